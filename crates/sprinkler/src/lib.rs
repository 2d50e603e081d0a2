//! Scheduling and station-state engine for an irrigation controller.
//!
//! Programs are authored in local civil time (a start time of day plus a
//! day rule) but are materialized into absolute UTC intervals before the
//! controller ever sees them. The controller only deals with a monotonically
//! increasing UTC clock, so DST transitions never shorten or stretch a run.
//!
//! ```text
//! Controller::on_tick(now)
//!   ├─ cold lockout?  ──▶ stop everything
//!   ├─ no program?    ──▶ ProgramManager::get_program(now)
//!   ├─ rain delay?    ──▶ stop everything
//!   └─ SprinklerProgram::update_program(now) ──▶ Board::apply_pattern
//! ```

pub mod board;
pub mod controller;
pub mod error;
pub mod manager;
pub mod program;
pub mod station;
pub mod time;
pub mod weather;

pub use board::{Board, VirtualBoard};
pub use controller::{Controller, TickOutcome};
pub use error::{Result, ScheduleError};
pub use manager::{remove_duplicate_even_odd_starts, ConfigProgramManager, ProgramManager};
pub use program::{ProgramConfig, ProgramKind, ProgramTimeline, SprinklerProgram, StationDuration};
pub use station::{Station, StationCatalog, StationId};
pub use weather::{FixedWeather, WeatherPolicy};
