use thiserror::Error;

use crate::station::StationId;

pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Failures surfaced by the scheduling engine.
///
/// "No program right now", lockouts and rain delays are not errors; they are
/// ordinary tick outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("{field} must be {min} - {max}: {value}")]
    Range {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("program '{program}' references unknown station {station}")]
    UnknownStation { program: String, station: StationId },

    #[error("no program configuration named '{0}'")]
    NotFound(String),

    #[error("invalid program '{name}': {reason}")]
    InvalidProgram { name: String, reason: String },

    #[error("timestamp {0} is outside the representable range")]
    InvalidTimestamp(i64),
}
