//! Program storage and selection.
//!
//! The manager is the seam between the controller and wherever programs come
//! from. All the controller needs is "give me the program to run at `now`",
//! in UTC. Only one program runs at a time: the valves share a supply line
//! and the board can only drive so much current.

use std::collections::HashSet;

use chrono_tz::Tz;
use tracing::warn;

use crate::error::{Result, ScheduleError};
use crate::program::{ProgramConfig, SprinklerProgram};
use crate::station::StationCatalog;
use crate::time::{after_now, local_datetime_for_utc};

/// Default tolerance, in seconds, for a tick landing after a start time.
pub const DEFAULT_JITTER_SEC: i64 = 5;

pub trait ProgramManager {
    /// The program that should start at `now`, if any.
    fn get_program(&self, now: i64, stations: &StationCatalog) -> Option<SprinklerProgram>;

    /// Remove every configuration in `deletions`, then append `additions`.
    /// Nothing changes if any deletion is missing.
    fn update_configurations(
        &mut self,
        additions: Vec<ProgramConfig>,
        deletions: &[ProgramConfig],
    ) -> Result<()>;
}

/// Keeps validated [`ProgramConfig`]s and materializes them on demand.
#[derive(Debug, Clone)]
pub struct ConfigProgramManager {
    programs: Vec<ProgramConfig>,
    tz: Tz,
    jitter: i64,
}

impl ConfigProgramManager {
    pub fn new(programs: Vec<ProgramConfig>, tz: Tz, jitter: i64) -> Self {
        Self {
            programs,
            tz,
            jitter,
        }
    }

    pub fn programs(&self) -> &[ProgramConfig] {
        &self.programs
    }

    pub fn time_zone(&self) -> Tz {
        self.tz
    }

    pub fn jitter(&self) -> i64 {
        self.jitter
    }

    /// Every configuration whose start instant today was at most `jitter`
    /// seconds ago, in insertion order. Day rules are not applied here.
    pub fn search_by_time(&self, now: i64, stations: &StationCatalog) -> Vec<SprinklerProgram> {
        self.materialize_all(now, stations)
            .filter(|p| after_now(now, p.start_time(), self.jitter))
            .collect()
    }

    /// Every configuration that runs on the local day containing `now`, with
    /// duplicate even/odd starts removed.
    pub fn scheduled_for_day(&self, now: i64, stations: &StationCatalog) -> Vec<SprinklerProgram> {
        let Ok(local) = local_datetime_for_utc(now, self.tz) else {
            return Vec::new();
        };
        let todays = self
            .materialize_all(now, stations)
            .filter(|p| p.kind().valid_on_day(&local))
            .collect();
        remove_duplicate_even_odd_starts(todays)
    }

    fn materialize_all<'a>(
        &'a self,
        now: i64,
        stations: &'a StationCatalog,
    ) -> impl Iterator<Item = SprinklerProgram> + 'a {
        self.programs.iter().filter_map(move |cfg| {
            match SprinklerProgram::factory(cfg, stations, now, self.tz) {
                Ok(program) => Some(program),
                Err(e) => {
                    warn!(program = %cfg.name(), "skipping program: {e}");
                    None
                }
            }
        })
    }
}

impl ProgramManager for ConfigProgramManager {
    /// First match wins: candidates at the same start time are tried in
    /// insertion order.
    fn get_program(&self, now: i64, stations: &StationCatalog) -> Option<SprinklerProgram> {
        let local = match local_datetime_for_utc(now, self.tz) {
            Ok(local) => local,
            Err(e) => {
                warn!(now, "cannot resolve local date: {e}");
                return None;
            }
        };
        self.search_by_time(now, stations)
            .into_iter()
            .find(|p| p.kind().valid_on_day(&local))
    }

    fn update_configurations(
        &mut self,
        additions: Vec<ProgramConfig>,
        deletions: &[ProgramConfig],
    ) -> Result<()> {
        let mut remaining = self.programs.clone();
        for del in deletions {
            let pos = remaining
                .iter()
                .position(|p| p == del)
                .ok_or_else(|| ScheduleError::NotFound(del.name()))?;
            remaining.remove(pos);
        }
        remaining.extend(additions);
        self.programs = remaining;
        Ok(())
    }
}

/// Keep only the first even-days and the first odd-days program at any given
/// start instant. Day-of-week programs always pass through.
pub fn remove_duplicate_even_odd_starts(programs: Vec<SprinklerProgram>) -> Vec<SprinklerProgram> {
    let mut seen = HashSet::new();
    programs
        .into_iter()
        .filter(|p| !p.kind().is_even_odd() || seen.insert((p.kind().clone(), p.start_time())))
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================
