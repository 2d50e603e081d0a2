//! The output side of the controller.
//!
//! A board turns a station bit pattern into physical valve states. The
//! engine only ever hands it a pattern; how that reaches the hardware (shift
//! register, relays, nothing at all) is the board's business.

use anyhow::Result;
use tracing::debug;

use crate::station::StationCatalog;

pub trait Board {
    /// Drive the outputs. One flag per station, in catalog order.
    fn apply_pattern(&mut self, pattern: &[bool]) -> Result<()>;

    fn stop_all_stations(&mut self, stations: &mut StationCatalog) -> Result<()> {
        stations.set_all_off();
        self.apply_pattern(&stations.pattern())
    }
}

/// A board with no hardware behind it. Remembers every pattern it was given.
#[derive(Debug, Default, Clone)]
pub struct VirtualBoard {
    history: Vec<Vec<bool>>,
}

impl VirtualBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_pattern(&self) -> Option<&[bool]> {
        self.history.last().map(Vec::as_slice)
    }

    pub fn history(&self) -> &[Vec<bool>] {
        &self.history
    }
}

impl Board for VirtualBoard {
    fn apply_pattern(&mut self, pattern: &[bool]) -> Result<()> {
        debug!(pattern = %format_pattern(pattern), "virtual board");
        self.history.push(pattern.to_vec());
        Ok(())
    }
}

/// `1` for on, `0` for off, first station first.
pub fn format_pattern(pattern: &[bool]) -> String {
    pattern.iter().map(|on| if *on { '1' } else { '0' }).collect()
}
