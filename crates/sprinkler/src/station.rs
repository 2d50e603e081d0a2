//! Stations (valves) and the catalog that owns them.
//!
//! The catalog is the single owner of station state. Programs and boards
//! refer to stations by [`StationId`] or by catalog position, never by
//! holding their own copies.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StationId(pub u32);

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    pub number: StationId,
    pub enabled: bool,
    /// Informational only; the engine applies weather policy per program.
    pub weather_aware: bool,
    on: bool,
}

impl Station {
    pub fn new(number: u32, enabled: bool, weather_aware: bool) -> Self {
        Self {
            number: StationId(number),
            enabled,
            weather_aware,
            on: false,
        }
    }

    /// Request a state. A disabled station always stays off.
    pub fn set_on(&mut self, desired: bool) -> bool {
        self.on = self.enabled && desired;
        self.on
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

/// All stations of a board, in board (output) order.
#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    stations: Vec<Station>,
}

impl StationCatalog {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Catalog position of a station, used as a stable handle by programs.
    pub fn index_of(&self, id: StationId) -> Option<usize> {
        self.stations.iter().position(|s| s.number == id)
    }

    pub fn get(&self, id: StationId) -> Option<&Station> {
        self.stations.iter().find(|s| s.number == id)
    }

    pub fn get_mut(&mut self, id: StationId) -> Option<&mut Station> {
        self.stations.iter_mut().find(|s| s.number == id)
    }

    pub(crate) fn by_index_mut(&mut self, index: usize) -> Option<&mut Station> {
        self.stations.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter()
    }

    pub fn set_all_off(&mut self) {
        for station in &mut self.stations {
            station.set_on(false);
        }
    }

    /// One flag per station, in catalog order.
    pub fn pattern(&self) -> Vec<bool> {
        self.stations.iter().map(Station::is_on).collect()
    }
}
