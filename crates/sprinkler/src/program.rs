//! Program configurations and their materialized, UTC-anchored form.
//!
//! A [`ProgramConfig`] lives in relative time: "start at 06:00 local, run
//! station 1 for 55 minutes, then station 2 for 40 minutes, on even days".
//! A [`SprinklerProgram`] is that configuration pinned to one specific day:
//! every station has an absolute `[start, end)` interval in UTC seconds.
//! Once materialized, the controller never thinks about local time again.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use chrono::{Datelike, Utc};
use chrono_tz::Tz;

use crate::error::{Result, ScheduleError};
use crate::station::{StationCatalog, StationId};
use crate::time::{local_datetime_for_utc, utc_for_local_midnight, SECONDS_PER_DAY};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which days a program may run on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// Weekdays, 0 = Monday.
    DaysOfWeek(BTreeSet<u8>),
    EvenDays,
    OddDays,
}

impl ProgramKind {
    pub fn valid_on_day<D: Datelike>(&self, day: &D) -> bool {
        match self {
            Self::DaysOfWeek(days) => {
                let weekday = day.weekday().num_days_from_monday() as u8;
                days.contains(&weekday)
            }
            Self::EvenDays => day.day() % 2 == 0,
            Self::OddDays => day.day() % 2 == 1,
        }
    }

    pub fn is_even_odd(&self) -> bool {
        matches!(self, Self::EvenDays | Self::OddDays)
    }
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DaysOfWeek(_) => f.write_str("days_of_week"),
            Self::EvenDays => f.write_str("even_days"),
            Self::OddDays => f.write_str("odd_days"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationDuration {
    pub station: StationId,
    pub duration_sec: u32,
}

impl StationDuration {
    pub fn new(station: u32, duration_sec: u32) -> Self {
        Self {
            station: StationId(station),
            duration_sec,
        }
    }
}

/// A validated program definition, not yet tied to any day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramConfig {
    name: Option<String>,
    start_time_of_day: u32,
    station_durations: Vec<StationDuration>,
    kind: ProgramKind,
    respect_rain: bool,
    respect_water_adjustment: bool,
}

impl ProgramConfig {
    /// Create a program that respects both rain delay and watering
    /// adjustment. Use the `respect_*` builders to opt out.
    pub fn new(
        start_time_of_day: u32,
        station_durations: Vec<StationDuration>,
        kind: ProgramKind,
    ) -> Result<Self> {
        let cfg = Self {
            name: None,
            start_time_of_day,
            station_durations,
            kind,
            respect_rain: true,
            respect_water_adjustment: true,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ScheduleError::InvalidProgram {
            name: self.name(),
            reason,
        };
        if self.start_time_of_day >= SECONDS_PER_DAY {
            return Err(invalid(format!(
                "start_time_of_day {} is not within a day",
                self.start_time_of_day
            )));
        }
        if let ProgramKind::DaysOfWeek(days) = &self.kind {
            if days.is_empty() {
                return Err(invalid("days_of_week is empty".to_string()));
            }
            if let Some(bad) = days.iter().find(|d| **d > 6) {
                return Err(invalid(format!("weekday {bad} is not 0 - 6")));
            }
        }
        Ok(())
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = if name.trim().is_empty() { None } else { Some(name) };
        self
    }

    pub fn respect_rain(mut self, respect: bool) -> Self {
        self.respect_rain = respect;
        self
    }

    pub fn respect_water_adjustment(mut self, respect: bool) -> Self {
        self.respect_water_adjustment = respect;
        self
    }

    /// The configured name, or one derived from the kind and start time.
    pub fn name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.kind {
            ProgramKind::DaysOfWeek(days) => {
                let dow = days
                    .iter()
                    .map(u8::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}_{}_{dow}", self.kind, self.start_time_of_day)
            }
            _ => format!("{}_{}", self.kind, self.start_time_of_day),
        }
    }

    pub fn start_time_of_day(&self) -> u32 {
        self.start_time_of_day
    }

    pub fn station_durations(&self) -> &[StationDuration] {
        &self.station_durations
    }

    pub fn kind(&self) -> &ProgramKind {
        &self.kind
    }

    pub fn respects_rain(&self) -> bool {
        self.respect_rain
    }

    pub fn respects_water_adjustment(&self) -> bool {
        self.respect_water_adjustment
    }

    pub fn valid_on_day<D: Datelike>(&self, day: &D) -> bool {
        self.kind.valid_on_day(day)
    }

    /// Whether this program should be starting around `now`, allowing
    /// `jitter` seconds early or late.
    pub fn should_run_now(&self, now: i64, tz: Tz, jitter: i64) -> Result<bool> {
        let local = local_datetime_for_utc(now, tz)?;
        if !self.valid_on_day(&local) {
            return Ok(false);
        }
        let program_start = utc_for_local_midnight(now, tz)? + i64::from(self.start_time_of_day);
        let window = program_start.saturating_sub(jitter)..=program_start.saturating_add(jitter);
        Ok(window.contains(&now))
    }
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// One station's run window, in UTC seconds. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramTime {
    pub start: i64,
    pub end: i64,
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    time: ProgramTime,
    station: StationId,
    index: usize,
}

/// Stations laid out back to back from a start instant, in configuration
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramTimeline {
    slots: Vec<Slot>,
}

impl ProgramTimeline {
    fn build(start_time: i64, entries: impl IntoIterator<Item = (StationId, usize, i64)>) -> Self {
        let mut running = start_time;
        let slots = entries
            .into_iter()
            .map(|(station, index, duration)| {
                let start = running;
                let end = start.saturating_add(duration);
                running = end;
                Slot {
                    time: ProgramTime {
                        start,
                        end,
                        duration,
                    },
                    station,
                    index,
                }
            })
            .collect();
        Self { slots }
    }

    pub fn slots(&self) -> impl Iterator<Item = (ProgramTime, StationId)> + '_ {
        self.slots.iter().map(|s| (s.time, s.station))
    }

    pub fn run_time(&self) -> i64 {
        self.slots.iter().map(|s| s.time.duration).sum()
    }

    pub fn end_time(&self) -> Option<i64> {
        self.slots.iter().map(|s| s.time.end).max()
    }
}

// ---------------------------------------------------------------------------
// Materialized program
// ---------------------------------------------------------------------------

/// A program pinned to one absolute start instant.
#[derive(Debug, Clone)]
pub struct SprinklerProgram {
    config: ProgramConfig,
    start_time: i64,
    timeline: ProgramTimeline,
    stations_used: BTreeMap<StationId, usize>,
}

impl PartialEq for SprinklerProgram {
    fn eq(&self, other: &Self) -> bool {
        self.start_time == other.start_time
            && self.stations() == other.stations()
            && self.config == other.config
    }
}

impl SprinklerProgram {
    /// Lay out `config` starting at the UTC instant `start_time`.
    pub fn materialize(
        config: &ProgramConfig,
        stations: &StationCatalog,
        start_time: i64,
    ) -> Result<Self> {
        let mut stations_used = BTreeMap::new();
        for entry in &config.station_durations {
            let index =
                stations
                    .index_of(entry.station)
                    .ok_or_else(|| ScheduleError::UnknownStation {
                        program: config.name(),
                        station: entry.station,
                    })?;
            stations_used.insert(entry.station, index);
        }

        let mut program = Self {
            config: config.clone(),
            start_time,
            timeline: ProgramTimeline::default(),
            stations_used,
        };
        program.rebuild(100);
        Ok(program)
    }

    /// Materialize `config` for the local day containing `now`. A `now` of
    /// zero or less means "the current time".
    pub fn factory(
        config: &ProgramConfig,
        stations: &StationCatalog,
        now: i64,
        tz: Tz,
    ) -> Result<Self> {
        let now = if now <= 0 { Utc::now().timestamp() } else { now };
        let start_time = utc_for_local_midnight(now, tz)? + i64::from(config.start_time_of_day);
        Self::materialize(config, stations, start_time)
    }

    fn rebuild(&mut self, percent: u32) {
        let stations_used = &self.stations_used;
        let entries = self.config.station_durations.iter().filter_map(|entry| {
            let index = *stations_used.get(&entry.station)?;
            Some((entry.station, index, scale(entry.duration_sec, percent)))
        });
        self.timeline = ProgramTimeline::build(self.start_time, entries);
    }

    /// Scale every station's duration by `percent` (100 = unchanged).
    /// No-op for programs that ignore watering adjustment.
    pub fn adjust_watering(&mut self, percent: u32) {
        if !self.config.respect_water_adjustment {
            return;
        }
        self.rebuild(percent);
    }

    /// Turn each of this program's stations on or off for `now`. Stations
    /// outside their window are switched off; other stations are untouched.
    pub fn update_program(&self, now: i64, stations: &mut StationCatalog) {
        let active: HashSet<usize> = self
            .timeline
            .slots
            .iter()
            .filter(|s| s.time.start <= now && now < s.time.end)
            .map(|s| s.index)
            .collect();
        for &index in self.stations_used.values() {
            if let Some(station) = stations.by_index_mut(index) {
                station.set_on(active.contains(&index));
            }
        }
    }

    /// Strictly after the end of the last station.
    pub fn program_over(&self, now: i64) -> bool {
        now > self.program_end_time()
    }

    pub fn program_run_time(&self) -> i64 {
        self.timeline.run_time()
    }

    pub fn program_end_time(&self) -> i64 {
        self.timeline.end_time().unwrap_or(self.start_time)
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Stations in run order.
    pub fn stations(&self) -> Vec<StationId> {
        self.timeline.slots().map(|(_, id)| id).collect()
    }

    pub fn timeline(&self) -> &ProgramTimeline {
        &self.timeline
    }

    pub fn config(&self) -> &ProgramConfig {
        &self.config
    }

    pub fn name(&self) -> String {
        self.config.name()
    }

    pub fn kind(&self) -> &ProgramKind {
        &self.config.kind
    }

    pub fn respects_rain_delay(&self) -> bool {
        self.config.respect_rain
    }

    pub fn respects_water_adjustment(&self) -> bool {
        self.config.respect_water_adjustment
    }
}

/// `duration_sec * percent / 100`, rounded half to even.
fn scale(duration_sec: u32, percent: u32) -> i64 {
    if percent == 100 {
        return i64::from(duration_sec);
    }
    (f64::from(duration_sec) * f64::from(percent) / 100.0).round_ties_even() as i64
}

// ===========================================================================
// Tests
// ===========================================================================
