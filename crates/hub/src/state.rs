use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sprinkler::{FixedWeather, StationCatalog, TickOutcome};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<SystemState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct SystemState {
    pub started_at: Instant,
    pub time_zone: String,
    pub last_tick: Option<DateTime<Utc>>,
    pub active_program: Option<String>,
    pub water_adjust_percent: u32,
    pub weather: WeatherOverrides,
    pub stations: Vec<StationState>,
    pub schedule: Vec<ScheduledProgram>,
    pub events: VecDeque<SystemEvent>,
}

/// Weather decisions the controller reads every tick. Seeded from the config
/// file and editable over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherOverrides {
    pub rain_delay: bool,
    pub cold_weather_lockout: bool,
    pub watering_percent: u32,
}

impl Default for WeatherOverrides {
    fn default() -> Self {
        Self {
            rain_delay: false,
            cold_weather_lockout: false,
            watering_percent: 100,
        }
    }
}

impl From<WeatherOverrides> for FixedWeather {
    fn from(w: WeatherOverrides) -> Self {
        FixedWeather {
            rain_delay: w.rain_delay,
            cold_weather_lockout: w.cold_weather_lockout,
            watering_percent: w.watering_percent,
        }
    }
}

#[derive(Clone, Serialize)]
pub struct StationState {
    pub number: u32,
    pub enabled: bool,
    pub on: bool,
    pub last_changed: Option<DateTime<Utc>>,
}

#[derive(Clone, Serialize)]
pub struct ScheduledProgram {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    pub ts: DateTime<Utc>,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Program,
    Station,
    Weather,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub time_zone: String,
    pub last_tick: Option<DateTime<Utc>>,
    pub active_program: Option<String>,
    pub water_adjust_percent: u32,
    pub weather: WeatherOverrides,
    pub stations: Vec<StationState>,
    pub schedule: Vec<ScheduledProgram>,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl SystemState {
    pub fn new(time_zone: &str, stations: &StationCatalog, weather: WeatherOverrides) -> Self {
        let stations = stations
            .iter()
            .map(|s| StationState {
                number: s.number.0,
                enabled: s.enabled,
                on: s.is_on(),
                last_changed: None,
            })
            .collect();

        Self {
            started_at: Instant::now(),
            time_zone: time_zone.to_string(),
            last_tick: None,
            active_program: None,
            water_adjust_percent: weather.watering_percent,
            weather,
            stations,
            schedule: Vec::new(),
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Record the result of one controller tick. `stopped_program` names the
    /// program a lockout or rain delay cut short on this tick, if any.
    /// `pattern` has one flag per station, in the same order the state was
    /// built with.
    pub fn record_tick(
        &mut self,
        now: DateTime<Utc>,
        outcome: TickOutcome,
        active_program: Option<String>,
        stopped_program: Option<String>,
        water_adjust_percent: u32,
        pattern: &[bool],
    ) {
        self.last_tick = Some(now);
        self.water_adjust_percent = water_adjust_percent;

        let previous = self.active_program.take();
        match outcome {
            TickOutcome::LockedOut | TickOutcome::RainDelayed => {
                let reason = if outcome == TickOutcome::LockedOut {
                    "cold weather lockout"
                } else {
                    "rain delay"
                };
                if let Some(name) = stopped_program.or(previous) {
                    self.push_event(EventKind::Program, format!("{name} stopped: {reason}"));
                }
            }
            _ => match (&previous, &active_program) {
                (Some(name), None) if outcome == TickOutcome::Finished => {
                    self.push_event(EventKind::Program, format!("{name} finished"));
                }
                (None, Some(name)) => {
                    self.push_event(EventKind::Program, format!("{name} started"));
                }
                _ => {}
            },
        }
        self.active_program = active_program;

        let mut changes = Vec::new();
        for (station, on) in self.stations.iter_mut().zip(pattern) {
            if station.on != *on {
                station.on = *on;
                station.last_changed = Some(now);
                changes.push(format!("station {} {}", station.number, if *on { "ON" } else { "OFF" }));
            }
        }
        for detail in changes {
            self.push_event(EventKind::Station, detail);
        }
    }

    pub fn set_weather(&mut self, weather: WeatherOverrides) {
        if weather != self.weather {
            self.push_event(
                EventKind::Weather,
                format!(
                    "rain_delay={} cold_weather_lockout={} watering_percent={}",
                    weather.rain_delay, weather.cold_weather_lockout, weather.watering_percent
                ),
            );
        }
        self.weather = weather;
    }

    pub fn set_schedule(&mut self, schedule: Vec<ScheduledProgram>) {
        let detail = if schedule.is_empty() {
            "no programs scheduled today".to_string()
        } else {
            format!(
                "scheduled today: {}",
                schedule
                    .iter()
                    .map(|p| p.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        self.schedule = schedule;
        self.push_event(EventKind::System, detail);
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            time_zone: self.time_zone.clone(),
            last_tick: self.last_tick,
            active_program: self.active_program.clone(),
            water_adjust_percent: self.water_adjust_percent,
            weather: self.weather,
            stations: self.stations.clone(),
            schedule: self.schedule.clone(),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: Utc::now(),
            kind,
            detail,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================
