//! TOML config file loading and validation for stations, programs and the
//! initial weather overrides.

use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};

use sprinkler::manager::DEFAULT_JITTER_SEC;
use sprinkler::time::seconds_from_midnight;
use sprinkler::{ProgramConfig, ProgramKind, Station, StationCatalog, StationDuration};

use crate::state::WeatherOverrides;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Config {
    pub time_zone: String,
    #[serde(default = "default_jitter")]
    pub jitter_sec: i64,
    #[serde(default)]
    pub weather: WeatherOverrides,
    #[serde(default)]
    pub stations: Vec<StationEntry>,
    #[serde(default)]
    pub programs: Vec<ProgramEntry>,
}

#[derive(Debug, Deserialize)]
pub struct StationEntry {
    pub number: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub weather_aware: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProgramEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub start_hour: u32,
    #[serde(default)]
    pub start_minute: u32,
    pub program_type: String,
    #[serde(default)]
    pub days_of_the_week: Vec<i64>,
    pub respect_rain: bool,
    pub respect_water_adjustment: bool,
    pub station_durations: Vec<DurationEntry>,
}

#[derive(Debug, Deserialize)]
pub struct DurationEntry {
    pub station_id: u32,
    pub duration_sec: i64,
}

fn default_jitter() -> i64 {
    DEFAULT_JITTER_SEC
}

fn default_true() -> bool {
    true
}

/// Upper bound for the watering adjustment, in percent.
pub const MAX_WATERING_PERCENT: u32 = 400;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if let Err(e) = self.time_zone() {
            errors.push(e.to_string());
        }
        if self.jitter_sec < 0 {
            errors.push(format!("jitter_sec must not be negative, got {}", self.jitter_sec));
        }
        if self.weather.watering_percent > MAX_WATERING_PERCENT {
            errors.push(format!(
                "weather.watering_percent {} out of range [0, {MAX_WATERING_PERCENT}]",
                self.weather.watering_percent
            ));
        }
        self.validate_stations(&mut errors);
        self.validate_programs(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_stations(&self, errors: &mut Vec<String>) {
        let mut seen: HashSet<u32> = HashSet::new();
        for s in &self.stations {
            if !seen.insert(s.number) {
                errors.push(format!("station {}: duplicate number", s.number));
            }
        }
    }

    fn validate_programs(&self, errors: &mut Vec<String>) {
        let station_ids: HashSet<u32> = self.stations.iter().map(|s| s.number).collect();

        for (i, p) in self.programs.iter().enumerate() {
            let ctx = || match &p.name {
                Some(name) if !name.trim().is_empty() => format!("program '{name}'"),
                _ => format!("programs[{i}]"),
            };

            // ── Start time ──────────────────────────────────────
            if let Err(e) = seconds_from_midnight(p.start_hour, p.start_minute) {
                errors.push(format!("{}: {e}", ctx()));
            }

            // ── Day rule ────────────────────────────────────────
            if let Err(e) = parse_kind(p) {
                errors.push(format!("{}: {e}", ctx()));
            }

            // ── Stations ────────────────────────────────────────
            if p.station_durations.is_empty() {
                errors.push(format!("{}: station_durations is empty", ctx()));
            }
            for d in &p.station_durations {
                if !station_ids.contains(&d.station_id) {
                    errors.push(format!(
                        "{}: station_id {} does not match any defined station",
                        ctx(),
                        d.station_id
                    ));
                }
                if d.duration_sec < 0 {
                    errors.push(format!(
                        "{}: duration_sec for station {} must not be negative, got {}",
                        ctx(),
                        d.station_id,
                        d.duration_sec
                    ));
                }
            }
        }
    }

    pub fn time_zone(&self) -> Result<Tz> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|e| anyhow!("unknown time_zone '{}': {e}", self.time_zone))
    }

    pub fn station_catalog(&self) -> StationCatalog {
        StationCatalog::new(
            self.stations
                .iter()
                .map(|s| Station::new(s.number, s.enabled, s.weather_aware))
                .collect(),
        )
    }

    /// Convert every program entry into a core [`ProgramConfig`].
    pub fn program_configs(&self) -> Result<Vec<ProgramConfig>> {
        self.programs
            .iter()
            .enumerate()
            .map(|(i, p)| {
                to_program_config(p).with_context(|| format!("invalid program programs[{i}]"))
            })
            .collect()
    }
}

/// The day rule of a program entry. Unknown program types are rejected
/// rather than treated as even days.
fn parse_kind(p: &ProgramEntry) -> Result<ProgramKind, String> {
    match p.program_type.trim() {
        "days_of_week" => {
            if p.days_of_the_week.is_empty() {
                return Err("days_of_the_week is empty for a days_of_week program".into());
            }
            let mut days = BTreeSet::new();
            for d in &p.days_of_the_week {
                match u8::try_from(*d) {
                    Ok(day) if day <= 6 => {
                        days.insert(day);
                    }
                    _ => return Err(format!("day of week {d} out of range [0, 6] (0 = Monday)")),
                }
            }
            Ok(ProgramKind::DaysOfWeek(days))
        }
        "even_days" => Ok(ProgramKind::EvenDays),
        "odd_days" => Ok(ProgramKind::OddDays),
        other => Err(format!(
            "unknown program_type '{other}' (expected days_of_week, even_days or odd_days)"
        )),
    }
}

fn to_program_config(p: &ProgramEntry) -> Result<ProgramConfig> {
    let start = seconds_from_midnight(p.start_hour, p.start_minute)?;
    let kind = parse_kind(p).map_err(|e| anyhow!(e))?;
    let durations = p
        .station_durations
        .iter()
        .map(|d| {
            let secs = u32::try_from(d.duration_sec)
                .with_context(|| format!("duration_sec {} out of range", d.duration_sec))?;
            Ok(StationDuration::new(d.station_id, secs))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut cfg = ProgramConfig::new(start, durations, kind)?
        .respect_rain(p.respect_rain)
        .respect_water_adjustment(p.respect_water_adjustment);
    if let Some(name) = &p.name {
        cfg = cfg.named(name.clone());
    }
    Ok(cfg)
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
