mod config;
mod state;
mod valve;
mod web;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::{env, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use sprinkler::{ConfigProgramManager, Controller, FixedWeather};
use state::{ScheduledProgram, SharedState, SystemState};
use valve::ShiftRegisterBoard;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let web_port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);
    let tick_ms: u64 = env::var("TICK_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|ms| *ms > 0)
        .unwrap_or(1000);
    let active_low = env::var("RELAY_ACTIVE_LOW")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    // ── Config file ─────────────────────────────────────────────────
    let cfg = config::load(&config_path)?;
    let tz = cfg.time_zone()?;
    let stations = cfg.station_catalog();
    let programs = cfg.program_configs()?;

    tracing::info!(
        config = %config_path,
        time_zone = %tz,
        stations = stations.len(),
        programs = programs.len(),
        "config loaded"
    );

    // ── Controller ──────────────────────────────────────────────────
    let board = ShiftRegisterBoard::new(stations.len(), active_low)
        .context("failed to initialise valve board")?;
    let manager = ConfigProgramManager::new(programs, tz, cfg.jitter_sec);
    let weather: FixedWeather = cfg.weather.into();
    let mut controller = Controller::new(stations, manager, board, weather);
    controller.full_stop();

    // ── Shared state (ephemeral, for the status API) ────────────────
    let shared: SharedState = Arc::new(RwLock::new(SystemState::new(
        &cfg.time_zone,
        controller.stations(),
        cfg.weather,
    )));
    shared.write().await.record_system("hub started".to_string());

    // ── Web server ──────────────────────────────────────────────────
    let web_state = Arc::clone(&shared);
    tokio::spawn(async move {
        if let Err(e) = web::serve(Arc::clone(&web_state), web_port).await {
            tracing::error!("web server stopped: {e:#}");
            web_state
                .write()
                .await
                .record_error(format!("web server stopped: {e:#}"));
        }
    });

    // ── Tick loop ───────────────────────────────────────────────────
    let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut schedule_day: Option<NaiveDate> = None;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick(&mut controller, &shared, tz, &mut schedule_day).await;
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown requested, turning all stations off");
                controller.full_stop();
                shared.write().await.record_system("hub stopped".to_string());
                break;
            }
        }
    }

    Ok(())
}

/// One controller step: pull the current weather overrides, advance the
/// controller, then publish what happened to the shared state.
async fn tick(
    controller: &mut Controller<ConfigProgramManager, ShiftRegisterBoard, FixedWeather>,
    shared: &SharedState,
    tz: Tz,
    schedule_day: &mut Option<NaiveDate>,
) {
    let overrides = shared.read().await.weather;
    *controller.weather_mut() = overrides.into();

    let now_utc = Utc::now();
    let now = now_utc.timestamp();
    let outcome = controller.on_tick(now);

    let today = now_utc.with_timezone(&tz).date_naive();
    let schedule = if *schedule_day != Some(today) {
        *schedule_day = Some(today);
        let programs = controller
            .manager()
            .scheduled_for_day(now, controller.stations());
        Some(
            programs
                .iter()
                .filter_map(|p| {
                    Some(ScheduledProgram {
                        name: p.name(),
                        start: DateTime::from_timestamp(p.start_time(), 0)?,
                        end: DateTime::from_timestamp(p.program_end_time(), 0)?,
                    })
                })
                .collect::<Vec<_>>(),
        )
    } else {
        None
    };

    let active = controller.active_program().map(|p| p.name());
    let stopped = controller.stopped_program().map(|p| p.name());
    let pattern = controller.stations().pattern();

    let mut st = shared.write().await;
    if let Some(schedule) = schedule {
        st.set_schedule(schedule);
    }
    st.record_tick(
        now_utc,
        outcome,
        active,
        stopped,
        controller.water_adjust_percent(),
        &pattern,
    );
}
