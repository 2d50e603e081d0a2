//! The controller main loop.
//!
//! `on_tick` is called with the current UTC time, typically once a second.
//! It checks weather lockouts, picks up a new program when idle, advances the
//! active one, and pushes the resulting station pattern to the board.
//!
//! ```text
//! Idle ──[manager has a program]──▶ Running ──[now > program end]──▶ Idle
//!  ▲                                   │
//!  └──[cold lockout / rain delay]──────┘   (stations forced off)
//! ```
//!
//! Only one program runs at a time. The controller never reads the wall
//! clock; every decision is made against the `now` it was handed.

use tracing::{error, info, warn};

use crate::board::Board;
use crate::manager::ProgramManager;
use crate::program::SprinklerProgram;
use crate::station::StationCatalog;
use crate::weather::WeatherPolicy;

/// What a tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Cold weather: everything stopped.
    LockedOut,
    /// The active program respects rain delay and was stopped.
    RainDelayed,
    /// Nothing to run.
    Idle,
    /// A program is active.
    Running,
    /// The active program ended on this tick.
    Finished,
}

pub struct Controller<M, B, W> {
    stations: StationCatalog,
    manager: M,
    board: B,
    weather: W,
    active: Option<SprinklerProgram>,
    /// The last program that ran to its end. A short program can finish
    /// inside its own start window; this keeps it from being picked up
    /// again. Runs cut short by a lockout or rain delay never land here, so
    /// they restart from the beginning if still inside the window.
    last_finished: Option<SprinklerProgram>,
    /// Whatever a lockout or rain delay stopped on the latest tick.
    stopped: Option<SprinklerProgram>,
    water_adjust_percent: u32,
    last_tick: Option<i64>,
}

impl<M, B, W> Controller<M, B, W>
where
    M: ProgramManager,
    B: Board,
    W: WeatherPolicy,
{
    pub fn new(stations: StationCatalog, manager: M, board: B, weather: W) -> Self {
        Self {
            stations,
            manager,
            board,
            weather,
            active: None,
            last_finished: None,
            stopped: None,
            water_adjust_percent: 100,
            last_tick: None,
        }
    }

    pub fn on_tick(&mut self, now: i64) -> TickOutcome {
        if let Some(last) = self.last_tick {
            if now < last {
                warn!(now, last, "clock went backwards");
            }
        }
        self.last_tick = Some(now);
        self.stopped = None;

        // Everything respects the cold weather lockout.
        if self.weather.cold_weather_lockout() {
            if let Some(program) = self.active.take() {
                info!(program = %program.name(), "cold weather lockout, stopping program");
                self.stopped = Some(program);
            }
            self.full_stop();
            return TickOutcome::LockedOut;
        }

        self.water_adjust_percent = self
            .weather
            .update_watering_percentage(self.water_adjust_percent);

        if self.active.is_none() {
            self.active = self.next_program(now);
        }

        let Some(program) = self.active.as_ref() else {
            self.apply();
            return TickOutcome::Idle;
        };

        if self.weather.rain_delay() && program.respects_rain_delay() {
            info!(program = %program.name(), "rain delay, stopping program");
            self.stopped = self.active.take();
            self.full_stop();
            return TickOutcome::RainDelayed;
        }

        program.update_program(now, &mut self.stations);
        let over = program.program_over(now);
        self.apply();

        if over {
            if let Some(program) = self.active.take() {
                info!(program = %program.name(), "program finished");
                self.last_finished = Some(program);
            }
            return TickOutcome::Finished;
        }
        TickOutcome::Running
    }

    /// Turn every station off and push that to the board.
    pub fn full_stop(&mut self) {
        if let Err(e) = self.board.stop_all_stations(&mut self.stations) {
            error!("board: stop all stations failed: {e:#}");
        }
    }

    fn apply(&mut self) {
        if let Err(e) = self.board.apply_pattern(&self.stations.pattern()) {
            error!("board: apply pattern failed: {e:#}");
        }
    }

    fn next_program(&self, now: i64) -> Option<SprinklerProgram> {
        let candidate = self.manager.get_program(now, &self.stations)?;
        if self.last_finished.as_ref() == Some(&candidate) {
            return None;
        }

        let mut program = candidate;
        if program.respects_water_adjustment() {
            program.adjust_watering(self.water_adjust_percent);
        }
        info!(
            program = %program.name(),
            start = program.start_time(),
            run_time_sec = program.program_run_time(),
            water_adjust_percent = self.water_adjust_percent,
            "program started"
        );
        Some(program)
    }

    pub fn stations(&self) -> &StationCatalog {
        &self.stations
    }

    pub fn active_program(&self) -> Option<&SprinklerProgram> {
        self.active.as_ref()
    }

    /// The program a lockout or rain delay stopped on the most recent tick,
    /// including one cancelled on the tick it was picked up.
    pub fn stopped_program(&self) -> Option<&SprinklerProgram> {
        self.stopped.as_ref()
    }

    pub fn water_adjust_percent(&self) -> u32 {
        self.water_adjust_percent
    }

    pub fn last_tick(&self) -> Option<i64> {
        self.last_tick
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// For adding or removing program configurations between ticks.
    pub fn manager_mut(&mut self) -> &mut M {
        &mut self.manager
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn weather_mut(&mut self) -> &mut W {
        &mut self.weather
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::VirtualBoard;
    use crate::manager::{ConfigProgramManager, DEFAULT_JITTER_SEC};
    use crate::program::tests::{catalog, sample, APR_1_6AM, CENTRAL, RUN_TIME};
    use crate::program::{ProgramConfig, ProgramKind, StationDuration};
    use crate::station::{Station, StationId};
    use crate::weather::FixedWeather;

    type TestController = Controller<ConfigProgramManager, VirtualBoard, FixedWeather>;

    fn controller(programs: Vec<ProgramConfig>) -> TestController {
        Controller::new(
            catalog(),
            ConfigProgramManager::new(programs, CENTRAL, DEFAULT_JITTER_SEC),
            VirtualBoard::new(),
            FixedWeather::default(),
        )
    }

    fn is_on(c: &TestController, id: u32) -> bool {
        c.stations().get(StationId(id)).unwrap().is_on()
    }

    fn all_off(c: &TestController) -> bool {
        c.stations().iter().all(|s| !s.is_on())
    }

    // -- Idle / Running / Finished ----------------------------------------------

    #[test]
    fn idle_before_start_applies_pattern() {
        let mut c = controller(vec![sample(ProgramKind::OddDays)]);
        assert_eq!(c.on_tick(APR_1_6AM - 1), TickOutcome::Idle);
        assert!(c.active_program().is_none());
        assert_eq!(c.board().last_pattern(), Some(&[false; 8][..]));
    }

    #[test]
    fn program_starts_and_drives_board() {
        let mut c = controller(vec![sample(ProgramKind::OddDays)]);
        assert_eq!(c.on_tick(APR_1_6AM), TickOutcome::Running);
        assert!(is_on(&c, 1));
        assert_eq!(
            c.board().last_pattern(),
            Some(&[true, false, false, false, false, false, false, false][..])
        );
    }

    #[test]
    fn program_not_valid_today_stays_idle() {
        let mut c = controller(vec![sample(ProgramKind::EvenDays)]);
        assert_eq!(c.on_tick(APR_1_6AM), TickOutcome::Idle);
        assert!(all_off(&c));
    }

    #[test]
    fn program_runs_to_completion() {
        let mut c = controller(vec![sample(ProgramKind::OddDays)]);
        c.on_tick(APR_1_6AM);
        c.on_tick(APR_1_6AM + 55 * 60);
        assert!(!is_on(&c, 1));
        assert!(is_on(&c, 2));

        let end = APR_1_6AM + RUN_TIME;
        assert_eq!(c.on_tick(end - 1), TickOutcome::Running);
        assert!(is_on(&c, 5));
        assert_eq!(c.on_tick(end), TickOutcome::Running);
        assert!(all_off(&c));
        assert_eq!(c.on_tick(end + 1), TickOutcome::Finished);
        assert!(c.active_program().is_none());
        assert_eq!(c.on_tick(end + 2), TickOutcome::Idle);
    }

    #[test]
    fn program_not_picked_up_twice_in_start_window() {
        let cfg = ProgramConfig::new(21_600, vec![StationDuration::new(1, 2)], ProgramKind::OddDays).unwrap();
        let mut c = controller(vec![cfg]);
        assert_eq!(c.on_tick(APR_1_6AM), TickOutcome::Running);
        assert_eq!(c.on_tick(APR_1_6AM + 3), TickOutcome::Finished);
        // Still inside the jitter window, but it already ran.
        assert_eq!(c.on_tick(APR_1_6AM + 4), TickOutcome::Idle);
        assert!(all_off(&c));
    }

    #[test]
    fn same_program_runs_again_next_day() {
        let cfg = ProgramConfig::new(21_600, vec![StationDuration::new(1, 2)], ProgramKind::DaysOfWeek((0..7).collect()))
            .unwrap();
        let mut c = controller(vec![cfg]);
        assert_eq!(c.on_tick(APR_1_6AM), TickOutcome::Running);
        assert_eq!(c.on_tick(APR_1_6AM + 3), TickOutcome::Finished);
        assert_eq!(c.on_tick(APR_1_6AM + 86_400), TickOutcome::Running);
    }

    #[test]
    fn disabled_station_never_opens() {
        let mut stations: Vec<Station> = (1..=8).map(|n| Station::new(n, true, true)).collect();
        stations[0].enabled = false;
        let mut c = Controller::new(
            StationCatalog::new(stations),
            ConfigProgramManager::new(vec![sample(ProgramKind::OddDays)], CENTRAL, DEFAULT_JITTER_SEC),
            VirtualBoard::new(),
            FixedWeather::default(),
        );
        assert_eq!(c.on_tick(APR_1_6AM), TickOutcome::Running);
        assert!(!is_on(&c, 1));
        assert!(all_off(&c));
    }

    // -- Cold weather lockout ---------------------------------------------------

    #[test]
    fn cold_lockout_stops_running_program() {
        let mut c = controller(vec![sample(ProgramKind::OddDays)]);
        c.on_tick(APR_1_6AM);
        assert!(is_on(&c, 1));

        c.weather_mut().cold_weather_lockout = true;
        assert_eq!(c.on_tick(APR_1_6AM + 60), TickOutcome::LockedOut);
        assert!(c.active_program().is_none());
        assert!(c.stopped_program().is_some());
        assert!(all_off(&c));
        assert_eq!(c.board().last_pattern(), Some(&[false; 8][..]));

        assert_eq!(c.on_tick(APR_1_6AM + 61), TickOutcome::LockedOut);
        assert!(c.stopped_program().is_none());
    }

    #[test]
    fn after_lockout_next_program_starts_from_its_beginning() {
        let first = sample(ProgramKind::OddDays);
        let second = ProgramConfig::new(
            21_600 + 120,
            vec![StationDuration::new(7, 600), StationDuration::new(8, 600)],
            ProgramKind::OddDays,
        )
        .unwrap();
        let mut c = controller(vec![first, second]);
        c.on_tick(APR_1_6AM);

        c.weather_mut().cold_weather_lockout = true;
        assert_eq!(c.on_tick(APR_1_6AM + 60), TickOutcome::LockedOut);

        c.weather_mut().cold_weather_lockout = false;
        assert_eq!(c.on_tick(APR_1_6AM + 120), TickOutcome::Running);
        let active = c.active_program().unwrap();
        assert_eq!(active.start_time(), APR_1_6AM + 120);
        assert!(is_on(&c, 7));
        assert!(!is_on(&c, 1));
    }

    #[test]
    fn lockout_lifted_inside_start_window_restarts_program() {
        let mut c = controller(vec![sample(ProgramKind::OddDays)]);
        assert_eq!(c.on_tick(APR_1_6AM), TickOutcome::Running);

        c.weather_mut().cold_weather_lockout = true;
        assert_eq!(c.on_tick(APR_1_6AM + 1), TickOutcome::LockedOut);
        assert!(all_off(&c));

        c.weather_mut().cold_weather_lockout = false;
        assert_eq!(c.on_tick(APR_1_6AM + 2), TickOutcome::Running);
        assert!(is_on(&c, 1));
        let active = c.active_program().unwrap();
        assert_eq!(active.start_time(), APR_1_6AM);
        assert_eq!(active.program_run_time(), RUN_TIME);
    }

    #[test]
    fn finished_program_stays_finished_across_lockout() {
        let cfg = ProgramConfig::new(21_600, vec![StationDuration::new(1, 2)], ProgramKind::OddDays).unwrap();
        let mut c = controller(vec![cfg]);
        assert_eq!(c.on_tick(APR_1_6AM), TickOutcome::Running);
        assert_eq!(c.on_tick(APR_1_6AM + 3), TickOutcome::Finished);
        c.weather_mut().cold_weather_lockout = true;
        assert_eq!(c.on_tick(APR_1_6AM + 4), TickOutcome::LockedOut);
        c.weather_mut().cold_weather_lockout = false;
        assert_eq!(c.on_tick(APR_1_6AM + 5), TickOutcome::Idle);
        assert!(all_off(&c));
    }

    #[test]
    fn cold_lockout_prevents_start() {
        let mut c = controller(vec![sample(ProgramKind::OddDays)]);
        c.weather_mut().cold_weather_lockout = true;
        assert_eq!(c.on_tick(APR_1_6AM), TickOutcome::LockedOut);
        assert!(c.active_program().is_none());
    }

    // -- Rain delay ---------------------------------------------------------------

    #[test]
    fn rain_delay_stops_running_program() {
        let mut c = controller(vec![sample(ProgramKind::OddDays)]);
        c.on_tick(APR_1_6AM);
        c.weather_mut().rain_delay = true;
        assert_eq!(c.on_tick(APR_1_6AM + 1), TickOutcome::RainDelayed);
        assert!(c.active_program().is_none());
        assert!(all_off(&c));
    }

    #[test]
    fn rain_delay_cancels_fresh_program_on_first_tick() {
        let mut c = controller(vec![sample(ProgramKind::OddDays)]);
        c.weather_mut().rain_delay = true;
        assert_eq!(c.on_tick(APR_1_6AM), TickOutcome::RainDelayed);
        assert!(all_off(&c));
        assert!(c.active_program().is_none());
        assert_eq!(c.stopped_program().unwrap().start_time(), APR_1_6AM);

        // Rain clears while still inside the start window: it starts over.
        c.weather_mut().rain_delay = false;
        assert_eq!(c.on_tick(APR_1_6AM + 2), TickOutcome::Running);
        assert!(is_on(&c, 1));
        assert_eq!(c.active_program().unwrap().start_time(), APR_1_6AM);
    }

    #[test]
    fn rain_stop_then_clear_in_window_restarts_program() {
        let mut c = controller(vec![sample(ProgramKind::OddDays)]);
        assert_eq!(c.on_tick(APR_1_6AM), TickOutcome::Running);
        c.weather_mut().rain_delay = true;
        assert_eq!(c.on_tick(APR_1_6AM + 1), TickOutcome::RainDelayed);
        c.weather_mut().rain_delay = false;
        assert_eq!(c.on_tick(APR_1_6AM + 3), TickOutcome::Running);
        assert!(is_on(&c, 1));
    }

    #[test]
    fn rain_delay_ignored_by_program_that_does_not_respect_it() {
        let mut c = controller(vec![sample(ProgramKind::OddDays).respect_rain(false)]);
        c.weather_mut().rain_delay = true;
        assert_eq!(c.on_tick(APR_1_6AM), TickOutcome::Running);
        assert!(is_on(&c, 1));
    }

    // -- Watering adjustment ------------------------------------------------------

    #[test]
    fn watering_percentage_applied_at_start() {
        let mut c = controller(vec![sample(ProgramKind::OddDays)]);
        c.weather_mut().watering_percent = 50;
        c.on_tick(APR_1_6AM);
        assert_eq!(c.water_adjust_percent(), 50);
        assert_eq!(c.active_program().unwrap().program_run_time(), RUN_TIME / 2);
    }

    #[test]
    fn watering_percentage_ignored_when_not_respected() {
        let mut c = controller(vec![sample(ProgramKind::OddDays).respect_water_adjustment(false)]);
        c.weather_mut().watering_percent = 50;
        c.on_tick(APR_1_6AM);
        assert_eq!(c.active_program().unwrap().program_run_time(), RUN_TIME);
    }

    // -- Board failures -----------------------------------------------------------

    struct FailingBoard {
        attempts: usize,
    }

    impl Board for FailingBoard {
        fn apply_pattern(&mut self, _pattern: &[bool]) -> anyhow::Result<()> {
            self.attempts += 1;
            anyhow::bail!("shift register not responding")
        }
    }

    #[test]
    fn board_failure_does_not_stop_ticking() {
        let mut c = Controller::new(
            catalog(),
            ConfigProgramManager::new(vec![sample(ProgramKind::OddDays)], CENTRAL, DEFAULT_JITTER_SEC),
            FailingBoard { attempts: 0 },
            FixedWeather::default(),
        );
        assert_eq!(c.on_tick(APR_1_6AM), TickOutcome::Running);
        assert_eq!(c.on_tick(APR_1_6AM + 1), TickOutcome::Running);
        c.full_stop();
        assert_eq!(c.board().attempts, 3);
        assert!(c.stations().iter().all(|s| !s.is_on()));
    }

    // -- Runtime configuration changes ----------------------------------------

    #[test]
    fn configurations_can_change_between_ticks() {
        let mut c = controller(vec![]);
        assert_eq!(c.on_tick(APR_1_6AM), TickOutcome::Idle);
        c.manager_mut()
            .update_configurations(vec![sample(ProgramKind::OddDays)], &[])
            .unwrap();
        assert_eq!(c.on_tick(APR_1_6AM + 1), TickOutcome::Running);
    }
}
