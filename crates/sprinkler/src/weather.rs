//! Weather-driven decisions the controller consults every tick.

/// Source of rain-delay, cold-weather and watering-adjustment decisions.
///
/// How these are decided (sensors, forecasts, a user toggle) is up to the
/// implementation; the controller only consumes the answers.
pub trait WeatherPolicy {
    /// Stop everything, regardless of program settings.
    fn cold_weather_lockout(&mut self) -> bool;

    /// Stop programs that respect rain delay.
    fn rain_delay(&mut self) -> bool;

    /// The watering percentage to use from now on, given the current one.
    /// Must be safe to call every tick.
    fn update_watering_percentage(&mut self, current: u32) -> u32 {
        current
    }
}

/// Decisions set directly by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWeather {
    pub rain_delay: bool,
    pub cold_weather_lockout: bool,
    pub watering_percent: u32,
}

impl Default for FixedWeather {
    fn default() -> Self {
        Self {
            rain_delay: false,
            cold_weather_lockout: false,
            watering_percent: 100,
        }
    }
}

impl WeatherPolicy for FixedWeather {
    fn cold_weather_lockout(&mut self) -> bool {
        self.cold_weather_lockout
    }

    fn rain_delay(&mut self) -> bool {
        self.rain_delay
    }

    fn update_watering_percentage(&mut self, _current: u32) -> u32 {
        self.watering_percent
    }
}
