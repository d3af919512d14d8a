//! Presets for the simulated quantities.
//!
//! Both sensors run the very same [RampOscillator](struct@crate::RampOscillator); the kind only
//! decides the default range, step and starting reading.

use crate::oscillator::{OscillatorError, RampState};
use std::fmt;
use std::str::FromStr;

/// Default time budget of an update cycle for every preset, in milliseconds.
pub const DEFAULT_INTERVAL_MS: u32 = 1000;

const VOLTAGE_RANGE: (f64, f64) = (0.0, 10.0);
const VOLTAGE_STEP: f64 = 0.1;

const TEMPERATURE_RANGE: (f64, f64) = (20.0, 100.0);
const TEMPERATURE_STEP: f64 = 0.5;

/// The simulated quantity of an oscillator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    /// 0 to 10 V in 0.1 V steps.
    Voltage,
    /// 20 to 100 °C in 0.5 °C steps.
    Temperature,
}

impl SensorKind {
    pub fn get_range(&self) -> (f64, f64) {
        match self {
            Self::Voltage => VOLTAGE_RANGE,
            Self::Temperature => TEMPERATURE_RANGE,
        }
    }

    pub fn get_step(&self) -> f64 {
        match self {
            Self::Voltage => VOLTAGE_STEP,
            Self::Temperature => TEMPERATURE_STEP,
        }
    }

    /// Both presets start at the bottom of their range.
    pub fn get_start(&self) -> f64 {
        self.get_range().0
    }

    pub fn get_unit(&self) -> &'static str {
        match self {
            Self::Voltage => "V",
            Self::Temperature => "°C",
        }
    }

    /// The parameter block a freshly created oscillator of this kind starts with.
    pub fn default_state(&self) -> RampState {
        let (min, max) = self.get_range();
        RampState::new(min, max, self.get_step(), self.get_start(), DEFAULT_INTERVAL_MS)
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Voltage => write!(f, "Voltage"),
            Self::Temperature => write!(f, "Temperature"),
        }
    }
}

impl FromStr for SensorKind {
    type Err = OscillatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "voltage" => Ok(Self::Voltage),
            "temperature" => Ok(Self::Temperature),
            _ => Err(OscillatorError::UnknownSensor(s.to_string())),
        }
    }
}
