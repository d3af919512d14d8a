//! Simulated voltage and temperature sensors.
//!
//! Each sensor is a [RampOscillator]: a reading that walks linearly between a minimum and a
//! maximum on its own update thread, reversing at each bound. Readings can be polled with
//! [get_current_value](fn@RampOscillator::get_current_value) or pushed to a single observer.
//!
//! The [ffi] module exposes the same oscillators to C through opaque handles, and
//! [layout_yaml] builds sets of them from YAML layouts.

pub mod ffi;
pub mod layout_yaml;
pub mod oscillator;
pub mod sensors;

pub use oscillator::{
    Direction, Observer, OscillatorError, RampOscillator, RampOscillatorBuilder, RampState,
};
pub use sensors::SensorKind;
