mod clock;
mod oscillator;
mod ramp;

pub use clock::{budget_left, Pacer};
pub use oscillator::{Observer, OscillatorError, RampOscillator, RampOscillatorBuilder};
pub use ramp::{Direction, RampState};
