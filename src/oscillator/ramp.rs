/// Accumulated steps such as 0.1 land a few ulps away from the bound they are
/// supposed to hit. Anything closer than this counts as having reached it.
const BOUND_TOLERANCE: f64 = 1e-9;

/// Sign of the next step of a [RampState].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increasing,
    Decreasing,
}

impl Direction {
    pub fn flipped(self) -> Self {
        match self {
            Self::Increasing => Self::Decreasing,
            Self::Decreasing => Self::Increasing,
        }
    }
}

/// The parameter block of a ramp oscillator: bounds, step, pacing and the
/// reading itself.
///
/// # Behaviour
/// Every call to [advance](fn@RampState::advance) moves the reading one step in
/// the current [Direction]. When the reading reaches or crosses a bound it gets
/// clamped to it and the direction flips, which draws a triangle wave:
///
/// `min -> min + step -> ... -> max -> max - step -> ... -> min`
///
/// # Degenerate parameters
/// Setters perform no validation. An inverted range, a zero step or a negative
/// step give a degenerate oscillation, never a panic. The reading is kept
/// inside `[min, max]` after every step whatever the parameters are.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampState {
    /// Time budget of one update cycle, in milliseconds.
    interval_ms: u32,
    /// Lower bound of the oscillation.
    min: f64,
    /// Upper bound of the oscillation.
    max: f64,
    /// How much the reading moves per cycle.
    step: f64,
    /// The reading.
    current: f64,
    direction: Direction,
}

impl RampState {
    /// Creates a state starting at `start`, increasing.
    pub fn new(min: f64, max: f64, step: f64, start: f64, interval_ms: u32) -> Self {
        Self {
            interval_ms,
            min,
            max,
            step,
            current: start,
            direction: Direction::Increasing,
        }
    }

    /// Runs one step of the oscillation and returns the new reading.
    pub fn advance(&mut self) -> f64 {
        match self.direction {
            Direction::Increasing => {
                self.current += self.step;
                if self.current >= self.max - BOUND_TOLERANCE {
                    self.current = self.max;
                    self.direction = self.direction.flipped();
                }
            }
            Direction::Decreasing => {
                self.current -= self.step;
                if self.current <= self.min + BOUND_TOLERANCE {
                    self.current = self.min;
                    self.direction = self.direction.flipped();
                }
            }
        }

        self.keep_in_range();
        self.current
    }

    // f64::clamp panics on an inverted range, so clamp each side on its own.
    fn keep_in_range(&mut self) {
        if self.current > self.max {
            self.current = self.max;
        }
        if self.current < self.min {
            self.current = self.min;
        }
    }

    pub fn get_interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn get_min(&self) -> f64 {
        self.min
    }

    pub fn get_max(&self) -> f64 {
        self.max
    }

    pub fn get_step(&self) -> f64 {
        self.step
    }

    pub fn get_current(&self) -> f64 {
        self.current
    }

    pub fn get_direction(&self) -> Direction {
        self.direction
    }

    pub fn set_interval_ms(&mut self, interval_ms: u32) {
        self.interval_ms = interval_ms;
    }

    pub fn set_min(&mut self, min: f64) {
        self.min = min;
    }

    pub fn set_max(&mut self, max: f64) {
        self.max = max;
    }

    pub fn set_step(&mut self, step: f64) {
        self.step = step;
    }
}
