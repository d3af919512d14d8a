use std::thread::sleep;
use std::time::{Duration, Instant};

/// Keeps an update loop on its time budget. Started at the beginning of a cycle,
/// it sleeps away whatever is left of the interval once the work is done.
///
/// There is no catch-up: a cycle that overran its budget is simply followed by
/// the next one without sleeping.
pub struct Pacer {
    started: Instant,
}

impl Pacer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn get_elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Sleeps for the rest of `interval`, if anything is left.
    pub fn wait(&self, interval: Duration) {
        let left = budget_left(interval, self.get_elapsed());

        if !left.is_zero() {
            sleep(left);
        }
    }
}

/// `max(0, interval - elapsed)`
pub fn budget_left(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}
