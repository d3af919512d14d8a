use super::clock::Pacer;
use super::ramp::{Direction, RampState};
use crate::sensors::{SensorKind, DEFAULT_INTERVAL_MS};
use parking_lot::Mutex;
use simplelog::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use thiserror::Error;

/// The single observer slot of an oscillator. Gets every new reading.
pub type Observer = Box<dyn FnMut(f64) + Send + 'static>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OscillatorError {
    #[error("Non valid min/max range: [{min}, {max}]")]
    InvalidRange { min: f64, max: f64 },
    #[error("Start value {start} is out of range [{min}, {max}]")]
    StartOutOfRange { start: f64, min: f64, max: f64 },
    #[error("Unknown sensor type '{0}'")]
    UnknownSensor(String),
    #[error("Could not spawn the update thread of {name}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything the update loop touches under the lock.
struct Core {
    state: RampState,
    observer: Option<Observer>,
}

/// State shared between the owning [RampOscillator] and its update thread.
struct Shared {
    name: String,
    kind: SensorKind,
    running: AtomicBool,
    core: Mutex<Core>,
    /// Id of the latest update thread. Lets `start`/`stop` spot calls made from the observer.
    update_thread: Mutex<Option<ThreadId>>,
}

impl Shared {
    /// One update cycle: step, notify, hand back the interval for pacing.
    fn update(&self) -> Duration {
        let mut core = self.core.lock();
        let value = core.state.advance();

        log::trace!("{} -> {}", self.name, value);
        #[cfg(feature = "verbose_readings")]
        info!(
            "<cyan>{}</>: {} {}",
            self.name,
            value,
            self.kind.get_unit()
        );

        if let Some(observer) = core.observer.as_mut() {
            observer(value);
        }

        Duration::from_millis(u64::from(core.state.get_interval_ms()))
    }
}

fn run(shared: Arc<Shared>) {
    *shared.update_thread.lock() = Some(thread::current().id());

    while shared.running.load(Ordering::SeqCst) {
        let pacer = Pacer::start();
        let interval = shared.update();
        pacer.wait(interval);
    }
}

/// A simulated sensor whose reading moves linearly between a minimum and a maximum,
/// reversing at each bound (a triangle wave).
///
/// # Usage
/// Create one from a preset with [new](fn@RampOscillator::new) or tune it with the
/// [RampOscillatorBuilder]. Every method takes `&self`, so an oscillator can be shared
/// between threads and reconfigured while it runs.
///
/// ```rust
/// use sensor_sim::{RampOscillator, SensorKind};
///
/// let voltage = RampOscillator::new(SensorKind::Voltage);
/// voltage.set_interval(100);
/// voltage.register_callback(|value| println!("{} V", value));
/// voltage.start().unwrap();
/// voltage.stop();
/// ```
///
/// # Threading
/// [start](fn@RampOscillator::start) spawns one update thread which advances the reading
/// once per interval. Setters, [get_current_value](fn@RampOscillator::get_current_value) and
/// the update itself are serialized by a single lock; the running flag lives outside of it.
///
/// The observer is called on the update thread **while the lock is held**. Keep it short:
/// a slow observer stalls the loop and delays [stop](fn@RampOscillator::stop). It must not
/// call back into the same oscillator, the lock is not re-entrant.
///
/// Dropping the oscillator stops it and waits for the update thread.
pub struct RampOscillator {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RampOscillator {
    /// An oscillator with the default parameters of `kind`.
    pub fn new(kind: SensorKind) -> Self {
        Self::from_parts(kind.to_string(), kind, kind.default_state())
    }

    fn from_parts(name: String, kind: SensorKind, state: RampState) -> Self {
        Self {
            shared: Arc::new(Shared {
                name,
                kind,
                running: AtomicBool::new(false),
                core: Mutex::new(Core {
                    state,
                    observer: None,
                }),
                update_thread: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Starts the update thread. Does nothing when already running.
    ///
    /// # Expected errors
    /// * The OS refused to spawn the thread. The oscillator stays stopped.
    pub fn start(&self) -> Result<(), OscillatorError> {
        if self.on_update_thread() {
            // Restarted from its own observer: the loop has not exited yet, keep it. A start
            // or stop in flight on another thread holds the worker and wins.
            match self.worker.try_lock() {
                Some(_worker) => self.shared.running.store(true, Ordering::SeqCst),
                None => {
                    warn!("<b>Start requested from the <yellow>observer</><b> while another thread starts or stops it. Ignored.</>");
                    warn!("  |_ name: {}", self.shared.name);
                }
            }
            return Ok(());
        }

        let mut worker = self.worker.lock();

        if self.shared.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.reap(&mut worker);
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || run(shared));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                info!("<b>Started <cyan>{}</>", self.shared.name);
                Ok(())
            }
            Err(source) => {
                self.shared.running.store(false, Ordering::SeqCst);
                error!("<b>Could <red>not spawn</> <b>the update thread.</>");
                error!("  |_ name: {}", self.shared.name);

                Err(OscillatorError::Spawn {
                    name: self.shared.name.clone(),
                    source,
                })
            }
        }
    }

    /// Stops the update thread and waits for it to exit. Does nothing when never started.
    ///
    /// Once this returns no more updates or observer calls happen. It may take up to one
    /// interval, as the loop only checks the flag between cycles.
    ///
    /// From inside the observer it only clears the flag, the loop exits after the cycle in
    /// progress.
    pub fn stop(&self) {
        if self.on_update_thread() {
            if self.shared.running.swap(false, Ordering::SeqCst) {
                warn!("<b>Stop requested from the <yellow>observer</><b>. The loop exits after this cycle.</>");
                warn!("  |_ name: {}", self.shared.name);
            }
            return;
        }

        let mut worker = self.worker.lock();
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);

        // A loop stopped by its own observer may still be finishing its last cycle.
        self.reap(&mut worker);
        if was_running {
            info!("<b>Stopped <cyan>{}</>", self.shared.name);
        }
    }

    fn on_update_thread(&self) -> bool {
        *self.shared.update_thread.lock() == Some(thread::current().id())
    }

    /// Joins a finished (or finishing) update thread. Never called from the update thread.
    fn reap(&self, worker: &mut Option<JoinHandle<()>>) {
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                error!("<b>The update thread <red>panicked</><b>.</>");
                error!("  |_ name: {}", self.shared.name);
            }
        }
    }

    /// A snapshot of the running flag. May be outdated by a concurrent start or stop.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn get_name(&self) -> &str {
        &self.shared.name
    }

    pub fn get_kind(&self) -> SensorKind {
        self.shared.kind
    }

    /// Sets the time budget of an update cycle, in milliseconds. Applies from the next cycle.
    pub fn set_interval(&self, interval_ms: u32) {
        self.shared.core.lock().state.set_interval_ms(interval_ms);
    }

    pub fn get_interval(&self) -> u32 {
        self.shared.core.lock().state.get_interval_ms()
    }

    /// Sets the lower bound. Not validated against the upper bound.
    pub fn set_min_value(&self, min: f64) {
        self.shared.core.lock().state.set_min(min);
    }

    /// Sets the upper bound. Not validated against the lower bound.
    pub fn set_max_value(&self, max: f64) {
        self.shared.core.lock().state.set_max(max);
    }

    /// Sets both bounds at once, so no cycle sees only one of them changed.
    pub fn set_range(&self, min: f64, max: f64) {
        let mut core = self.shared.core.lock();
        core.state.set_min(min);
        core.state.set_max(max);
    }

    /// Sets how much the reading moves per cycle. A zero step holds the reading.
    pub fn set_step_size(&self, step: f64) {
        self.shared.core.lock().state.set_step(step);
    }

    pub fn get_min_value(&self) -> f64 {
        self.shared.core.lock().state.get_min()
    }

    pub fn get_max_value(&self) -> f64 {
        self.shared.core.lock().state.get_max()
    }

    pub fn get_step_size(&self) -> f64 {
        self.shared.core.lock().state.get_step()
    }

    /// The reading produced by the last completed cycle.
    pub fn get_current_value(&self) -> f64 {
        self.shared.core.lock().state.get_current()
    }

    pub fn get_direction(&self) -> Direction {
        self.shared.core.lock().state.get_direction()
    }

    /// A consistent copy of the whole parameter block.
    pub fn snapshot(&self) -> RampState {
        self.shared.core.lock().state
    }

    /// Installs the observer, replacing the previous one. Applies from the next cycle.
    pub fn register_callback<F>(&self, observer: F)
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.shared.core.lock().observer = Some(Box::new(observer));
    }

    /// Removes the observer, if any.
    pub fn clear_callback(&self) {
        self.shared.core.lock().observer = None;
    }
}

impl Drop for RampOscillator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The [RampOscillatorBuilder] is the proper way of tuning a [RampOscillator].
/// # Usage
/// ```rust
/// use sensor_sim::{RampOscillatorBuilder, SensorKind};
///
/// let temperature = RampOscillatorBuilder::new(SensorKind::Temperature).build().unwrap(); // Preset
///
/// let supply = RampOscillatorBuilder::new(SensorKind::Voltage) // With most values
///     .with_name("Bench supply")
///     .with_interval(250)
///     .with_min(0.0)
///     .with_max(12.0)
///     .with_step(0.2)
///     .build()
///     .unwrap();
/// ```
pub struct RampOscillatorBuilder {
    kind: SensorKind,
    name: Option<String>,
    interval: Option<u32>,
    min: Option<f64>,
    max: Option<f64>,
    step: Option<f64>,
    start: Option<f64>,
}

impl RampOscillatorBuilder {
    /// Starts from the preset of `kind` (no overrides).
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            name: None,
            interval: None,
            min: None,
            max: None,
            step: None,
            start: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Sets the time budget of an update cycle, in milliseconds.
    pub fn with_interval(mut self, interval_ms: u32) -> Self {
        self.interval = Some(interval_ms);
        self
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    /// Sets the first reading. Defaults to the minimum.
    pub fn with_start(mut self, start: f64) -> Self {
        self.start = Some(start);
        self
    }

    /// Tries to generate a [RampOscillator] from the given configuration.
    ///
    /// # Default values
    /// Whatever the [SensorKind] preset says, the start value being the minimum.
    ///
    /// # Expected errors
    /// * Minimum over the maximum.
    /// * Start value out of the range.
    pub fn build(self) -> Result<RampOscillator, OscillatorError> {
        let (default_min, default_max) = self.kind.get_range();
        let min = self.min.unwrap_or(default_min);
        let max = self.max.unwrap_or(default_max);
        let step = self.step.unwrap_or(self.kind.get_step());
        let start = self.start.unwrap_or(min);
        let interval = self.interval.unwrap_or(DEFAULT_INTERVAL_MS);
        let name = self.name.unwrap_or_else(|| self.kind.to_string());

        if min > max {
            return Err(OscillatorError::InvalidRange { min, max });
        }

        if start < min || start > max {
            return Err(OscillatorError::StartOutOfRange { start, min, max });
        }

        Ok(RampOscillator::from_parts(
            name,
            self.kind,
            RampState::new(min, max, step, start, interval),
        ))
    }
}


#[cfg(test)]
mod oscillator_tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread::sleep;
    use std::time::Instant;

    fn fast_oscillator(kind: SensorKind, interval_ms: u32) -> RampOscillator {
        let osc = RampOscillator::new(kind);
        osc.set_interval(interval_ms);
        osc
    }

    fn counting_observer(osc: &RampOscillator) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        osc.register_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    /// Polls `condition` for up to two seconds.
    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            sleep(Duration::from_millis(1));
        }
        condition()
    }

    #[test]
    fn test_presets() {
        let voltage = RampOscillator::new(SensorKind::Voltage);
        let temperature = RampOscillator::new(SensorKind::Temperature);

        assert_eq!(voltage.get_current_value(), 0.0);
        assert_eq!(voltage.get_interval(), 1000);
        assert_eq!(temperature.get_current_value(), 20.0);
        assert_eq!(temperature.get_name(), "Temperature");
    }

    #[test]
    fn test_start_stop() {
        let osc = fast_oscillator(SensorKind::Voltage, 1);
        assert!(!osc.is_running());

        osc.start().unwrap();
        assert!(osc.is_running(), "Not running after start");
        assert!(
            wait_for(|| osc.get_current_value() > 0.0),
            "The reading never moved"
        );

        osc.stop();
        assert!(!osc.is_running(), "Still running after stop");
    }

    #[test]
    fn test_stop_without_start() {
        let osc = RampOscillator::new(SensorKind::Temperature);

        osc.stop();
        osc.stop();
        assert!(!osc.is_running());
        assert_eq!(osc.get_current_value(), 20.0);
    }

    #[test]
    fn test_start_is_idempotent() {
        let osc = fast_oscillator(SensorKind::Voltage, 200);
        let count = counting_observer(&osc);

        osc.start().unwrap();
        osc.start().unwrap();
        assert!(wait_for(|| count.load(Ordering::SeqCst) >= 1));

        // A second loop would have run its first cycle by now too.
        sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 1, "More than one loop ran");
        osc.stop();
    }

    #[test]
    fn test_interval_change_while_running() {
        let osc = fast_oscillator(SensorKind::Voltage, 1);
        let count = counting_observer(&osc);

        osc.start().unwrap();
        assert!(wait_for(|| count.load(Ordering::SeqCst) >= 5));

        osc.set_interval(300);
        assert_eq!(osc.get_interval(), 300);

        // Let the cycle that read the old interval finish.
        sleep(Duration::from_millis(20));
        let slowed_at = count.load(Ordering::SeqCst);
        sleep(Duration::from_millis(100));
        assert!(
            count.load(Ordering::SeqCst) <= slowed_at + 1,
            "Still ticking at the old interval"
        );

        osc.stop();
    }

    #[test]
    fn test_no_callbacks_after_stop() {
        let osc = fast_oscillator(SensorKind::Voltage, 1);
        let count = counting_observer(&osc);

        osc.start().unwrap();
        assert!(wait_for(|| count.load(Ordering::SeqCst) >= 5));
        osc.stop();

        let after_stop = count.load(Ordering::SeqCst);
        sleep(Duration::from_millis(30));
        assert_eq!(
            after_stop,
            count.load(Ordering::SeqCst),
            "Observer called after stop returned"
        );
    }

    #[test]
    fn test_restart() {
        let osc = fast_oscillator(SensorKind::Temperature, 1);
        let count = counting_observer(&osc);

        osc.start().unwrap();
        assert!(wait_for(|| count.load(Ordering::SeqCst) >= 3));
        osc.stop();

        let first_run = count.load(Ordering::SeqCst);
        osc.start().unwrap();
        assert!(wait_for(|| count.load(Ordering::SeqCst) > first_run));
        osc.stop();
    }

    #[test]
    fn test_readings_follow_the_ramp() {
        let osc = fast_oscillator(SensorKind::Temperature, 1);
        let (tx, rx) = crossbeam::channel::unbounded();
        osc.register_callback(move |value| {
            tx.send(value).unwrap();
        });

        osc.start().unwrap();
        let readings: Vec<f64> = rx.iter().take(10).collect();
        osc.stop();

        let expected: Vec<f64> = (1..=10).map(|i| 20.0 + 0.5 * i as f64).collect();
        assert_eq!(readings, expected, "Readings are not a ramp");
    }

    #[test]
    fn test_zero_step_while_running() {
        let osc = fast_oscillator(SensorKind::Voltage, 1);
        let (tx, rx) = crossbeam::channel::unbounded();
        osc.register_callback(move |value| {
            let _ = tx.send(value);
        });

        osc.start().unwrap();
        assert!(wait_for(|| osc.get_current_value() > 0.0));

        osc.set_step_size(0.0);
        let held = osc.get_current_value();
        rx.try_iter().for_each(drop);

        let readings: Vec<f64> = rx.iter().take(5).collect();
        osc.stop();

        assert_eq!(readings.len(), 5, "The observer stopped being called");
        assert!(
            readings.iter().all(|value| *value == held),
            "Reading moved with a zero step: {:?}",
            readings
        );
    }

    #[test]
    fn test_degenerate_range_while_running() {
        let osc = fast_oscillator(SensorKind::Voltage, 1);

        osc.start().unwrap();
        osc.set_range(50.0, 50.0);
        assert!(
            wait_for(|| osc.get_current_value() == 50.0),
            "Never converged to the range"
        );

        osc.set_step_size(-3.0);
        sleep(Duration::from_millis(20));
        assert_eq!(osc.get_current_value(), 50.0);
        osc.stop();
    }

    #[test]
    fn test_bounds_while_running() {
        let osc = fast_oscillator(SensorKind::Voltage, 0);
        osc.set_step_size(0.7);
        let (tx, rx) = crossbeam::channel::unbounded();
        osc.register_callback(move |value| {
            let _ = tx.send(value);
        });

        osc.start().unwrap();
        let readings: Vec<f64> = rx.iter().take(100).collect();
        osc.stop();

        assert!(readings.iter().all(|value| (0.0..=10.0).contains(value)));
    }

    #[test]
    fn test_replace_and_clear_callback() {
        let osc = fast_oscillator(SensorKind::Voltage, 1);
        let first = counting_observer(&osc);

        osc.start().unwrap();
        assert!(wait_for(|| first.load(Ordering::SeqCst) >= 2));

        let second = counting_observer(&osc);
        let first_total = first.load(Ordering::SeqCst);
        assert!(wait_for(|| second.load(Ordering::SeqCst) >= 2));
        assert_eq!(
            first_total,
            first.load(Ordering::SeqCst),
            "Replaced observer still called"
        );

        osc.clear_callback();
        let second_total = second.load(Ordering::SeqCst);
        sleep(Duration::from_millis(10));
        assert_eq!(second_total, second.load(Ordering::SeqCst));
        assert!(osc.is_running(), "Clearing the observer stopped the loop");

        osc.stop();
    }

    #[test]
    fn test_stop_from_observer() {
        let osc = Arc::new(fast_oscillator(SensorKind::Voltage, 1));
        let count = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&osc);
        let counter = Arc::clone(&count);
        osc.register_callback(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                if let Some(osc) = weak.upgrade() {
                    osc.stop();
                }
            }
        });

        osc.start().unwrap();
        assert!(wait_for(|| !osc.is_running()), "Observer could not stop");
        sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stop_while_observer_stops() {
        let osc = Arc::new(fast_oscillator(SensorKind::Voltage, 1));
        let (in_observer_tx, in_observer_rx) = crossbeam::channel::bounded(1);

        let weak = Arc::downgrade(&osc);
        let mut first = true;
        osc.register_callback(move |_| {
            if !first {
                return;
            }
            first = false;
            let _ = in_observer_tx.send(());

            // Gives the other thread time to get into stop() first.
            sleep(Duration::from_millis(50));
            if let Some(osc) = weak.upgrade() {
                osc.stop();
            }
        });

        osc.start().unwrap();
        in_observer_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("Observer never called");

        let (done_tx, done_rx) = crossbeam::channel::bounded(1);
        let stopper = Arc::clone(&osc);
        thread::spawn(move || {
            stopper.stop();
            let _ = done_tx.send(());
        });

        assert!(
            done_rx.recv_timeout(Duration::from_secs(3)).is_ok(),
            "stop() hung while the observer was stopping the loop"
        );
        assert!(!osc.is_running());
    }

    #[test]
    fn test_stop_joins_loop_stopped_by_observer() {
        let osc = Arc::new(fast_oscillator(SensorKind::Voltage, 1));
        let count = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let weak = Arc::downgrade(&osc);
        let counter = Arc::clone(&count);
        let last_cycle = Arc::clone(&finished);
        osc.register_callback(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(osc) = weak.upgrade() {
                    osc.stop();
                }
                sleep(Duration::from_millis(30));
                last_cycle.store(true, Ordering::SeqCst);
            }
        });

        osc.start().unwrap();
        assert!(wait_for(|| !osc.is_running()));

        // The observer may still be sleeping in the last cycle, stop() waits for it.
        osc.stop();
        assert!(finished.load(Ordering::SeqCst), "stop() returned mid-cycle");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_stops_the_loop() {
        let count;
        {
            let osc = fast_oscillator(SensorKind::Temperature, 1);
            count = counting_observer(&osc);
            osc.start().unwrap();
            assert!(wait_for(|| count.load(Ordering::SeqCst) >= 2));
        }

        let after_drop = count.load(Ordering::SeqCst);
        sleep(Duration::from_millis(20));
        assert_eq!(after_drop, count.load(Ordering::SeqCst));
    }
}
