//! C interface of the simulators.
//!
//! Two families of functions with the very same shape, one per [SensorKind]. Each one works
//! on an opaque handle obtained from its `create*` function and released with its `destroy*`
//! function:
//!
//! ```c
//! VoltageSimulator* sim = createVoltageSimulator();
//! setVoltageInterval(sim, 100);
//! registerVoltageCallback(sim, on_voltage);
//! startVoltageSimulator(sim);
//! /* ... */
//! destroyVoltageSimulator(sim); /* stops it first */
//! ```
//!
//! Null handles are logged and ignored. Any other invalid handle is undefined behaviour.
#![allow(non_snake_case)]

use crate::oscillator::RampOscillator;
use crate::sensors::SensorKind;
use simplelog::{error, warn};

/// Plain C callback receiving every new reading. `None` (a null pointer) removes it.
pub type UpdateCallback = Option<extern "C" fn(f64)>;

fn warn_null(function: &str) {
    warn!("<b>Null handle passed to <yellow>{}</><b>. Ignored.</>", function);
}

fn install_callback(oscillator: &RampOscillator, callback: UpdateCallback) {
    match callback {
        Some(callback) => oscillator.register_callback(move |value| callback(value)),
        None => oscillator.clear_callback(),
    }
}

fn start_or_log(oscillator: &RampOscillator) {
    if let Err(err) = oscillator.start() {
        error!("<b>Could <red>not start</> <b>{}: {}</>", oscillator.get_name(), err);
    }
}

macro_rules! simulator_api {
    (
        $(#[$handle_doc:meta])*
        handle: $handle:ident,
        kind: $kind:expr,
        create: $create:ident,
        destroy: $destroy:ident,
        start: $start:ident,
        stop: $stop:ident,
        is_running: $is_running:ident,
        set_interval: $set_interval:ident,
        get_interval: $get_interval:ident,
        set_range: $set_range:ident,
        set_step: $set_step:ident,
        get_current: $get_current:ident,
        register_callback: $register_callback:ident $(,)?
    ) => {
        $(#[$handle_doc])*
        pub struct $handle {
            oscillator: RampOscillator,
        }

        /// Allocates a simulator with the default parameters. Release it with the matching
        /// destroy function.
        #[no_mangle]
        pub extern "C" fn $create() -> *mut $handle {
            Box::into_raw(Box::new($handle {
                oscillator: RampOscillator::new($kind),
            }))
        }

        /// Stops the simulator (waiting for its update thread) and frees it.
        ///
        /// # Safety
        /// `instance` must be null or come from the matching create function, and must not
        /// be used after this call.
        #[no_mangle]
        pub unsafe extern "C" fn $destroy(instance: *mut $handle) {
            if instance.is_null() {
                warn_null(stringify!($destroy));
                return;
            }
            drop(Box::from_raw(instance));
        }

        /// # Safety
        /// `instance` must be null or a live handle from the matching create function.
        #[no_mangle]
        pub unsafe extern "C" fn $start(instance: *mut $handle) {
            match instance.as_ref() {
                Some(handle) => start_or_log(&handle.oscillator),
                None => warn_null(stringify!($start)),
            }
        }

        /// Blocks until the update thread exited.
        ///
        /// # Safety
        /// `instance` must be null or a live handle from the matching create function.
        #[no_mangle]
        pub unsafe extern "C" fn $stop(instance: *mut $handle) {
            match instance.as_ref() {
                Some(handle) => handle.oscillator.stop(),
                None => warn_null(stringify!($stop)),
            }
        }

        /// # Safety
        /// `instance` must be null or a live handle from the matching create function.
        #[no_mangle]
        pub unsafe extern "C" fn $is_running(instance: *mut $handle) -> bool {
            match instance.as_ref() {
                Some(handle) => handle.oscillator.is_running(),
                None => {
                    warn_null(stringify!($is_running));
                    false
                }
            }
        }

        /// # Safety
        /// `instance` must be null or a live handle from the matching create function.
        #[no_mangle]
        pub unsafe extern "C" fn $set_interval(instance: *mut $handle, milliseconds: u32) {
            match instance.as_ref() {
                Some(handle) => handle.oscillator.set_interval(milliseconds),
                None => warn_null(stringify!($set_interval)),
            }
        }

        /// Returns 0 for a null handle.
        ///
        /// # Safety
        /// `instance` must be null or a live handle from the matching create function.
        #[no_mangle]
        pub unsafe extern "C" fn $get_interval(instance: *mut $handle) -> u32 {
            match instance.as_ref() {
                Some(handle) => handle.oscillator.get_interval(),
                None => {
                    warn_null(stringify!($get_interval));
                    0
                }
            }
        }

        /// Sets both bounds. Not validated.
        ///
        /// # Safety
        /// `instance` must be null or a live handle from the matching create function.
        #[no_mangle]
        pub unsafe extern "C" fn $set_range(instance: *mut $handle, min: f64, max: f64) {
            match instance.as_ref() {
                Some(handle) => handle.oscillator.set_range(min, max),
                None => warn_null(stringify!($set_range)),
            }
        }

        /// # Safety
        /// `instance` must be null or a live handle from the matching create function.
        #[no_mangle]
        pub unsafe extern "C" fn $set_step(instance: *mut $handle, step: f64) {
            match instance.as_ref() {
                Some(handle) => handle.oscillator.set_step_size(step),
                None => warn_null(stringify!($set_step)),
            }
        }

        /// Returns NaN for a null handle.
        ///
        /// # Safety
        /// `instance` must be null or a live handle from the matching create function.
        #[no_mangle]
        pub unsafe extern "C" fn $get_current(instance: *mut $handle) -> f64 {
            match instance.as_ref() {
                Some(handle) => handle.oscillator.get_current_value(),
                None => {
                    warn_null(stringify!($get_current));
                    f64::NAN
                }
            }
        }

        /// The callback runs on the update thread, so it has to be thread safe, and should
        /// return quickly: the simulator is locked while it runs.
        ///
        /// # Safety
        /// `instance` must be null or a live handle from the matching create function.
        #[no_mangle]
        pub unsafe extern "C" fn $register_callback(
            instance: *mut $handle,
            callback: UpdateCallback,
        ) {
            match instance.as_ref() {
                Some(handle) => install_callback(&handle.oscillator, callback),
                None => warn_null(stringify!($register_callback)),
            }
        }
    };
}

simulator_api! {
    /// Opaque handle of a simulated voltage sensor (0 to 10 V, 0.1 V per second).
    handle: VoltageSimulator,
    kind: SensorKind::Voltage,
    create: createVoltageSimulator,
    destroy: destroyVoltageSimulator,
    start: startVoltageSimulator,
    stop: stopVoltageSimulator,
    is_running: isVoltageSimulatorRunning,
    set_interval: setVoltageInterval,
    get_interval: getVoltageInterval,
    set_range: setVoltageRange,
    set_step: setVoltageStep,
    get_current: getCurrentVoltage,
    register_callback: registerVoltageCallback,
}

simulator_api! {
    /// Opaque handle of a simulated temperature sensor (20 to 100 °C, 0.5 °C per second).
    handle: TemperatureSimulator,
    kind: SensorKind::Temperature,
    create: createTemperatureSimulator,
    destroy: destroyTemperatureSimulator,
    start: startTemperatureSimulator,
    stop: stopTemperatureSimulator,
    is_running: isTemperatureSimulatorRunning,
    set_interval: setTemperatureInterval,
    get_interval: getTemperatureInterval,
    set_range: setTemperatureRange,
    set_step: setTemperatureStep,
    get_current: getCurrentTemperature,
    register_callback: registerTemperatureCallback,
}
