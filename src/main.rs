use anyhow::Context;
use crossbeam::channel::RecvTimeoutError;
use std::path::Path;
use std::time::{Duration, Instant};

// DEBUGGING, LOGGING
use simplelog::*;

// MY STUFF
use sensor_sim::layout_yaml::load_layout;
use sensor_sim::{RampOscillator, SensorKind};

const DEFAULT_LAYOUT: &str = "layouts/bench.yaml";
const DEFAULT_DURATION_MS: u64 = 5000;

/// Usage: `sensor_sim [layout.yaml] [duration_ms]`
fn main() -> Result<(), anyhow::Error> {
    // LOGGER INIT
    TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to start simplelog")?;

    let mut args = std::env::args().skip(1);
    let layout = args.next().unwrap_or_else(|| DEFAULT_LAYOUT.to_string());
    let duration_ms = match args.next() {
        Some(arg) => arg
            .parse::<u64>()
            .with_context(|| format!("Invalid duration '{}'", arg))?,
        None => DEFAULT_DURATION_MS,
    };

    info!("<b>Running <blue>sensor simulation</>");
    let sensors = if Path::new(&layout).exists() {
        load_layout(&layout).with_context(|| format!("Could not load layout {}", layout))?
    } else {
        warn!(
            "<yellow><warn></> <b>Layout <yellow>{}</> <b>not found, using the presets.</>",
            layout
        );
        vec![
            RampOscillator::new(SensorKind::Voltage),
            RampOscillator::new(SensorKind::Temperature),
        ]
    };

    // Every observer forwards its readings here, tagged with the sensor index.
    let (tx, rx) = crossbeam::channel::unbounded::<(usize, f64)>();
    for (index, sensor) in sensors.iter().enumerate() {
        let tx = tx.clone();
        sensor.register_callback(move |value| {
            let _ = tx.send((index, value));
        });
        sensor.start()?;
    }
    drop(tx);

    info!("<b>Sampling for: <u>{} milliseconds</>", duration_ms);
    let deadline = Instant::now() + Duration::from_millis(duration_ms);

    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok((index, value)) => {
                if let Some(sensor) = sensors.get(index) {
                    info!(
                        "<cyan>{}</>: {:.2} {}",
                        sensor.get_name(),
                        value,
                        sensor.get_kind().get_unit()
                    );
                }
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    for sensor in sensors.iter() {
        sensor.stop();
    }

    info!("<green><tick></> <b>Program finished <green>successfully</>");
    Ok(())
}
