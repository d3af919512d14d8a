//! Sensor layouts written in YAML.
//!
//! ```yaml
//! version: 0.1
//! sensors:
//!   - sensor:
//!       type: voltage        # or temperature
//!       name: Bench supply   # optional, every field below is
//!       interval: 250        # milliseconds
//!       min: 0
//!       max: 12
//!       step: 0.2
//!       start: 0
//! ```
//!
//! Missing fields fall back to the preset of the sensor type. Integers and reals are both
//! accepted for numeric fields.

use crate::oscillator::{OscillatorError, RampOscillator, RampOscillatorBuilder};
use crate::sensors::SensorKind;
use simplelog::{error, info, warn};
use std::fs;
use std::path::Path;
use thiserror::Error;
use yaml_rust::{ScanError, Yaml, YamlLoader};

pub const LAYOUT_VERSION: f64 = 0.1;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LayoutError {
    #[error("Could not read layout {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed YAML")]
    Yaml(#[from] ScanError),
    #[error("The layout document is empty")]
    Empty,
    #[error("Unsupported layout version {found}, expected {expected}")]
    Version { found: f64, expected: f64 },
    #[error("The layout has no 'sensors' list")]
    NoSensors,
    #[error("Sensor #{index} is missing its '{field}' field")]
    MissingField { index: usize, field: &'static str },
    #[error("Sensor #{index} has an invalid '{field}' value")]
    InvalidField { index: usize, field: &'static str },
    #[error("Sensor #{index}: {source}")]
    Sensor {
        index: usize,
        #[source]
        source: OscillatorError,
    },
}

/// Reads a layout file and builds its (stopped) oscillators.
pub fn load_layout(path: impl AsRef<Path>) -> Result<Vec<RampOscillator>, LayoutError> {
    let path = path.as_ref();
    info!("<b>Loading layout from <red>{}</><b>.</>", path.display());

    let source = fs::read_to_string(path).map_err(|source| LayoutError::Io {
        path: path.display().to_string(),
        source,
    })?;

    parse_layout(&source)
}

/// Builds the (stopped) oscillators of a layout document.
pub fn parse_layout(source: &str) -> Result<Vec<RampOscillator>, LayoutError> {
    let docs = YamlLoader::load_from_str(source)?;
    let doc = docs.first().ok_or(LayoutError::Empty)?;

    let version = as_number(&doc["version"]).unwrap_or(0.0);
    if version != LAYOUT_VERSION {
        error!("<b>Please use the <red>latest YAML</> <b>version.</>");
        return Err(LayoutError::Version {
            found: version,
            expected: LAYOUT_VERSION,
        });
    }
    info!(
        "<b>Using <magenta>YAML layout</> <b>version: <b><cyan>{}</>",
        version
    );

    let sensors = doc["sensors"].as_vec().ok_or(LayoutError::NoSensors)?;

    sensors
        .iter()
        .enumerate()
        .map(|(index, entry)| build_sensor(index, &entry["sensor"]))
        .collect()
}

fn build_sensor(index: usize, sensor: &Yaml) -> Result<RampOscillator, LayoutError> {
    info!("> Processing <cyan>sensor {}</>", index);

    let kind = sensor["type"]
        .as_str()
        .ok_or(LayoutError::MissingField {
            index,
            field: "type",
        })?
        .parse::<SensorKind>()
        .map_err(|source| LayoutError::Sensor { index, source })?;
    info!("  |_ type: {}", kind);

    let mut builder = RampOscillatorBuilder::new(kind);

    if let Some(name) = sensor["name"].as_str() {
        info!("  |_ name: {}", name);
        builder = builder.with_name(name);
    }

    if let Some(interval) = optional_number(index, sensor, "interval")? {
        if interval < 0.0 || interval > f64::from(u32::MAX) || interval.fract() != 0.0 {
            warn!("<b>The <yellow>interval</> <b>must be a whole amount of milliseconds.</>");
            return Err(LayoutError::InvalidField {
                index,
                field: "interval",
            });
        }
        builder = builder.with_interval(interval as u32);
    }

    if let Some(min) = optional_number(index, sensor, "min")? {
        builder = builder.with_min(min);
    }
    if let Some(max) = optional_number(index, sensor, "max")? {
        builder = builder.with_max(max);
    }
    if let Some(step) = optional_number(index, sensor, "step")? {
        builder = builder.with_step(step);
    }
    if let Some(start) = optional_number(index, sensor, "start")? {
        builder = builder.with_start(start);
    }

    builder
        .build()
        .map_err(|source| LayoutError::Sensor { index, source })
}

fn as_number(yaml: &Yaml) -> Option<f64> {
    match yaml {
        Yaml::Real(_) => yaml.as_f64(),
        Yaml::Integer(value) => Some(*value as f64),
        _ => None,
    }
}

fn optional_number(
    index: usize,
    sensor: &Yaml,
    field: &'static str,
) -> Result<Option<f64>, LayoutError> {
    match &sensor[field] {
        Yaml::BadValue | Yaml::Null => Ok(None), // not found
        value => match as_number(value) {
            Some(number) => Ok(Some(number)),
            None => {
                warn!("<b>Invalid format for <yellow>{}</> <b>value.</>", field);
                Err(LayoutError::InvalidField { index, field })
            }
        },
    }
}
