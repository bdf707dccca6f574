// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SoC temperature fallback chain and OS thermal pressure.
//!
//! No single temperature source works on every machine, so the resolver
//! walks an ordered list and returns the first plausible reading. When
//! every source comes up empty the temperature is unknown (`None`), never
//! a made-up zero.
//!
//! The thermal *state* is read separately. It reflects throttling
//! pressure as the OS sees it and does not depend on any sensor.

use serde::Serialize;

use crate::common::config::AppConfig;
use crate::sampler::source::{HidSensorSource, TemperatureSource, ThermalStateSource};
use crate::sampler::types::{SourceConfidence, ThermalReading, ThermalState};

/// Product labels of HID thermal diodes that track the SoC die.
pub const HID_SENSOR_ALLOW_LIST: [&str; 5] = [
    "PMU tdie",
    "pACC MTR Temp",
    "eACC MTR Temp",
    "GPU MTR Temp",
    "SOC MTR Temp",
];

pub fn is_plausible_celsius(value: f64) -> bool {
    value.is_finite()
        && value > AppConfig::MIN_PLAUSIBLE_CELSIUS
        && value <= AppConfig::MAX_PLAUSIBLE_CELSIUS
}

pub fn is_allowed_sensor(label: &str) -> bool {
    HID_SENSOR_ALLOW_LIST
        .iter()
        .any(|prefix| label.starts_with(prefix))
}

/// Average of the allow-listed, plausible readings.
pub fn average_sensor_readings(readings: &[(String, f64)]) -> Option<ThermalReading> {
    let values: Vec<f64> = readings
        .iter()
        .filter(|(label, value)| is_allowed_sensor(label) && is_plausible_celsius(*value))
        .map(|(_, value)| *value)
        .collect();

    if values.is_empty() {
        return None;
    }

    Some(ThermalReading {
        celsius: values.iter().sum::<f64>() / values.len() as f64,
        confidence: SourceConfidence::SensorAverage {
            sensors: values.len(),
        },
    })
}

/// Temperature from the HID event system's thermal diodes.
pub struct HidTemperatureSource<H: HidSensorSource> {
    sensors: H,
}

impl<H: HidSensorSource> HidTemperatureSource<H> {
    pub fn new(sensors: H) -> Self {
        Self { sensors }
    }
}

impl<H: HidSensorSource> TemperatureSource for HidTemperatureSource<H> {
    fn name(&self) -> &'static str {
        "hid"
    }

    fn read(&mut self) -> Option<ThermalReading> {
        match self.sensors.sensor_readings() {
            Ok(readings) => average_sensor_readings(&readings),
            Err(e) => {
                tracing::debug!("HID sensor enumeration failed: {e}");
                None
            }
        }
    }
}

/// Ordered temperature fallback chain.
#[derive(Default)]
pub struct ThermalResolver {
    sources: Vec<Box<dyn TemperatureSource>>,
}

impl ThermalResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source; earlier sources take precedence.
    pub fn with_source(mut self, source: Box<dyn TemperatureSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// First plausible reading, or `None` when the temperature is unknown.
    pub fn resolve(&mut self) -> Option<ThermalReading> {
        for source in &mut self.sources {
            if let Some(reading) = source.read() {
                if is_plausible_celsius(reading.celsius) {
                    return Some(reading);
                }
                tracing::trace!(
                    "Discarding implausible {:.1}°C from {}",
                    reading.celsius,
                    source.name()
                );
            }
        }
        None
    }
}

/// Temperature and thermal pressure taken together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThermalSnapshot {
    /// `None` means unknown.
    pub temperature: Option<ThermalReading>,
    pub state: ThermalState,
}

pub struct ThermalMonitor<T: ThermalStateSource> {
    resolver: ThermalResolver,
    state_source: T,
}

impl<T: ThermalStateSource> ThermalMonitor<T> {
    pub fn new(resolver: ThermalResolver, state_source: T) -> Self {
        Self {
            resolver,
            state_source,
        }
    }

    pub fn read(&mut self) -> ThermalSnapshot {
        ThermalSnapshot {
            temperature: self.resolver.resolve(),
            state: self.state_source.thermal_state(),
        }
    }
}

/// State source for platforms without a thermal-pressure API.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnknownThermalState;

impl ThermalStateSource for UnknownThermalState {
    fn thermal_state(&self) -> ThermalState {
        ThermalState::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};

    struct Fixed(Option<f64>);

    impl TemperatureSource for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn read(&mut self) -> Option<ThermalReading> {
            self.0.map(|celsius| ThermalReading {
                celsius,
                confidence: SourceConfidence::EmbeddedController,
            })
        }
    }

    struct FakeHid(Result<Vec<(String, f64)>>);

    impl HidSensorSource for FakeHid {
        fn sensor_readings(&mut self) -> Result<Vec<(String, f64)>> {
            match &self.0 {
                Ok(readings) => Ok(readings.clone()),
                Err(_) => Err(Error::SourceUnavailable("IOHIDEventSystem".to_string())),
            }
        }
    }

    struct Pressure(ThermalState);

    impl ThermalStateSource for Pressure {
        fn thermal_state(&self) -> ThermalState {
            self.0
        }
    }

    fn labelled(readings: &[(&str, f64)]) -> Vec<(String, f64)> {
        readings.iter().map(|(l, v)| (l.to_string(), *v)).collect()
    }

    #[test]
    fn test_allow_list() {
        assert!(is_allowed_sensor("PMU tdie1"));
        assert!(is_allowed_sensor("pACC MTR Temp Sensor3"));
        assert!(is_allowed_sensor("GPU MTR Temp Sensor1"));
        assert!(!is_allowed_sensor("NAND CH0 temp"));
        assert!(!is_allowed_sensor("gas gauge battery"));
    }

    #[test]
    fn test_average_filters_and_counts() {
        let readings = labelled(&[
            ("PMU tdie1", 40.0),
            ("PMU tdie2", 50.0),
            ("eACC MTR Temp Sensor0", 0.0),
            ("SOC MTR Temp Sensor0", 151.0),
            ("NAND CH0 temp", 90.0),
        ]);

        let reading = average_sensor_readings(&readings).unwrap();
        assert!((reading.celsius - 45.0).abs() < 1e-9);
        assert_eq!(
            reading.confidence,
            SourceConfidence::SensorAverage { sensors: 2 }
        );
    }

    #[test]
    fn test_smc_takes_precedence() {
        let mut resolver = ThermalResolver::new()
            .with_source(Box::new(Fixed(Some(55.0))))
            .with_source(Box::new(HidTemperatureSource::new(FakeHid(Ok(labelled(
                &[("PMU tdie1", 40.0)],
            ))))));

        assert_eq!(resolver.resolve().unwrap().celsius, 55.0);
        assert_eq!(resolver.source_names(), vec!["fixed", "hid"]);
    }

    #[test]
    fn test_falls_through_to_hid() {
        let mut resolver = ThermalResolver::new()
            .with_source(Box::new(Fixed(None)))
            .with_source(Box::new(Fixed(Some(400.0))))
            .with_source(Box::new(HidTemperatureSource::new(FakeHid(Ok(labelled(
                &[("PMU tdie1", 40.0), ("PMU tdie2", 42.0)],
            ))))));

        let reading = resolver.resolve().unwrap();
        assert!((reading.celsius - 41.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_when_everything_fails() {
        let mut resolver = ThermalResolver::new()
            .with_source(Box::new(Fixed(None)))
            .with_source(Box::new(HidTemperatureSource::new(FakeHid(Err(
                Error::SourceUnavailable(String::new()),
            )))));
        assert!(resolver.resolve().is_none());

        assert!(ThermalResolver::new().resolve().is_none());
    }

    #[test]
    fn test_monitor_reports_state_independently() {
        let mut monitor = ThermalMonitor::new(
            ThermalResolver::new().with_source(Box::new(Fixed(None))),
            Pressure(ThermalState::Serious),
        );

        let snapshot = monitor.read();
        assert!(snapshot.temperature.is_none());
        assert_eq!(snapshot.state, ThermalState::Serious);
        assert!(snapshot.state.is_throttled());
    }

    #[test]
    fn test_unknown_state_source() {
        assert_eq!(UnknownThermalState.thermal_state(), ThermalState::Unknown);
    }
}
