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

//! End-to-end tests of the sampling engine through the public API, with
//! simulated counter sources standing in for the native interfaces.

use std::collections::HashMap;

use soc_sampler::prelude::*;
use soc_sampler::report::{CpuReport, PowerReport, ThermalReport};
use soc_sampler::runner;
use soc_sampler::sampler::classifier::ChannelReading;
use soc_sampler::sampler::frequency::select_gpu_frequency_table;
use soc_sampler::sampler::smc::{
    fourcc, KeyData, KeyInfo, SmcTemperatureSource, SMC_CMD_READ_BYTES, SMC_CMD_READ_KEY_INFO,
    SMC_TYPE_FLT,
};
use soc_sampler::sampler::thermal::{HidTemperatureSource, UnknownThermalState};
use soc_sampler::sampler::types::CoreTickSnapshot;

/// Every window yields the same per-window delta.
struct SteadySubscription {
    delta: Vec<ChannelReading>,
}

impl ChannelSubscription for SteadySubscription {
    type Snapshot = ();

    fn capture(&mut self) -> Result<()> {
        Ok(())
    }

    fn delta(&mut self, _previous: &(), _current: &()) -> Result<Vec<ChannelReading>> {
        Ok(self.delta.clone())
    }
}

struct SteadySource {
    delta: Vec<ChannelReading>,
    blobs: Vec<(String, Vec<u8>)>,
}

impl ChannelSource for SteadySource {
    type Subscription = SteadySubscription;

    fn subscribe(&mut self) -> Result<SteadySubscription> {
        Ok(SteadySubscription {
            delta: self.delta.clone(),
        })
    }

    fn gpu_frequency_table(&mut self) -> Vec<u32> {
        select_gpu_frequency_table(self.blobs.iter().map(|(n, b)| (n.as_str(), b.as_slice())))
    }
}

fn voltage_blob(mhz: &[u32]) -> Vec<u8> {
    mhz.iter()
        .flat_map(|f| {
            let mut record = (f * 1_000_000).to_le_bytes().to_vec();
            record.extend_from_slice(&[0, 0, 0, 0]);
            record
        })
        .collect()
}

#[test]
fn power_pipeline_from_channels_to_watts() {
    let source = SteadySource {
        delta: vec![
            ChannelReading::energy("CPU Energy", "mJ", 500),
            ChannelReading::energy("GPU Energy", "nJ", 250_000_000),
            ChannelReading::energy("ANE0", "uJ", 50_000),
            ChannelReading::energy("DRAM0", "mJ", 100),
            ChannelReading::energy("GPU SRAM0", "mJ", 25),
            ChannelReading::gpu_states(&[
                ("OFF", 500),
                ("P1", 250),
                ("P2", 250),
            ]),
        ],
        blobs: vec![
            ("voltage-states1".to_string(), voltage_blob(&[600, 2000, 3200])),
            ("voltage-states9".to_string(), voltage_blob(&[400, 800, 1200])),
        ],
    };

    let mut power = PowerSampler::new(source);
    power.initialize().unwrap();
    assert_eq!(power.gpu_frequency_table(), &[400, 800, 1200]);

    let sample = power.sample(500);
    assert!((sample.cpu_watts - 1.0).abs() < 1e-9);
    assert!((sample.gpu_watts - 0.5).abs() < 1e-9);
    assert!((sample.ane_watts - 0.1).abs() < 1e-9);
    assert!((sample.dram_watts - 0.2).abs() < 1e-9);
    assert!((sample.gpu_sram_watts - 0.05).abs() < 1e-9);
    assert!((sample.gpu_active_percent - 50.0).abs() < 1e-9);
    assert_eq!(sample.gpu_freq_mhz, 600);

    let report = PowerReport::new(sample, 3.0);
    assert!((report.total_watts - 1.85).abs() < 1e-9);
    assert!((report.package_watts - 3.0).abs() < 1e-9);
}

struct ScriptedTicks(Vec<CoreTickSnapshot>);

impl TickSource for ScriptedTicks {
    fn core_ticks(&mut self) -> Result<CoreTickSnapshot> {
        if self.0.is_empty() {
            return Err(Error::SourceUnavailable("drained".to_string()));
        }
        Ok(self.0.remove(0))
    }
}

#[test]
fn cpu_usage_across_cycles() {
    let mut tracker = CpuUsageTracker::new(ScriptedTicks(vec![
        vec![CoreTicks::new(0, 0, 0, 0), CoreTicks::new(0, 0, 0, 0)],
        vec![CoreTicks::new(30, 10, 60, 0), CoreTicks::new(0, 0, 100, 0)],
    ]));

    assert_eq!(tracker.usage_percentages(), vec![0.0, 0.0]);
    let usage = tracker.usage_percentages();
    assert!((usage[0] - 40.0).abs() < 1e-9);
    assert_eq!(usage[1], 0.0);

    let report = CpuReport::new(usage);
    assert!((report.usage_percent - 20.0).abs() < 1e-9);

    assert!(tracker.usage_percentages().is_empty());
    assert!(tracker.has_baseline());
}

/// SMC with a fixed set of keys.
#[derive(Default)]
struct MemorySmc {
    keys: HashMap<u32, (u32, [u8; 4])>,
}

impl MemorySmc {
    fn float(mut self, key: &str, value: f32) -> Self {
        self.keys
            .insert(fourcc(key).unwrap(), (SMC_TYPE_FLT, value.to_be_bytes()));
        self
    }
}

impl SmcTransport for MemorySmc {
    fn call(&mut self, input: &KeyData) -> Result<KeyData> {
        let (data_type, payload) = *self
            .keys
            .get(&input.key)
            .ok_or_else(|| Error::SourceUnavailable("unknown key".to_string()))?;
        let mut output = KeyData::default();
        match input.data8 {
            SMC_CMD_READ_KEY_INFO => {
                output.key_info = KeyInfo {
                    data_size: 4,
                    data_type,
                    data_attributes: 0,
                };
            }
            SMC_CMD_READ_BYTES => output.bytes[..4].copy_from_slice(&payload),
            _ => return Err(Error::Decode("unexpected command".to_string())),
        }
        Ok(output)
    }
}

struct FixedHid(Vec<(String, f64)>);

impl HidSensorSource for FixedHid {
    fn sensor_readings(&mut self) -> Result<Vec<(String, f64)>> {
        Ok(self.0.clone())
    }
}

struct FixedState(ThermalState);

impl ThermalStateSource for FixedState {
    fn thermal_state(&self) -> ThermalState {
        self.0
    }
}

fn hid_diodes() -> FixedHid {
    FixedHid(vec![
        ("PMU tdie1".to_string(), 40.0),
        ("pACC MTR Temp Sensor0".to_string(), 50.0),
        ("NAND CH0 temp".to_string(), 90.0),
        ("GPU MTR Temp Sensor1".to_string(), 400.0),
    ])
}

#[test]
fn thermal_chain_prefers_smc_key() {
    let smc = SmcClient::new(MemorySmc::default().float("Tp01", 61.5));
    let resolver = ThermalResolver::new()
        .with_source(Box::new(SmcTemperatureSource::new(
            smc,
            vec!["Tp09".to_string(), "Tp01".to_string()],
        )))
        .with_source(Box::new(HidTemperatureSource::new(hid_diodes())));
    assert_eq!(resolver.source_names(), vec!["smc", "hid"]);

    let mut monitor = ThermalMonitor::new(resolver, FixedState(ThermalState::Fair));
    let report = ThermalReport::from(monitor.read());
    let reading = report.temperature.unwrap();
    assert!((reading.celsius - 61.5).abs() < 1e-6);
    assert_eq!(reading.confidence, SourceConfidence::EmbeddedController);
    assert_eq!(report.state_ordinal, Some(1));
    assert!(report.throttled);
}

#[test]
fn thermal_chain_falls_back_to_hid_average() {
    let smc = SmcClient::new(MemorySmc::default().float("Tp01", 0.0));
    let mut resolver = ThermalResolver::new()
        .with_source(Box::new(SmcTemperatureSource::new(smc, vec!["Tp01".to_string()])))
        .with_source(Box::new(HidTemperatureSource::new(hid_diodes())));

    let reading = resolver.resolve().unwrap();
    assert!((reading.celsius - 45.0).abs() < 1e-9);
    assert_eq!(reading.confidence, SourceConfidence::SensorAverage { sensors: 2 });
}

#[test]
fn thermal_chain_reports_unknown() {
    let resolver = ThermalResolver::new()
        .with_source(Box::new(SmcTemperatureSource::new(
            SmcClient::new(MemorySmc::default()),
            vec!["Tp01".to_string()],
        )))
        .with_source(Box::new(HidTemperatureSource::new(FixedHid(vec![]))));

    let snapshot = ThermalMonitor::new(resolver, UnknownThermalState).read();
    assert!(snapshot.temperature.is_none());
    assert_eq!(snapshot.state, ThermalState::Unknown);
}

#[test]
fn system_power_reads_pstr() {
    let mut smc = SmcClient::new(MemorySmc::default().float("PSTR", 10.0));
    assert!((smc.system_power() - 10.0).abs() < 1e-9);

    let mut empty = SmcClient::new(MemorySmc::default());
    assert_eq!(empty.system_power(), 0.0);
}

#[tokio::test]
async fn runner_drives_samplers_into_json_lines() {
    let mut power = PowerSampler::new(SteadySource {
        delta: vec![ChannelReading::energy("CPU Energy", "mJ", 100)],
        blobs: vec![],
    });
    power.initialize().unwrap();

    let mut cpu = CpuUsageTracker::new(ScriptedTicks(
        (0..16u64)
            .map(|i| vec![CoreTicks::new(i * 10, 0, i * 10, 0)])
            .collect(),
    ));

    let engine = Engine::new()
        .with_power(move || PowerReport::new(power.sample(100), 0.0))
        .with_cpu(move || CpuReport::new(cpu.usage_percentages()));

    let config = SamplerConfig::new().interval(20).report_count(Some(2));
    let mut out = Vec::new();
    let written = runner::run(engine, &config, false, &mut out, std::future::pending())
        .await
        .unwrap();
    assert_eq!(written, 2);

    let text = String::from_utf8(out).unwrap();
    let last: serde_json::Value = serde_json::from_str(text.lines().last().unwrap()).unwrap();
    let cpu_watts = last["power"]["cpu_watts"].as_f64().unwrap();
    assert!((cpu_watts - 1.0).abs() < 1e-9);
    assert!(last["cpu"]["core_usages"].is_array());
}
