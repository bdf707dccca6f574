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

//! Channel classification for energy and GPU performance-state deltas.
//!
//! A decoded delta is a flat list of [`ChannelReading`]s. Each reading is
//! matched against [`CLASSIFICATION_RULES`] in table order and the first
//! matching rule decides its [`ChannelMetric`]. Readings that match no
//! rule are ignored.
//!
//! ## Channel groups
//! - `Energy Model`: `CPU Energy`, `GPU Energy`, `ANE*`, `DRAM*`, `GPU SRAM*`
//! - `GPU Stats` / `GPU Performance States`: `GPUPH` residency table

use super::delta::{percent_of, rate_per_second};
use super::types::PowerSample;

pub const ENERGY_MODEL_GROUP: &str = "Energy Model";
pub const GPU_STATS_GROUP: &str = "GPU Stats";
pub const GPU_PERF_STATES_SUBGROUP: &str = "GPU Performance States";
pub const GPU_PERF_STATES_CHANNEL: &str = "GPUPH";

/// States of the GPU residency table that count as not running.
const INACTIVE_GPU_STATES: [&str; 3] = ["OFF", "IDLE", "DOWN"];

/// Raw payload of one channel in a delta.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValue {
    /// A simple integer counter (energy).
    Integer(i64),
    /// Named state residencies, in the order the platform reports them.
    States(Vec<(String, i64)>),
}

/// One decoded channel from a delta sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReading {
    pub group: String,
    pub subgroup: String,
    pub channel: String,
    pub unit: String,
    pub value: ChannelValue,
}

impl ChannelReading {
    pub fn energy(channel: &str, unit: &str, value: i64) -> Self {
        Self {
            group: ENERGY_MODEL_GROUP.to_string(),
            subgroup: String::new(),
            channel: channel.to_string(),
            unit: unit.to_string(),
            value: ChannelValue::Integer(value),
        }
    }

    pub fn gpu_states<S: AsRef<str>>(states: &[(S, i64)]) -> Self {
        Self {
            group: GPU_STATS_GROUP.to_string(),
            subgroup: GPU_PERF_STATES_SUBGROUP.to_string(),
            channel: GPU_PERF_STATES_CHANNEL.to_string(),
            unit: String::new(),
            value: ChannelValue::States(
                states
                    .iter()
                    .map(|(name, residency)| (name.as_ref().to_string(), *residency))
                    .collect(),
            ),
        }
    }
}

/// Logical metric a channel feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMetric {
    CpuPower,
    GpuPower,
    GpuSramPower,
    AnePower,
    DramPower,
    GpuPerformanceStates,
}

/// How a rule matches the channel name.
#[derive(Debug, Clone, Copy)]
pub enum NameMatcher {
    Exact(&'static str),
    Prefix(&'static str),
    Contains(&'static str),
}

impl NameMatcher {
    fn matches(&self, name: &str) -> bool {
        match self {
            NameMatcher::Exact(s) => name == *s,
            NameMatcher::Prefix(s) => name.starts_with(s),
            NameMatcher::Contains(s) => name.contains(s),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    pub group: &'static str,
    /// `None` matches any subgroup.
    pub subgroup: Option<&'static str>,
    pub name: NameMatcher,
    pub metric: ChannelMetric,
}

/// Evaluated top to bottom; first match wins. `GPU SRAM` precedes the
/// GPU energy rule so the SRAM rail is never counted as GPU core power.
pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        group: ENERGY_MODEL_GROUP,
        subgroup: None,
        name: NameMatcher::Prefix("GPU SRAM"),
        metric: ChannelMetric::GpuSramPower,
    },
    ClassificationRule {
        group: ENERGY_MODEL_GROUP,
        subgroup: None,
        name: NameMatcher::Exact("GPU Energy"),
        metric: ChannelMetric::GpuPower,
    },
    ClassificationRule {
        group: ENERGY_MODEL_GROUP,
        subgroup: None,
        name: NameMatcher::Contains("CPU Energy"),
        metric: ChannelMetric::CpuPower,
    },
    ClassificationRule {
        group: ENERGY_MODEL_GROUP,
        subgroup: None,
        name: NameMatcher::Prefix("ANE"),
        metric: ChannelMetric::AnePower,
    },
    ClassificationRule {
        group: ENERGY_MODEL_GROUP,
        subgroup: None,
        name: NameMatcher::Prefix("DRAM"),
        metric: ChannelMetric::DramPower,
    },
    ClassificationRule {
        group: GPU_STATS_GROUP,
        subgroup: Some(GPU_PERF_STATES_SUBGROUP),
        name: NameMatcher::Exact(GPU_PERF_STATES_CHANNEL),
        metric: ChannelMetric::GpuPerformanceStates,
    },
];

/// Find the metric bucket for a channel.
pub fn classify(group: &str, subgroup: &str, channel: &str) -> Option<ChannelMetric> {
    CLASSIFICATION_RULES
        .iter()
        .find(|rule| {
            rule.group == group
                && rule.subgroup.map_or(true, |s| s == subgroup)
                && rule.name.matches(channel)
        })
        .map(|rule| rule.metric)
}

/// Joules per raw unit for an energy channel's unit label.
///
/// An empty or unrecognized label is treated as microjoules.
pub fn energy_unit_scale(unit: &str) -> f64 {
    match unit.trim() {
        "mJ" => 1e-3,
        "uJ" | "µJ" => 1e-6,
        "nJ" => 1e-9,
        _ => 1e-6,
    }
}

/// Convert a raw energy delta over a window into watts.
pub fn energy_to_watts(raw: i64, unit: &str, window_ms: u64) -> f64 {
    if raw <= 0 {
        return 0.0;
    }
    let joules = raw as f64 * energy_unit_scale(unit);
    rate_per_second(joules, window_ms as f64 / 1000.0)
}

/// GPU activity derived from one residency table.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct GpuActivity {
    pub active_percent: f64,
    pub freq_mhz: u32,
}

/// Reduce a GPU residency table to active percent and weighted frequency.
///
/// The Nth active state is priced at `freq_table[N]`. This positional
/// mapping assumes the platform reports states in ascending frequency
/// order and is an approximation. Active states past the end of the
/// table count toward activity but not toward frequency.
pub fn gpu_activity(states: &[(String, i64)], freq_table: &[u32]) -> GpuActivity {
    let mut total_residency: u64 = 0;
    let mut active_residency: u64 = 0;
    let mut weighted_freq: f64 = 0.0;
    let mut active_index: usize = 0;

    for (name, residency) in states {
        let residency = (*residency).max(0) as u64;
        total_residency = total_residency.saturating_add(residency);

        if INACTIVE_GPU_STATES.contains(&name.as_str()) {
            continue;
        }

        active_residency = active_residency.saturating_add(residency);
        if let Some(freq) = freq_table.get(active_index) {
            weighted_freq += *freq as f64 * residency as f64;
        }
        active_index += 1;
    }

    let active_percent = percent_of(active_residency as f64, total_residency as f64);
    let freq_mhz = if active_residency > 0 {
        (weighted_freq / active_residency as f64) as u32
    } else {
        0
    };

    GpuActivity {
        active_percent,
        freq_mhz,
    }
}

impl PowerSample {
    /// Build a power sample from one decoded delta.
    ///
    /// `window_ms` is the nominal window between the two captures.
    pub fn from_channels(readings: &[ChannelReading], window_ms: u64, freq_table: &[u32]) -> Self {
        let mut sample = PowerSample::default();

        for reading in readings {
            let Some(metric) = classify(&reading.group, &reading.subgroup, &reading.channel) else {
                continue;
            };

            match (metric, &reading.value) {
                (ChannelMetric::GpuPerformanceStates, ChannelValue::States(states)) => {
                    let activity = gpu_activity(states, freq_table);
                    sample.gpu_active_percent = activity.active_percent;
                    sample.gpu_freq_mhz = activity.freq_mhz;
                }
                (metric, ChannelValue::Integer(raw)) => {
                    let watts = energy_to_watts(*raw, &reading.unit, window_ms);
                    match metric {
                        ChannelMetric::CpuPower => sample.cpu_watts += watts,
                        ChannelMetric::GpuPower => sample.gpu_watts += watts,
                        ChannelMetric::GpuSramPower => sample.gpu_sram_watts += watts,
                        ChannelMetric::AnePower => sample.ane_watts += watts,
                        ChannelMetric::DramPower => sample.dram_watts += watts,
                        ChannelMetric::GpuPerformanceStates => {}
                    }
                }
                (metric, _) => {
                    tracing::trace!(
                        "Skipping channel '{}' with unexpected payload for {metric:?}",
                        reading.channel
                    );
                }
            }
        }

        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_energy_channels() {
        assert_eq!(
            classify(ENERGY_MODEL_GROUP, "", "CPU Energy"),
            Some(ChannelMetric::CpuPower)
        );
        assert_eq!(
            classify(ENERGY_MODEL_GROUP, "", "GPU Energy"),
            Some(ChannelMetric::GpuPower)
        );
        assert_eq!(
            classify(ENERGY_MODEL_GROUP, "", "GPU SRAM0"),
            Some(ChannelMetric::GpuSramPower)
        );
        assert_eq!(
            classify(ENERGY_MODEL_GROUP, "", "ANE0"),
            Some(ChannelMetric::AnePower)
        );
        assert_eq!(
            classify(ENERGY_MODEL_GROUP, "", "DRAM0"),
            Some(ChannelMetric::DramPower)
        );
    }

    #[test]
    fn test_classify_ignores_cluster_and_foreign_channels() {
        // Per-cluster rails would double count the CPU total
        assert_eq!(classify(ENERGY_MODEL_GROUP, "", "EACC_CPU0"), None);
        assert_eq!(classify(ENERGY_MODEL_GROUP, "", "GPU0"), None);
        assert_eq!(classify("CPU Stats", "CPU Core Performance States", "ECPU0"), None);
        assert_eq!(classify(GPU_STATS_GROUP, "GPU Performance States", "GPU_SW"), None);
        assert_eq!(classify(GPU_STATS_GROUP, "Other", GPU_PERF_STATES_CHANNEL), None);
    }

    #[test]
    fn test_classify_gpu_states() {
        assert_eq!(
            classify(GPU_STATS_GROUP, GPU_PERF_STATES_SUBGROUP, "GPUPH"),
            Some(ChannelMetric::GpuPerformanceStates)
        );
    }

    #[test]
    fn test_energy_unit_conversion() {
        let e = 1234;
        let mj = energy_to_watts(e, "mJ", 500);
        assert!((mj - e as f64 / 1000.0 / 0.5).abs() < 1e-9);

        let uj = energy_to_watts(e, "uJ", 500);
        assert!((uj - e as f64 / 1e6 / 0.5).abs() < 1e-12);

        let unlabeled = energy_to_watts(e, "", 500);
        assert_eq!(unlabeled, uj);

        let nj = energy_to_watts(e, "nJ", 500);
        assert!((nj - e as f64 / 1e9 / 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_energy_guards() {
        assert_eq!(energy_to_watts(-10, "mJ", 500), 0.0);
        assert_eq!(energy_to_watts(10, "mJ", 0), 0.0);
    }

    #[test]
    fn test_gpu_weighted_frequency() {
        let states = vec![
            ("OFF".to_string(), 100),
            ("S1".to_string(), 50),
            ("S2".to_string(), 50),
        ];
        let table = [600, 1200, 1400];

        let activity = gpu_activity(&states, &table);
        assert!((activity.active_percent - 50.0).abs() < 1e-9);
        assert_eq!(activity.freq_mhz, (600 * 50 + 1200 * 50) / 100);
    }

    #[test]
    fn test_gpu_states_all_idle() {
        let states = vec![
            ("OFF".to_string(), 10),
            ("IDLE".to_string(), 20),
            ("DOWN".to_string(), 30),
        ];
        let activity = gpu_activity(&states, &[400]);
        assert_eq!(activity, GpuActivity::default());
    }

    #[test]
    fn test_gpu_states_beyond_table() {
        let states = vec![
            ("IDLE".to_string(), 100),
            ("P1".to_string(), 100),
            ("P2".to_string(), 100),
        ];
        // Only the first active state has a frequency
        let activity = gpu_activity(&states, &[300]);
        assert!((activity.active_percent - 66.666).abs() < 0.01);
        assert_eq!(activity.freq_mhz, 150);
    }

    #[test]
    fn test_gpu_negative_residency_is_zero() {
        let states = vec![("OFF".to_string(), -5), ("P1".to_string(), -5)];
        assert_eq!(gpu_activity(&states, &[500]), GpuActivity::default());
    }

    #[test]
    fn test_from_channels_accumulates_buckets() {
        let readings = vec![
            ChannelReading::energy("CPU Energy", "mJ", 1000),
            ChannelReading::energy("GPU Energy", "mJ", 500),
            ChannelReading::energy("GPU SRAM0", "mJ", 100),
            ChannelReading::energy("ANE0", "mJ", 50),
            ChannelReading::energy("DRAM0", "mJ", 200),
            ChannelReading::energy("DRAM1", "mJ", 200),
            ChannelReading::energy("EACC_CPU", "mJ", 9999),
            ChannelReading::gpu_states(&[("OFF", 100), ("S1", 50), ("S2", 50)]),
        ];

        let sample = PowerSample::from_channels(&readings, 1000, &[600, 1200]);
        assert!((sample.cpu_watts - 1.0).abs() < 1e-9);
        assert!((sample.gpu_watts - 0.5).abs() < 1e-9);
        assert!((sample.gpu_sram_watts - 0.1).abs() < 1e-9);
        assert!((sample.ane_watts - 0.05).abs() < 1e-9);
        assert!((sample.dram_watts - 0.4).abs() < 1e-9);
        assert!((sample.gpu_active_percent - 50.0).abs() < 1e-9);
        assert_eq!(sample.gpu_freq_mhz, 900);
    }

    #[test]
    fn test_from_channels_skips_mismatched_payload() {
        let mut bogus = ChannelReading::energy("CPU Energy", "mJ", 0);
        bogus.value = ChannelValue::States(vec![("S1".to_string(), 10)]);
        let sample = PowerSample::from_channels(&[bogus], 1000, &[]);
        assert_eq!(sample, PowerSample::default());
    }
}
