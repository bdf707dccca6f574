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

//! Plain data produced by the sampling engine.
//!
//! Everything here is immutable once built and carries no handles to
//! native resources, so it can be cloned across tasks and serialized
//! by export collaborators.

use serde::Serialize;

/// Power and GPU activity derived from one sampling window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct PowerSample {
    pub cpu_watts: f64,
    pub gpu_watts: f64,
    pub ane_watts: f64,
    pub dram_watts: f64,
    pub gpu_sram_watts: f64,
    pub gpu_freq_mhz: u32,
    pub gpu_active_percent: f64,
}

impl PowerSample {
    /// Sum of the component powers.
    pub fn total_watts(&self) -> f64 {
        self.cpu_watts + self.gpu_watts + self.ane_watts + self.dram_watts + self.gpu_sram_watts
    }

    /// Whole-package power: the larger of the component total and the
    /// SMC system power reading, since the component sum under-reports.
    pub fn package_watts(&self, system_power_watts: f64) -> f64 {
        self.total_watts().max(system_power_watts)
    }

    /// Power attributed to the GPU including its SRAM.
    pub fn gpu_combined_watts(&self) -> f64 {
        self.gpu_watts + self.gpu_sram_watts
    }

    /// Average a set of samples field by field.
    pub fn average(samples: &[PowerSample]) -> PowerSample {
        if samples.is_empty() {
            return PowerSample::default();
        }

        let count = samples.len() as f64;
        let mut avg = PowerSample::default();
        let mut freq_sum = 0.0;

        for sample in samples {
            avg.cpu_watts += sample.cpu_watts;
            avg.gpu_watts += sample.gpu_watts;
            avg.ane_watts += sample.ane_watts;
            avg.dram_watts += sample.dram_watts;
            avg.gpu_sram_watts += sample.gpu_sram_watts;
            avg.gpu_active_percent += sample.gpu_active_percent;
            freq_sum += sample.gpu_freq_mhz as f64;
        }

        avg.cpu_watts /= count;
        avg.gpu_watts /= count;
        avg.ane_watts /= count;
        avg.dram_watts /= count;
        avg.gpu_sram_watts /= count;
        avg.gpu_active_percent /= count;
        avg.gpu_freq_mhz = (freq_sum / count) as u32;
        avg
    }
}

/// Cumulative tick counters of one logical core.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoreTicks {
    pub user: u64,
    pub system: u64,
    pub idle: u64,
    pub nice: u64,
}

impl CoreTicks {
    pub fn new(user: u64, system: u64, idle: u64, nice: u64) -> Self {
        Self {
            user,
            system,
            idle,
            nice,
        }
    }
}

/// Per-core tick counters, one entry per logical core, in core order.
pub type CoreTickSnapshot = Vec<CoreTicks>;

/// Kernel scheduling state of a process, as a one-letter code.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessState {
    Idle,
    Running,
    Sleeping,
    Stopped,
    Zombie,
    #[default]
    Unknown,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Idle => "I",
            ProcessState::Running => "R",
            ProcessState::Sleeping => "S",
            ProcessState::Stopped => "T",
            ProcessState::Zombie => "Z",
            ProcessState::Unknown => "?",
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the live process list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSnapshotEntry {
    pub pid: u32,
    pub user: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub cumulative_cpu_time_nanos: u64,
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
    #[serde(serialize_with = "serialize_state")]
    pub state: ProcessState,
    pub command: String,
}

fn serialize_state<S: serde::Serializer>(
    state: &ProcessState,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(state.as_str())
}

/// Where a temperature reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum SourceConfidence {
    /// A single embedded-controller key that decoded to a float.
    EmbeddedController,
    /// Average of several HID thermal diodes.
    SensorAverage { sensors: usize },
}

/// One SoC temperature reading. Recomputed on every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThermalReading {
    pub celsius: f64,
    pub confidence: SourceConfidence,
}

/// Coarse OS thermal-pressure level.
///
/// Independent of the numeric temperature: this reflects throttling
/// pressure as the OS sees it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThermalState {
    #[default]
    Nominal,
    Fair,
    Serious,
    Critical,
    Unknown,
}

impl ThermalState {
    /// Convert from the raw NSProcessInfo ordinal.
    pub fn from_raw(value: i64) -> Self {
        match value {
            0 => ThermalState::Nominal,
            1 => ThermalState::Fair,
            2 => ThermalState::Serious,
            3 => ThermalState::Critical,
            _ => ThermalState::Unknown,
        }
    }

    /// Ordinal 0..=3, or `None` when unknown.
    pub fn ordinal(&self) -> Option<u8> {
        match self {
            ThermalState::Nominal => Some(0),
            ThermalState::Fair => Some(1),
            ThermalState::Serious => Some(2),
            ThermalState::Critical => Some(3),
            ThermalState::Unknown => None,
        }
    }

    /// powermetrics terminology for the same ordinal.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThermalState::Nominal => "Nominal",
            ThermalState::Fair => "Moderate",
            ThermalState::Serious => "Heavy",
            ThermalState::Critical => "Critical",
            ThermalState::Unknown => "Unknown",
        }
    }

    /// Any known state above nominal means the SoC is being held back.
    pub fn is_throttled(&self) -> bool {
        matches!(
            self,
            ThermalState::Fair | ThermalState::Serious | ThermalState::Critical
        )
    }
}

impl std::fmt::Display for ThermalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ThermalState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Network and disk throughput over one interval.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct NetDiskSample {
    pub in_bytes_per_sec: f64,
    pub out_bytes_per_sec: f64,
    pub in_packets_per_sec: f64,
    pub out_packets_per_sec: f64,
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
}

/// System memory occupancy in bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemorySample {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub swap_total: u64,
    pub swap_used: u64,
}

/// Static description of the SoC, read once at startup.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    /// CPU brand string, e.g. "Apple M2 Pro".
    pub name: String,
    pub core_count: u32,
    pub e_core_count: u32,
    pub p_core_count: u32,
    /// 0 when the GPU core count could not be determined.
    pub gpu_core_count: u32,
}
