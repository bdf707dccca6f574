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

//! One exported line of telemetry.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sampler::cpu::overall_usage;
use crate::sampler::thermal::ThermalSnapshot;
use crate::sampler::types::{
    MemorySample, NetDiskSample, PowerSample, ProcessSnapshotEntry, SystemInfo, ThermalReading,
    ThermalState,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerReport {
    #[serde(flatten)]
    pub sample: PowerSample,
    /// SMC `PSTR` reading, 0.0 when unavailable.
    pub system_watts: f64,
    pub total_watts: f64,
    pub package_watts: f64,
}

impl PowerReport {
    pub fn new(sample: PowerSample, system_watts: f64) -> Self {
        Self {
            sample,
            system_watts,
            total_watts: sample.total_watts(),
            package_watts: sample.package_watts(system_watts),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuReport {
    pub usage_percent: f64,
    pub core_usages: Vec<f64>,
}

impl CpuReport {
    pub fn new(core_usages: Vec<f64>) -> Self {
        Self {
            usage_percent: overall_usage(&core_usages),
            core_usages,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThermalReport {
    /// `None` when no source produced a plausible value.
    pub temperature: Option<ThermalReading>,
    pub state: ThermalState,
    pub state_ordinal: Option<u8>,
    pub throttled: bool,
}

impl From<ThermalSnapshot> for ThermalReport {
    fn from(snapshot: ThermalSnapshot) -> Self {
        Self {
            temperature: snapshot.temperature,
            state: snapshot.state,
            state_ordinal: snapshot.state.ordinal(),
            throttled: snapshot.state.is_throttled(),
        }
    }
}

/// Latest value of every enabled family at one instant. Disabled
/// families are omitted from the JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_info: Option<SystemInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<PowerReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermal: Option<ThermalReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemorySample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_disk: Option<NetDiskSample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processes: Option<Vec<ProcessSnapshotEntry>>,
}

impl Report {
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            timestamp: time.to_rfc3339(),
            system_info: None,
            power: None,
            cpu: None,
            thermal: None,
            memory: None,
            net_disk: None,
            processes: None,
        }
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}
