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

//! Static SoC description assembled from sysctl values and the display
//! profiler report.

use serde_json::Value;

use crate::sampler::types::SystemInfo;

/// GPU core count from `system_profiler SPDisplaysDataType -json` output.
///
/// The profiler reports `sppci_cores` as a string on current releases and
/// as a number on some older ones; both are accepted.
pub fn gpu_cores_from_profiler(json: &str) -> Option<u32> {
    let report: Value = serde_json::from_str(json).ok()?;
    report
        .get("SPDisplaysDataType")?
        .as_array()?
        .iter()
        .filter_map(|display| display.get("sppci_cores"))
        .find_map(|cores| match cores {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            _ => None,
        })
}

/// Build the record from whatever the platform managed to report.
/// Missing values read as zero, and a missing total core count falls back
/// to the sum of the two performance levels.
pub fn assemble_system_info(
    name: Option<String>,
    core_count: Option<u32>,
    p_core_count: Option<u32>,
    e_core_count: Option<u32>,
    gpu_core_count: Option<u32>,
) -> SystemInfo {
    let p_core_count = p_core_count.unwrap_or(0);
    let e_core_count = e_core_count.unwrap_or(0);
    SystemInfo {
        name: name.map(|n| n.trim().to_string()).unwrap_or_default(),
        core_count: core_count.unwrap_or(p_core_count + e_core_count),
        e_core_count,
        p_core_count,
        gpu_core_count: gpu_core_count.unwrap_or(0),
    }
}
