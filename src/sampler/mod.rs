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

//! Sampling and delta engine.
//!
//! Everything in here is platform independent. Native counter access is
//! injected through the traits in [`source`].
//!
//! ## Modules
//! - `power`: windowed energy and GPU residency sampling
//! - `classifier`: channel name rules, unit scaling and GPU residency math
//! - `frequency`: GPU DVFS table discovery
//! - `cpu`: per-core tick deltas
//! - `process`: process list with per-process CPU delta cache
//! - `thermal`: temperature fallback chain and thermal pressure
//! - `smc`: SMC key protocol and system power
//! - `netdisk`, `memory`: network/disk rates and memory occupancy
//! - `system_info`: static SoC description

pub mod classifier;
pub mod cpu;
pub mod delta;
pub mod frequency;
pub mod memory;
pub mod netdisk;
pub mod power;
pub mod process;
pub mod smc;
pub mod source;
pub mod system_info;
pub mod thermal;
pub mod types;

pub use cpu::CpuUsageTracker;
pub use netdisk::NetDiskSampler;
pub use power::PowerSampler;
pub use process::ProcessTracker;
pub use smc::SmcClient;
pub use thermal::{ThermalMonitor, ThermalResolver, ThermalSnapshot};
pub use types::{
    CoreTicks, MemorySample, NetDiskSample, PowerSample, ProcessSnapshotEntry, ProcessState,
    SourceConfidence, SystemInfo, ThermalReading, ThermalState,
};
