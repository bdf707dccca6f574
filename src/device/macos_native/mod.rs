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

//! Native macOS counter sources for Apple Silicon
//!
//! Each module implements one of the traits in [`crate::sampler::source`]
//! against a privileged platform interface. None of them computes rates.
//!
//! ## Modules
//! - `ioreport`: IOReport energy and GPU residency channels
//! - `host`: per-core tick counters
//! - `process`: kernel process table and task accounting
//! - `smc`: AppleSMC user-client transport
//! - `sysctl`: named sysctl reads and the SoC description
//! - `hid`: HID event system temperature sensors
//! - `thermal`: NSProcessInfo thermal state binding

mod hid;
mod host;
mod ioreport;
mod process;
mod smc;
mod sysctl;
mod thermal;

pub use hid::HidThermalSensors;
pub use host::HostTicks;
pub use ioreport::{IOReportSource, IOReportSubscriptionHandle, OwnedSample};
pub use process::LibprocTable;
pub use smc::IoKitSmc;
pub use sysctl::{read_system_info, sysctl_string, sysctl_u32};
pub use thermal::{current_thermal_state, ProcessInfoThermalState};

use crate::sampler::smc::{SmcClient, SmcTemperatureSource};
use crate::sampler::thermal::{HidTemperatureSource, ThermalMonitor, ThermalResolver};

/// Open an SMC client, or `None` when the service is missing.
pub fn smc_client() -> Option<SmcClient<IoKitSmc>> {
    match IoKitSmc::open() {
        Ok(transport) => Some(SmcClient::new(transport)),
        Err(e) => {
            tracing::warn!("SMC unavailable: {e}");
            None
        }
    }
}

/// Temperature fallback chain: SMC keys first, then the HID diode average.
pub fn thermal_resolver(temperature_keys: &[String]) -> ThermalResolver {
    let mut resolver = ThermalResolver::new();
    if let Some(client) = smc_client() {
        resolver = resolver.with_source(Box::new(SmcTemperatureSource::new(
            client,
            temperature_keys.to_vec(),
        )));
    }
    resolver.with_source(Box::new(HidTemperatureSource::new(
        HidThermalSensors::new(),
    )))
}

pub fn thermal_monitor(temperature_keys: &[String]) -> ThermalMonitor<ProcessInfoThermalState> {
    ThermalMonitor::new(thermal_resolver(temperature_keys), ProcessInfoThermalState)
}
