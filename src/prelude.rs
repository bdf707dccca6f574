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

//! The soc-sampler prelude.
//!
//! ```rust
//! use soc_sampler::prelude::*;
//! ```

// Error types
pub use crate::error::{Error, Result};

// Configuration
pub use crate::common::config::{AppConfig, MetricFamilies, SamplerConfig};

// Samplers
pub use crate::sampler::{
    CpuUsageTracker, NetDiskSampler, PowerSampler, ProcessTracker, SmcClient, ThermalMonitor,
    ThermalResolver, ThermalSnapshot,
};

// Data
pub use crate::sampler::types::{
    CoreTicks, MemorySample, NetDiskSample, PowerSample, ProcessSnapshotEntry, ProcessState,
    SourceConfidence, SystemInfo, ThermalReading, ThermalState,
};

// Source traits for custom counter backends
pub use crate::sampler::smc::SmcTransport;
pub use crate::sampler::source::{
    ChannelSource, ChannelSubscription, HidSensorSource, ProcessTableSource, TemperatureSource,
    ThermalStateSource, TickSource,
};

// Reporting
pub use crate::report::{CpuReport, PowerReport, Report, ThermalReport};
pub use crate::runner::Engine;
