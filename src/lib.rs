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

//! # soc-sampler
//!
//! Live telemetry sampler for Apple Silicon. It holds long-lived
//! subscriptions to privileged counters and reduces pairs of snapshots into
//! watts, percent-active, MHz and percent-CPU.
//!
//! The numerical engine lives in [`sampler`] and is platform independent;
//! native counter access sits behind the traits in [`sampler::source`] and
//! is implemented for macOS in `device::macos_native`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use soc_sampler::prelude::*;
//!
//! # #[cfg(target_os = "macos")]
//! # fn demo() -> Result<()> {
//! use soc_sampler::device::macos_native::IOReportSource;
//!
//! let mut power = PowerSampler::new(IOReportSource::new());
//! power.initialize()?;
//! let sample = power.sample(500);
//! println!("CPU {:.2} W, GPU {} MHz", sample.cpu_watts, sample.gpu_freq_mhz);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod device;
pub mod error;
pub mod prelude;
pub mod report;
pub mod runner;
pub mod sampler;

pub mod common {
    pub mod config;
}

pub use error::{Error, Result};
