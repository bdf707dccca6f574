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

//! Unified error types for the soc-sampler library.
//!
//! Sampling entry points degrade to zeroed or absent data instead of
//! returning errors. The only error a caller normally sees is
//! [`Error::ChannelGroupNotFound`] from
//! [`PowerSampler::initialize`](crate::sampler::power::PowerSampler::initialize),
//! which lets the caller disable the power family entirely.
//!
//! # Example
//!
//! ```rust,no_run
//! use soc_sampler::{Error, Result};
//!
//! fn check(result: Result<()>) {
//!     if let Err(Error::ChannelGroupNotFound(group)) = result {
//!         eprintln!("power metrics disabled: no '{group}' channels");
//!     }
//! }
//! ```

use thiserror::Error;

/// The main error type for soc-sampler operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The required counter group could not be found at all.
    ///
    /// Returned when the energy-model channel group is missing, which
    /// makes the whole power family unusable on this machine.
    #[error("Counter group not found: {0}")]
    ChannelGroupNotFound(String),

    /// Platform initialization failed.
    ///
    /// A native service exists but could not be opened or subscribed to
    /// (e.g. IOReport subscription creation, SMC user client open).
    #[error("Platform initialization failed: {0}")]
    PlatformInit(String),

    /// A single read from a privileged source failed.
    ///
    /// Transient; the next scheduled cycle retries automatically.
    #[error("Counter source unavailable: {0}")]
    SourceUnavailable(String),

    /// Raw data could not be interpreted (unexpected type code,
    /// malformed property blob).
    #[error("Decode error: {0}")]
    Decode(String),

    /// Feature not supported on this platform.
    #[error("Feature not supported on this platform: {0}")]
    NotSupported(String),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A report could not be encoded as JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for soc-sampler operations.
pub type Result<T> = std::result::Result<T, Error>;
