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

/// Application configuration constants
pub struct AppConfig;

impl AppConfig {
    // Sampling cadence
    pub const DEFAULT_INTERVAL_MS: u64 = 1000;
    pub const MIN_SAMPLE_WINDOW_MS: u64 = 100;
    pub const DEFAULT_SAMPLE_COUNT: usize = 1;

    // Process table
    pub const DEFAULT_MAX_PROCESSES: usize = 500;

    // GPU frequency table decoding
    pub const FREQUENCY_RECORD_BYTES: usize = 8;
    pub const SPURIOUS_FREQUENCY_HZ: u32 = 100_000_000; // 100 MHz
    pub const MAX_GPU_FREQUENCY_HZ: u32 = 4_000_000_000; // 4 GHz
    pub const MAX_FREQUENCY_ENTRIES: usize = 64;

    // Thermal plausibility
    pub const MIN_PLAUSIBLE_CELSIUS: f64 = 0.0;
    pub const MAX_PLAUSIBLE_CELSIUS: f64 = 150.0;

    // SMC keys
    pub const SYSTEM_POWER_KEY: &'static str = "PSTR";
    pub const DEFAULT_TEMPERATURE_KEYS: [&'static str; 6] =
        ["Tp09", "Tp01", "Tp05", "Tp0D", "TC0P", "TC0D"];
}

/// Which metric families the runner samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricFamilies {
    pub power: bool,
    pub cpu: bool,
    pub processes: bool,
    pub thermal: bool,
    pub net_disk: bool,
    pub memory: bool,
}

impl Default for MetricFamilies {
    fn default() -> Self {
        Self {
            power: true,
            cpu: true,
            processes: true,
            thermal: true,
            net_disk: true,
            memory: true,
        }
    }
}

/// Runtime configuration for the sampling engine and runner.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Reporting interval in milliseconds.
    /// Default: 1000ms
    pub interval_ms: u64,
    /// Number of consecutive power windows averaged per report.
    /// Default: 1
    pub sample_count: usize,
    /// Maximum number of processes returned per listing.
    /// Default: 500
    pub max_processes: usize,
    /// SMC keys tried, in order, for the SoC temperature.
    pub temperature_keys: Vec<String>,
    /// Number of reports to emit before stopping. `None` runs until Ctrl-C.
    pub report_count: Option<usize>,
    pub families: MetricFamilies,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: AppConfig::DEFAULT_INTERVAL_MS,
            sample_count: AppConfig::DEFAULT_SAMPLE_COUNT,
            max_processes: AppConfig::DEFAULT_MAX_PROCESSES,
            temperature_keys: AppConfig::DEFAULT_TEMPERATURE_KEYS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            report_count: None,
            families: MetricFamilies::default(),
        }
    }
}

impl SamplerConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reporting interval in milliseconds.
    pub fn interval(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Set how many power windows are averaged per report (minimum 1).
    pub fn sample_count(mut self, count: usize) -> Self {
        self.sample_count = count.max(1);
        self
    }

    /// Cap the returned process list length.
    pub fn max_processes(mut self, max: usize) -> Self {
        self.max_processes = max;
        self
    }

    pub fn temperature_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.temperature_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Stop after `count` reports.
    pub fn report_count(mut self, count: Option<usize>) -> Self {
        self.report_count = count;
        self
    }

    pub fn families(mut self, families: MetricFamilies) -> Self {
        self.families = families;
        self
    }

    /// Window for one power sample: half the interval, never below the
    /// platform minimum.
    pub fn power_window_ms(&self) -> u64 {
        (self.interval_ms / 2).max(AppConfig::MIN_SAMPLE_WINDOW_MS)
    }
}
