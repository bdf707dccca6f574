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

use clap::Parser;

use crate::common::config::{AppConfig, MetricFamilies, SamplerConfig};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Reporting interval in milliseconds. The power window is half of it.
    #[arg(short, long, default_value_t = AppConfig::DEFAULT_INTERVAL_MS)]
    pub interval: u64,
    /// Stop after this many reports. Runs until Ctrl-C when omitted.
    #[arg(short, long)]
    pub count: Option<usize>,
    /// Number of power windows averaged into each report.
    #[arg(long, default_value_t = AppConfig::DEFAULT_SAMPLE_COUNT)]
    pub sample_count: usize,
    /// Maximum number of processes listed per report.
    #[arg(long, default_value_t = AppConfig::DEFAULT_MAX_PROCESSES)]
    pub max_processes: usize,
    /// Skip the process list.
    #[arg(long)]
    pub no_processes: bool,
    /// Skip power and GPU sampling.
    #[arg(long)]
    pub no_power: bool,
    /// Pretty-print each report instead of one JSON object per line.
    #[arg(long)]
    pub pretty: bool,
}

impl Cli {
    pub fn sampler_config(&self) -> SamplerConfig {
        let families = MetricFamilies {
            power: !self.no_power,
            processes: !self.no_processes,
            ..MetricFamilies::default()
        };
        SamplerConfig::new()
            .interval(self.interval.max(1))
            .sample_count(self.sample_count)
            .max_processes(self.max_processes)
            .report_count(self.count)
            .families(families)
    }
}
