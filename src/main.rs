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
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use soc_sampler::cli::Cli;
use soc_sampler::common::config::SamplerConfig;
use soc_sampler::device::SysinfoCounters;
use soc_sampler::runner::{self, Engine};
use soc_sampler::sampler::memory::MemorySampler;
use soc_sampler::sampler::NetDiskSampler;

fn init_tracing() {
    // stdout carries the JSON stream, so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soc_sampler=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(target_os = "macos")]
fn add_native_families(engine: Engine, config: &SamplerConfig) -> Engine {
    use soc_sampler::device::macos_native::{
        read_system_info, smc_client, thermal_monitor, HostTicks, IOReportSource, LibprocTable,
    };
    use soc_sampler::report::{CpuReport, PowerReport, ThermalReport};
    use soc_sampler::sampler::{CpuUsageTracker, PowerSampler, ProcessTracker};
    use soc_sampler::Error;

    let mut engine = engine.with_system_info(read_system_info());
    let families = config.families;

    if families.power {
        let mut power = PowerSampler::new(IOReportSource::new());
        match power.initialize() {
            Err(Error::ChannelGroupNotFound(group)) => {
                tracing::warn!("Power metrics disabled: '{group}' channels not found");
            }
            result => {
                if let Err(e) = result {
                    tracing::warn!("Power subscription deferred: {e}");
                }
                let mut smc = smc_client();
                let window_ms = config.power_window_ms();
                let sample_count = config.sample_count;
                engine = engine.with_power(move || {
                    let sample = power.sample_averaged(window_ms, sample_count);
                    let system_watts = smc.as_mut().map_or(0.0, |client| client.system_power());
                    PowerReport::new(sample, system_watts)
                });
            }
        }
    }

    if families.cpu {
        let mut ticks = CpuUsageTracker::new(HostTicks);
        engine = engine.with_cpu(move || CpuReport::new(ticks.usage_percentages()));
    }

    if families.processes {
        let mut processes = ProcessTracker::with_limit(LibprocTable, config.max_processes);
        engine = engine.with_processes(move || processes.list_processes());
    }

    if families.thermal {
        let mut monitor = thermal_monitor(&config.temperature_keys);
        engine = engine.with_thermal(move || ThermalReport::from(monitor.read()));
    }

    engine
}

#[cfg(not(target_os = "macos"))]
fn add_native_families(engine: Engine, config: &SamplerConfig) -> Engine {
    let families = config.families;
    if families.power || families.cpu || families.processes || families.thermal {
        tracing::warn!(
            "{}",
            soc_sampler::Error::NotSupported(
                "power, CPU tick, process and thermal sampling need macOS".to_string()
            )
        );
    }
    engine
}

fn build_engine(config: &SamplerConfig) -> Engine {
    let mut engine = add_native_families(Engine::new(), config);

    if config.families.net_disk {
        let net_disk = NetDiskSampler::new(SysinfoCounters::new());
        engine = engine.with_net_disk(move || net_disk.sample());
    }

    if config.families.memory {
        let mut memory = MemorySampler::new();
        engine = engine.with_memory(move || memory.sample());
    }

    engine
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.sampler_config();
    let engine = build_engine(&config);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if let Err(e) = runner::run(engine, &config, cli.pretty, &mut out, shutdown_signal()).await {
        tracing::error!("Sampling stopped: {e}");
        std::process::exit(1);
    }
}
