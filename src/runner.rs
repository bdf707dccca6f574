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

//! Periodic driver for the sampling engine.
//!
//! Every metric family runs as its own task so a slow power window never
//! stalls tick or process sampling. A family owns its sampler outright;
//! each blocking call moves the sampler into `spawn_blocking` and gets it
//! back with the result, so no lock is held across a sample. The latest
//! value of each family is published on a `watch` channel and a reporter
//! assembles one [`Report`] per interval.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::common::config::SamplerConfig;
use crate::error::Result;
use crate::report::{CpuReport, PowerReport, Report, ThermalReport};
use crate::sampler::types::{MemorySample, NetDiskSample, ProcessSnapshotEntry, SystemInfo};

/// One blocking sampling call. Owns whatever state it needs between calls.
pub type Job<T> = Box<dyn FnMut() -> T + Send + 'static>;

/// The set of families to drive. `None` disables a family.
#[derive(Default)]
pub struct Engine {
    /// Static SoC description attached to every report.
    pub system_info: Option<SystemInfo>,
    pub power: Option<Job<PowerReport>>,
    pub cpu: Option<Job<CpuReport>>,
    pub processes: Option<Job<Vec<ProcessSnapshotEntry>>>,
    pub thermal: Option<Job<ThermalReport>>,
    pub net_disk: Option<Job<NetDiskSample>>,
    pub memory: Option<Job<MemorySample>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_info(mut self, info: SystemInfo) -> Self {
        self.system_info = Some(info);
        self
    }

    pub fn with_power(mut self, job: impl FnMut() -> PowerReport + Send + 'static) -> Self {
        self.power = Some(Box::new(job));
        self
    }

    pub fn with_cpu(mut self, job: impl FnMut() -> CpuReport + Send + 'static) -> Self {
        self.cpu = Some(Box::new(job));
        self
    }

    pub fn with_processes(
        mut self,
        job: impl FnMut() -> Vec<ProcessSnapshotEntry> + Send + 'static,
    ) -> Self {
        self.processes = Some(Box::new(job));
        self
    }

    pub fn with_thermal(mut self, job: impl FnMut() -> ThermalReport + Send + 'static) -> Self {
        self.thermal = Some(Box::new(job));
        self
    }

    pub fn with_net_disk(mut self, job: impl FnMut() -> NetDiskSample + Send + 'static) -> Self {
        self.net_disk = Some(Box::new(job));
        self
    }

    pub fn with_memory(mut self, job: impl FnMut() -> MemorySample + Send + 'static) -> Self {
        self.memory = Some(Box::new(job));
        self
    }

    pub fn family_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.power.is_some() {
            names.push("power");
        }
        if self.cpu.is_some() {
            names.push("cpu");
        }
        if self.processes.is_some() {
            names.push("processes");
        }
        if self.thermal.is_some() {
            names.push("thermal");
        }
        if self.net_disk.is_some() {
            names.push("net_disk");
        }
        if self.memory.is_some() {
            names.push("memory");
        }
        names
    }
}

/// Running family task and the receiving end of its results.
struct Family<T> {
    latest: watch::Receiver<Option<T>>,
    handle: JoinHandle<()>,
}

impl<T: Clone> Family<T> {
    fn current(&self) -> Option<T> {
        self.latest.borrow().clone()
    }
}

fn spawn_family<T>(
    name: &'static str,
    mut job: Job<T>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> Family<T>
where
    T: Send + Sync + 'static,
{
    let (tx, rx) = watch::channel(None);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.changed() => break,
            }

            let result = tokio::task::spawn_blocking(move || {
                let value = job();
                (job, value)
            })
            .await;

            match result {
                Ok((returned, value)) => {
                    job = returned;
                    if tx.send(Some(value)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("{name} sampler stopped: {e}");
                    break;
                }
            }
        }
        tracing::debug!("{name} sampler finished");
    });

    Family { latest: rx, handle }
}

fn spawn_optional<T>(
    name: &'static str,
    job: Option<Job<T>>,
    period: Duration,
    stop: &watch::Receiver<bool>,
) -> Option<Family<T>>
where
    T: Send + Sync + 'static,
{
    job.map(|job| spawn_family(name, job, period, stop.clone()))
}

/// Resolves once the family has produced its first value, or at once when
/// the family is disabled or has stopped.
async fn first_value<T>(family: &mut Option<Family<T>>) {
    if let Some(family) = family {
        let _ = family.latest.wait_for(|value| value.is_some()).await;
    }
}

struct Families {
    system_info: Option<SystemInfo>,
    power: Option<Family<PowerReport>>,
    cpu: Option<Family<CpuReport>>,
    processes: Option<Family<Vec<ProcessSnapshotEntry>>>,
    thermal: Option<Family<ThermalReport>>,
    net_disk: Option<Family<NetDiskSample>>,
    memory: Option<Family<MemorySample>>,
}

impl Families {
    fn spawn(engine: Engine, period: Duration, stop: &watch::Receiver<bool>) -> Self {
        Self {
            system_info: engine.system_info,
            power: spawn_optional("power", engine.power, period, stop),
            cpu: spawn_optional("cpu", engine.cpu, period, stop),
            processes: spawn_optional("processes", engine.processes, period, stop),
            thermal: spawn_optional("thermal", engine.thermal, period, stop),
            net_disk: spawn_optional("net_disk", engine.net_disk, period, stop),
            memory: spawn_optional("memory", engine.memory, period, stop),
        }
    }

    async fn ready(&mut self) {
        first_value(&mut self.power).await;
        first_value(&mut self.cpu).await;
        first_value(&mut self.processes).await;
        first_value(&mut self.thermal).await;
        first_value(&mut self.net_disk).await;
        first_value(&mut self.memory).await;
    }

    fn snapshot(&self) -> Report {
        let mut report = Report::at(chrono::Utc::now());
        report.system_info = self.system_info.clone();
        report.power = self.power.as_ref().and_then(Family::current);
        report.cpu = self.cpu.as_ref().and_then(Family::current);
        report.processes = self.processes.as_ref().and_then(Family::current);
        report.thermal = self.thermal.as_ref().and_then(Family::current);
        report.net_disk = self.net_disk.as_ref().and_then(Family::current);
        report.memory = self.memory.as_ref().and_then(Family::current);
        report
    }

    async fn join(self) {
        let handles = [
            self.power.map(|f| f.handle),
            self.cpu.map(|f| f.handle),
            self.processes.map(|f| f.handle),
            self.thermal.map(|f| f.handle),
            self.net_disk.map(|f| f.handle),
            self.memory.map(|f| f.handle),
        ];
        for handle in handles.into_iter().flatten() {
            if let Err(e) = handle.await {
                tracing::warn!("Sampler task failed to join: {e}");
            }
        }
    }
}

/// Drive `engine` until `config.report_count` reports are written or
/// `shutdown` resolves. Returns the number of reports written.
///
/// Every family task is stopped and joined before returning, which drops
/// each sampler (and any native subscription it holds) exactly once.
pub async fn run<W, F>(
    engine: Engine,
    config: &SamplerConfig,
    pretty: bool,
    out: &mut W,
    shutdown: F,
) -> Result<usize>
where
    W: Write,
    F: Future<Output = ()>,
{
    let period = Duration::from_millis(config.interval_ms.max(1));
    tracing::info!(
        "Sampling {:?} every {}ms",
        engine.family_names(),
        config.interval_ms
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut families = Families::spawn(engine, period, &stop_rx);

    let mut written = 0usize;
    let outcome = tokio::select! {
        result = report_loop(&mut families, config, period, pretty, out, &mut written) => result,
        _ = shutdown => Ok(()),
    };

    let _ = stop_tx.send(true);
    families.join().await;
    tracing::info!("Stopped after {written} reports");

    outcome.map(|()| written)
}

async fn report_loop<W: Write>(
    families: &mut Families,
    config: &SamplerConfig,
    period: Duration,
    pretty: bool,
    out: &mut W,
    written: &mut usize,
) -> Result<()> {
    families.ready().await;

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let line = families.snapshot().to_json(pretty)?;
        writeln!(out, "{line}")?;
        out.flush()?;
        *written += 1;

        if config.report_count.is_some_and(|limit| *written >= limit) {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts live instances so tests can observe teardown.
    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(count: usize) -> SamplerConfig {
        SamplerConfig::new().interval(10).report_count(Some(count))
    }

    #[tokio::test]
    async fn test_writes_requested_number_of_reports() {
        let engine = Engine::new()
            .with_cpu(|| CpuReport::new(vec![25.0, 75.0]))
            .with_memory(|| MemorySample {
                total: 100,
                used: 40,
                ..Default::default()
            });

        let mut out = Vec::new();
        let written = run(engine, &config(3), false, &mut out, std::future::pending())
            .await
            .unwrap();

        assert_eq!(written, 3);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let json: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(json["cpu"]["usage_percent"], 50.0);
            assert_eq!(json["memory"]["used"], 40);
            assert!(json.get("power").is_none());
        }
    }

    #[tokio::test]
    async fn test_first_report_waits_for_every_family() {
        let slow_calls = Arc::new(AtomicUsize::new(0));
        let calls = slow_calls.clone();
        let engine = Engine::new()
            .with_cpu(|| CpuReport::new(vec![1.0]))
            .with_net_disk(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(50));
                NetDiskSample::default()
            });

        let mut out = Vec::new();
        run(engine, &config(1), false, &mut out, std::future::pending())
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert!(json.get("net_disk").is_some());
        assert!(json.get("cpu").is_some());
        assert!(slow_calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_shutdown_drops_samplers_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let guard = DropCounter(drops.clone());
        let engine = Engine::new().with_power(move || {
            let _held = &guard;
            PowerReport::new(Default::default(), 0.0)
        });

        let mut out = Vec::new();
        let config = SamplerConfig::new().interval(10);
        let shutdown = tokio::time::sleep(Duration::from_millis(60));
        run(engine, &config, false, &mut out, shutdown).await.unwrap();

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_engine_still_reports_timestamps() {
        let mut out = Vec::new();
        let written = run(Engine::new(), &config(2), false, &mut out, std::future::pending())
            .await
            .unwrap();
        assert_eq!(written, 2);

        let text = String::from_utf8(out).unwrap();
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert!(first["timestamp"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_system_info_on_every_report() {
        let info = SystemInfo {
            name: "Apple M1".to_string(),
            core_count: 8,
            e_core_count: 4,
            p_core_count: 4,
            gpu_core_count: 8,
        };
        let engine = Engine::new()
            .with_system_info(info)
            .with_cpu(|| CpuReport::new(vec![0.0]));

        let mut out = Vec::new();
        run(engine, &config(2), false, &mut out, std::future::pending())
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        for line in text.lines() {
            let json: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(json["system_info"]["name"], "Apple M1");
            assert_eq!(json["system_info"]["gpu_core_count"], 8);
        }
    }

    #[test]
    fn test_family_names() {
        let engine = Engine::new()
            .with_thermal(|| ThermalReport::from(crate::sampler::thermal::ThermalSnapshot {
                temperature: None,
                state: crate::sampler::types::ThermalState::Unknown,
            }))
            .with_memory(MemorySample::default);
        assert_eq!(engine.family_names(), vec!["thermal", "memory"]);
    }
}
