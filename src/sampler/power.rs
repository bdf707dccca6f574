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

//! Windowed power and GPU activity sampling.
//!
//! [`PowerSampler`] owns at most one channel subscription. It is created
//! lazily on the first [`sample`](PowerSampler::sample) (or an explicit
//! [`initialize`](PowerSampler::initialize)) and lives until
//! [`cleanup`](PowerSampler::cleanup) or drop.
//!
//! Sampling blocks the calling thread for the whole window. Run it from a
//! dedicated blocking task so other metric families keep their cadence.

use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::sampler::source::{ChannelSource, ChannelSubscription};
use crate::sampler::types::PowerSample;

pub struct PowerSampler<S: ChannelSource> {
    source: S,
    subscription: Option<S::Subscription>,
    gpu_freq_table: Vec<u32>,
    init_failure_logged: bool,
}

impl<S: ChannelSource> PowerSampler<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            subscription: None,
            gpu_freq_table: Vec::new(),
            init_failure_logged: false,
        }
    }

    /// Subscribe to the energy and GPU groups. No-op when already done.
    pub fn initialize(&mut self) -> Result<()> {
        if self.subscription.is_some() {
            return Ok(());
        }

        let subscription = self.source.subscribe()?;
        if self.gpu_freq_table.is_empty() {
            self.gpu_freq_table = self.source.gpu_frequency_table();
            tracing::debug!(
                "GPU frequency table: {} states {:?}",
                self.gpu_freq_table.len(),
                self.gpu_freq_table
            );
        }
        self.subscription = Some(subscription);
        self.init_failure_logged = false;
        tracing::info!("Power sampling subscription established");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn gpu_frequency_table(&self) -> &[u32] {
        &self.gpu_freq_table
    }

    /// Capture, sleep `window_ms`, capture again and reduce the delta.
    ///
    /// Never fails: any problem yields a zeroed sample.
    pub fn sample(&mut self, window_ms: u64) -> PowerSample {
        if let Err(e) = self.initialize() {
            if !self.init_failure_logged {
                tracing::warn!("Power metrics unavailable: {e}");
                self.init_failure_logged = true;
            }
            return PowerSample::default();
        }

        let Some(subscription) = self.subscription.as_mut() else {
            return PowerSample::default();
        };

        let first = match subscription.capture() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::debug!("Power snapshot failed: {e}");
                return PowerSample::default();
            }
        };

        if window_ms > 0 {
            thread::sleep(Duration::from_millis(window_ms));
        }

        // `first` is dropped (and released) on every return below.
        let second = match subscription.capture() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::debug!("Power snapshot failed: {e}");
                return PowerSample::default();
            }
        };

        match subscription.delta(&first, &second) {
            Ok(readings) => {
                tracing::trace!("Power delta carried {} channels", readings.len());
                PowerSample::from_channels(&readings, window_ms, &self.gpu_freq_table)
            }
            Err(e) => {
                tracing::debug!("Power delta failed: {e}");
                PowerSample::default()
            }
        }
    }

    /// Take `count` consecutive windows and average them.
    pub fn sample_averaged(&mut self, window_ms: u64, count: usize) -> PowerSample {
        let count = count.max(1);
        if count == 1 {
            return self.sample(window_ms);
        }

        let samples: Vec<PowerSample> = (0..count).map(|_| self.sample(window_ms)).collect();
        PowerSample::average(&samples)
    }

    /// Release the subscription. Safe to call repeatedly; the next
    /// `sample` re-subscribes.
    pub fn cleanup(&mut self) {
        if self.subscription.take().is_some() {
            tracing::debug!("Power sampling subscription released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sampler::classifier::{ChannelReading, ChannelValue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Replays cumulative channel values, advancing one frame per capture.
    struct ScriptedSubscription {
        frames: Vec<Vec<ChannelReading>>,
        next: usize,
        live: Arc<AtomicUsize>,
    }

    impl Drop for ScriptedSubscription {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl ChannelSubscription for ScriptedSubscription {
        type Snapshot = Vec<ChannelReading>;

        fn capture(&mut self) -> Result<Self::Snapshot> {
            let frame = self
                .frames
                .get(self.next.min(self.frames.len().saturating_sub(1)))
                .cloned()
                .ok_or_else(|| Error::SourceUnavailable("no frames".to_string()))?;
            self.next += 1;
            Ok(frame)
        }

        fn delta(
            &mut self,
            previous: &Self::Snapshot,
            current: &Self::Snapshot,
        ) -> Result<Vec<ChannelReading>> {
            Ok(current
                .iter()
                .zip(previous)
                .map(|(cur, prev)| {
                    let value = match (&cur.value, &prev.value) {
                        (ChannelValue::Integer(c), ChannelValue::Integer(p)) => {
                            ChannelValue::Integer(c - p)
                        }
                        (ChannelValue::States(c), ChannelValue::States(p)) => ChannelValue::States(
                            c.iter()
                                .zip(p)
                                .map(|((name, cr), (_, pr))| (name.clone(), cr - pr))
                                .collect(),
                        ),
                        (other, _) => other.clone(),
                    };
                    ChannelReading {
                        value,
                        ..cur.clone()
                    }
                })
                .collect())
        }
    }

    struct ScriptedSource {
        frames: Option<Vec<Vec<ChannelReading>>>,
        subscribes: Arc<AtomicUsize>,
        live: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Vec<ChannelReading>>) -> Self {
            Self {
                frames: Some(frames),
                subscribes: Arc::new(AtomicUsize::new(0)),
                live: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn missing() -> Self {
            Self {
                frames: None,
                subscribes: Arc::new(AtomicUsize::new(0)),
                live: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ChannelSource for ScriptedSource {
        type Subscription = ScriptedSubscription;

        fn subscribe(&mut self) -> Result<Self::Subscription> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            let frames = self
                .frames
                .clone()
                .ok_or_else(|| Error::ChannelGroupNotFound("Energy Model".to_string()))?;
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptedSubscription {
                frames,
                next: 0,
                live: self.live.clone(),
            })
        }

        fn gpu_frequency_table(&mut self) -> Vec<u32> {
            vec![600, 1200, 1400]
        }
    }

    fn frame(cpu_mj: i64, off: i64, s1: i64, s2: i64) -> Vec<ChannelReading> {
        vec![
            ChannelReading::energy("CPU Energy", "mJ", cpu_mj),
            ChannelReading::energy("GPU Energy", "mJ", cpu_mj / 2),
            ChannelReading::gpu_states(&[("OFF", off), ("S1", s1), ("S2", s2)]),
        ]
    }

    #[test]
    fn test_identical_snapshots_yield_zero() {
        let f = frame(5_000, 1_000, 400, 400);
        let mut sampler = PowerSampler::new(ScriptedSource::new(vec![f.clone(), f]));

        let sample = sampler.sample(0);
        assert_eq!(sample, PowerSample::default());
    }

    #[test]
    fn test_delta_over_window() {
        let mut sampler = PowerSampler::new(ScriptedSource::new(vec![
            frame(1_000, 0, 0, 0),
            frame(1_500, 100, 50, 50),
        ]));

        let sample = sampler.sample(10);
        // 500 mJ over 10 ms
        assert!((sample.cpu_watts - 50.0).abs() < 1e-9);
        assert!((sample.gpu_watts - 25.0).abs() < 1e-9);
        assert!((sample.gpu_active_percent - 50.0).abs() < 1e-9);
        assert_eq!(sample.gpu_freq_mhz, 900);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let source = ScriptedSource::new(vec![frame(0, 0, 0, 0)]);
        let subscribes = source.subscribes.clone();
        let mut sampler = PowerSampler::new(source);

        sampler.initialize().unwrap();
        sampler.initialize().unwrap();
        sampler.sample(0);
        assert_eq!(subscribes.load(Ordering::SeqCst), 1);
        assert_eq!(sampler.gpu_frequency_table(), &[600, 1200, 1400]);
    }

    #[test]
    fn test_missing_group_surfaces_error_and_zeroes_samples() {
        let mut sampler = PowerSampler::new(ScriptedSource::missing());

        assert!(matches!(
            sampler.initialize(),
            Err(Error::ChannelGroupNotFound(_))
        ));
        assert_eq!(sampler.sample(0), PowerSample::default());
        assert!(!sampler.is_initialized());
    }

    #[test]
    fn test_cleanup_then_lazy_reinit() {
        let source = ScriptedSource::new(vec![frame(0, 0, 0, 0)]);
        let subscribes = source.subscribes.clone();
        let live = source.live.clone();
        let mut sampler = PowerSampler::new(source);

        sampler.sample(0);
        assert_eq!(live.load(Ordering::SeqCst), 1);

        sampler.cleanup();
        sampler.cleanup();
        assert!(!sampler.is_initialized());
        assert_eq!(live.load(Ordering::SeqCst), 0);

        sampler.sample(0);
        assert!(sampler.is_initialized());
        assert_eq!(subscribes.load(Ordering::SeqCst), 2);
        assert_eq!(live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sample_averaged() {
        let mut sampler = PowerSampler::new(ScriptedSource::new(vec![
            frame(0, 0, 0, 0),
            frame(100, 0, 0, 0),
            frame(100, 0, 0, 0),
            frame(400, 0, 0, 0),
        ]));

        // Windows: 100 mJ, then 300 mJ, each over 100 ms
        let avg = sampler.sample_averaged(100, 2);
        assert!((avg.cpu_watts - 2.0).abs() < 1e-9);
    }
}
