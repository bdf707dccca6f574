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

//! Per-core CPU utilization from cumulative tick counters.

use crate::sampler::delta::{counter_delta, percent_of};
use crate::sampler::source::TickSource;
use crate::sampler::types::{CoreTickSnapshot, CoreTicks};

/// Percent busy for one core between two tick readings.
pub fn core_usage(previous: &CoreTicks, current: &CoreTicks) -> f64 {
    let user = counter_delta(previous.user, current.user);
    let system = counter_delta(previous.system, current.system);
    let idle = counter_delta(previous.idle, current.idle);
    let nice = counter_delta(previous.nice, current.nice);

    let active = user.saturating_add(system).saturating_add(nice);
    let total = active.saturating_add(idle);
    percent_of(active as f64, total as f64)
}

/// Per-core percentages between two snapshots.
///
/// The result always has the length of `current`. Cores with no
/// counterpart in `previous` report zero until the next cycle.
pub fn compute_usage(previous: &[CoreTicks], current: &[CoreTicks]) -> Vec<f64> {
    current
        .iter()
        .enumerate()
        .map(|(i, cur)| previous.get(i).map_or(0.0, |prev| core_usage(prev, cur)))
        .collect()
}

/// Mean of per-core percentages, zero for an empty slice.
pub fn overall_usage(per_core: &[f64]) -> f64 {
    if per_core.is_empty() {
        return 0.0;
    }
    per_core.iter().sum::<f64>() / per_core.len() as f64
}

/// Holds the previous tick snapshot between calls.
pub struct CpuUsageTracker<S: TickSource> {
    source: S,
    previous: Option<CoreTickSnapshot>,
}

impl<S: TickSource> CpuUsageTracker<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            previous: None,
        }
    }

    /// Utilization per logical core since the previous call.
    ///
    /// The first call after construction or [`reset`](Self::reset) only
    /// primes the tracker and returns zeros. A failed read returns an
    /// empty vector and keeps the stored snapshot.
    pub fn usage_percentages(&mut self) -> Vec<f64> {
        let current = match self.source.core_ticks() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::debug!("Core tick read failed: {e}");
                return Vec::new();
            }
        };

        let usage = match &self.previous {
            Some(previous) => {
                if previous.len() != current.len() {
                    tracing::debug!(
                        "Core count changed from {} to {}",
                        previous.len(),
                        current.len()
                    );
                }
                compute_usage(previous, &current)
            }
            None => vec![0.0; current.len()],
        };

        self.previous = Some(current);
        usage
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use std::collections::VecDeque;

    struct QueuedTicks(VecDeque<Result<CoreTickSnapshot>>);

    impl TickSource for QueuedTicks {
        fn core_ticks(&mut self) -> Result<CoreTickSnapshot> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(Error::SourceUnavailable("drained".to_string())))
        }
    }

    fn ticks(user: u64, system: u64, idle: u64, nice: u64) -> CoreTicks {
        CoreTicks::new(user, system, idle, nice)
    }

    #[test]
    fn test_core_usage() {
        let a = ticks(100, 50, 800, 50);
        let b = ticks(150, 70, 850, 80);
        // user 50, system 20, nice 30 busy against 50 idle
        let usage = core_usage(&a, &b);
        assert!((usage - 100.0 / 150.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_equal_snapshots_are_zero() {
        let snap = vec![ticks(10, 20, 30, 40), ticks(1, 2, 3, 4)];
        assert_eq!(compute_usage(&snap, &snap), vec![0.0, 0.0]);
    }

    #[test]
    fn test_usage_bounded() {
        let a = vec![ticks(0, 0, 0, 0), ticks(500, 0, 0, 0)];
        let b = vec![ticks(1000, 0, 0, 0), ticks(100, 0, 50, 0)];
        for pct in compute_usage(&a, &b) {
            assert!((0.0..=100.0).contains(&pct));
        }
        // Second core went backwards except idle: all idle
        assert_eq!(compute_usage(&a, &b)[1], 0.0);
    }

    #[test]
    fn test_core_count_change() {
        let a = vec![ticks(0, 0, 0, 0)];
        let b = vec![ticks(50, 0, 50, 0), ticks(10, 0, 10, 0)];
        assert_eq!(compute_usage(&a, &b), vec![50.0, 0.0]);
        assert_eq!(compute_usage(&b, &a), vec![0.0]);
    }

    #[test]
    fn test_first_call_primes_with_zeros() {
        let source = QueuedTicks(VecDeque::from(vec![
            Ok(vec![ticks(100, 100, 100, 0); 4]),
            Ok(vec![ticks(150, 100, 150, 0); 4]),
        ]));
        let mut tracker = CpuUsageTracker::new(source);

        assert_eq!(tracker.usage_percentages(), vec![0.0; 4]);
        assert!(tracker.has_baseline());

        let usage = tracker.usage_percentages();
        assert_eq!(usage.len(), 4);
        assert!(usage.iter().all(|u| (u - 50.0).abs() < 1e-9));
    }

    #[test]
    fn test_reset_forgets_baseline() {
        let source = QueuedTicks(VecDeque::from(vec![
            Ok(vec![ticks(0, 0, 0, 0); 2]),
            Ok(vec![ticks(999, 999, 1, 0); 2]),
        ]));
        let mut tracker = CpuUsageTracker::new(source);

        tracker.usage_percentages();
        tracker.reset();
        assert_eq!(tracker.usage_percentages(), vec![0.0; 2]);
    }

    #[test]
    fn test_failed_read_keeps_baseline() {
        let source = QueuedTicks(VecDeque::from(vec![
            Ok(vec![ticks(0, 0, 0, 0)]),
            Err(Error::SourceUnavailable("host_processor_info".to_string())),
            Ok(vec![ticks(25, 0, 75, 0)]),
        ]));
        let mut tracker = CpuUsageTracker::new(source);

        tracker.usage_percentages();
        assert!(tracker.usage_percentages().is_empty());
        assert_eq!(tracker.usage_percentages(), vec![25.0]);
    }

    #[test]
    fn test_overall_usage() {
        assert_eq!(overall_usage(&[]), 0.0);
        assert!((overall_usage(&[10.0, 30.0]) - 20.0).abs() < 1e-9);
    }
}
