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

//! Network and disk throughput from cumulative counters.
//!
//! Structurally the same as the tick delta, except the sampler may be
//! shared between tasks, so the previous totals and their timestamp sit
//! behind one mutex. The lock covers only the swap, never the counter read.

use std::sync::Mutex;
use std::time::Instant;

use crate::sampler::delta::{counter_delta, rate_per_second};
use crate::sampler::types::NetDiskSample;

/// Cumulative byte and packet counters summed over all interfaces/disks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NetDiskTotals {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub packets_in: u64,
    pub packets_out: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

pub trait NetDiskCounterSource: Send {
    fn totals(&mut self) -> NetDiskTotals;
}

/// Rates between two totals. A non-positive interval counts as one second.
pub fn compute_rates(
    previous: &NetDiskTotals,
    current: &NetDiskTotals,
    elapsed_secs: f64,
) -> NetDiskSample {
    let secs = if elapsed_secs > 0.0 && elapsed_secs.is_finite() {
        elapsed_secs
    } else {
        1.0
    };
    let rate = |prev: u64, cur: u64| rate_per_second(counter_delta(prev, cur) as f64, secs);

    NetDiskSample {
        in_bytes_per_sec: rate(previous.bytes_in, current.bytes_in),
        out_bytes_per_sec: rate(previous.bytes_out, current.bytes_out),
        in_packets_per_sec: rate(previous.packets_in, current.packets_in),
        out_packets_per_sec: rate(previous.packets_out, current.packets_out),
        read_bytes_per_sec: rate(previous.bytes_read, current.bytes_read),
        write_bytes_per_sec: rate(previous.bytes_written, current.bytes_written),
    }
}

pub struct NetDiskSampler<C: NetDiskCounterSource> {
    counters: Mutex<C>,
    previous: Mutex<Option<(NetDiskTotals, Instant)>>,
}

impl<C: NetDiskCounterSource> NetDiskSampler<C> {
    pub fn new(counters: C) -> Self {
        Self {
            counters: Mutex::new(counters),
            previous: Mutex::new(None),
        }
    }

    pub fn sample(&self) -> NetDiskSample {
        self.sample_at(Instant::now())
    }

    /// Rates since the previous call; zeros on the first.
    pub fn sample_at(&self, now: Instant) -> NetDiskSample {
        let current = match self.counters.lock() {
            Ok(mut counters) => counters.totals(),
            Err(_) => return NetDiskSample::default(),
        };

        let Ok(mut previous) = self.previous.lock() else {
            return NetDiskSample::default();
        };
        let last = previous.replace((current, now));
        drop(previous);

        match last {
            Some((totals, at)) => {
                let elapsed = now
                    .checked_duration_since(at)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                compute_rates(&totals, &current, elapsed)
            }
            None => NetDiskSample::default(),
        }
    }
}
