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

//! Live process list with per-process CPU percent.
//!
//! The kernel only exposes cumulative task time, so each listing is
//! compared against the previous one. The tracker keeps nothing but
//! `pid -> (cpu time, timestamp)` between cycles and replaces that map
//! wholesale every time, so exited processes vanish without bookkeeping.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use once_cell::sync::OnceCell;

use crate::common::config::AppConfig;
use crate::sampler::delta::{counter_delta, percent_of};
use crate::sampler::source::{ProcessTableSource, RawProcess, Timebase};
use crate::sampler::types::ProcessSnapshotEntry;

/// What survives from one cycle to the next for a single pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessCpuState {
    pub cpu_time_nanos: u64,
    pub observed_at: Instant,
}

/// Memoized uid to user-name resolution.
///
/// Never evicts: the set of distinct uids on a machine is small.
#[derive(Debug, Default)]
pub struct UserNameCache {
    names: RwLock<HashMap<u32, String>>,
}

impl UserNameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `uid`, calling `resolve` only on a miss. Unresolvable ids
    /// are cached as their decimal form.
    pub fn get_or_resolve<F>(&self, uid: u32, resolve: F) -> String
    where
        F: FnOnce(u32) -> Option<String>,
    {
        if let Ok(names) = self.names.read() {
            if let Some(name) = names.get(&uid) {
                return name.clone();
            }
        }

        let Ok(mut names) = self.names.write() else {
            return resolve(uid).unwrap_or_else(|| uid.to_string());
        };

        // Another caller may have filled it between the two locks
        if let Some(name) = names.get(&uid) {
            return name.clone();
        }

        let name = resolve(uid).unwrap_or_else(|| uid.to_string());
        names.insert(uid, name.clone());
        name
    }

    pub fn len(&self) -> usize {
        self.names.read().map(|names| names.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Last path component of an executable path; the input when there is none.
pub fn command_basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or(path)
}

/// CPU percent from two cumulative readings. Zero unless both the task
/// time and the wall time moved forward.
pub fn process_cpu_percent(previous: &ProcessCpuState, cpu_time_nanos: u64, now: Instant) -> f64 {
    let cpu_delta = counter_delta(previous.cpu_time_nanos, cpu_time_nanos);
    let wall_delta = now
        .checked_duration_since(previous.observed_at)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    if cpu_delta == 0 || wall_delta == 0 {
        return 0.0;
    }
    cpu_delta as f64 / wall_delta as f64 * 100.0
}

pub struct ProcessTracker<S: ProcessTableSource> {
    source: S,
    previous: HashMap<u32, ProcessCpuState>,
    users: UserNameCache,
    timebase: OnceCell<Timebase>,
    max_processes: usize,
}

impl<S: ProcessTableSource> ProcessTracker<S> {
    pub fn new(source: S) -> Self {
        Self::with_limit(source, AppConfig::DEFAULT_MAX_PROCESSES)
    }

    pub fn with_limit(source: S, max_processes: usize) -> Self {
        Self {
            source,
            previous: HashMap::new(),
            users: UserNameCache::new(),
            timebase: OnceCell::new(),
            max_processes,
        }
    }

    /// Enumerate the process table, highest CPU first, capped at the
    /// configured limit.
    pub fn list_processes(&mut self) -> Vec<ProcessSnapshotEntry> {
        self.refresh_at(Instant::now())
    }

    /// [`list_processes`](Self::list_processes) with an explicit clock.
    ///
    /// A failed enumeration returns an empty list and keeps the previous
    /// cache so the next good cycle still has a baseline.
    pub fn refresh_at(&mut self, now: Instant) -> Vec<ProcessSnapshotEntry> {
        let raw = match self.source.processes() {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!("Process enumeration failed: {e}");
                return Vec::new();
            }
        };

        let total_memory = self.source.total_memory_bytes();
        let timebase = *self.timebase.get_or_init(|| self.source.timebase());

        let mut next = HashMap::with_capacity(raw.len());
        let mut entries = Vec::with_capacity(raw.len());

        for process in raw {
            if process.pid == 0 {
                continue;
            }
            let task_known = process.task.is_some();
            let entry = self.build_entry(process, timebase, total_memory, now);
            // A refused task query reads as zero time; caching it would turn
            // the next successful read into a lifetime-sized delta.
            if task_known {
                next.insert(
                    entry.pid,
                    ProcessCpuState {
                        cpu_time_nanos: entry.cumulative_cpu_time_nanos,
                        observed_at: now,
                    },
                );
            }
            entries.push(entry);
        }

        self.previous = next;

        entries.sort_by(|a, b| {
            b.cpu_percent
                .partial_cmp(&a.cpu_percent)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries.truncate(self.max_processes);
        entries
    }

    fn build_entry(
        &self,
        process: RawProcess,
        timebase: Timebase,
        total_memory: u64,
        now: Instant,
    ) -> ProcessSnapshotEntry {
        let task = process.task.unwrap_or_default();
        let cpu_time_nanos = timebase.ticks_to_nanos(task.total_ticks);

        let cpu_percent = self
            .previous
            .get(&process.pid)
            .map_or(0.0, |prev| process_cpu_percent(prev, cpu_time_nanos, now));
        let memory_percent = percent_of(task.resident_bytes as f64, total_memory as f64);
        let user = self
            .users
            .get_or_resolve(process.uid, |uid| self.source.user_name(uid));

        ProcessSnapshotEntry {
            pid: process.pid,
            user,
            cpu_percent,
            memory_percent,
            cumulative_cpu_time_nanos: cpu_time_nanos,
            resident_bytes: task.resident_bytes,
            virtual_bytes: task.virtual_bytes,
            state: process.state,
            command: process.command,
        }
    }

    /// Number of pids carried into the next cycle.
    pub fn cache_len(&self) -> usize {
        self.previous.len()
    }

    pub fn cached_state(&self, pid: u32) -> Option<ProcessCpuState> {
        self.previous.get(&pid).copied()
    }

    pub fn user_cache(&self) -> &UserNameCache {
        &self.users
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}
