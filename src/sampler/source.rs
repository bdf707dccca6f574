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

//! Counter source adapters.
//!
//! Each trait wraps one privileged platform interface and returns raw
//! snapshots or scalars. None of them computes a rate; that is the job of
//! the samplers in this module's siblings. Native implementations live in
//! `device::macos_native`, tests use in-memory fakes.

use crate::error::Result;
use crate::sampler::classifier::ChannelReading;
use crate::sampler::types::{CoreTickSnapshot, ProcessState, ThermalReading, ThermalState};

/// Opens subscriptions to the energy and GPU channel groups.
pub trait ChannelSource: Send {
    type Subscription: ChannelSubscription;

    /// Discover the channel groups and subscribe to them.
    ///
    /// Must fail with [`Error::ChannelGroupNotFound`](crate::Error::ChannelGroupNotFound)
    /// when the energy group is absent. A missing GPU group is not an error.
    fn subscribe(&mut self) -> Result<Self::Subscription>;

    /// GPU discrete frequency table in MHz, ascending. Empty when unknown.
    fn gpu_frequency_table(&mut self) -> Vec<u32>;
}

/// A live subscription that produces point-in-time snapshots.
///
/// Dropping the subscription releases the native handle. Snapshots are
/// owned values and release their native storage on drop as well.
pub trait ChannelSubscription: Send {
    type Snapshot;

    fn capture(&mut self) -> Result<Self::Snapshot>;

    /// Decode `current - previous` into a flat channel list.
    fn delta(&mut self, previous: &Self::Snapshot, current: &Self::Snapshot)
        -> Result<Vec<ChannelReading>>;
}

/// Per-core cumulative tick counters.
pub trait TickSource: Send {
    fn core_ticks(&mut self) -> Result<CoreTickSnapshot>;
}

/// Numerator/denominator pair converting platform ticks to nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timebase {
    pub numer: u32,
    pub denom: u32,
}

impl Timebase {
    pub const IDENTITY: Timebase = Timebase { numer: 1, denom: 1 };

    pub fn ticks_to_nanos(&self, ticks: u64) -> u64 {
        let denom = self.denom.max(1) as u128;
        let nanos = ticks as u128 * self.numer as u128 / denom;
        nanos.min(u64::MAX as u128) as u64
    }
}

impl Default for Timebase {
    fn default() -> Self {
        Timebase::IDENTITY
    }
}

/// Task-level accounting for one process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
    /// User plus system time, in platform ticks.
    pub total_ticks: u64,
}

/// One row of the raw process table before any delta math.
#[derive(Debug, Clone, PartialEq)]
pub struct RawProcess {
    pub pid: u32,
    pub uid: u32,
    pub state: ProcessState,
    pub command: String,
    /// `None` when the task query was refused (other users' processes
    /// without privileges, or a process that exited mid-enumeration).
    pub task: Option<TaskInfo>,
}

/// Whole-system process table.
pub trait ProcessTableSource: Send {
    fn processes(&mut self) -> Result<Vec<RawProcess>>;

    fn total_memory_bytes(&mut self) -> u64;

    fn timebase(&self) -> Timebase;

    /// Resolve a numeric user id. `None` falls back to the number.
    fn user_name(&self, uid: u32) -> Option<String>;
}

/// One candidate in the temperature fallback chain.
pub trait TemperatureSource: Send {
    fn name(&self) -> &'static str;

    /// A plausible reading, or `None` to fall through to the next source.
    fn read(&mut self) -> Option<ThermalReading>;
}

/// HID thermal sensor enumeration: `(product label, celsius)` pairs.
pub trait HidSensorSource: Send {
    fn sensor_readings(&mut self) -> Result<Vec<(String, f64)>>;
}

/// OS thermal-pressure level.
pub trait ThermalStateSource: Send {
    fn thermal_state(&self) -> ThermalState;
}
