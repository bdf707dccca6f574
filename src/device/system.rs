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

//! Portable network and disk counters backed by `sysinfo`.

use sysinfo::{Disks, Networks};

use crate::sampler::netdisk::{NetDiskCounterSource, NetDiskTotals};

/// Sums cumulative counters over every interface and disk.
pub struct SysinfoCounters {
    networks: Networks,
    disks: Disks,
}

impl Default for SysinfoCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoCounters {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl NetDiskCounterSource for SysinfoCounters {
    fn totals(&mut self) -> NetDiskTotals {
        self.networks.refresh(true);
        self.disks.refresh(true);

        let mut totals = NetDiskTotals::default();
        for (_name, data) in self.networks.iter() {
            totals.bytes_in = totals.bytes_in.saturating_add(data.total_received());
            totals.bytes_out = totals.bytes_out.saturating_add(data.total_transmitted());
            totals.packets_in = totals
                .packets_in
                .saturating_add(data.total_packets_received());
            totals.packets_out = totals
                .packets_out
                .saturating_add(data.total_packets_transmitted());
        }
        for disk in self.disks.list() {
            let usage = disk.usage();
            totals.bytes_read = totals.bytes_read.saturating_add(usage.total_read_bytes);
            totals.bytes_written = totals
                .bytes_written
                .saturating_add(usage.total_written_bytes);
        }
        totals
    }
}
