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

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use crate::sampler::delta::percent_of;
use crate::sampler::types::MemorySample;

impl MemorySample {
    pub fn used_percent(&self) -> f64 {
        percent_of(self.used as f64, self.total as f64)
    }

    pub fn swap_used_percent(&self) -> f64 {
        percent_of(self.swap_used as f64, self.swap_total as f64)
    }
}

/// System memory occupancy via sysinfo.
pub struct MemorySampler {
    system: System,
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()),
        );
        Self { system }
    }

    pub fn sample(&mut self) -> MemorySample {
        self.system.refresh_memory();
        MemorySample {
            total: self.system.total_memory(),
            used: self.system.used_memory(),
            available: self.system.available_memory(),
            swap_total: self.system.total_swap(),
            swap_used: self.system.used_swap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentages() {
        let sample = MemorySample {
            total: 16,
            used: 4,
            available: 12,
            swap_total: 0,
            swap_used: 0,
        };
        assert!((sample.used_percent() - 25.0).abs() < 1e-9);
        assert_eq!(sample.swap_used_percent(), 0.0);
    }

    #[test]
    fn test_live_sample_is_consistent() {
        let sample = MemorySampler::new().sample();
        assert!(sample.used <= sample.total || sample.total == 0);
        assert!(sample.swap_used <= sample.swap_total || sample.swap_total == 0);
    }
}
