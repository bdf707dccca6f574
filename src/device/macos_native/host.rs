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

//! Per-core tick counters via `host_processor_info`.

#![allow(deprecated)]

use libc::{
    c_int, host_processor_info, mach_host_self, mach_msg_type_number_t, natural_t,
    processor_info_array_t, PROCESSOR_CPU_LOAD_INFO,
};

use crate::error::{Error, Result};
use crate::sampler::source::TickSource;
use crate::sampler::types::{CoreTickSnapshot, CoreTicks};

const CPU_STATE_USER: isize = 0;
const CPU_STATE_SYSTEM: isize = 1;
const CPU_STATE_IDLE: isize = 2;
const CPU_STATE_NICE: isize = 3;
const CPU_STATE_MAX: isize = 4;

unsafe extern "C" {
    fn vm_deallocate(target_task: u32, address: usize, size: usize) -> c_int;
    fn mach_task_self() -> u32;
}

/// Releases the kernel-allocated info array on drop.
struct ProcessorInfo {
    data: processor_info_array_t,
    count: mach_msg_type_number_t,
}

impl Drop for ProcessorInfo {
    fn drop(&mut self) {
        // SAFETY: data was allocated by host_processor_info for this task.
        unsafe {
            vm_deallocate(
                mach_task_self(),
                self.data as usize,
                self.count as usize * std::mem::size_of::<c_int>(),
            );
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HostTicks;

impl TickSource for HostTicks {
    fn core_ticks(&mut self) -> Result<CoreTickSnapshot> {
        let mut num_cpus: natural_t = 0;
        let mut data: processor_info_array_t = std::ptr::null_mut();
        let mut count: mach_msg_type_number_t = 0;

        // SAFETY: out-pointers are valid; the returned array is wrapped
        // immediately so it is freed on every path.
        unsafe {
            let kr = host_processor_info(
                mach_host_self(),
                PROCESSOR_CPU_LOAD_INFO as c_int,
                &mut num_cpus,
                &mut data,
                &mut count,
            );
            if kr != 0 || data.is_null() {
                return Err(Error::SourceUnavailable(format!(
                    "host_processor_info failed: {kr}"
                )));
            }

            let info = ProcessorInfo { data, count };
            let available = info.count as isize / CPU_STATE_MAX;
            let cores = (num_cpus as isize).min(available);

            Ok((0..cores)
                .map(|cpu| {
                    let base = info.data.offset(cpu * CPU_STATE_MAX);
                    CoreTicks::new(
                        *base.offset(CPU_STATE_USER) as u32 as u64,
                        *base.offset(CPU_STATE_SYSTEM) as u32 as u64,
                        *base.offset(CPU_STATE_IDLE) as u32 as u64,
                        *base.offset(CPU_STATE_NICE) as u32 as u64,
                    )
                })
                .collect())
        }
    }
}
