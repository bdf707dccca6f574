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

//! Named sysctl reads and the SoC description built from them.

use std::ffi::{c_void, CString};
use std::process::Command;

use crate::sampler::system_info::{assemble_system_info, gpu_cores_from_profiler};
use crate::sampler::types::SystemInfo;

fn sysctl_raw(name: &str, buf: *mut c_void, len: &mut libc::size_t) -> bool {
    let Ok(name) = CString::new(name) else {
        return false;
    };
    // SAFETY: buf is either null (size probe) or valid for `len` bytes.
    let rc = unsafe { libc::sysctlbyname(name.as_ptr(), buf, len, std::ptr::null_mut(), 0) };
    rc == 0
}

pub fn sysctl_string(name: &str) -> Option<String> {
    let mut len: libc::size_t = 0;
    if !sysctl_raw(name, std::ptr::null_mut(), &mut len) || len == 0 {
        return None;
    }
    let mut buf = vec![0u8; len];
    if !sysctl_raw(name, buf.as_mut_ptr() as *mut c_void, &mut len) {
        return None;
    }
    buf.truncate(len);
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Some(String::from_utf8_lossy(&buf[..end]).into_owned())
}

pub fn sysctl_u32(name: &str) -> Option<u32> {
    let mut value: i32 = 0;
    let mut len = std::mem::size_of::<i32>();
    if !sysctl_raw(name, &mut value as *mut i32 as *mut c_void, &mut len) {
        return None;
    }
    u32::try_from(value).ok()
}

fn gpu_core_count() -> Option<u32> {
    let output = Command::new("system_profiler")
        .args(["SPDisplaysDataType", "-json"])
        .output();
    match output {
        Ok(output) if output.status.success() => {
            gpu_cores_from_profiler(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            tracing::debug!("system_profiler exited with {}", output.status);
            None
        }
        Err(e) => {
            tracing::debug!("system_profiler unavailable: {e}");
            None
        }
    }
}

/// Read the SoC description. Unreadable values come back as zero.
pub fn read_system_info() -> SystemInfo {
    let info = assemble_system_info(
        sysctl_string("machdep.cpu.brand_string"),
        sysctl_u32("machdep.cpu.core_count"),
        sysctl_u32("hw.perflevel0.logicalcpu"),
        sysctl_u32("hw.perflevel1.logicalcpu"),
        gpu_core_count(),
    );
    tracing::info!(
        "{}: {} cores ({}P + {}E), {} GPU cores",
        info.name,
        info.core_count,
        info.p_core_count,
        info.e_core_count,
        info.gpu_core_count
    );
    info
}
