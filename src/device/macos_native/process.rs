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

//! Kernel process table via `sysctl(KERN_PROC_ALL)` and libproc.

use std::ffi::{c_void, CStr};
use std::mem;

use once_cell::sync::OnceCell;

use crate::error::{Error, Result};
use crate::sampler::source::{ProcessTableSource, RawProcess, TaskInfo, Timebase};
use crate::sampler::process::command_basename;
use crate::sampler::types::ProcessState;

// p_stat values from <sys/proc.h>
const SIDL: i8 = 1;
const SRUN: i8 = 2;
const SSLEEP: i8 = 3;
const SSTOP: i8 = 4;
const SZOMB: i8 = 5;

#[repr(C)]
#[derive(Default)]
struct MachTimebaseInfo {
    numer: u32,
    denom: u32,
}

unsafe extern "C" {
    fn mach_timebase_info(info: *mut MachTimebaseInfo) -> i32;
}

static TIMEBASE: OnceCell<Timebase> = OnceCell::new();

fn host_timebase() -> Timebase {
    *TIMEBASE.get_or_init(|| {
        let mut info = MachTimebaseInfo::default();
        // SAFETY: info is a valid out-pointer.
        let kr = unsafe { mach_timebase_info(&mut info) };
        if kr != 0 || info.denom == 0 {
            Timebase::IDENTITY
        } else {
            Timebase {
                numer: info.numer,
                denom: info.denom,
            }
        }
    })
}

fn state_from_stat(stat: i8) -> ProcessState {
    match stat {
        SIDL => ProcessState::Idle,
        SRUN => ProcessState::Running,
        SSLEEP => ProcessState::Sleeping,
        SSTOP => ProcessState::Stopped,
        SZOMB => ProcessState::Zombie,
        _ => ProcessState::Unknown,
    }
}

/// Extra records allocated beyond the probed size.
const PROC_HEADROOM: usize = 16;
const FETCH_ATTEMPTS: usize = 4;

/// Call `fetch` with a record capacity, growing it while the kernel
/// answers ENOMEM because the table grew between probe and fetch.
fn fetch_growing<T>(
    initial: usize,
    mut fetch: impl FnMut(usize) -> std::io::Result<T>,
) -> Result<T> {
    let mut capacity = initial;
    for attempt in 1..=FETCH_ATTEMPTS {
        match fetch(capacity) {
            Ok(value) => return Ok(value),
            Err(e) if e.raw_os_error() == Some(libc::ENOMEM) && attempt < FETCH_ATTEMPTS => {
                tracing::debug!("Process table outgrew {capacity} records, retrying");
                capacity = capacity + capacity / 4 + PROC_HEADROOM;
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Err(Error::Io(std::io::Error::from_raw_os_error(libc::ENOMEM)))
}

fn kinfo_procs() -> Result<Vec<libc::kinfo_proc>> {
    let mut mib = [libc::CTL_KERN, libc::KERN_PROC, libc::KERN_PROC_ALL];
    let mut size: libc::size_t = 0;

    // SAFETY: first call only reports the required size.
    let rc = unsafe {
        libc::sysctl(
            mib.as_mut_ptr(),
            mib.len() as u32,
            std::ptr::null_mut(),
            &mut size,
            std::ptr::null_mut(),
            0,
        )
    };
    if rc != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }

    let stride = mem::size_of::<libc::kinfo_proc>();
    fetch_growing(size / stride + PROC_HEADROOM, |capacity| {
        let mut procs: Vec<libc::kinfo_proc> = Vec::with_capacity(capacity);
        let mut size = capacity * stride;

        // SAFETY: the buffer holds `capacity` records and size reports its bytes.
        let rc = unsafe {
            libc::sysctl(
                mib.as_mut_ptr(),
                mib.len() as u32,
                procs.as_mut_ptr() as *mut c_void,
                &mut size,
                std::ptr::null_mut(),
                0,
            )
        };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }

        // SAFETY: the kernel wrote `size` bytes of whole records.
        unsafe { procs.set_len(size / stride) };
        Ok(procs)
    })
}

fn executable_name(pid: i32) -> Option<String> {
    let mut buf = vec![0u8; libc::PROC_PIDPATHINFO_MAXSIZE as usize];
    // SAFETY: buf is PROC_PIDPATHINFO_MAXSIZE bytes.
    let len = unsafe { libc::proc_pidpath(pid, buf.as_mut_ptr() as *mut c_void, buf.len() as u32) };
    if len <= 0 {
        return None;
    }
    let path = String::from_utf8_lossy(&buf[..len as usize]);
    let name = command_basename(&path);
    (!name.is_empty()).then(|| name.to_string())
}

fn task_info(pid: i32) -> Option<TaskInfo> {
    // SAFETY: proc_taskinfo is plain integers; all-zero is valid.
    let mut info: libc::proc_taskinfo = unsafe { mem::zeroed() };
    let expected = mem::size_of::<libc::proc_taskinfo>() as i32;
    // SAFETY: info is a valid proc_taskinfo-sized buffer.
    let ret = unsafe {
        libc::proc_pidinfo(
            pid,
            libc::PROC_PIDTASKINFO,
            0,
            &mut info as *mut libc::proc_taskinfo as *mut c_void,
            expected,
        )
    };
    if ret != expected {
        return None;
    }
    Some(TaskInfo {
        resident_bytes: info.pti_resident_size,
        virtual_bytes: info.pti_virtual_size,
        total_ticks: info.pti_total_user.saturating_add(info.pti_total_system),
    })
}

/// Live process table. Holds no state between calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibprocTable;

impl ProcessTableSource for LibprocTable {
    fn processes(&mut self) -> Result<Vec<RawProcess>> {
        let procs = kinfo_procs()?;
        Ok(procs
            .iter()
            .map(|kp| {
                let pid = kp.kp_proc.p_pid;
                // SAFETY: p_comm is NUL-terminated by the kernel.
                let comm = unsafe { CStr::from_ptr(kp.kp_proc.p_comm.as_ptr()) }
                    .to_string_lossy()
                    .into_owned();
                RawProcess {
                    pid: pid.max(0) as u32,
                    uid: kp.kp_eproc.e_ucred.cr_uid,
                    state: state_from_stat(kp.kp_proc.p_stat as i8),
                    command: executable_name(pid).unwrap_or(comm),
                    task: task_info(pid),
                }
            })
            .collect())
    }

    fn total_memory_bytes(&mut self) -> u64 {
        let mut memsize: u64 = 0;
        let mut len = mem::size_of::<u64>();
        // SAFETY: memsize is a u64 out-buffer of len bytes.
        let rc = unsafe {
            libc::sysctlbyname(
                c"hw.memsize".as_ptr(),
                &mut memsize as *mut u64 as *mut c_void,
                &mut len,
                std::ptr::null_mut(),
                0,
            )
        };
        if rc == 0 {
            memsize
        } else {
            0
        }
    }

    fn timebase(&self) -> Timebase {
        host_timebase()
    }

    fn user_name(&self, uid: u32) -> Option<String> {
        // SAFETY: getpwuid returns a pointer into static storage or null;
        // the name is copied out immediately. Calls are serialized by the
        // name cache's write lock.
        unsafe {
            let pwd = libc::getpwuid(uid);
            if pwd.is_null() || (*pwd).pw_name.is_null() {
                return None;
            }
            Some(CStr::from_ptr((*pwd).pw_name).to_string_lossy().into_owned())
        }
    }
}
