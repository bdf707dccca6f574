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

//! AppleSMC user-client connection.
//!
//! Only the transport lives here. Key encoding and the two-step read are
//! in [`crate::sampler::smc`].

use std::ffi::c_void;

use crate::error::{Error, Result};
use crate::sampler::smc::{KeyData, SmcTransport, KERNEL_INDEX_SMC};

#[link(name = "IOKit", kind = "framework")]
unsafe extern "C" {
    fn mach_task_self() -> u32;
    fn IOServiceMatching(name: *const i8) -> *mut c_void;
    fn IOServiceGetMatchingService(master_port: u32, matching: *mut c_void) -> u32;
    fn IOServiceOpen(device: u32, owning_task: u32, conn_type: u32, conn: *mut u32) -> i32;
    fn IOServiceClose(conn: u32) -> i32;
    fn IOObjectRelease(object: u32) -> i32;
    fn IOConnectCallStructMethod(
        conn: u32,
        selector: u32,
        input: *const c_void,
        input_size: usize,
        output: *mut c_void,
        output_size: *mut usize,
    ) -> i32;
}

/// Open connection to the AppleSMC service. Closed on drop.
pub struct IoKitSmc {
    conn: u32,
}

impl IoKitSmc {
    pub fn open() -> Result<Self> {
        // SAFETY: plain IOKit calls; the service object is released below.
        unsafe {
            let matching = IOServiceMatching(c"AppleSMC".as_ptr());
            if matching.is_null() {
                return Err(Error::PlatformInit(
                    "failed to create AppleSMC matching dictionary".to_string(),
                ));
            }

            let device = IOServiceGetMatchingService(0, matching);
            if device == 0 {
                return Err(Error::NotSupported("AppleSMC service not found".to_string()));
            }

            let mut conn: u32 = 0;
            let result = IOServiceOpen(device, mach_task_self(), 0, &mut conn);
            IOObjectRelease(device);

            if result != 0 {
                return Err(Error::PlatformInit(format!(
                    "IOServiceOpen(AppleSMC) failed: {result:#x}"
                )));
            }

            Ok(Self { conn })
        }
    }
}

impl SmcTransport for IoKitSmc {
    fn call(&mut self, input: &KeyData) -> Result<KeyData> {
        let mut output = KeyData::default();
        let mut output_size = std::mem::size_of::<KeyData>();

        // SAFETY: input and output are valid KeyData-sized buffers.
        let result = unsafe {
            IOConnectCallStructMethod(
                self.conn,
                KERNEL_INDEX_SMC,
                input as *const KeyData as *const c_void,
                std::mem::size_of::<KeyData>(),
                &mut output as *mut KeyData as *mut c_void,
                &mut output_size,
            )
        };

        if result != 0 {
            return Err(Error::SourceUnavailable(format!(
                "SMC call failed: {result:#x}"
            )));
        }
        Ok(output)
    }
}

impl Drop for IoKitSmc {
    fn drop(&mut self) {
        // SAFETY: conn was opened by us and is closed exactly once.
        unsafe {
            IOServiceClose(self.conn);
        }
    }
}

// SAFETY: an io_connect_t may be used from any thread.
unsafe impl Send for IoKitSmc {}
