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

//! Thermal state monitoring for macOS
//!
//! Reads `NSProcessInfo.thermalState`, the coarse thermal-pressure level
//! the OS uses to decide on throttling.
//!
//! ## References
//! - Apple Developer Documentation: NSProcessInfo.thermalState

use std::ffi::c_void;

use crate::sampler::source::ThermalStateSource;
use crate::sampler::types::ThermalState;

// Objective-C runtime linkage
#[link(name = "objc", kind = "dylib")]
unsafe extern "C" {
    fn objc_getClass(name: *const i8) -> *mut c_void;
    fn sel_registerName(name: *const i8) -> *mut c_void;
    fn objc_msgSend(receiver: *mut c_void, selector: *mut c_void, ...) -> *mut c_void;
}

// NSProcessInfo lives in Foundation
#[link(name = "Foundation", kind = "framework")]
unsafe extern "C" {}

/// Current thermal state, or `Unknown` if the runtime lookup fails.
pub fn current_thermal_state() -> ThermalState {
    // SAFETY: message sends to the NSProcessInfo singleton, each result
    // null-checked before use.
    unsafe {
        let class = objc_getClass(c"NSProcessInfo".as_ptr());
        if class.is_null() {
            return ThermalState::Unknown;
        }

        let process_info_sel = sel_registerName(c"processInfo".as_ptr());
        if process_info_sel.is_null() {
            return ThermalState::Unknown;
        }

        let process_info = objc_msgSend(class, process_info_sel);
        if process_info.is_null() {
            return ThermalState::Unknown;
        }

        let thermal_state_sel = sel_registerName(c"thermalState".as_ptr());
        if thermal_state_sel.is_null() {
            return ThermalState::Unknown;
        }

        let state = objc_msgSend(process_info, thermal_state_sel) as i64;
        ThermalState::from_raw(state)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessInfoThermalState;

impl ThermalStateSource for ProcessInfoThermalState {
    fn thermal_state(&self) -> ThermalState {
        current_thermal_state()
    }
}
