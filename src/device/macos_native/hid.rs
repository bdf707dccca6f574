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

//! HID event system thermal sensors.
//!
//! Apple Silicon exposes its die diodes as vendor-page HID services. Each
//! service carries a `Product` label and answers temperature events.
//!
//! ## References
//! - macmon project by vladkens
//! - freedomtan/sensors

use core_foundation::array::{CFArray, CFArrayRef};
use core_foundation::base::{kCFAllocatorDefault, CFAllocatorRef, CFRelease, CFType, TCFType};
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::string::{CFString, CFStringRef};
use std::ffi::c_void;

use crate::error::{Error, Result};
use crate::sampler::source::HidSensorSource;

const HID_PAGE_APPLE_VENDOR: i32 = 0xff00;
const HID_USAGE_APPLE_VENDOR_TEMPERATURE_SENSOR: i32 = 0x0005;
const HID_EVENT_TYPE_TEMPERATURE: i64 = 15;

type IOHIDEventSystemClientRef = *const c_void;
type IOHIDServiceClientRef = *const c_void;
type IOHIDEventRef = *const c_void;

#[link(name = "IOKit", kind = "framework")]
unsafe extern "C" {
    fn IOHIDEventSystemClientCreate(allocator: CFAllocatorRef) -> IOHIDEventSystemClientRef;
    fn IOHIDEventSystemClientSetMatching(
        client: IOHIDEventSystemClientRef,
        matching: CFDictionaryRef,
    ) -> i32;
    fn IOHIDEventSystemClientCopyServices(client: IOHIDEventSystemClientRef) -> CFArrayRef;
    fn IOHIDServiceClientCopyProperty(
        service: IOHIDServiceClientRef,
        key: CFStringRef,
    ) -> CFStringRef;
    fn IOHIDServiceClientCopyEvent(
        service: IOHIDServiceClientRef,
        event_type: i64,
        options: i32,
        timeout: i64,
    ) -> IOHIDEventRef;
    fn IOHIDEventGetFloatValue(event: IOHIDEventRef, field: i64) -> f64;
}

/// Enumerates vendor temperature services on every call.
pub struct HidThermalSensors {
    matching: CFDictionary<CFString, CFNumber>,
}

// SAFETY: the matching dictionary is immutable after construction.
unsafe impl Send for HidThermalSensors {}

impl Default for HidThermalSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl HidThermalSensors {
    pub fn new() -> Self {
        let matching = CFDictionary::from_CFType_pairs(&[
            (
                CFString::new("PrimaryUsagePage"),
                CFNumber::from(HID_PAGE_APPLE_VENDOR),
            ),
            (
                CFString::new("PrimaryUsage"),
                CFNumber::from(HID_USAGE_APPLE_VENDOR_TEMPERATURE_SENSOR),
            ),
        ]);
        Self { matching }
    }
}

impl HidSensorSource for HidThermalSensors {
    fn sensor_readings(&mut self) -> Result<Vec<(String, f64)>> {
        // SAFETY: the client and the copied services array are released
        // before return; per-service objects follow the copy rule.
        unsafe {
            let client = IOHIDEventSystemClientCreate(kCFAllocatorDefault);
            if client.is_null() {
                return Err(Error::SourceUnavailable(
                    "IOHIDEventSystemClientCreate returned null".to_string(),
                ));
            }

            IOHIDEventSystemClientSetMatching(client, self.matching.as_concrete_TypeRef());

            let services_ref = IOHIDEventSystemClientCopyServices(client);
            if services_ref.is_null() {
                CFRelease(client);
                return Err(Error::SourceUnavailable(
                    "no HID temperature services".to_string(),
                ));
            }
            let services = CFArray::<CFType>::wrap_under_create_rule(services_ref);
            let product_key = CFString::new("Product");

            let mut readings = Vec::new();
            for service in services.iter() {
                let service = service.as_CFTypeRef() as IOHIDServiceClientRef;
                if service.is_null() {
                    continue;
                }

                let label_ref =
                    IOHIDServiceClientCopyProperty(service, product_key.as_concrete_TypeRef());
                if label_ref.is_null() {
                    continue;
                }
                let label = CFString::wrap_under_create_rule(label_ref).to_string();

                let event =
                    IOHIDServiceClientCopyEvent(service, HID_EVENT_TYPE_TEMPERATURE, 0, 0);
                if event.is_null() {
                    continue;
                }
                let celsius = IOHIDEventGetFloatValue(event, HID_EVENT_TYPE_TEMPERATURE << 16);
                CFRelease(event);

                readings.push((label, celsius));
            }

            drop(services);
            CFRelease(client);
            Ok(readings)
        }
    }
}
