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

//! IOReport API bindings for macOS
//!
//! This module provides FFI bindings to Apple's private IOReport framework,
//! which exposes the energy model and GPU residency counters on Apple Silicon.
//!
//! ## Channel Groups
//! - `Energy Model`: Power consumption (CPU, GPU, ANE, DRAM, GPU SRAM)
//! - `GPU Stats` / `GPU Performance States`: GPU residency per DVFS state
//!
//! ## References
//! - macmon project by vladkens
//! - OSXPrivateSDK IOReport.h

use core_foundation::array::{CFArray, CFArrayRef};
use core_foundation::base::{kCFAllocatorDefault, CFRelease, CFRetain, CFType, CFTypeRef, TCFType};
use core_foundation::data::{CFData, CFDataRef};
use core_foundation::dictionary::{
    CFDictionary, CFDictionaryCreateMutableCopy, CFDictionaryGetCount,
    CFDictionaryGetKeysAndValues, CFDictionaryRef, CFMutableDictionaryRef,
};
use core_foundation::string::{CFString, CFStringRef};
use std::ffi::c_void;
use std::marker::{PhantomData, PhantomPinned};
use std::ptr;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::sampler::classifier::{
    ChannelReading, ChannelValue, ENERGY_MODEL_GROUP, GPU_PERF_STATES_SUBGROUP, GPU_STATS_GROUP,
};
use crate::sampler::frequency::{select_gpu_frequency_table, VOLTAGE_STATES_PREFIX};
use crate::sampler::source::{ChannelSource, ChannelSubscription};

/// Static CFStringRef constants for the subscribed channel groups.
/// Created once and retained for the lifetime of the process so the
/// pointers handed to IOReport never dangle.
struct GroupNames {
    energy_model: CFStringRef,
    gpu_stats: CFStringRef,
    gpu_perf_states: CFStringRef,
}

// SAFETY: CFStrings are immutable and retained forever; read-only sharing is sound.
unsafe impl Send for GroupNames {}
unsafe impl Sync for GroupNames {}

fn retained_cfstring(value: &str) -> CFStringRef {
    let s = CFString::new(value);
    let ptr = s.as_concrete_TypeRef();
    // SAFETY: ptr is a live CFString; the extra retain outlives `s`.
    unsafe { CFRetain(ptr as *const c_void) };
    ptr
}

static GROUP_NAMES: OnceLock<GroupNames> = OnceLock::new();

fn group_names() -> &'static GroupNames {
    GROUP_NAMES.get_or_init(|| GroupNames {
        energy_model: retained_cfstring(ENERGY_MODEL_GROUP),
        gpu_stats: retained_cfstring(GPU_STATS_GROUP),
        gpu_perf_states: retained_cfstring(GPU_PERF_STATES_SUBGROUP),
    })
}

/// Opaque IOReport subscription reference
#[repr(C)]
struct IOReportSubscription {
    _data: [u8; 0],
    _phantom: PhantomData<(*mut u8, PhantomPinned)>,
}

type IOReportSubscriptionRef = *const IOReportSubscription;

#[link(name = "IOReport", kind = "dylib")]
unsafe extern "C" {
    fn IOReportCopyChannelsInGroup(
        group: CFStringRef,
        subgroup: CFStringRef,
        a: u64,
        b: u64,
        c: u64,
    ) -> CFDictionaryRef;

    fn IOReportMergeChannels(a: CFDictionaryRef, b: CFDictionaryRef, nil: CFTypeRef);

    fn IOReportCreateSubscription(
        a: *const c_void,
        desired_channels: CFMutableDictionaryRef,
        subscribed_channels: *mut CFMutableDictionaryRef,
        channel_id: u64,
        b: CFTypeRef,
    ) -> IOReportSubscriptionRef;

    fn IOReportCreateSamples(
        subscription: IOReportSubscriptionRef,
        channels: CFMutableDictionaryRef,
        a: CFTypeRef,
    ) -> CFDictionaryRef;

    fn IOReportCreateSamplesDelta(
        prev: CFDictionaryRef,
        curr: CFDictionaryRef,
        a: CFTypeRef,
    ) -> CFDictionaryRef;

    fn IOReportChannelGetGroup(channel: CFDictionaryRef) -> CFStringRef;
    fn IOReportChannelGetSubGroup(channel: CFDictionaryRef) -> CFStringRef;
    fn IOReportChannelGetChannelName(channel: CFDictionaryRef) -> CFStringRef;
    fn IOReportChannelGetUnitLabel(channel: CFDictionaryRef) -> CFStringRef;
    fn IOReportSimpleGetIntegerValue(channel: CFDictionaryRef, a: i32) -> i64;
    fn IOReportStateGetCount(channel: CFDictionaryRef) -> i32;
    fn IOReportStateGetNameForIndex(channel: CFDictionaryRef, index: i32) -> CFStringRef;
    fn IOReportStateGetResidency(channel: CFDictionaryRef, index: i32) -> i64;
}

// IOKit FFI declarations for GPU frequency discovery
#[link(name = "IOKit", kind = "framework")]
unsafe extern "C" {
    fn IOServiceMatching(name: *const i8) -> *mut c_void;
    fn IOServiceGetMatchingServices(
        master_port: u32,
        matching: *mut c_void,
        existing: *mut u32,
    ) -> i32;
    fn IOIteratorNext(iterator: u32) -> u32;
    fn IORegistryEntryGetName(entry: u32, name: *mut i8) -> i32;
    fn IORegistryEntryCreateCFProperties(
        entry: u32,
        properties: *mut CFMutableDictionaryRef,
        allocator: *const c_void,
        options: u32,
    ) -> i32;
    fn IOObjectRelease(object: u32) -> i32;
}

fn cfstr_to_string(cfstr: CFStringRef) -> Option<String> {
    if cfstr.is_null() {
        return None;
    }
    // SAFETY: non-null CFStringRef obtained under the get rule.
    unsafe { Some(CFString::wrap_under_get_rule(cfstr).to_string()) }
}

/// An owned CF dictionary returned by a `Create`/`Copy` call.
///
/// Released exactly once on drop, which covers every early return.
pub struct OwnedSample(CFDictionaryRef);

impl OwnedSample {
    fn from_create(raw: CFDictionaryRef, what: &str) -> Result<Self> {
        if raw.is_null() {
            return Err(Error::SourceUnavailable(what.to_string()));
        }
        Ok(Self(raw))
    }

    fn as_raw(&self) -> CFDictionaryRef {
        self.0
    }
}

impl Drop for OwnedSample {
    fn drop(&mut self) {
        // SAFETY: self.0 is non-null and owned (create rule).
        unsafe { CFRelease(self.0 as *const c_void) };
    }
}

/// Channel dictionaries under the `IOReportChannels` key.
fn sample_channels(sample: &OwnedSample) -> Vec<CFDictionaryRef> {
    // SAFETY: the sample outlives the borrowed dictionaries returned here.
    unsafe {
        let dict = CFDictionary::<CFType, CFType>::wrap_under_get_rule(sample.as_raw());
        let key = CFString::new("IOReportChannels");
        let Some(channels) = dict.find(key.as_CFType().as_CFTypeRef()) else {
            return vec![];
        };

        let arr_ref = channels.as_CFTypeRef() as CFArrayRef;
        if arr_ref.is_null() {
            return vec![];
        }

        let arr = CFArray::<CFType>::wrap_under_get_rule(arr_ref);
        (0..arr.len())
            .filter_map(|i| arr.get(i).map(|v| v.as_CFTypeRef() as CFDictionaryRef))
            .filter(|d| !d.is_null())
            .collect()
    }
}

fn decode_channel(item: CFDictionaryRef) -> ChannelReading {
    // SAFETY: item is a live channel dictionary borrowed from the delta.
    unsafe {
        let group = cfstr_to_string(IOReportChannelGetGroup(item)).unwrap_or_default();
        let subgroup = cfstr_to_string(IOReportChannelGetSubGroup(item)).unwrap_or_default();
        let channel = cfstr_to_string(IOReportChannelGetChannelName(item)).unwrap_or_default();
        let unit = cfstr_to_string(IOReportChannelGetUnitLabel(item)).unwrap_or_default();

        let value = if group == GPU_STATS_GROUP {
            let count = IOReportStateGetCount(item);
            ChannelValue::States(
                (0..count)
                    .filter_map(|i| {
                        let name = cfstr_to_string(IOReportStateGetNameForIndex(item, i))?;
                        Some((name, IOReportStateGetResidency(item, i)))
                    })
                    .collect(),
            )
        } else {
            ChannelValue::Integer(IOReportSimpleGetIntegerValue(item, 0))
        };

        ChannelReading {
            group,
            subgroup,
            channel,
            unit,
            value,
        }
    }
}

/// A live IOReport subscription over the merged channel set.
pub struct IOReportSubscriptionHandle {
    subscription: IOReportSubscriptionRef,
    channels: CFMutableDictionaryRef,
}

// SAFETY: the handle is only used from one thread at a time (&mut self).
unsafe impl Send for IOReportSubscriptionHandle {}

impl IOReportSubscriptionHandle {
    fn new() -> Result<Self> {
        let names = group_names();

        // SAFETY: all CF objects below are released on every path.
        unsafe {
            let energy = IOReportCopyChannelsInGroup(names.energy_model, ptr::null(), 0, 0, 0);
            if energy.is_null() {
                return Err(Error::ChannelGroupNotFound(ENERGY_MODEL_GROUP.to_string()));
            }

            let gpu = IOReportCopyChannelsInGroup(names.gpu_stats, names.gpu_perf_states, 0, 0, 0);
            if gpu.is_null() {
                tracing::info!("GPU performance state channels not found; GPU activity disabled");
            } else {
                IOReportMergeChannels(energy, gpu, ptr::null());
                CFRelease(gpu as *const c_void);
            }

            let count = CFDictionaryGetCount(energy);
            let channels = CFDictionaryCreateMutableCopy(kCFAllocatorDefault, count, energy);
            CFRelease(energy as *const c_void);

            if channels.is_null() {
                return Err(Error::PlatformInit(
                    "failed to copy IOReport channel dictionary".to_string(),
                ));
            }

            let mut subscribed: CFMutableDictionaryRef = ptr::null_mut();
            let subscription =
                IOReportCreateSubscription(ptr::null(), channels, &mut subscribed, 0, ptr::null());

            if subscription.is_null() {
                CFRelease(channels as *const c_void);
                return Err(Error::PlatformInit(
                    "IOReportCreateSubscription returned null".to_string(),
                ));
            }

            Ok(Self {
                subscription,
                channels,
            })
        }
    }
}

impl ChannelSubscription for IOReportSubscriptionHandle {
    type Snapshot = OwnedSample;

    fn capture(&mut self) -> Result<OwnedSample> {
        // SAFETY: subscription and channels stay valid until drop.
        let raw = unsafe { IOReportCreateSamples(self.subscription, self.channels, ptr::null()) };
        OwnedSample::from_create(raw, "IOReportCreateSamples")
    }

    fn delta(&mut self, previous: &OwnedSample, current: &OwnedSample) -> Result<Vec<ChannelReading>> {
        // SAFETY: both snapshots are live owned samples.
        let raw = unsafe {
            IOReportCreateSamplesDelta(previous.as_raw(), current.as_raw(), ptr::null())
        };
        let delta = OwnedSample::from_create(raw, "IOReportCreateSamplesDelta")?;

        Ok(sample_channels(&delta)
            .into_iter()
            .map(decode_channel)
            .collect())
    }
}

impl Drop for IOReportSubscriptionHandle {
    fn drop(&mut self) {
        // SAFETY: both were created by us and are released exactly once.
        unsafe {
            if !self.channels.is_null() {
                CFRelease(self.channels as *const c_void);
            }
            if !self.subscription.is_null() {
                CFRelease(self.subscription as *const c_void);
            }
        }
    }
}

/// IOReport-backed [`ChannelSource`].
#[derive(Debug, Default)]
pub struct IOReportSource;

impl IOReportSource {
    pub fn new() -> Self {
        Self
    }
}

impl ChannelSource for IOReportSource {
    type Subscription = IOReportSubscriptionHandle;

    fn subscribe(&mut self) -> Result<IOReportSubscriptionHandle> {
        IOReportSubscriptionHandle::new()
    }

    fn gpu_frequency_table(&mut self) -> Vec<u32> {
        load_gpu_frequencies()
    }
}

/// Read the `voltage-states*` blobs of the pmgr (or clpc) device and pick
/// the GPU table among them.
fn load_gpu_frequencies() -> Vec<u32> {
    // SAFETY: every IOKit object obtained here is released before return.
    unsafe {
        let matching = IOServiceMatching(c"AppleARMIODevice".as_ptr());
        if matching.is_null() {
            return vec![];
        }

        let mut iterator: u32 = 0;
        // kIOMainPortDefault is 0
        if IOServiceGetMatchingServices(0, matching, &mut iterator) != 0 {
            return vec![];
        }

        let mut frequencies: Vec<u32> = vec![];
        let mut entry = IOIteratorNext(iterator);

        while entry != 0 {
            let mut name_buf = [0i8; 128];
            IORegistryEntryGetName(entry, name_buf.as_mut_ptr());
            let name = std::ffi::CStr::from_ptr(name_buf.as_ptr())
                .to_str()
                .unwrap_or("");

            if name == "pmgr" || name == "clpc" {
                let mut properties: CFMutableDictionaryRef = ptr::null_mut();
                if IORegistryEntryCreateCFProperties(entry, &mut properties, ptr::null(), 0) == 0
                    && !properties.is_null()
                {
                    frequencies = frequencies_from_properties(properties);
                    CFRelease(properties as *const c_void);
                }
            }

            IOObjectRelease(entry);
            if !frequencies.is_empty() {
                break;
            }
            entry = IOIteratorNext(iterator);
        }

        IOObjectRelease(iterator);
        frequencies
    }
}

fn frequencies_from_properties(properties: CFMutableDictionaryRef) -> Vec<u32> {
    // SAFETY: keys and values are borrowed from `properties`, which the
    // caller keeps alive for the duration of this call.
    unsafe {
        let count = CFDictionaryGetCount(properties) as usize;
        if count == 0 {
            return vec![];
        }

        let mut keys: Vec<*const c_void> = vec![ptr::null(); count];
        let mut values: Vec<*const c_void> = vec![ptr::null(); count];
        CFDictionaryGetKeysAndValues(properties, keys.as_mut_ptr(), values.as_mut_ptr());

        let blobs: Vec<(String, Vec<u8>)> = keys
            .iter()
            .zip(&values)
            .filter_map(|(key, value)| {
                let name = cfstr_to_string(*key as CFStringRef)?;
                if !name.starts_with(VOLTAGE_STATES_PREFIX) || value.is_null() {
                    return None;
                }
                let data = CFData::wrap_under_get_rule(*value as CFDataRef);
                Some((name, data.bytes().to_vec()))
            })
            .collect();

        select_gpu_frequency_table(blobs.iter().map(|(n, b)| (n.as_str(), b.as_slice())))
    }
}
