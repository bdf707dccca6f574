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

//! Apple SMC key protocol.
//!
//! The SMC user client exchanges one fixed-size [`KeyData`] structure per
//! call. Reading a key takes two calls: `READ_KEY_INFO` returns the size
//! and type, then `READ_BYTES` returns the payload. Only the `flt ` type
//! is decoded; anything else reads as zero.
//!
//! ## Keys used here
//! - `PSTR`: whole-system power in watts
//! - `Tp09`, `Tp01`, `TC0P`, ...: SoC temperature in °C, model dependent

use crate::common::config::AppConfig;
use crate::error::{Error, Result};
use crate::sampler::source::TemperatureSource;
use crate::sampler::types::{SourceConfidence, ThermalReading};

/// Selector of the SMC struct method on the user client.
pub const KERNEL_INDEX_SMC: u32 = 2;

pub const SMC_CMD_READ_BYTES: u8 = 5;
pub const SMC_CMD_READ_KEY_INFO: u8 = 9;

/// `flt ` packed big-endian (1718383648).
pub const SMC_TYPE_FLT: u32 = u32::from_be_bytes(*b"flt ");

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyInfo {
    pub data_size: u32,
    pub data_type: u32,
    pub data_attributes: u8,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyDataVer {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
    pub reserved: u8,
    pub release: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PLimitData {
    pub version: u16,
    pub length: u16,
    pub cpu_p_limit: u32,
    pub gpu_p_limit: u32,
    pub mem_p_limit: u32,
}

/// Wire structure shared with the kernel for every SMC call.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyData {
    pub key: u32,
    pub vers: KeyDataVer,
    pub p_limit_data: PLimitData,
    pub key_info: KeyInfo,
    pub result: u8,
    pub status: u8,
    pub data8: u8,
    pub data32: u32,
    pub bytes: [u8; 32],
}

/// Pack a four character key big-endian. `None` unless exactly 4 bytes.
pub fn fourcc(key: &str) -> Option<u32> {
    let bytes: [u8; 4] = key.as_bytes().try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Decode a payload according to its reported type.
///
/// Only `flt ` is understood: the first four bytes as a big-endian
/// IEEE-754 single.
pub fn decode_value(data_type: u32, bytes: &[u8; 32]) -> f64 {
    if data_type != SMC_TYPE_FLT {
        return 0.0;
    }
    f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
}

/// One struct-method round trip to the SMC.
pub trait SmcTransport: Send {
    fn call(&mut self, input: &KeyData) -> Result<KeyData>;
}

/// A key's metadata and raw payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmcValue {
    pub info: KeyInfo,
    pub bytes: [u8; 32],
}

impl SmcValue {
    pub fn as_f64(&self) -> f64 {
        decode_value(self.info.data_type, &self.bytes)
    }

    pub fn is_float(&self) -> bool {
        self.info.data_type == SMC_TYPE_FLT
    }
}

pub struct SmcClient<T: SmcTransport> {
    transport: T,
}

impl<T: SmcTransport> SmcClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    fn encode_key(key: &str) -> Result<u32> {
        fourcc(key).ok_or_else(|| Error::Decode(format!("SMC key must be 4 bytes: {key:?}")))
    }

    pub fn read_key_info(&mut self, key: &str) -> Result<KeyInfo> {
        let input = KeyData {
            key: Self::encode_key(key)?,
            data8: SMC_CMD_READ_KEY_INFO,
            ..Default::default()
        };
        Ok(self.transport.call(&input)?.key_info)
    }

    /// Two-step read: metadata, then bytes sized by that metadata.
    pub fn read_key(&mut self, key: &str) -> Result<SmcValue> {
        let info = self.read_key_info(key)?;
        let input = KeyData {
            key: Self::encode_key(key)?,
            key_info: KeyInfo {
                data_size: info.data_size,
                ..Default::default()
            },
            data8: SMC_CMD_READ_BYTES,
            ..Default::default()
        };
        let output = self.transport.call(&input)?;
        Ok(SmcValue {
            info,
            bytes: output.bytes,
        })
    }

    /// Float value of `key`, or `None` when unreadable or not a float.
    pub fn read_float(&mut self, key: &str) -> Option<f64> {
        match self.read_key(key) {
            Ok(value) if value.is_float() => Some(value.as_f64()),
            Ok(value) => {
                tracing::trace!(
                    "SMC key {key} has type {:#010x}, not a float",
                    value.info.data_type
                );
                None
            }
            Err(e) => {
                tracing::trace!("SMC key {key} unreadable: {e}");
                None
            }
        }
    }

    /// Whole-system power in watts. Zero on any failure.
    pub fn system_power(&mut self) -> f64 {
        self.read_key(AppConfig::SYSTEM_POWER_KEY)
            .map(|value| value.as_f64())
            .unwrap_or(0.0)
    }
}

/// First plausible float among an ordered list of SMC temperature keys.
pub struct SmcTemperatureSource<T: SmcTransport> {
    client: SmcClient<T>,
    keys: Vec<String>,
}

impl<T: SmcTransport> SmcTemperatureSource<T> {
    pub fn new(client: SmcClient<T>, keys: Vec<String>) -> Self {
        Self { client, keys }
    }
}

impl<T: SmcTransport> TemperatureSource for SmcTemperatureSource<T> {
    fn name(&self) -> &'static str {
        "smc"
    }

    fn read(&mut self) -> Option<ThermalReading> {
        for key in &self.keys {
            let Some(celsius) = self.client.read_float(key) else {
                continue;
            };
            if celsius > AppConfig::MIN_PLAUSIBLE_CELSIUS
                && celsius <= AppConfig::MAX_PLAUSIBLE_CELSIUS
            {
                return Some(ThermalReading {
                    celsius,
                    confidence: SourceConfidence::EmbeddedController,
                });
            }
        }
        None
    }
}

/// Transport for machines without an SMC. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSmc;

impl SmcTransport for NoSmc {
    fn call(&mut self, _input: &KeyData) -> Result<KeyData> {
        Err(Error::NotSupported("AppleSMC".to_string()))
    }
}
