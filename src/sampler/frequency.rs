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

//! GPU frequency table discovery from `voltage-states*` property blobs.
//!
//! The power-manager device node (`pmgr`, or `clpc` on some machines)
//! carries one `voltage-states*` property per DVFS domain. Each blob is a
//! run of 8-byte records whose first 4 bytes are a little-endian frequency
//! in Hz. The GPU domain is not labelled, so it is picked by elimination.

use crate::common::config::AppConfig;

/// Property name that is authoritative for the GPU when present.
pub const PREFERRED_GPU_TABLE: &str = "voltage-states9-sram";
/// Prefix shared by all DVFS table properties.
pub const VOLTAGE_STATES_PREFIX: &str = "voltage-states";

/// Decode one blob into frequencies in MHz.
///
/// Records below the spurious threshold or above the ceiling are dropped.
/// A trailing partial record is ignored.
pub fn parse_voltage_states(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(AppConfig::FREQUENCY_RECORD_BYTES)
        .take(AppConfig::MAX_FREQUENCY_ENTRIES)
        .filter_map(|record| {
            let hz = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
            is_valid_frequency(hz).then_some(hz / 1_000_000)
        })
        .collect()
}

fn is_valid_frequency(hz: u32) -> bool {
    (AppConfig::SPURIOUS_FREQUENCY_HZ..=AppConfig::MAX_GPU_FREQUENCY_HZ).contains(&hz)
}

/// A blob is self-consistent when every non-zero record is a plausible
/// frequency. Tables that mix real values with junk belong to some other
/// encoding and are skipped.
pub fn is_self_consistent(bytes: &[u8]) -> bool {
    let mut any_valid = false;
    for record in bytes
        .chunks_exact(AppConfig::FREQUENCY_RECORD_BYTES)
        .take(AppConfig::MAX_FREQUENCY_ENTRIES)
    {
        let hz = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        if hz == 0 {
            continue;
        }
        if !is_valid_frequency(hz) {
            return false;
        }
        any_valid = true;
    }
    any_valid
}

/// Pick the GPU frequency table among all `voltage-states*` properties.
///
/// The SRAM table wins outright when it decodes to anything. Otherwise the
/// self-consistent candidate with the lowest maximum frequency is taken,
/// since GPU clocks sit below CPU clocks on every known part.
pub fn select_gpu_frequency_table<'a, I>(properties: I) -> Vec<u32>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut best: Vec<u32> = Vec::new();
    let mut best_max = u32::MAX;

    for (name, bytes) in properties {
        if !name.starts_with(VOLTAGE_STATES_PREFIX) {
            continue;
        }

        if name == PREFERRED_GPU_TABLE {
            let table = parse_voltage_states(bytes);
            if !table.is_empty() {
                return table;
            }
            continue;
        }

        if !is_self_consistent(bytes) {
            tracing::trace!("Skipping inconsistent frequency table {name}");
            continue;
        }

        let table = parse_voltage_states(bytes);
        let max = table.iter().copied().max().unwrap_or(0);
        if max > 0 && max < best_max {
            best_max = max;
            best = table;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(freqs_hz: &[u32]) -> Vec<u8> {
        freqs_hz
            .iter()
            .flat_map(|hz| {
                let mut record = hz.to_le_bytes().to_vec();
                record.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
                record
            })
            .collect()
    }

    #[test]
    fn test_parse_voltage_states() {
        let bytes = blob(&[0, 338_000_000, 618_000_000, 1_398_000_000]);
        assert_eq!(parse_voltage_states(&bytes), vec![338, 618, 1398]);
    }

    #[test]
    fn test_parse_drops_spurious_and_partial() {
        let mut bytes = blob(&[50_000_000, 444_000_000]);
        bytes.extend_from_slice(&[1, 2, 3]);
        assert_eq!(parse_voltage_states(&bytes), vec![444]);
        assert!(parse_voltage_states(&[]).is_empty());
    }

    #[test]
    fn test_self_consistency() {
        assert!(is_self_consistent(&blob(&[0, 400_000_000, 800_000_000])));
        assert!(!is_self_consistent(&blob(&[400_000_000, 12_345])));
        assert!(!is_self_consistent(&blob(&[0, 0])));
    }

    #[test]
    fn test_select_prefers_sram_table() {
        let cpu = blob(&[600_000_000, 3_200_000_000]);
        let gpu = blob(&[300_000_000, 500_000_000]);
        let sram = blob(&[389_000_000, 1_296_000_000]);
        let props: Vec<(&str, &[u8])> = vec![
            ("voltage-states1", &cpu),
            ("voltage-states5", &gpu),
            (PREFERRED_GPU_TABLE, &sram),
        ];
        assert_eq!(select_gpu_frequency_table(props), vec![389, 1296]);
    }

    #[test]
    fn test_select_lowest_max_consistent_table() {
        let cpu = blob(&[600_000_000, 3_200_000_000]);
        let gpu = blob(&[300_000_000, 1_100_000_000]);
        let junk = blob(&[150_000_000, 7]);
        let props: Vec<(&str, &[u8])> = vec![
            ("voltage-states1", &cpu),
            ("voltage-states9", &gpu),
            ("voltage-states13", &junk),
            ("compatible", &cpu),
        ];
        assert_eq!(select_gpu_frequency_table(props), vec![300, 1100]);
    }

    #[test]
    fn test_select_empty_when_nothing_matches() {
        let props: Vec<(&str, &[u8])> = vec![("model", b"pmgr")];
        assert!(select_gpu_frequency_table(props).is_empty());
    }
}
