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

//! Delta arithmetic shared by every rate the engine reports.
//!
//! Two rules hold everywhere: never divide by a non-positive interval,
//! and never report a negative delta.

/// Difference between two readings of a cumulative counter.
///
/// A counter that went backwards (wrap, reboot, reset) yields zero.
#[inline]
pub fn counter_delta(previous: u64, current: u64) -> u64 {
    current.saturating_sub(previous)
}

/// Signed variant for counters the platform exposes as `i64`.
#[inline]
pub fn signed_delta(previous: i64, current: i64) -> u64 {
    current.saturating_sub(previous).max(0) as u64
}

/// `amount / seconds`, or zero when the interval is not positive.
#[inline]
pub fn rate_per_second(amount: f64, seconds: f64) -> f64 {
    if seconds <= 0.0 || !seconds.is_finite() || amount <= 0.0 || !amount.is_finite() {
        return 0.0;
    }
    amount / seconds
}

/// `part / whole * 100`, clamped to `[0, 100]`; zero when `whole` is
/// not positive.
#[inline]
pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 || !whole.is_finite() || !part.is_finite() {
        return 0.0;
    }
    clamp_percent(part / whole * 100.0)
}

#[inline]
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}
