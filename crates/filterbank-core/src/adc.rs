// Copyright 2025 Chris Custine
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

//! ADC register decoding.
//!
//! The ADHAT boards report each conversion as a 32-bit register value where
//! bit 31 selects between two fixed-point branches. Codes may arrive wider
//! than 32 bits (the container stores them as 64-bit integers), so the sign
//! branch is chosen by testing bit 31 rather than by truncating.

use crate::CHANNEL_COUNT;

/// A raw ADC register value.
pub type AdcCode = i64;

/// Detector voltages for all 21 channels, in channel-index order.
pub type VoltageVector = [f64; CHANNEL_COUNT];

/// Reference voltage of the deployed converter boards.
pub const DEFAULT_REFERENCE_VOLTAGE: f64 = 5.0;

const SIGN_BIT: u32 = 31;
const NEGATIVE_FULL_SCALE: f64 = 2_147_483_648.0; // 2^31
const POSITIVE_FULL_SCALE: f64 = 2_147_483_647.0; // 2^31 - 1

/// Convert one ADC code to a voltage.
///
/// `decode(2^31 - 1)` and `decode(2^31)` both land exactly on the reference
/// voltage, so the two branches meet without a discontinuity.
#[must_use]
pub fn decode(code: AdcCode, reference_voltage: f64) -> f64 {
    let msb = (code >> SIGN_BIT) & 1;
    let value = code as f64;

    if msb == 1 {
        reference_voltage * 2.0 - value / NEGATIVE_FULL_SCALE * reference_voltage
    } else {
        value / POSITIVE_FULL_SCALE * reference_voltage
    }
}

/// Decode a full set of combined channel codes.
#[must_use]
pub fn decode_all(codes: &[AdcCode; CHANNEL_COUNT], reference_voltage: f64) -> VoltageVector {
    codes.map(|code| decode(code, reference_voltage))
}
