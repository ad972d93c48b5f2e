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

//! Typed sweep records.
//!
//! A data file holds one row per LO step. Each row carries the first seven
//! conversions of each of the three ADC boards; concatenated in board order
//! they give one code per filter channel.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::adc::{self, AdcCode, VoltageVector};
use crate::CHANNEL_COUNT;

/// Number of ADC boards in the instrument.
pub const DEVICE_COUNT: usize = 3;

/// Conversions used from each board per row.
pub const CODES_PER_DEVICE: usize = 7;

/// Raw conversions from the three ADC boards for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSample {
    devices: [[AdcCode; CODES_PER_DEVICE]; DEVICE_COUNT],
}

impl RawSample {
    #[must_use]
    pub fn new(devices: [[AdcCode; CODES_PER_DEVICE]; DEVICE_COUNT]) -> Self {
        Self { devices }
    }

    /// Build from the per-board arrays as stored in a file.
    ///
    /// Each array must hold at least seven codes; anything past the seventh
    /// is ignored. Returns `None` when a board is short.
    #[must_use]
    pub fn from_device_slices(adc1: &[AdcCode], adc2: &[AdcCode], adc3: &[AdcCode]) -> Option<Self> {
        let take = |codes: &[AdcCode]| -> Option<[AdcCode; CODES_PER_DEVICE]> {
            codes.get(..CODES_PER_DEVICE)?.try_into().ok()
        };

        Some(Self {
            devices: [take(adc1)?, take(adc2)?, take(adc3)?],
        })
    }

    /// All codes in channel order (board 1, then 2, then 3).
    #[must_use]
    pub fn combined(&self) -> [AdcCode; CHANNEL_COUNT] {
        let mut codes = [0; CHANNEL_COUNT];
        for (chunk, device) in codes.chunks_exact_mut(CODES_PER_DEVICE).zip(&self.devices) {
            chunk.copy_from_slice(device);
        }
        codes
    }

    /// Decode every channel to a detector voltage.
    #[must_use]
    pub fn voltages(&self, reference_voltage: f64) -> VoltageVector {
        adc::decode_all(&self.combined(), reference_voltage)
    }
}

/// One row of a sweep file: a single LO step across all channels.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRecord {
    pub raw: RawSample,
    /// LO frequency in MHz, truncated toward zero.
    pub lo_freq_mhz: f64,
    pub timestamp: String,
    pub state: String,
}

impl SweepRecord {
    #[must_use]
    pub fn new(raw: RawSample, lo_freq_mhz: f64, timestamp: String, state: String) -> Self {
        Self {
            raw,
            lo_freq_mhz: lo_freq_mhz.trunc(),
            timestamp,
            state,
        }
    }
}

/// Every row read from one data or reference file.
#[derive(Debug, Clone)]
pub struct SweepFile {
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
    /// System supply voltage recorded in the file header.
    pub sys_voltage: f64,
    pub rows: Vec<SweepRecord>,
}

impl SweepFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, sys_voltage: f64, rows: Vec<SweepRecord>) -> Self {
        Self {
            path: path.into(),
            modified: None,
            sys_voltage,
            rows,
        }
    }

    #[must_use]
    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name of the file, for display.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row whose LO frequency is nearest to `target_mhz`, with its distance.
    ///
    /// The first row wins when several are equally close. Rows whose
    /// distance is not finite are ignored.
    #[must_use]
    pub fn closest_row(&self, target_mhz: f64) -> Option<(&SweepRecord, f64)> {
        let mut best: Option<(&SweepRecord, f64)> = None;
        for row in &self.rows {
            let distance = (row.lo_freq_mhz - target_mhz).abs();
            if !distance.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((row, distance));
            }
        }
        best
    }
}
