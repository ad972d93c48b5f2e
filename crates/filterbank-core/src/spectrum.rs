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

//! Spectrum processing.
//!
//! Turns the rows of one sweep file into calibrated power points. Every row
//! contributes 21 points, one per filter, placed on an absolute frequency
//! axis obtained by shifting the filter centers by that row's LO frequency.
//!
//! Channels without a calibration fall back to a single global linear law
//! and are flagged so the presentation layer can mark them.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationSet;
use crate::sweep::{SweepFile, SweepRecord};
use crate::{center_frequency, CHANNEL_COUNT};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `power = slope * voltage + intercept`, used for uncalibrated channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearLaw {
    pub slope: f64,
    pub intercept: f64,
}

impl Default for LinearLaw {
    fn default() -> Self {
        Self {
            slope: -43.5,
            intercept: 24.98,
        }
    }
}

impl LinearLaw {
    #[must_use]
    pub fn apply(&self, voltage: f64) -> f64 {
        self.slope * voltage + self.intercept
    }
}

/// One channel's reading from one row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpectrumPoint {
    pub frequency_mhz: f64,
    pub voltage: f64,
    pub power_dbm: f64,
    pub channel: usize,
    /// False when the fallback law produced `power_dbm`.
    pub calibrated: bool,
}

/// File-level information shown alongside the spectrum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameMetadata {
    pub sys_voltage: f64,
    /// State tag of the first row.
    pub state: String,
    pub num_sweeps: usize,
    pub filename: String,
    /// File modification time, local, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
}

/// Processed contents of one sweep file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumFrame {
    pub points: Vec<SpectrumPoint>,
    pub metadata: FrameMetadata,
    /// Channels rendered with the fallback law, ascending.
    pub uncalibrated_channels: Vec<usize>,
}

impl SpectrumFrame {
    /// Points of a single channel across all rows.
    pub fn channel_points(&self, channel: usize) -> impl Iterator<Item = &SpectrumPoint> {
        self.points.iter().filter(move |p| p.channel == channel)
    }
}

/// Absolute frequency of each filter for a row tuned to `lo_freq_mhz`.
#[must_use]
pub fn frequency_axis(lo_freq_mhz: f64) -> [f64; CHANNEL_COUNT] {
    std::array::from_fn(|channel| center_frequency(channel) - lo_freq_mhz)
}

/// Applies calibrations to sweep files.
#[derive(Debug, Clone)]
pub struct SpectrumProcessor {
    reference_voltage: f64,
    fallback: LinearLaw,
}

impl SpectrumProcessor {
    /// `reference_voltage` must match the one the calibration was built with.
    #[must_use]
    pub fn new(reference_voltage: f64, fallback: LinearLaw) -> Self {
        Self {
            reference_voltage,
            fallback,
        }
    }

    /// Process every row of `sweep`.
    ///
    /// Returns `None` for a file with no rows.
    #[must_use]
    pub fn process(&self, sweep: &SweepFile, calibration: Option<&CalibrationSet>) -> Option<SpectrumFrame> {
        let first = sweep.rows.first()?;

        let mut points = Vec::with_capacity(sweep.len() * CHANNEL_COUNT);
        for record in &sweep.rows {
            points.extend(self.process_record(record, calibration));
        }

        let uncalibrated_channels = (0..CHANNEL_COUNT)
            .filter(|channel| calibration.and_then(|set| set.get(*channel)).is_none())
            .collect();

        let timestamp = sweep
            .modified
            .map(|modified| DateTime::<Local>::from(modified).format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default();

        Some(SpectrumFrame {
            points,
            metadata: FrameMetadata {
                sys_voltage: sweep.sys_voltage,
                state: first.state.clone(),
                num_sweeps: sweep.len(),
                filename: sweep.file_name(),
                timestamp,
            },
            uncalibrated_channels,
        })
    }

    /// The 21 points of a single row.
    #[must_use]
    pub fn process_record(
        &self,
        record: &SweepRecord,
        calibration: Option<&CalibrationSet>,
    ) -> [SpectrumPoint; CHANNEL_COUNT] {
        let voltages = record.raw.voltages(self.reference_voltage);
        let frequencies = frequency_axis(record.lo_freq_mhz);

        std::array::from_fn(|channel| {
            let voltage = voltages[channel];
            let (power_dbm, calibrated) = match calibration.and_then(|set| set.get(channel)) {
                Some(cal) => (cal.power(voltage), true),
                None => (self.fallback.apply(voltage), false),
            };
            SpectrumPoint {
                frequency_mhz: frequencies[channel],
                voltage,
                power_dbm,
                channel,
                calibrated,
            }
        })
    }
}
