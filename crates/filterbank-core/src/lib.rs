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

//! Calibration and spectrum processing for the 21-channel filterbank.
//!
//! The instrument digitizes 21 filter detectors with three ADC boards and
//! steps a local oscillator across the band. This crate turns those raw
//! register values into calibrated power spectra:
//!
//! - **ADC layer** ([`adc`]): register code to detector voltage
//! - **Correction layer** ([`s21`]): per-filter insertion loss from VNA sweeps
//! - **Calibration layer** ([`calibration`]): two-point voltage-to-dBm curves
//! - **Processing layer** ([`spectrum`]): calibrated points on an absolute frequency axis
//! - **Control layer** ([`controller`]): live/paused selection of the file to render
//!
//! Collaborators sit behind narrow traits: [`source::SweepSource`] reads
//! files into typed records and [`listing::DirectoryListing`] lists
//! candidate files. [`pipeline::Pipeline`] wires one poll tick together.
//!
//! # Quick Start
//!
//! ```no_run
//! use filterbank_core::{Pipeline, PipelineConfig, ViewerCommand};
//! use std::path::Path;
//!
//! let mut pipeline = Pipeline::from_dirs(
//!     PipelineConfig::default(),
//!     Path::new("/data/sweeps"),
//!     Path::new("/data/calibrations"),
//!     "csv",
//! )
//! .with_s21_dir("/data/s_parameters");
//!
//! let output = pipeline.tick();
//! println!("{}", output.status);
//!
//! pipeline.apply(ViewerCommand::Pause);
//! ```
//!
//! # Using Individual Layers
//!
//! ```
//! use filterbank_core::adc::{decode, DEFAULT_REFERENCE_VOLTAGE};
//! use filterbank_core::calibration::{CalibrationPoint, FilterCalibration};
//!
//! let low = CalibrationPoint { voltage: decode(1_600_000_000, DEFAULT_REFERENCE_VOLTAGE), power_dbm: -25.0 };
//! let high = CalibrationPoint { voltage: decode(1_300_000_000, DEFAULT_REFERENCE_VOLTAGE), power_dbm: -16.0 };
//! let (slope, intercept) = FilterCalibration::through(low, high, 0.001).unwrap();
//! assert!((slope * low.voltage + intercept + 25.0).abs() < 1e-9);
//! ```

pub mod adc;
pub mod calibration;
pub mod controller;
pub mod error;
pub mod listing;
pub mod pipeline;
pub mod s21;
pub mod source;
pub mod spectrum;
pub mod sweep;

pub use calibration::{
    CalibrationBuilder, CalibrationConfig, CalibrationCoverage, CalibrationSet, FilterCalibration,
};
pub use controller::{FileSelection, LiveController, ViewerCommand, ViewerMode};
pub use error::{FilterbankError, Result};
pub use listing::{DirectoryListing, FileEntry, FsDirectory};
pub use pipeline::{Pipeline, PipelineConfig, TickOutput};
pub use s21::S21Table;
pub use source::{CsvSweepSource, SweepSource};
pub use spectrum::{LinearLaw, SpectrumFrame, SpectrumPoint, SpectrumProcessor};
pub use sweep::{RawSample, SweepFile, SweepRecord};

/// Number of filter channels in the filterbank.
pub const CHANNEL_COUNT: usize = 21;

/// Center frequency of the first filter, in MHz.
pub const FIRST_CENTER_MHZ: f64 = 904.0;

/// Spacing between adjacent filter centers, in MHz.
pub const CHANNEL_SPACING_MHZ: f64 = 2.6;

/// Nominal center frequency of `channel`, in MHz.
#[must_use]
pub fn center_frequency(channel: usize) -> f64 {
    FIRST_CENTER_MHZ + CHANNEL_SPACING_MHZ * channel as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_grid() {
        assert_eq!(center_frequency(0), 904.0);
        assert!((center_frequency(1) - 906.6).abs() < 1e-9);
        assert!((center_frequency(CHANNEL_COUNT - 1) - 956.0).abs() < 1e-9);
    }
}
