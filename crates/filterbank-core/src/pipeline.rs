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

//! One poll tick, end to end.
//!
//! A tick resolves the file to show, rebuilds the calibration from whatever
//! reference files are current, processes the selected file and packages
//! everything the presentation layer needs. Every stage degrades instead of
//! failing: a missing reference file means fallback powers, an unreadable
//! data file means an explicit error status.

use std::path::{Path, PathBuf};

use log::{debug, error, warn};
use serde::Serialize;

use crate::adc::DEFAULT_REFERENCE_VOLTAGE;
use crate::calibration::{
    locate_references, CalibrationBuilder, CalibrationConfig, CalibrationCoverage, CalibrationSet,
    ReferenceTags,
};
use crate::controller::{LiveController, ViewerCommand};
use crate::listing::{DirectoryListing, FsDirectory};
use crate::s21::S21Table;
use crate::source::{CsvSweepSource, SweepSource};
use crate::spectrum::{FrameMetadata, LinearLaw, SpectrumFrame, SpectrumProcessor};

pub const NO_DATA_STATUS: &str = "No data files found";
pub const PROCESSING_ERROR_STATUS: &str = "Error processing data file";

/// Numeric configuration shared by every stage of a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// ADC reference voltage, used for both calibration and processing.
    pub reference_voltage: f64,
    /// Power law for channels without a calibration.
    pub fallback: LinearLaw,
    pub calibration: CalibrationConfig,
    pub reference_tags: ReferenceTags,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reference_voltage: DEFAULT_REFERENCE_VOLTAGE,
            fallback: LinearLaw::default(),
            calibration: CalibrationConfig::default(),
            reference_tags: ReferenceTags::default(),
        }
    }
}

/// Everything produced by one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickOutput {
    /// File the controller selected, if any.
    pub selected: Option<PathBuf>,
    pub paused: bool,
    pub frame: Option<SpectrumFrame>,
    pub coverage: CalibrationCoverage,
    pub status: String,
    pub pause_status: String,
}

/// Owns the controller and collaborators and runs ticks.
pub struct Pipeline {
    controller: LiveController,
    data: Box<dyn DirectoryListing + Send>,
    references: Box<dyn DirectoryListing + Send>,
    source: Box<dyn SweepSource + Send>,
    s21_dir: Option<PathBuf>,
    builder: CalibrationBuilder,
    processor: SpectrumProcessor,
    reference_tags: ReferenceTags,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("controller", &self.controller)
            .field("s21_dir", &self.s21_dir)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        data: Box<dyn DirectoryListing + Send>,
        references: Box<dyn DirectoryListing + Send>,
        source: Box<dyn SweepSource + Send>,
    ) -> Self {
        Self {
            controller: LiveController::new(),
            data,
            references,
            source,
            s21_dir: None,
            builder: CalibrationBuilder::new(config.calibration, config.reference_voltage),
            processor: SpectrumProcessor::new(config.reference_voltage, config.fallback),
            reference_tags: config.reference_tags,
        }
    }

    /// Filesystem-backed pipeline reading CSV sweep files.
    #[must_use]
    pub fn from_dirs(
        config: PipelineConfig,
        data_dir: &Path,
        calibration_dir: &Path,
        extension: &str,
    ) -> Self {
        Self::new(
            config,
            Box::new(FsDirectory::new(data_dir).with_extension(extension)),
            Box::new(FsDirectory::new(calibration_dir).with_extension(extension)),
            Box::new(CsvSweepSource::new()),
        )
    }

    /// Directory holding `filter_NN.s2p` corrections.
    #[must_use]
    pub fn with_s21_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.s21_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn controller(&self) -> &LiveController {
        &self.controller
    }

    pub fn apply(&mut self, command: ViewerCommand) {
        self.controller.apply(command);
    }

    /// Run one tick.
    pub fn tick(&mut self) -> TickOutput {
        let selection = self.controller.tick(self.data.as_ref());
        let paused = selection.paused;
        let pause_status = if paused { "PAUSED" } else { "Live" }.to_string();

        let Some(path) = selection.path else {
            return TickOutput {
                selected: None,
                paused,
                frame: None,
                coverage: CalibrationSet::empty().coverage(),
                status: NO_DATA_STATUS.to_string(),
                pause_status,
            };
        };

        let calibration = self.build_calibration();
        let coverage = calibration
            .as_ref()
            .map_or_else(|| CalibrationSet::empty().coverage(), CalibrationSet::coverage);

        let frame = match self.source.read(&path) {
            Ok(sweep) => {
                let frame = self.processor.process(&sweep, calibration.as_ref());
                if frame.is_none() {
                    warn!("Data file {} has no rows", path.display());
                }
                frame
            }
            Err(e) => {
                error!("Error processing file {}: {e}", path.display());
                None
            }
        };

        let status = frame.as_ref().map_or_else(
            || PROCESSING_ERROR_STATUS.to_string(),
            |frame| status_line(&frame.metadata, &coverage, paused),
        );
        debug!("{status}");

        TickOutput {
            selected: Some(path),
            paused,
            frame,
            coverage,
            status,
            pause_status,
        }
    }

    /// Build a fresh calibration from the current reference files.
    ///
    /// Returns `None` when the reference pair is missing or unreadable.
    pub fn build_calibration(&self) -> Option<CalibrationSet> {
        let pair = match locate_references(self.references.as_ref(), &self.reference_tags) {
            Ok(Some(pair)) => pair,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to list calibration directory: {e}");
                return None;
            }
        };

        let read = |path: &Path| match self.source.read(path) {
            Ok(sweep) => Some(sweep),
            Err(e) => {
                warn!("Failed to read calibration file: {e}");
                None
            }
        };
        let low = read(&pair.low)?;
        let high = read(&pair.high)?;

        let s21 = self.s21_dir.as_deref().map(S21Table::load_dir);
        let (low_ref, high_ref) = self.builder.references(&low, &high);
        Some(self.builder.build(low_ref, high_ref, s21.as_ref()))
    }
}

/// Human-readable one-line status for a processed file.
#[must_use]
pub fn status_line(metadata: &FrameMetadata, coverage: &CalibrationCoverage, paused: bool) -> String {
    let prefix = if paused { "PAUSED - " } else { "" };
    format!(
        "{prefix}File: {} | Voltage: {:.2} V | State: {} | Sweeps: {} | {}",
        metadata.filename,
        metadata.sys_voltage,
        metadata.state,
        metadata.num_sweeps,
        coverage.describe()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::tests::code_for;
    use crate::{center_frequency, CHANNEL_COUNT};
    use std::fs;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _root: TempDir,
        data: PathBuf,
        cal: PathBuf,
        s21: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            let data = root.path().join("data");
            let cal = root.path().join("cal");
            let s21 = root.path().join("s21");
            for dir in [&data, &cal, &s21] {
                fs::create_dir(dir).unwrap();
            }
            Self {
                _root: root,
                data,
                cal,
                s21,
            }
        }

        fn pipeline(&self) -> Pipeline {
            Pipeline::from_dirs(PipelineConfig::default(), &self.data, &self.cal, "csv")
                .with_s21_dir(&self.s21)
        }
    }

    fn codes(volts: f64) -> String {
        vec![code_for(volts).to_string(); 7].join(" ")
    }

    fn row(volts: f64, lo: f64) -> String {
        let c = codes(volts);
        format!("{c},{c},{c},2025-01-01T00:00:00,2,{lo}\n")
    }

    fn write_sweep(path: &Path, rows: &[String]) {
        let mut text = String::from("#SYSVOLT=12.31\nadhat_1,adhat_2,adhat_3,time,state,frequency\n");
        for r in rows {
            text.push_str(r);
        }
        fs::write(path, text).unwrap();
    }

    fn write_reference(path: &Path, volts: f64) {
        let rows: Vec<String> = (0..CHANNEL_COUNT)
            .map(|ch| row(volts, center_frequency(ch)))
            .collect();
        write_sweep(path, &rows);
    }

    #[test]
    fn test_no_data_files() {
        let fixture = Fixture::new();
        let output = fixture.pipeline().tick();

        assert_eq!(output.status, NO_DATA_STATUS);
        assert!(output.frame.is_none());
        assert_eq!(output.pause_status, "Live");
    }

    #[test]
    fn test_uncalibrated_frame() {
        let fixture = Fixture::new();
        write_sweep(&fixture.data.join("sweep_1.csv"), &[row(1.5, 904.0)]);

        let output = fixture.pipeline().tick();
        let frame = output.frame.unwrap();
        assert_eq!(output.coverage.calibrated_count, 0);
        assert!(frame.points.iter().all(|p| !p.calibrated));
        assert_eq!(
            output.status,
            "File: sweep_1.csv | Voltage: 12.31 V | State: 2 | Sweeps: 1 | No calibration (using fallback)"
        );
    }

    #[test]
    fn test_calibrated_frame_with_s21() {
        let fixture = Fixture::new();
        write_reference(&fixture.cal.join("cal_-4dBm.csv"), 1.9);
        write_reference(&fixture.cal.join("cal_+5dBm.csv"), 1.6);
        fs::write(
            S21Table::channel_path(&fixture.s21, 0),
            "# Hz S DB R 50\n900000000 0 0 -3.0 0\n910000000 0 0 -3.0 0\n",
        )
        .unwrap();
        write_sweep(&fixture.data.join("sweep_1.csv"), &[row(1.9, 904.0)]);

        let output = fixture.pipeline().tick();
        assert_eq!(output.coverage.calibrated_count, CHANNEL_COUNT);
        assert_eq!(output.coverage.has_s21_correction_count, 1);
        assert!(output
            .status
            .ends_with("Per-filter cal (21/21) + S21 correction (1/21)"));

        let frame = output.frame.unwrap();
        let p0 = frame.channel_points(0).next().unwrap();
        assert!((p0.power_dbm - -28.0).abs() < 1e-6);
        let p1 = frame.channel_points(1).next().unwrap();
        assert!((p1.power_dbm - -25.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_reference_falls_back() {
        let fixture = Fixture::new();
        write_reference(&fixture.cal.join("cal_-4dBm.csv"), 1.9);
        write_sweep(&fixture.data.join("sweep_1.csv"), &[row(1.5, 904.0)]);

        let output = fixture.pipeline().tick();
        assert_eq!(output.coverage.calibrated_count, 0);
        assert!(output.frame.is_some());
    }

    #[test]
    fn test_unreadable_data_file() {
        let fixture = Fixture::new();
        fs::write(fixture.data.join("broken.csv"), "not,a,sweep\n1,2,3\n").unwrap();

        let output = fixture.pipeline().tick();
        assert_eq!(output.status, PROCESSING_ERROR_STATUS);
        assert!(output.frame.is_none());
        assert!(output.selected.is_some());
    }

    #[test]
    fn test_pause_keeps_file_and_prefixes_status() {
        let fixture = Fixture::new();
        write_sweep(&fixture.data.join("a.csv"), &[row(1.5, 904.0)]);

        let mut pipeline = fixture.pipeline();
        pipeline.apply(ViewerCommand::Pause);
        let first = pipeline.tick();
        assert!(first.status.starts_with("PAUSED - File: a.csv"));
        assert_eq!(first.pause_status, "PAUSED");

        sleep(Duration::from_millis(20));
        write_sweep(&fixture.data.join("b.csv"), &[row(1.5, 904.0)]);
        let second = pipeline.tick();
        assert_eq!(second.frame.unwrap().metadata.filename, "a.csv");

        pipeline.apply(ViewerCommand::Resume);
        let third = pipeline.tick();
        assert_eq!(third.frame.unwrap().metadata.filename, "b.csv");
    }
}
