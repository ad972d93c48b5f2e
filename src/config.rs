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

//! Application configuration management.
//!
//! Directory locations, the poll interval and the calibration constants are
//! persisted in TOML via `confy`. Everything numeric is handed to the
//! library as a [`PipelineConfig`]; nothing below `main` reads process-wide
//! constants.

use std::path::{Path, PathBuf};
use std::time::Duration;

use filterbank_core::calibration::{CalibrationConfig, ReferenceTags};
use filterbank_core::{LinearLaw, Pipeline, PipelineConfig};
use serde::{Deserialize, Serialize};

/// Name used for the config directory and file.
pub const APP_NAME: &str = "filterbank-viewer";

const CONFIG_NAME: &str = "config";
const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Directory the acquisition system writes sweep files into
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding the low/high power reference files
    #[serde(default = "default_calibration_dir")]
    pub calibration_dir: PathBuf,

    /// Directory holding filter_NN.s2p S21 measurements (optional)
    #[serde(default)]
    pub s21_dir: Option<PathBuf>,

    /// Extension of sweep files in both directories
    #[serde(default = "default_data_extension")]
    pub data_extension: String,

    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// ADC reference voltage
    #[serde(default = "default_reference_voltage")]
    pub reference_voltage: f64,

    /// LO output power for the low reference file, dBm
    #[serde(default = "default_low_power_dbm")]
    pub low_power_dbm: f64,

    /// LO output power for the high reference file, dBm
    #[serde(default = "default_high_power_dbm")]
    pub high_power_dbm: f64,

    /// File-name tag of the low reference file
    #[serde(default = "default_low_power_tag")]
    pub low_power_tag: String,

    /// File-name tag of the high reference file
    #[serde(default = "default_high_power_tag")]
    pub high_power_tag: String,

    /// Maximum LO distance from a filter center when calibrating, MHz
    #[serde(default = "default_lo_tolerance_mhz")]
    pub lo_tolerance_mhz: f64,

    /// Minimum voltage difference between reference points
    #[serde(default = "default_min_voltage_delta")]
    pub min_voltage_delta: f64,

    /// Power law for uncalibrated filters
    #[serde(default)]
    pub fallback: LinearLaw,

    /// Write each tick's output as JSON to this file (optional)
    #[serde(default)]
    pub frame_output: Option<PathBuf>,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_root() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join("filterbank")
}

fn default_data_dir() -> PathBuf {
    default_root().join("Data")
}

fn default_calibration_dir() -> PathBuf {
    default_root().join("FilterCalibrations")
}

fn default_data_extension() -> String {
    "csv".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_reference_voltage() -> f64 {
    filterbank_core::adc::DEFAULT_REFERENCE_VOLTAGE
}

fn default_low_power_dbm() -> f64 {
    CalibrationConfig::default().low_power_dbm
}

fn default_high_power_dbm() -> f64 {
    CalibrationConfig::default().high_power_dbm
}

fn default_low_power_tag() -> String {
    ReferenceTags::default().low
}

fn default_high_power_tag() -> String {
    ReferenceTags::default().high
}

fn default_lo_tolerance_mhz() -> f64 {
    CalibrationConfig::default().lo_tolerance_mhz
}

fn default_min_voltage_delta() -> f64 {
    CalibrationConfig::default().min_voltage_delta
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            data_dir: default_data_dir(),
            calibration_dir: default_calibration_dir(),
            s21_dir: None,
            data_extension: default_data_extension(),
            poll_interval_ms: default_poll_interval_ms(),
            reference_voltage: default_reference_voltage(),
            low_power_dbm: default_low_power_dbm(),
            high_power_dbm: default_high_power_dbm(),
            low_power_tag: default_low_power_tag(),
            high_power_tag: default_high_power_tag(),
            lo_tolerance_mhz: default_lo_tolerance_mhz(),
            min_voltage_delta: default_min_voltage_delta(),
            fallback: LinearLaw::default(),
            frame_output: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, confy::ConfyError> {
        confy::load_path(path)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<(), confy::ConfyError> {
        confy::store_path(path, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Poll interval, never shorter than 100 ms
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    /// Numeric settings for the processing pipeline
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            reference_voltage: self.reference_voltage,
            fallback: self.fallback,
            calibration: CalibrationConfig {
                low_power_dbm: self.low_power_dbm,
                high_power_dbm: self.high_power_dbm,
                lo_tolerance_mhz: self.lo_tolerance_mhz,
                min_voltage_delta: self.min_voltage_delta,
            },
            reference_tags: ReferenceTags {
                low: self.low_power_tag.clone(),
                high: self.high_power_tag.clone(),
            },
        }
    }

    /// Build a filesystem-backed pipeline from this configuration
    pub fn build_pipeline(&self) -> Pipeline {
        let pipeline = Pipeline::from_dirs(
            self.pipeline_config(),
            &self.data_dir,
            &self.calibration_dir,
            &self.data_extension,
        );
        match &self.s21_dir {
            Some(dir) => pipeline.with_s21_dir(dir),
            None => pipeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.reference_voltage, 5.0);
        assert_eq!(config.low_power_tag, "-4");
        assert_eq!(config.high_power_tag, "+5");
        assert_eq!(config.data_extension, "csv");
        assert!(config.s21_dir.is_none());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"poll_interval_ms": 500}"#).unwrap();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.fallback, LinearLaw::default());
        assert_eq!(config.low_power_dbm, -25.0);
        assert_eq!(config.high_power_dbm, -16.0);
    }

    #[test]
    fn test_poll_interval_floor() {
        let config = AppConfig {
            poll_interval_ms: 5,
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_pipeline_config_mapping() {
        let config = AppConfig {
            reference_voltage: 3.27,
            low_power_dbm: -30.0,
            high_power_tag: "+6".to_string(),
            fallback: LinearLaw {
                slope: -40.0,
                intercept: 20.0,
            },
            ..Default::default()
        };

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.reference_voltage, 3.27);
        assert_eq!(pipeline.calibration.low_power_dbm, -30.0);
        assert_eq!(pipeline.calibration.high_power_dbm, -16.0);
        assert_eq!(pipeline.reference_tags.high, "+6");
        assert_eq!(pipeline.fallback.slope, -40.0);
    }

    #[test]
    fn test_store_and_load_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("viewer.toml");
        let config = AppConfig {
            s21_dir: Some(PathBuf::from("/srv/s21")),
            poll_interval_ms: 1500,
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
