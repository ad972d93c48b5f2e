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

//! CSV export of sweep files.
//!
//! Layout:
//!
//! ```text
//! #SYSVOLT=12.31
//! adhat_1,adhat_2,adhat_3,time,state,frequency
//! "12 34 ...","...","...",2025-01-01T00:00:00,1,904.2
//! ```
//!
//! Each `adhat_N` cell holds that board's conversions separated by spaces;
//! at least seven are required. `frequency` is the LO frequency in MHz.
//! Leading `#KEY=VALUE` lines form the file header.

use std::fs;
use std::path::Path;

use log::warn;
use serde::Deserialize;

use super::SweepSource;
use crate::adc::AdcCode;
use crate::error::{FilterbankError, Result};
use crate::sweep::{RawSample, SweepFile, SweepRecord};

const SYS_VOLTAGE_KEY: &str = "SYSVOLT";
const REQUIRED_COLUMNS: [&str; 6] = ["adhat_1", "adhat_2", "adhat_3", "time", "state", "frequency"];

#[derive(Debug, Deserialize)]
struct CsvRow {
    adhat_1: String,
    adhat_2: String,
    adhat_3: String,
    time: String,
    state: String,
    frequency: f64,
}

/// Reads sweep files exported as CSV.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvSweepSource;

impl CsvSweepSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse CSV text. `path` is used for naming and error context only.
    pub fn parse(&self, path: &Path, text: &str) -> Result<SweepFile> {
        let (sys_voltage, body) = split_header(path, text);

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());

        let headers = reader.headers().map_err(|e| FilterbankError::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(FilterbankError::MissingColumn {
                    path: path.to_path_buf(),
                    column,
                });
            }
        }

        let mut rows = Vec::new();
        for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
            let row_number = index + 1;
            match result.map_err(|e| e.to_string()).and_then(to_record) {
                Ok(record) => rows.push(record),
                Err(reason) => {
                    let err = FilterbankError::MalformedRow {
                        row: row_number,
                        reason,
                    };
                    warn!("Skipping row in {}: {err}", path.display());
                }
            }
        }

        Ok(SweepFile::new(path, sys_voltage, rows))
    }
}

impl SweepSource for CsvSweepSource {
    fn read(&self, path: &Path) -> Result<SweepFile> {
        let text = fs::read_to_string(path).map_err(|e| FilterbankError::io(path, e))?;
        let mut file = self.parse(path, &text)?;
        if let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) {
            file = file.with_modified(modified);
        }
        Ok(file)
    }
}

/// Split leading `#KEY=VALUE` lines from the table and pull out the system voltage.
fn split_header<'a>(path: &Path, text: &'a str) -> (f64, &'a str) {
    let mut sys_voltage = None;
    let mut body = text;

    while let Some(rest) = body.strip_prefix('#') {
        let (line, remainder) = rest.split_once('\n').unwrap_or((rest, ""));
        body = remainder;

        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case(SYS_VOLTAGE_KEY) {
            match value.trim().parse::<f64>() {
                Ok(v) => sys_voltage = Some(v),
                Err(_) => warn!("Unparsable {SYS_VOLTAGE_KEY} '{}' in {}", value.trim(), path.display()),
            }
        }
    }

    (sys_voltage.unwrap_or(0.0), body)
}

fn to_record(row: CsvRow) -> std::result::Result<SweepRecord, String> {
    if !row.frequency.is_finite() {
        return Err(format!("non-finite frequency {}", row.frequency));
    }

    let adc1 = parse_codes("adhat_1", &row.adhat_1)?;
    let adc2 = parse_codes("adhat_2", &row.adhat_2)?;
    let adc3 = parse_codes("adhat_3", &row.adhat_3)?;

    let raw = RawSample::from_device_slices(&adc1, &adc2, &adc3)
        .ok_or_else(|| "fewer than 7 conversions for a board".to_string())?;

    Ok(SweepRecord::new(raw, row.frequency, row.time, row.state))
}

/// Parse a space-separated list of codes. Integral floats (`123.0`) are accepted.
fn parse_codes(column: &str, cell: &str) -> std::result::Result<Vec<AdcCode>, String> {
    cell.split_whitespace()
        .map(|token| {
            token
                .parse::<AdcCode>()
                .ok()
                .or_else(|| integral_code(token))
                .ok_or_else(|| format!("invalid code '{token}' in {column}"))
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation, reason = "value is integral and within i64 range")]
fn integral_code(token: &str) -> Option<AdcCode> {
    let value = token.parse::<f64>().ok()?;
    (value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e18).then_some(value as AdcCode)
}
