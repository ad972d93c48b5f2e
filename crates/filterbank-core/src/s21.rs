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

//! S21 insertion-loss correction tables.
//!
//! Each filter channel may have a Touchstone-style `.s2p` measurement of its
//! forward transmission. Only the frequency column (Hz) and the S21
//! magnitude column (dB) are used.
//!
//! Lookups outside a table's measured span are clamped to the nearest end
//! sample, the same behaviour as a standard piecewise-linear `interp`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{FilterbankError, Result};
use crate::CHANNEL_COUNT;

const HZ_PER_MHZ: f64 = 1e6;
const FREQUENCY_COLUMN: usize = 0;
const S21_MAGNITUDE_COLUMN: usize = 3;
// freq + S11 pair + S21 magnitude at minimum
const MIN_COLUMNS: usize = 5;

/// One channel's measured loss curve, sorted by frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct LossCurve {
    samples: Vec<(f64, f64)>,
}

impl LossCurve {
    /// Build a curve from `(freq_mhz, loss_db)` samples in any order.
    ///
    /// Returns `None` for an empty sample set.
    #[must_use]
    pub fn new(mut samples: Vec<(f64, f64)>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        Some(Self { samples })
    }

    #[must_use]
    pub fn samples(&self) -> &[(f64, f64)] {
        &self.samples
    }

    /// Frequency span covered by the measurement, in MHz.
    #[must_use]
    pub fn span(&self) -> (f64, f64) {
        let first = self.samples[0].0;
        let last = self.samples[self.samples.len() - 1].0;
        (first, last)
    }

    #[must_use]
    pub fn mean_loss(&self) -> f64 {
        self.samples.iter().map(|(_, loss)| loss).sum::<f64>() / self.samples.len() as f64
    }

    /// Linearly interpolated loss at `freq_mhz`, clamped outside the span.
    #[must_use]
    pub fn interpolate(&self, freq_mhz: f64) -> f64 {
        let (first_freq, first_loss) = self.samples[0];
        let (last_freq, last_loss) = self.samples[self.samples.len() - 1];

        if freq_mhz <= first_freq {
            return first_loss;
        }
        if freq_mhz >= last_freq {
            return last_loss;
        }

        // First sample strictly above the target; the one before it is at or below.
        let upper = self.samples.partition_point(|(f, _)| *f <= freq_mhz);
        let (f0, l0) = self.samples[upper - 1];
        let (f1, l1) = self.samples[upper];

        l0 + (freq_mhz - f0) * (l1 - l0) / (f1 - f0)
    }
}

/// Per-channel S21 corrections. Channels without a curve read as 0 dB.
#[derive(Debug, Clone, Default)]
pub struct S21Table {
    curves: HashMap<usize, LossCurve>,
}

impl S21Table {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: usize, curve: LossCurve) {
        self.curves.insert(channel, curve);
    }

    /// Loss in dB for `channel` at `freq_mhz`, or 0.0 without a table.
    #[must_use]
    pub fn lookup(&self, channel: usize, freq_mhz: f64) -> f64 {
        self.curves
            .get(&channel)
            .map_or(0.0, |curve| curve.interpolate(freq_mhz))
    }

    #[must_use]
    pub fn has_channel(&self, channel: usize) -> bool {
        self.curves.contains_key(&channel)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.curves.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Path of a channel's table inside a corrections directory.
    #[must_use]
    pub fn channel_path(dir: &Path, channel: usize) -> PathBuf {
        dir.join(format!("filter_{channel:02}.s2p"))
    }

    /// Load every `filter_NN.s2p` present in `dir`.
    ///
    /// Missing or unreadable files leave that channel uncorrected. A missing
    /// directory yields an empty table.
    #[must_use]
    pub fn load_dir(dir: &Path) -> Self {
        let mut table = Self::new();

        if !dir.is_dir() {
            warn!("S21 directory not found: {}", dir.display());
            return table;
        }

        for channel in 0..CHANNEL_COUNT {
            let path = Self::channel_path(dir, channel);
            if !path.exists() {
                warn!("S21 file not found for filter {channel}: {}", path.display());
                continue;
            }

            match load_touchstone(&path) {
                Ok(Some(curve)) => {
                    let (lo, hi) = curve.span();
                    info!(
                        "Loaded S21 for filter {channel}: {} points, range {lo:.1}-{hi:.1} MHz, loss {:.1} dB avg",
                        curve.samples().len(),
                        curve.mean_loss()
                    );
                    table.insert(channel, curve);
                }
                Ok(None) => warn!("No usable S21 rows for filter {channel}: {}", path.display()),
                Err(e) => warn!("Failed to read S21 file for filter {channel}: {e}"),
            }
        }

        info!("Loaded S21 corrections for {}/{CHANNEL_COUNT} filters", table.len());
        table
    }
}

/// Read a Touchstone file into a loss curve.
pub fn load_touchstone(path: &Path) -> Result<Option<LossCurve>> {
    let text = fs::read_to_string(path).map_err(|e| FilterbankError::io(path, e))?;
    Ok(LossCurve::new(parse_touchstone(&text)))
}

/// Extract `(freq_mhz, s21_db)` pairs from Touchstone text.
///
/// Comment (`!`) and option (`#`) lines, blank lines, short lines and lines
/// with unparsable or non-finite numbers are skipped.
#[must_use]
pub fn parse_touchstone(text: &str) -> Vec<(f64, f64)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('!') && !line.starts_with('#'))
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < MIN_COLUMNS {
                return None;
            }
            let freq_hz = parts[FREQUENCY_COLUMN].parse::<f64>().ok()?;
            let s21_db = parts[S21_MAGNITUDE_COLUMN].parse::<f64>().ok()?;
            Some((freq_hz / HZ_PER_MHZ, s21_db))
        })
        .filter(|(freq, loss)| freq.is_finite() && loss.is_finite())
        .collect()
}
