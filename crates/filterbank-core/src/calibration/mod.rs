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

//! Per-filter two-point power calibration.
//!
//! Two reference files are recorded while the LO injects a known power into
//! the filterbank, once at a low and once at a high setting. For each filter
//! the row whose LO sits on the filter's center frequency gives one detector
//! voltage per power level; the line through those two points maps any later
//! detector voltage back to dBm.
//!
//! The nominal levels are the power at the LO output. When an S21 table is
//! available, the filter's insertion loss at its center frequency is added
//! to both levels so the curve reflects power at the detector.

mod reference;

pub use reference::{locate_references, ReferencePair, ReferenceTags};

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, warn};
use serde::Serialize;

use crate::adc::DEFAULT_REFERENCE_VOLTAGE;
use crate::s21::S21Table;
use crate::sweep::SweepFile;
use crate::{center_frequency, CHANNEL_COUNT};

/// A detector voltage paired with the power that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationPoint {
    pub voltage: f64,
    pub power_dbm: f64,
}

/// Linear voltage-to-power curve for one filter channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FilterCalibration {
    pub slope: f64,
    pub intercept: f64,
    pub low_voltage: f64,
    pub high_voltage: f64,
    pub center_freq: f64,
    pub s21_loss_db: f64,
}

impl FilterCalibration {
    /// Fit the line through two points.
    ///
    /// Returns `None` when the voltages are closer than `min_voltage_delta`.
    #[must_use]
    pub fn through(
        low: CalibrationPoint,
        high: CalibrationPoint,
        min_voltage_delta: f64,
    ) -> Option<(f64, f64)> {
        let voltage_diff = high.voltage - low.voltage;
        if voltage_diff.is_nan() || voltage_diff.abs() < min_voltage_delta {
            return None;
        }
        let slope = (high.power_dbm - low.power_dbm) / voltage_diff;
        let intercept = low.power_dbm - slope * low.voltage;
        (slope.is_finite() && intercept.is_finite()).then_some((slope, intercept))
    }

    /// Calibrated power in dBm for a detector voltage.
    #[must_use]
    pub fn power(&self, voltage: f64) -> f64 {
        self.slope * voltage + self.intercept
    }

    #[must_use]
    pub fn has_s21_correction(&self) -> bool {
        self.s21_loss_db != 0.0
    }
}

/// Which of the two reference files a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PowerLevel {
    Low,
    High,
}

impl fmt::Display for PowerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Why a channel was left out of a calibration set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SkipReason {
    /// No row in the reference file had its LO within tolerance of the center.
    NoMatchingLo { level: PowerLevel },
    /// Both reference voltages were (nearly) identical.
    DegenerateVoltage { low_voltage: f64, high_voltage: f64 },
    /// The S21 table produced a non-finite loss at the center.
    InvalidS21 { loss_db: f64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatchingLo { level } => {
                write!(f, "no {level}-power row with LO near the center frequency")
            }
            Self::DegenerateVoltage {
                low_voltage,
                high_voltage,
            } => write!(
                f,
                "no voltage difference ({low_voltage:.4} V vs {high_voltage:.4} V)"
            ),
            Self::InvalidS21 { loss_db } => write!(f, "unusable S21 loss {loss_db} dB"),
        }
    }
}

/// Tunables for deriving calibration curves.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConfig {
    /// LO output power at the low setting, in dBm.
    pub low_power_dbm: f64,
    /// LO output power at the high setting, in dBm.
    pub high_power_dbm: f64,
    /// Maximum distance between a row's LO and a filter center, in MHz.
    pub lo_tolerance_mhz: f64,
    /// Minimum usable difference between the two reference voltages.
    pub min_voltage_delta: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            low_power_dbm: -25.0,
            high_power_dbm: -16.0,
            lo_tolerance_mhz: 1.0,
            min_voltage_delta: 0.001,
        }
    }
}

/// A reference file tagged with the power injected while recording it.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceSweep<'a> {
    pub sweep: &'a SweepFile,
    pub nominal_power_dbm: f64,
}

/// Calibration coverage for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalibrationCoverage {
    pub calibrated_count: usize,
    pub has_s21_correction_count: usize,
    pub total: usize,
}

impl CalibrationCoverage {
    /// Short human-readable summary.
    #[must_use]
    pub fn describe(&self) -> String {
        if self.has_s21_correction_count > 0 {
            format!(
                "Per-filter cal ({}/{}) + S21 correction ({}/{})",
                self.calibrated_count, self.total, self.has_s21_correction_count, self.total
            )
        } else if self.calibrated_count > 0 {
            format!("Per-filter calibration ({}/{})", self.calibrated_count, self.total)
        } else {
            "No calibration (using fallback)".to_string()
        }
    }
}

/// Calibrations for the channels that could be calibrated.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CalibrationSet {
    filters: BTreeMap<usize, FilterCalibration>,
    skipped: Vec<(usize, SkipReason)>,
}

impl CalibrationSet {
    /// A set with no calibrated channels.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, channel: usize) -> Option<&FilterCalibration> {
        self.filters.get(&channel)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &FilterCalibration)> {
        self.filters.iter().map(|(channel, cal)| (*channel, cal))
    }

    /// Channels left out, with the reason.
    #[must_use]
    pub fn skipped(&self) -> &[(usize, SkipReason)] {
        &self.skipped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.filters.len() == CHANNEL_COUNT
    }

    #[must_use]
    pub fn coverage(&self) -> CalibrationCoverage {
        CalibrationCoverage {
            calibrated_count: self.filters.len(),
            has_s21_correction_count: self
                .filters
                .values()
                .filter(|cal| cal.has_s21_correction())
                .count(),
            total: CHANNEL_COUNT,
        }
    }

    fn insert(&mut self, channel: usize, calibration: FilterCalibration) {
        self.filters.insert(channel, calibration);
    }

    fn skip(&mut self, channel: usize, reason: SkipReason) {
        warn!(
            "Filter {channel} ({:.1} MHz) not calibrated: {reason}",
            center_frequency(channel)
        );
        self.skipped.push((channel, reason));
    }
}

/// Derives a [`CalibrationSet`] from a pair of reference files.
#[derive(Debug, Clone)]
pub struct CalibrationBuilder {
    config: CalibrationConfig,
    reference_voltage: f64,
}

impl Default for CalibrationBuilder {
    fn default() -> Self {
        Self::new(CalibrationConfig::default(), DEFAULT_REFERENCE_VOLTAGE)
    }
}

impl CalibrationBuilder {
    #[must_use]
    pub fn new(config: CalibrationConfig, reference_voltage: f64) -> Self {
        Self {
            config,
            reference_voltage,
        }
    }

    #[must_use]
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Tag a pair of reference files with the configured nominal powers.
    #[must_use]
    pub fn references<'a>(
        &self,
        low: &'a SweepFile,
        high: &'a SweepFile,
    ) -> (ReferenceSweep<'a>, ReferenceSweep<'a>) {
        (
            ReferenceSweep {
                sweep: low,
                nominal_power_dbm: self.config.low_power_dbm,
            },
            ReferenceSweep {
                sweep: high,
                nominal_power_dbm: self.config.high_power_dbm,
            },
        )
    }

    /// Build per-channel calibrations.
    ///
    /// Channels that cannot be calibrated are recorded in
    /// [`CalibrationSet::skipped`] and logged; the rest are still returned.
    #[must_use]
    pub fn build(
        &self,
        low: ReferenceSweep<'_>,
        high: ReferenceSweep<'_>,
        s21: Option<&S21Table>,
    ) -> CalibrationSet {
        let mut set = CalibrationSet::empty();

        for channel in 0..CHANNEL_COUNT {
            let center_freq = center_frequency(channel);

            let Some(low_voltage) = self.voltage_at_center(low.sweep, channel, center_freq) else {
                set.skip(channel, SkipReason::NoMatchingLo { level: PowerLevel::Low });
                continue;
            };
            let Some(high_voltage) = self.voltage_at_center(high.sweep, channel, center_freq) else {
                set.skip(channel, SkipReason::NoMatchingLo { level: PowerLevel::High });
                continue;
            };

            let s21_loss_db = s21.map_or(0.0, |table| table.lookup(channel, center_freq));
            if !s21_loss_db.is_finite() {
                set.skip(channel, SkipReason::InvalidS21 { loss_db: s21_loss_db });
                continue;
            }
            let low_point = CalibrationPoint {
                voltage: low_voltage,
                power_dbm: low.nominal_power_dbm + s21_loss_db,
            };
            let high_point = CalibrationPoint {
                voltage: high_voltage,
                power_dbm: high.nominal_power_dbm + s21_loss_db,
            };

            let Some((slope, intercept)) =
                FilterCalibration::through(low_point, high_point, self.config.min_voltage_delta)
            else {
                set.skip(
                    channel,
                    SkipReason::DegenerateVoltage {
                        low_voltage,
                        high_voltage,
                    },
                );
                continue;
            };

            debug!(
                "Filter {channel} ({center_freq:.1} MHz): V=[{low_voltage:.3}, {high_voltage:.3}] -> P=[{:.1}, {:.1}] dBm, S21={s21_loss_db:.1} dB, slope={slope:.2}",
                low_point.power_dbm, high_point.power_dbm
            );

            set.insert(
                channel,
                FilterCalibration {
                    slope,
                    intercept,
                    low_voltage,
                    high_voltage,
                    center_freq,
                    s21_loss_db,
                },
            );
        }

        if !set.is_complete() {
            warn!("Only calibrated {}/{CHANNEL_COUNT} filters", set.len());
        }
        set
    }

    /// Detector voltage of `channel` in the row tuned to its center.
    fn voltage_at_center(&self, sweep: &SweepFile, channel: usize, center_freq: f64) -> Option<f64> {
        let (row, distance) = sweep.closest_row(center_freq)?;
        if distance.is_nan() || distance >= self.config.lo_tolerance_mhz {
            return None;
        }
        Some(row.raw.voltages(self.reference_voltage)[channel])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adc::AdcCode;
    use crate::sweep::{RawSample, SweepRecord, CODES_PER_DEVICE, DEVICE_COUNT};

    const REF: f64 = DEFAULT_REFERENCE_VOLTAGE;

    /// ADC code that decodes to `volts` on the positive branch.
    pub(crate) fn code_for(volts: f64) -> AdcCode {
        (volts / REF * 2_147_483_647.0).round() as AdcCode
    }

    /// A row where every channel reads `volts_for(channel)`.
    pub(crate) fn row(lo: f64, volts_for: impl Fn(usize) -> f64) -> SweepRecord {
        let mut devices = [[0; CODES_PER_DEVICE]; DEVICE_COUNT];
        for channel in 0..CHANNEL_COUNT {
            devices[channel / CODES_PER_DEVICE][channel % CODES_PER_DEVICE] =
                code_for(volts_for(channel));
        }
        SweepRecord::new(RawSample::new(devices), lo, "t".to_string(), "1".to_string())
    }

    /// A reference file with one row per filter center.
    pub(crate) fn reference_file(volts_for: impl Fn(usize) -> f64 + Copy) -> SweepFile {
        let rows = (0..CHANNEL_COUNT)
            .map(|channel| row(center_frequency(channel), volts_for))
            .collect();
        SweepFile::new("ref.csv", 5.0, rows)
    }

    #[test]
    fn test_through_is_exact_at_both_points() {
        let low = CalibrationPoint { voltage: 1.9, power_dbm: -25.0 };
        let high = CalibrationPoint { voltage: 1.6, power_dbm: -16.0 };

        let (slope, intercept) = FilterCalibration::through(low, high, 0.001).unwrap();
        assert!((slope * low.voltage + intercept - low.power_dbm).abs() < 1e-9);
        assert!((slope * high.voltage + intercept - high.power_dbm).abs() < 1e-9);
    }

    #[test]
    fn test_through_rejects_close_voltages() {
        let low = CalibrationPoint { voltage: 1.5, power_dbm: -25.0 };
        let high = CalibrationPoint { voltage: 1.5005, power_dbm: -16.0 };
        assert!(FilterCalibration::through(low, high, 0.001).is_none());
    }

    #[test]
    fn test_through_rejects_non_finite_result() {
        let low = CalibrationPoint { voltage: 1.9, power_dbm: f64::INFINITY };
        let high = CalibrationPoint { voltage: 1.6, power_dbm: f64::INFINITY };
        assert!(FilterCalibration::through(low, high, 0.001).is_none());

        let high = CalibrationPoint { voltage: 1.6, power_dbm: f64::NAN };
        let low = CalibrationPoint { voltage: 1.9, power_dbm: -25.0 };
        assert!(FilterCalibration::through(low, high, 0.001).is_none());
    }

    #[test]
    fn test_nan_lo_row_does_not_calibrate_every_channel() {
        let mut low = reference_file(|_| 1.9);
        low.rows.insert(0, row(f64::NAN, |_| 0.5));
        let high = reference_file(|_| 1.6);

        let builder = CalibrationBuilder::default();
        let (low_ref, high_ref) = builder.references(&low, &high);
        let set = builder.build(low_ref, high_ref, None);

        assert!(set.is_complete());
        for (_, cal) in set.iter() {
            assert!((cal.low_voltage - 1.9).abs() < 1e-6);
        }
    }

    #[test]
    fn test_infinite_s21_loss_leaves_channel_absent() {
        let low = reference_file(|_| 1.9);
        let high = reference_file(|_| 1.6);
        let mut table = S21Table::new();
        table.insert(
            0,
            crate::s21::LossCurve::new(vec![(900.0, f64::INFINITY), (910.0, f64::INFINITY)]).unwrap(),
        );

        let builder = CalibrationBuilder::default();
        let (low_ref, high_ref) = builder.references(&low, &high);
        let set = builder.build(low_ref, high_ref, Some(&table));

        assert!(set.get(0).is_none());
        assert!(matches!(set.skipped(), [(0, SkipReason::InvalidS21 { .. })]));
        assert_eq!(set.coverage().has_s21_correction_count, 0);
        assert!(set.iter().all(|(_, cal)| cal.slope.is_finite() && cal.intercept.is_finite()));
    }

    #[test]
    fn test_build_full_coverage() {
        let low = reference_file(|ch| 2.0 - ch as f64 * 0.01);
        let high = reference_file(|ch| 1.7 - ch as f64 * 0.01);

        let builder = CalibrationBuilder::default();
        let (low_ref, high_ref) = builder.references(&low, &high);
        let set = builder.build(low_ref, high_ref, None);

        assert!(set.is_complete());
        assert!(set.skipped().is_empty());
        for (channel, cal) in set.iter() {
            assert!((cal.power(cal.low_voltage) - -25.0).abs() < 1e-9);
            assert!((cal.power(cal.high_voltage) - -16.0).abs() < 1e-9);
            assert_eq!(cal.center_freq, center_frequency(channel));
            assert_eq!(cal.s21_loss_db, 0.0);
        }
        assert_eq!(set.coverage().calibrated_count, CHANNEL_COUNT);
        assert_eq!(set.coverage().has_s21_correction_count, 0);
    }

    #[test]
    fn test_degenerate_channel_is_absent() {
        let low = reference_file(|_| 1.8);
        let high = reference_file(|ch| if ch == 4 { 1.8004 } else { 1.5 });

        let builder = CalibrationBuilder::default();
        let (low_ref, high_ref) = builder.references(&low, &high);
        let set = builder.build(low_ref, high_ref, None);

        assert!(set.get(4).is_none());
        assert_eq!(set.len(), CHANNEL_COUNT - 1);
        assert!(matches!(
            set.skipped(),
            [(4, SkipReason::DegenerateVoltage { .. })]
        ));
        assert!(set.iter().all(|(_, cal)| cal.slope.is_finite()));
    }

    #[test]
    fn test_channel_without_matching_lo_is_skipped() {
        // Channel 20's center (956 MHz) has no row within 1 MHz.
        let mut low = reference_file(|_| 1.9);
        low.rows.retain(|r| r.lo_freq_mhz < 950.0);
        let high = reference_file(|_| 1.6);

        let builder = CalibrationBuilder::default();
        let (low_ref, high_ref) = builder.references(&low, &high);
        let set = builder.build(low_ref, high_ref, None);

        assert!(set.get(20).is_none());
        assert!(set.skipped().contains(&(
            20,
            SkipReason::NoMatchingLo { level: PowerLevel::Low }
        )));
    }

    #[test]
    fn test_truncated_lo_still_matches() {
        // Row LO 906.6 is stored as 906; channel 1 center is 906.6, 0.6 MHz away.
        let low = reference_file(|_| 1.9);
        assert_eq!(low.rows[1].lo_freq_mhz, 906.0);

        let high = reference_file(|_| 1.6);
        let builder = CalibrationBuilder::default();
        let (low_ref, high_ref) = builder.references(&low, &high);
        let set = builder.build(low_ref, high_ref, None);
        assert!(set.get(1).is_some());
    }

    #[test]
    fn test_s21_shifts_both_levels() {
        let low = reference_file(|_| 1.9);
        let high = reference_file(|_| 1.6);
        let mut table = S21Table::new();
        table.insert(
            0,
            crate::s21::LossCurve::new(vec![(900.0, -10.0), (910.0, -10.0)]).unwrap(),
        );

        let builder = CalibrationBuilder::default();
        let (low_ref, high_ref) = builder.references(&low, &high);
        let set = builder.build(low_ref, high_ref, Some(&table));

        let cal = set.get(0).unwrap();
        assert_eq!(cal.s21_loss_db, -10.0);
        assert!((cal.power(cal.low_voltage) - -35.0).abs() < 1e-9);
        assert!((cal.power(cal.high_voltage) - -26.0).abs() < 1e-9);
        assert_eq!(set.coverage().has_s21_correction_count, 1);
        assert_eq!(set.get(1).unwrap().s21_loss_db, 0.0);
    }

    #[test]
    fn test_coverage_descriptions() {
        let none = CalibrationSet::empty().coverage();
        assert_eq!(none.describe(), "No calibration (using fallback)");

        let partial = CalibrationCoverage {
            calibrated_count: 19,
            has_s21_correction_count: 0,
            total: CHANNEL_COUNT,
        };
        assert_eq!(partial.describe(), "Per-filter calibration (19/21)");

        let corrected = CalibrationCoverage {
            has_s21_correction_count: 12,
            ..partial
        };
        assert_eq!(
            corrected.describe(),
            "Per-filter cal (19/21) + S21 correction (12/21)"
        );
    }
}
