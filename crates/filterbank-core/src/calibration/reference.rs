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

//! Locating the low/high reference files in the calibration directory.
//!
//! Calibration runs are named after the LO power setting they were taken at
//! (for example `cal_-4dBm_20250101.csv` and `cal_+5dBm_20250101.csv`). The
//! newest file carrying each tag is used.

use std::path::PathBuf;

use log::warn;

use crate::error::Result;
use crate::listing::{ready_files_newest_first, DirectoryListing};

/// File-name substrings identifying the two reference power settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTags {
    pub low: String,
    pub high: String,
}

impl Default for ReferenceTags {
    fn default() -> Self {
        Self {
            low: "-4".to_string(),
            high: "+5".to_string(),
        }
    }
}

/// Paths of the reference files to calibrate from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePair {
    pub low: PathBuf,
    pub high: PathBuf,
}

/// Find the newest low- and high-power reference files.
///
/// A file whose name carries the low tag is never taken as the high
/// reference, even if it also carries the high tag. Returns `Ok(None)` when
/// either file is missing.
pub fn locate_references(
    listing: &dyn DirectoryListing,
    tags: &ReferenceTags,
) -> Result<Option<ReferencePair>> {
    let candidates = ready_files_newest_first(listing.list()?);

    let mut low = None;
    let mut high = None;
    for entry in candidates {
        let name = entry.file_name();
        if name.contains(&tags.low) {
            if low.is_none() {
                low = Some(entry.path);
            }
        } else if name.contains(&tags.high) && high.is_none() {
            high = Some(entry.path);
        }
        if low.is_some() && high.is_some() {
            break;
        }
    }

    match (low, high) {
        (Some(low), Some(high)) => Ok(Some(ReferencePair { low, high })),
        (low, high) => {
            warn!(
                "Could not find both {} and {} calibration files (low: {}, high: {})",
                tags.low,
                tags.high,
                if low.is_some() { "found" } else { "missing" },
                if high.is_some() { "found" } else { "missing" },
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::tests::FakeListing;

    #[test]
    fn test_newest_of_each_tag() {
        let listing = FakeListing::default();
        listing.add("cal_-4dBm_old.csv", 500, 10);
        listing.add("cal_-4dBm_new.csv", 50, 10);
        listing.add("cal_+5dBm_old.csv", 400, 10);
        listing.add("cal_+5dBm_new.csv", 40, 10);
        listing.add("unrelated.csv", 1, 10);

        let pair = locate_references(&listing, &ReferenceTags::default())
            .unwrap()
            .unwrap();
        assert_eq!(pair.low, PathBuf::from("cal_-4dBm_new.csv"));
        assert_eq!(pair.high, PathBuf::from("cal_+5dBm_new.csv"));
    }

    #[test]
    fn test_empty_reference_files_ignored() {
        let listing = FakeListing::default();
        listing.add("cal_-4dBm_a.csv", 500, 10);
        listing.add("cal_-4dBm_b.csv", 5, 0);
        listing.add("cal_+5dBm_a.csv", 400, 10);

        let pair = locate_references(&listing, &ReferenceTags::default())
            .unwrap()
            .unwrap();
        assert_eq!(pair.low, PathBuf::from("cal_-4dBm_a.csv"));
    }

    #[test]
    fn test_low_tag_takes_precedence() {
        let listing = FakeListing::default();
        listing.add("cal_-4_+5.csv", 10, 10);
        listing.add("cal_-4dBm.csv", 20, 10);

        let pair = locate_references(&listing, &ReferenceTags::default()).unwrap();
        assert!(pair.is_none());
    }

    #[test]
    fn test_dual_tag_file_not_high_after_low_found() {
        let listing = FakeListing::default();
        listing.add("cal_-4dBm.csv", 5, 10);
        listing.add("cal_-4_+5.csv", 10, 10);
        listing.add("cal_+5dBm.csv", 30, 10);

        let pair = locate_references(&listing, &ReferenceTags::default())
            .unwrap()
            .unwrap();
        assert_eq!(pair.low, PathBuf::from("cal_-4dBm.csv"));
        assert_eq!(pair.high, PathBuf::from("cal_+5dBm.csv"));
    }

    #[test]
    fn test_missing_high_reference() {
        let listing = FakeListing::default();
        listing.add("cal_-4dBm.csv", 10, 10);

        assert!(locate_references(&listing, &ReferenceTags::default())
            .unwrap()
            .is_none());
    }
}
