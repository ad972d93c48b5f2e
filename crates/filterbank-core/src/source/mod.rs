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

//! Sweep file sources.
//!
//! The container format of the acquisition files is owned by the
//! acquisition side. The core only needs typed [`SweepFile`]s, so readers
//! implement [`SweepSource`] and hand back named-field records.

mod csv_file;

pub use csv_file::CsvSweepSource;

use std::path::Path;

use crate::error::Result;
use crate::sweep::SweepFile;

/// Reads one data or reference file into typed records.
pub trait SweepSource {
    /// Read every row of the file at `path`.
    ///
    /// Unreadable rows should be skipped rather than failing the file; an
    /// error means the file as a whole could not be used.
    fn read(&self, path: &Path) -> Result<SweepFile>;
}
