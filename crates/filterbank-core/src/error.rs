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

//! Error types for filterbank processing.
//!
//! Only file-level failures surface as errors. Per-row, per-line and
//! per-channel problems are logged and skipped by the component that hits
//! them, so a single bad input never aborts a whole tick.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FilterbankError>;

/// Errors raised while reading sweep files, correction tables or directories.
#[derive(Debug, Error)]
pub enum FilterbankError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("missing required column '{column}' in {path}")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("malformed row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },
}

impl FilterbankError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
