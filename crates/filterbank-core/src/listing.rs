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

//! Directory listing collaborator.
//!
//! The controller and the reference locator only need file paths with their
//! modification times and sizes. [`DirectoryListing`] is that narrow seam;
//! [`FsDirectory`] is the filesystem-backed implementation.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::debug;

use crate::error::{FilterbankError, Result};

/// A candidate file as seen by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

impl FileEntry {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, modified: SystemTime, size: u64) -> Self {
        Self {
            path: path.into(),
            modified,
            size,
        }
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Source of candidate files.
pub trait DirectoryListing {
    /// List candidate files. Order is unspecified.
    fn list(&self) -> Result<Vec<FileEntry>>;
}

/// Lists regular files in one directory, optionally filtered by extension.
#[derive(Debug, Clone)]
pub struct FsDirectory {
    dir: PathBuf,
    extension: Option<String>,
}

impl FsDirectory {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: None,
        }
    }

    /// Only list files with this extension (without the leading dot).
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn matches_extension(&self, path: &Path) -> bool {
        match &self.extension {
            Some(wanted) => path
                .extension()
                .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(wanted)),
            None => true,
        }
    }
}

impl FsDirectory {
    /// Turn raw directory entries into candidates, skipping any that cannot be read.
    fn collect_entries(&self, entries: impl IntoIterator<Item = io::Result<fs::DirEntry>>) -> Vec<FileEntry> {
        let mut files = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry in {}: {e}", self.dir.display());
                    continue;
                }
            };
            let path = entry.path();
            if !self.matches_extension(&path) {
                continue;
            }

            // Files can vanish between read_dir and stat while the writer rotates.
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push(FileEntry::new(path, modified, metadata.len()));
        }
        files
    }
}

impl DirectoryListing for FsDirectory {
    fn list(&self) -> Result<Vec<FileEntry>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| FilterbankError::io(&self.dir, e))?;
        Ok(self.collect_entries(entries))
    }
}

/// Newest first: modification time descending, then path descending.
fn newest_first(a: &FileEntry, b: &FileEntry) -> Ordering {
    b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path))
}

/// Drop zero-size files (still being written) and sort newest first.
#[must_use]
pub fn ready_files_newest_first(mut entries: Vec<FileEntry>) -> Vec<FileEntry> {
    entries.retain(|entry| entry.size > 0);
    entries.sort_by(newest_first);
    entries
}

/// The most recent non-empty file, if any.
#[must_use]
pub fn latest_ready_file(entries: Vec<FileEntry>) -> Option<FileEntry> {
    ready_files_newest_first(entries).into_iter().next()
}
