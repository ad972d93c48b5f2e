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

//! Live/paused file selection.
//!
//! Each poll tick asks the controller which data file to render. While live
//! it is always the newest complete file. Pausing freezes the view on
//! whatever was newest at the first tick after the pause command, not at the
//! moment of the command itself.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::listing::{latest_ready_file, DirectoryListing};

/// Controller state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewerMode {
    #[default]
    Live,
    /// `frozen` is filled on the first tick observed in this state.
    Paused { frozen: Option<PathBuf> },
}

/// Commands accepted from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerCommand {
    Pause,
    Resume,
    /// Pause when live, resume when paused.
    Toggle,
}

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    /// File to render, or `None` when there is nothing to show.
    pub path: Option<PathBuf>,
    pub paused: bool,
}

/// Poll-driven state machine choosing the file to render.
#[derive(Debug, Default)]
pub struct LiveController {
    mode: ViewerMode,
}

impl LiveController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn mode(&self) -> &ViewerMode {
        &self.mode
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        matches!(self.mode, ViewerMode::Paused { .. })
    }

    #[must_use]
    pub fn frozen_file(&self) -> Option<&Path> {
        match &self.mode {
            ViewerMode::Paused { frozen } => frozen.as_deref(),
            ViewerMode::Live => None,
        }
    }

    pub fn apply(&mut self, command: ViewerCommand) {
        match command {
            ViewerCommand::Pause => self.pause(),
            ViewerCommand::Resume => self.resume(),
            ViewerCommand::Toggle if self.is_paused() => self.resume(),
            ViewerCommand::Toggle => self.pause(),
        }
    }

    /// Enter the paused state. Pausing while paused keeps the frozen file.
    pub fn pause(&mut self) {
        if matches!(self.mode, ViewerMode::Live) {
            info!("Viewer paused");
            self.mode = ViewerMode::Paused { frozen: None };
        }
    }

    /// Return to live selection, dropping any frozen file.
    pub fn resume(&mut self) {
        if self.is_paused() {
            info!("Viewer resumed");
        }
        self.mode = ViewerMode::Live;
    }

    /// Resolve the file for this tick.
    pub fn tick(&mut self, listing: &dyn DirectoryListing) -> FileSelection {
        match &mut self.mode {
            ViewerMode::Live => FileSelection {
                path: latest_path(listing),
                paused: false,
            },
            ViewerMode::Paused { frozen: Some(path) } => FileSelection {
                path: Some(path.clone()),
                paused: true,
            },
            ViewerMode::Paused { frozen } => {
                let latest = latest_path(listing);
                if let Some(path) = &latest {
                    info!("Freezing view on {}", path.display());
                    *frozen = Some(path.clone());
                }
                FileSelection {
                    path: latest,
                    paused: true,
                }
            }
        }
    }
}

fn latest_path(listing: &dyn DirectoryListing) -> Option<PathBuf> {
    match listing.list() {
        Ok(entries) => {
            let latest = latest_ready_file(entries).map(|entry| entry.path);
            debug!("Latest data file: {latest:?}");
            latest
        }
        Err(e) => {
            warn!("Failed to list data directory: {e}");
            None
        }
    }
}
