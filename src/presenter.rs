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

//! Text presentation of tick results.
//!
//! The status line is logged whenever it changes, and each tick can
//! optionally be exported as JSON for an external plotter.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use filterbank_core::TickOutput;
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Logs status changes and writes frame exports.
#[derive(Debug, Default)]
pub struct Presenter {
    frame_output: Option<PathBuf>,
    last_status: Option<String>,
    last_pause_status: Option<String>,
}

impl Presenter {
    pub fn new(frame_output: Option<PathBuf>) -> Self {
        Self {
            frame_output,
            ..Default::default()
        }
    }

    /// Handle one tick result. Returns true if the status line changed.
    pub fn present(&mut self, output: &TickOutput) -> bool {
        if self.last_pause_status.as_deref() != Some(output.pause_status.as_str()) {
            info!("[{}]", output.pause_status);
            self.last_pause_status = Some(output.pause_status.clone());
        }

        let changed = self.last_status.as_deref() != Some(output.status.as_str());
        if changed {
            info!("{}", output.status);
            self.last_status = Some(output.status.clone());
        } else {
            debug!("{}", output.status);
        }

        if let Some(frame) = &output.frame {
            if !frame.uncalibrated_channels.is_empty() {
                debug!("Fallback power law used for channels {:?}", frame.uncalibrated_channels);
            }
        }

        if let Some(path) = &self.frame_output {
            if let Err(e) = write_json(path, output) {
                warn!("Failed to write frame to {}: {}", path.display(), e);
            }
        }

        changed
    }
}

/// Write the tick as pretty JSON, replacing the file atomically.
pub fn write_json(path: &Path, output: &TickOutput) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(output)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)
}

/// Present every published tick until cancelled or the sender is dropped.
pub async fn run(
    mut presenter: Presenter,
    mut output_rx: watch::Receiver<Option<TickOutput>>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            changed = output_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let output = output_rx.borrow_and_update().clone();
                if let Some(output) = output {
                    presenter.present(&output);
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }
}
