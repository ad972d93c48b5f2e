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

//! Poll loop driving the pipeline.
//!
//! A single task owns the [`Pipeline`]. Ticks run on a tokio interval with
//! [`MissedTickBehavior::Skip`], so a tick that overruns the poll interval
//! delays the next one instead of overlapping it. Results are published on
//! a watch channel; the presenter only ever sees the latest one.

use std::time::{Duration, Instant};

use filterbank_core::{Pipeline, TickOutput};
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::command::Command;

/// Run ticks until cancelled or a quit command arrives.
///
/// Returns the pipeline so callers can inspect the final controller state.
pub async fn run(
    mut pipeline: Pipeline,
    poll_interval: Duration,
    mut commands: mpsc::Receiver<Command>,
    output_tx: watch::Sender<Option<TickOutput>>,
    cancel_token: CancellationToken,
) -> Pipeline {
    info!("Polling every {} ms", poll_interval.as_millis());

    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // Shutdown and commands are checked before a pending tick
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                info!("Viewer stopped");
                break;
            }

            Some(command) = commands.recv() => {
                match command {
                    Command::Viewer(command) => {
                        pipeline.apply(command);
                        info!(
                            "{}",
                            if pipeline.controller().is_paused() { "Paused" } else { "Live" }
                        );
                        // Refresh right away so the pause state is visible
                        interval.reset_immediately();
                    }
                    Command::Quit => {
                        info!("Quit requested");
                        cancel_token.cancel();
                        break;
                    }
                }
            }

            _ = interval.tick() => {
                let started = Instant::now();
                // Directory scans and file parsing are blocking
                let output = tokio::task::block_in_place(|| pipeline.tick());
                let elapsed = started.elapsed();
                if elapsed > poll_interval {
                    warn!("Tick took {} ms, longer than the poll interval", elapsed.as_millis());
                } else {
                    debug!("Tick took {} ms", elapsed.as_millis());
                }
                output_tx.send_replace(Some(output));
            }
        }
    }

    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use filterbank_core::pipeline::NO_DATA_STATUS;
    use filterbank_core::{PipelineConfig, ViewerCommand};
    use tempfile::TempDir;

    fn empty_pipeline(dir: &TempDir) -> Pipeline {
        Pipeline::from_dirs(PipelineConfig::default(), dir.path(), dir.path(), "csv")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_publishes_ticks() {
        let dir = TempDir::new().unwrap();
        let (_command_tx, command_rx) = mpsc::channel(4);
        let (output_tx, mut output_rx) = watch::channel(None);
        let cancel_token = CancellationToken::new();

        let handle = tokio::spawn(run(
            empty_pipeline(&dir),
            Duration::from_millis(20),
            command_rx,
            output_tx,
            cancel_token.clone(),
        ));

        output_rx.changed().await.unwrap();
        let output = output_rx.borrow_and_update().clone().unwrap();
        assert_eq!(output.status, NO_DATA_STATUS);
        assert!(output.frame.is_none());

        cancel_token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_quit_stops_before_pending_tick() {
        let dir = TempDir::new().unwrap();
        let (command_tx, command_rx) = mpsc::channel(4);
        let (output_tx, output_rx) = watch::channel(None);
        let cancel_token = CancellationToken::new();

        // Both commands are queued while the first tick is already due
        command_tx.send(Command::Viewer(ViewerCommand::Pause)).await.unwrap();
        command_tx.send(Command::Quit).await.unwrap();

        let pipeline = tokio::time::timeout(
            Duration::from_secs(5),
            run(
                empty_pipeline(&dir),
                Duration::from_secs(60),
                command_rx,
                output_tx,
                cancel_token.clone(),
            ),
        )
        .await
        .unwrap();

        assert!(pipeline.controller().is_paused());
        assert!(cancel_token.is_cancelled());
        assert!(output_rx.borrow().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_commands_reach_controller() {
        let dir = TempDir::new().unwrap();
        let (command_tx, command_rx) = mpsc::channel(4);
        let (output_tx, _output_rx) = watch::channel(None);
        let cancel_token = CancellationToken::new();

        let handle = tokio::spawn(run(
            empty_pipeline(&dir),
            Duration::from_secs(60),
            command_rx,
            output_tx,
            cancel_token.clone(),
        ));

        command_tx.send(Command::Viewer(ViewerCommand::Pause)).await.unwrap();
        command_tx.send(Command::Quit).await.unwrap();

        let pipeline = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(pipeline.controller().is_paused());
        assert!(cancel_token.is_cancelled());
    }
}
