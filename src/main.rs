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

mod command;
mod config;
mod presenter;
mod viewer;

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::AppConfig;
use log::{error, info};
use presenter::Presenter;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Real-time calibrated spectrum viewer for the 21-channel filterbank
#[derive(Parser, Debug)]
#[command(name = "filterbank-viewer", version, about)]
struct Args {
    /// Load configuration from this file instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory containing sweep files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory containing the low/high power reference files
    #[arg(long)]
    calibration_dir: Option<PathBuf>,

    /// Directory containing filter_NN.s2p S21 measurements
    #[arg(long)]
    s21_dir: Option<PathBuf>,

    /// Poll interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// ADC reference voltage
    #[arg(long)]
    reference_voltage: Option<f64>,

    /// Write each frame as JSON to this file
    #[arg(long)]
    frame_output: Option<PathBuf>,

    /// Persist the effective configuration and continue
    #[arg(long)]
    save_config: bool,

    /// Process the current file once, print it as JSON and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir.clone_from(dir);
        }
        if let Some(dir) = &self.calibration_dir {
            config.calibration_dir.clone_from(dir);
        }
        if let Some(dir) = &self.s21_dir {
            config.s21_dir = Some(dir.clone());
        }
        if let Some(ms) = self.interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(volts) = self.reference_voltage {
            config.reference_voltage = volts;
        }
        if let Some(path) = &self.frame_output {
            config.frame_output = Some(path.clone());
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    args.apply_to(&mut config);

    if args.save_config {
        match &args.config {
            Some(path) => {
                config.save_to(path)?;
                info!("Configuration saved to {}", path.display());
            }
            None => {
                config.save()?;
                if let Ok(path) = AppConfig::get_config_path() {
                    info!("Configuration saved to {}", path.display());
                }
            }
        }
    }

    info!("Data directory: {}", config.data_dir.display());
    info!("Calibration directory: {}", config.calibration_dir.display());
    if let Some(dir) = &config.s21_dir {
        info!("S21 directory: {}", dir.display());
    }

    let mut pipeline = config.build_pipeline();

    if args.once {
        let output = pipeline.tick();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(&config, pipeline));
    // The stdin reader may still be parked in a blocking read
    runtime.shutdown_timeout(Duration::from_millis(100));
    Ok(())
}

async fn run(config: &AppConfig, pipeline: filterbank_core::Pipeline) {
    let cancel_token = CancellationToken::new();
    let (command_tx, command_rx) = mpsc::channel(16);
    let (output_tx, output_rx) = watch::channel(None);

    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, shutting down");
                ctrl_c_token.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    tokio::spawn(command::read_commands(command_tx, cancel_token.clone()));

    let presenter_handle = tokio::spawn(presenter::run(
        Presenter::new(config.frame_output.clone()),
        output_rx,
        cancel_token.clone(),
    ));

    info!("Type 'pause', 'resume', an empty line to toggle, or 'quit'");
    viewer::run(
        pipeline,
        config.poll_interval(),
        command_rx,
        output_tx,
        cancel_token.clone(),
    )
    .await;

    cancel_token.cancel();
    if let Err(e) = presenter_handle.await {
        error!("Presenter task failed: {}", e);
    }
}
