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

//! Keyboard commands read from stdin.
//!
//! One command per line: `p`/`pause`, `r`/`resume`, an empty line or
//! `t`/`toggle` to flip the pause state, and `q`/`quit` to exit.

use filterbank_core::ViewerCommand;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A parsed input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Viewer(ViewerCommand),
    Quit,
}

/// Parse one input line, ignoring case and surrounding whitespace.
pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "t" | "toggle" => Some(Command::Viewer(ViewerCommand::Toggle)),
        "p" | "pause" => Some(Command::Viewer(ViewerCommand::Pause)),
        "r" | "resume" | "live" => Some(Command::Viewer(ViewerCommand::Resume)),
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

/// Forward stdin commands until EOF, `quit`, or cancellation.
pub async fn read_commands(tx: mpsc::Sender<Command>, cancel_token: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let Some(command) = parse_command(&line) else {
                            warn!("Unknown command '{}' (use pause, resume, toggle or quit)", line.trim());
                            continue;
                        };
                        debug!("Command: {:?}", command);
                        if tx.send(command).await.is_err() || command == Command::Quit {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("stdin closed, keyboard commands disabled");
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }

    info!("Command reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("pause"), Some(Command::Viewer(ViewerCommand::Pause)));
        assert_eq!(parse_command("  P \n"), Some(Command::Viewer(ViewerCommand::Pause)));
        assert_eq!(parse_command("Resume"), Some(Command::Viewer(ViewerCommand::Resume)));
        assert_eq!(parse_command("q"), Some(Command::Quit));
    }

    #[test]
    fn test_empty_line_toggles() {
        assert_eq!(parse_command(""), Some(Command::Viewer(ViewerCommand::Toggle)));
        assert_eq!(parse_command("   "), Some(Command::Viewer(ViewerCommand::Toggle)));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(parse_command("rewind"), None);
    }
}
