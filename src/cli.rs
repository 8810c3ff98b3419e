use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::error::Result;
use crate::translator::Policy;

/// Drive the motor controller from the keyboard over a serial link.
///
/// Compiles and uploads the controller firmware, then forwards arrow keys as
/// single-byte motion commands until Escape or Ctrl+C.
#[derive(Debug, Parser)]
#[command(name = "motor-teleop", version)]
pub struct Opts {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial device of the controller
    #[arg(short, long)]
    pub port: Option<String>,

    #[arg(long)]
    pub baud: Option<u32>,

    /// Fully qualified board name passed to arduino-cli
    #[arg(long)]
    pub board: Option<String>,

    /// Firmware sketch directory
    #[arg(long)]
    pub sketch_path: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub policy: Option<Policy>,

    /// Input polling interval in milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Use the firmware already on the board
    #[arg(long)]
    pub skip_upload: bool,
}

impl Opts {
    /// Defaults, then the config file, then flags
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(baud) = self.baud {
            config.baud = baud;
        }
        if let Some(board) = self.board {
            config.board = board;
        }
        if let Some(sketch_path) = self.sketch_path {
            config.sketch_path = sketch_path;
        }
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        if self.tick_ms.is_some() {
            config.tick_ms = self.tick_ms;
        }
        config.skip_upload |= self.skip_upload;

        Ok(config)
    }
}
