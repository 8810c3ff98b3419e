// Serial port, board, firmware and loop timing
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::translator::Policy;

// Serial device the controller enumerates as
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

pub const DEFAULT_BAUD: u32 = 1_000_000;

// Fully qualified board name for arduino-cli
pub const DEFAULT_BOARD: &str = "arduino:avr:mega";

pub const DEFAULT_SKETCH_PATH: &str = "/home/bee/Arduino/receive_motors";

pub const DEFAULT_CLI: &str = "arduino-cli";

// Loop tick per policy
pub const TOGGLE_TICK_MS: u64 = 50;
pub const HOLD_TICK_MS: u64 = 10;

// The board resets when the port opens or after an upload
pub const SETTLE_MS: u64 = 2000;

// Without release reporting, a pressed key counts as held until the OS
// starts auto-repeating it (typically 250-600 ms after the press)...
pub const REPEAT_DELAY_MS: u64 = 650;

// ...and after that for this long past its latest repeat
pub const HOLD_TIMEOUT_MS: u64 = 100;

/// Session configuration, passed explicitly to every stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: String,
    pub baud: u32,
    pub board: String,
    pub sketch_path: PathBuf,
    pub cli: String,
    pub policy: Policy,
    /// Defaults to the policy's own tick when unset
    pub tick_ms: Option<u64>,
    pub settle_ms: u64,
    pub repeat_delay_ms: u64,
    pub hold_timeout_ms: u64,
    /// Go straight to the control loop with whatever firmware is flashed
    pub skip_upload: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud: DEFAULT_BAUD,
            board: DEFAULT_BOARD.to_string(),
            sketch_path: PathBuf::from(DEFAULT_SKETCH_PATH),
            cli: DEFAULT_CLI.to_string(),
            policy: Policy::default(),
            tick_ms: None,
            settle_ms: SETTLE_MS,
            repeat_delay_ms: REPEAT_DELAY_MS,
            hold_timeout_ms: HOLD_TIMEOUT_MS,
            skip_upload: false,
        }
    }
}

impl Config {
    /// Read a JSON config file; missing fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.baud == 0 {
            return Err(Error::Config("baud rate must be non-zero".to_string()));
        }
        if self.tick_ms == Some(0) {
            return Err(Error::Config("tick must be at least 1 ms".to_string()));
        }
        if self.port.is_empty() {
            return Err(Error::Config("serial port path is empty".to_string()));
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        let default = match self.policy {
            Policy::Toggle => TOGGLE_TICK_MS,
            Policy::Hold => HOLD_TICK_MS,
        };
        Duration::from_millis(self.tick_ms.unwrap_or(default))
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn repeat_delay(&self) -> Duration {
        Duration::from_millis(self.repeat_delay_ms)
    }

    pub fn hold_timeout(&self) -> Duration {
        Duration::from_millis(self.hold_timeout_ms)
    }
}
