use thiserror::Error;

use crate::command::Command;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while uploading firmware or driving the link
#[derive(Debug, Error)]
pub enum Error {
    #[error("{stage} failed with {status}")]
    Upload {
        stage: &'static str,
        status: std::process::ExitStatus,
    },

    #[error("Could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open serial port {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to write '{command}' to the link: {source}")]
    Write {
        command: Command,
        #[source]
        source: std::io::Error,
    },

    #[error("Serial link is closed")]
    LinkClosed,

    #[error("Terminal error: {0}")]
    Terminal(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Unknown command byte 0x{0:02X}")]
    UnknownCommandByte(u8),
}
