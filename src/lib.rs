// Keyboard teleoperation of a serial motor controller

pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod input;
pub mod link;
pub mod logging;
pub mod runtime;
pub mod translator;
pub mod upload;
