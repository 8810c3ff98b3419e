// Command alphabet sent to the motor controller
//
// Wire format is one ASCII byte per command, no framing and no checksum.

use std::fmt;

use crate::error::Error;

/// A single motion or speed instruction for the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Up,
    Down,
    Left,
    Right,
    Home,
    Stop,
    SpeedUp,
    SpeedDown,
}

impl Command {
    /// Every command, in wire table order
    pub const ALL: [Command; 8] = [
        Command::Up,
        Command::Down,
        Command::Left,
        Command::Right,
        Command::Home,
        Command::Stop,
        Command::SpeedUp,
        Command::SpeedDown,
    ];

    /// ASCII byte written to the serial link
    pub fn as_byte(self) -> u8 {
        match self {
            Command::Up => b'U',
            Command::Down => b'D',
            Command::Left => b'L',
            Command::Right => b'R',
            Command::Home => b'H',
            Command::Stop => b'S',
            Command::SpeedUp => b'F',
            Command::SpeedDown => b'W',
        }
    }

    /// Motion commands change what the motors are doing; speed commands only
    /// adjust the rate of the current motion.
    pub fn is_motion(self) -> bool {
        !matches!(self, Command::SpeedUp | Command::SpeedDown)
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Command::ALL
            .into_iter()
            .find(|cmd| cmd.as_byte() == byte)
            .ok_or(Error::UnknownCommandByte(byte))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_byte() as char)
    }
}
