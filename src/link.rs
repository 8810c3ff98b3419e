// Serial link to the motor controller
//
// Outbound: one ASCII byte per command, written and flushed immediately.
// Inbound: newline terminated text, read opportunistically and never required.

use serialport::{self, SerialPort};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::error::{Error, Result};

/// Read timeout configured on the port itself
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

// Sleep between availability checks while waiting for an inbound line
const READ_POLL: Duration = Duration::from_millis(1);

// Unterminated inbound text beyond this is discarded
const MAX_PENDING: usize = 1024;

/// Byte transport the session writes commands to
pub trait Transport {
    /// Write one command byte, or report why it was not delivered
    fn write_command(&mut self, command: Command) -> Result<()>;

    /// Best-effort read of one inbound line, waiting at most `timeout`
    fn read_line(&mut self, timeout: Duration) -> Option<String>;

    /// Release the underlying device. Closing twice is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Serial connection to the controller board
pub struct SerialLink {
    name: String,
    port: Option<Box<dyn SerialPort>>,
    inbound: LineBuffer,
}

impl SerialLink {
    /// Open `port_name` at `baud`.
    ///
    /// Most boards reset when the port opens; callers should give the
    /// firmware a moment to boot before the first write.
    pub fn open(port_name: &str, baud: u32) -> Result<Self> {
        info!("Opening serial link on {} at {} baud", port_name, baud);
        let port = serialport::new(port_name, baud)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()
            .map_err(|source| Error::Connection {
                port: port_name.to_string(),
                source,
            })?;

        Ok(Self::from_port(port_name, port))
    }

    /// Wrap an already opened port
    pub fn from_port(name: &str, port: Box<dyn SerialPort>) -> Self {
        Self {
            name: name.to_string(),
            port: Some(port),
            inbound: LineBuffer::default(),
        }
    }
}

impl Transport for SerialLink {
    fn write_command(&mut self, command: Command) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::LinkClosed)?;
        port.write_all(&[command.as_byte()])
            .and_then(|()| port.flush())
            .map_err(|source| Error::Write { command, source })?;

        debug!("Sent '{}' on {}", command, self.name);
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Option<String> {
        let port = self.port.as_mut()?;
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(raw) = self.inbound.take_line() {
                return decode_line(&raw);
            }

            let available = match port.bytes_to_read() {
                Ok(n) => n as usize,
                Err(e) => {
                    warn!("Cannot query inbound bytes on {}: {}", self.name, e);
                    return None;
                }
            };

            if available == 0 {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return None;
                }
                std::thread::sleep(remaining.min(READ_POLL));
                continue;
            }

            let mut chunk = vec![0u8; available];
            match port.read(&mut chunk) {
                Ok(n) => self.inbound.extend(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => {
                    warn!("Cannot receive from {}: {}", self.name, e);
                    return None;
                }
            }
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Closed serial link on {}", self.name);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        // Never leave the motors running when the link goes away
        if self.is_open() {
            if let Err(e) = self.write_command(Command::Stop) {
                warn!("Failed to stop motors on drop: {}", e);
            }
            self.close();
        }
    }
}

/// Accumulates inbound bytes across reads until a full line is available
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_PENDING && !self.pending.contains(&b'\n') {
            warn!(
                "Dropping {} inbound bytes without a line terminator",
                self.pending.len()
            );
            self.pending.clear();
        }
    }

    /// Remove and return the first complete line, without its terminator
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        Some(line)
    }
}

/// Decode and trim an inbound line; blank or malformed lines yield nothing
fn decode_line(raw: &[u8]) -> Option<String> {
    match std::str::from_utf8(raw) {
        Ok(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Err(e) => {
            warn!("Cannot decode inbound line {:02X?}: {}", raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_keeps_partial_lines() {
        let mut buffer = LineBuffer::default();
        buffer.extend(b"spe");
        assert_eq!(buffer.take_line(), None);

        buffer.extend(b"ed 3\r\nready\n");
        assert_eq!(buffer.take_line().as_deref(), Some(&b"speed 3\r"[..]));
        assert_eq!(buffer.take_line().as_deref(), Some(&b"ready"[..]));
        assert_eq!(buffer.take_line(), None);
    }

    #[test]
    fn test_line_buffer_drops_unterminated_flood() {
        let mut buffer = LineBuffer::default();
        buffer.extend(&[b'x'; 600]);
        assert_eq!(buffer.pending.len(), 600);

        buffer.extend(&[b'x'; 600]);
        assert!(buffer.pending.is_empty());

        buffer.extend(b"ok\n");
        assert_eq!(buffer.take_line().as_deref(), Some(&b"ok"[..]));
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"speed 3\r").as_deref(), Some("speed 3"));
        assert_eq!(decode_line(b"  \r"), None);
        assert_eq!(decode_line(&[0xFF, 0xFE, b'x']), None);
    }

    #[test]
    fn test_open_missing_port() {
        let result = SerialLink::open("/dev/does-not-exist-teleop", 9600);
        assert!(matches!(result, Err(Error::Connection { .. })));
    }

    #[cfg(unix)]
    mod pty {
        use super::*;
        use serialport::TTYPort;

        #[test]
        fn test_write_commands() {
            let (mut board, host) = TTYPort::pair().expect("pty pair");
            let mut link = SerialLink::from_port("pty", Box::new(host));

            link.write_command(Command::Up).unwrap();
            link.write_command(Command::Stop).unwrap();

            let mut received = [0u8; 2];
            board.read_exact(&mut received).unwrap();
            assert_eq!(&received, b"US");
        }

        #[test]
        fn test_read_line() {
            let (mut board, host) = TTYPort::pair().expect("pty pair");
            let mut link = SerialLink::from_port("pty", Box::new(host));

            board.write_all(b"ready\n").unwrap();
            board.flush().unwrap();
            assert_eq!(
                link.read_line(Duration::from_millis(500)).as_deref(),
                Some("ready")
            );
            assert_eq!(link.read_line(Duration::ZERO), None);
        }

        #[test]
        fn test_closed_link() {
            let (_board, host) = TTYPort::pair().expect("pty pair");
            let mut link = SerialLink::from_port("pty", Box::new(host));

            link.close();
            link.close();
            assert!(!link.is_open());
            assert!(matches!(
                link.write_command(Command::Up),
                Err(Error::LinkClosed)
            ));
            assert_eq!(link.read_line(Duration::ZERO), None);
        }
    }
}
