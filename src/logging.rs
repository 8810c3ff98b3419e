// Log output that stays readable while the terminal is in raw mode
//
// Raw mode turns off the terminal's newline translation, so every "\n" the
// formatter emits is written as "\r\n".

use std::io::{self, Write};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Install the global subscriber (set RUST_LOG=info or debug)
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with_writer(RawStderr)
        .init(); // installs the subscriber globally
}

/// Stderr with carriage returns added before every newline
pub struct RawStderr;

impl<'a> MakeWriter<'a> for RawStderr {
    type Writer = CrlfWriter<io::StderrLock<'static>>;

    fn make_writer(&'a self) -> Self::Writer {
        CrlfWriter(io::stderr().lock())
    }
}

/// Writes `\n` as `\r\n`
pub struct CrlfWriter<W>(pub W);

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for (i, chunk) in buf.split(|&b| b == b'\n').enumerate() {
            if i > 0 {
                self.0.write_all(b"\r\n")?;
            }
            self.0.write_all(chunk)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}
