//! Outbound half of the link.
//!
//! [`CommandSink`] is the seam between the dispatcher and the wire: the
//! dispatcher only ever talks to the trait, so ticks can be exercised
//! against an in-memory sink.  [`Outbound`] is the socket-backed
//! implementation.

use std::io::{BufWriter, Write};
use std::net::TcpStream;
use std::sync::Mutex;

use rcdrive_types::{Command, ConnectionError};
use tracing::trace;

use crate::protocol;
use crate::worker::lock;

/// Something that can put a [`Command`] on the wire.
pub trait CommandSink: Send + Sync {
    /// Encode and send `command` as one line.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Write`] when the line could not be written
    /// and flushed.
    fn send(&self, command: &Command) -> Result<(), ConnectionError>;
}

/// Line writer over the socket's output direction.  Writes from the
/// connection manager (handshake, close) and the dispatcher are serialised
/// by an internal lock so lines never interleave.
pub struct Outbound<W: Write + Send = TcpStream> {
    writer: Mutex<BufWriter<W>>,
}

impl<W: Write + Send> Outbound<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
        }
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut writer = lock(&self.writer);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl<W: Write + Send> CommandSink for Outbound<W> {
    fn send(&self, command: &Command) -> Result<(), ConnectionError> {
        let line = protocol::encode(command);
        self.write_line(&line)
            .map_err(|e| ConnectionError::Write(e.to_string()))?;
        trace!(line = %line, "sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcdrive_types::{SteerAngle, Throttle};
    use std::io;
    use std::sync::Arc;

    /// Writer that appends into a shared buffer.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
        }
    }

    #[test]
    fn sends_newline_terminated_lines() {
        let buf = SharedBuf::default();
        let outbound = Outbound::new(buf.clone());

        outbound.send(&Command::Handshake).unwrap();
        outbound.send(&Command::Steer(SteerAngle::new(45))).unwrap();
        outbound.send(&Command::Throttle(Throttle::Reverse)).unwrap();

        let written = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written, "HANDSHAKE\nSTEER 45\nTHROTTLE REVERSE\n");
    }

    #[test]
    fn write_failure_maps_to_write_error() {
        let outbound = Outbound::new(BrokenPipe);
        let err = outbound.send(&Command::Heartbeat).unwrap_err();
        assert!(matches!(err, ConnectionError::Write(_)));
    }
}
