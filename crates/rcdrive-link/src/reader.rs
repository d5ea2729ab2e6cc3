//! Inbound reader.
//!
//! A dedicated thread reads newline-delimited lines from the vehicle and
//! reports the recognised control messages to an [`InboundHandler`]:
//!
//! * `HANDSHAKE` → [`InboundHandler::on_handshake_ack`]
//! * `CLOSE` → [`InboundHandler::on_peer_close`], then the loop stops
//! * end-of-stream or a read error → [`InboundHandler::on_read_failure`],
//!   then the loop stops
//!
//! Lines with more than two tokens are reported through
//! [`InboundHandler::on_discarded`]; any other line is ignored.
//!
//! The socket is expected to carry a read timeout.  A timeout is not a
//! failure: the loop checks its stop flag and resumes, keeping any partial
//! line it has already buffered.

use std::io::{self, BufRead, BufReader, ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace};

use crate::protocol::{self, Control, Inbound};
use crate::worker::join_unless_current;

/// Receiver of what the inbound reader observes.
pub trait InboundHandler: Send + Sync {
    fn on_handshake_ack(&self);

    fn on_peer_close(&self);

    /// `error` is `None` on a clean end-of-stream.
    fn on_read_failure(&self, error: Option<&io::Error>);

    fn on_discarded(&self, _line: &str) {}
}

/// Handle to a running reader thread.
pub struct InboundReader {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl InboundReader {
    /// Start reading `source` on a new thread.
    pub fn spawn<R>(source: R, handler: Arc<dyn InboundHandler>) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name("rcdrive-inbound".to_string())
            .spawn(move || {
                let outcome = read_loop(BufReader::new(source), &flag, handler.as_ref());
                debug!(?outcome, "inbound reader stopped");
            })?;
        Ok(Self { stop, handle })
    }

    /// Ask the loop to stop at its next wake-up.  Closing the socket's read
    /// direction afterwards wakes it immediately.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request a stop and wait for the thread, unless called from the reader
    /// thread itself.
    pub fn join(self) {
        self.request_stop();
        join_unless_current(self.handle);
    }
}

/// Why [`read_loop`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Stopped,
    PeerClosed,
    EndOfStream,
    Failed,
}

/// The reader's loop, run on whatever thread calls it.
pub fn read_loop<R: BufRead>(
    mut source: R,
    stop: &AtomicBool,
    handler: &dyn InboundHandler,
) -> ReadOutcome {
    let mut buf = Vec::new();
    loop {
        if stop.load(Ordering::SeqCst) {
            return ReadOutcome::Stopped;
        }
        match source.read_until(b'\n', &mut buf) {
            Ok(0) => {
                // A partial line may be left over from a timed-out read.
                if !buf.is_empty() && dispatch_line(&buf, handler) {
                    return ReadOutcome::PeerClosed;
                }
                if stop.load(Ordering::SeqCst) {
                    return ReadOutcome::Stopped;
                }
                handler.on_read_failure(None);
                return ReadOutcome::EndOfStream;
            }
            Ok(_) => {
                let closed = dispatch_line(&buf, handler);
                buf.clear();
                if closed {
                    return ReadOutcome::PeerClosed;
                }
            }
            Err(e) if is_poll_wakeup(e.kind()) => {
                trace!("inbound read timed out; polling stop flag");
            }
            Err(e) => {
                if stop.load(Ordering::SeqCst) {
                    return ReadOutcome::Stopped;
                }
                handler.on_read_failure(Some(&e));
                return ReadOutcome::Failed;
            }
        }
    }
}

/// Read timeouts surface as `WouldBlock` or `TimedOut` depending on the
/// platform.
fn is_poll_wakeup(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

/// Returns `true` when the line was a `CLOSE`.
fn dispatch_line(raw: &[u8], handler: &dyn InboundHandler) -> bool {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\r', '\n']);
    match protocol::parse_inbound(line) {
        Inbound::Control(Control::Handshake) => {
            handler.on_handshake_ack();
            false
        }
        Inbound::Control(Control::Close) => {
            handler.on_peer_close();
            true
        }
        Inbound::Malformed => {
            handler.on_discarded(line);
            false
        }
        Inbound::Ignored => {
            trace!(line = %line, "ignoring inbound line");
            false
        }
    }
}
