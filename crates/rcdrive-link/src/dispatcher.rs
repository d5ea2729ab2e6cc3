//! Outbound dispatcher.
//!
//! [`Dispatcher::tick`] is one dispatcher tick: send the oldest queued
//! command, or a heartbeat when nothing is queued, so the vehicle sees
//! traffic at least once per period.
//!
//! [`Ticker`] fires those ticks from a dedicated thread at a fixed rate and
//! can be stopped deterministically.  Tests drive [`Dispatcher::tick`]
//! directly instead.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rcdrive_types::{Command, ConnectionError};
use tracing::{debug, warn};

use crate::outbound::CommandSink;
use crate::queue::CommandQueue;
use crate::worker::join_unless_current;

/// Drains a [`CommandQueue`] into a [`CommandSink`], one command per tick.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<CommandQueue>,
    sink: Arc<dyn CommandSink>,
}

impl Dispatcher {
    pub fn new(queue: Arc<CommandQueue>, sink: Arc<dyn CommandSink>) -> Self {
        Self { queue, sink }
    }

    /// Send the front of the queue, or [`Command::Heartbeat`] if it is empty.
    /// Returns the command that went out.
    ///
    /// # Errors
    ///
    /// Propagates the sink's [`ConnectionError::Write`].  The tick does not
    /// retry.
    pub fn tick(&self) -> Result<Command, ConnectionError> {
        // Single consumer: nothing can drain the queue between the check and
        // the pop.
        let command = if self.queue.is_empty() {
            Command::Heartbeat
        } else {
            self.queue.pop_front()?
        };
        self.sink.send(&command)?;
        Ok(command)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Ticker
// ────────────────────────────────────────────────────────────────────────────

/// Background thread running [`Dispatcher::tick`] every `period`.
///
/// The first tick fires immediately.  Deadlines are computed from the start
/// instant so scheduling jitter does not accumulate; ticks missed while a
/// write was blocked are skipped rather than fired in a burst.
pub struct Ticker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Start ticking.  On the first failed tick `on_failure` is invoked from
    /// the ticker thread and the thread exits.
    pub fn spawn<F>(
        dispatcher: Dispatcher,
        period: Duration,
        on_failure: F,
    ) -> std::io::Result<Self>
    where
        F: FnOnce(ConnectionError) + Send + 'static,
    {
        let (stop, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("rcdrive-dispatch".to_string())
            .spawn(move || {
                let mut next = Instant::now();
                loop {
                    let wait = next.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        // Stop requested, or the Ticker was dropped.
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if let Err(e) = dispatcher.tick() {
                        warn!(error = %e, "dispatcher tick failed");
                        on_failure(e);
                        break;
                    }
                    next += period;
                    let now = Instant::now();
                    if next < now {
                        next = now;
                    }
                }
                debug!("dispatcher stopped");
            })?;
        Ok(Self { stop, handle })
    }

    /// Stop ticking and wait for the thread, unless called from the ticker
    /// thread itself.
    pub fn stop(self) {
        let _ = self.stop.send(());
        join_unless_current(self.handle);
    }
}
