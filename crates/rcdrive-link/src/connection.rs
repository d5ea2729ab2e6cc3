//! [`Connection`] – the vehicle link state machine.
//!
//! ```text
//! Disconnected ──connect()──▶ Handshaking ──HANDSHAKE ack──▶ Active
//!      ▲                           │                          │
//!      └──────── disconnect() / peer CLOSE / read or write failure
//! ```
//!
//! While a link exists two workers run next to the caller's thread:
//!
//! * the [`InboundReader`] thread, which reports the vehicle's handshake ack
//!   and close request back into the connection, and
//! * once the link is active, the [`Ticker`] thread, which sends one queued
//!   command (or a heartbeat) per heartbeat period.
//!
//! The connection subscribes to the shared [`Vehicle`]; every change of the
//! operator's intent is diffed against what was last queued and turned into
//! at most one outbound command.
//!
//! Any of these threads may tear the link down.  Teardown is idempotent:
//! only the first caller closes the socket, and stale callbacks from an
//! earlier session are ignored.
//!
//! # Example
//!
//! ```no_run
//! use rcdrive_link::{Connection, LinkConfig};
//! use rcdrive_types::Throttle;
//! use rcdrive_vehicle::Vehicle;
//!
//! let vehicle = Vehicle::new();
//! let link = Connection::new(vehicle.clone(), LinkConfig::default());
//! link.connect("192.168.4.1", "5000")?;
//!
//! // ... once the vehicle acknowledged the handshake:
//! vehicle.set_throttle(Throttle::Forward);
//!
//! link.disconnect();
//! # Ok::<(), rcdrive_types::ConnectionError>(())
//! ```

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, Weak};

use rcdrive_types::{
    Command, ConnectionError, ConnectionState, DisconnectReason, LinkEvent, LinkEventPayload,
    SteerAngle, Throttle,
};
use rcdrive_vehicle::{SubscriptionId, Vehicle, VehicleSnapshot};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::dispatcher::{Dispatcher, Ticker};
use crate::observer::{LinkObserver, TracingObserver};
use crate::outbound::{CommandSink, Outbound};
use crate::protocol;
use crate::queue::CommandQueue;
use crate::reader::{InboundHandler, InboundReader};
use crate::worker::lock;

const SOURCE: &str = "rcdrive-link::connection";

/// Handle to the single vehicle link of a session.  Clone it cheaply – all
/// clones drive the same link.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    me: Weak<Inner>,
    vehicle: Vehicle,
    config: LinkConfig,
    observer: Arc<dyn LinkObserver>,
    subscription: Mutex<Option<SubscriptionId>>,
    link: Mutex<Link>,
}

#[derive(Default)]
struct Link {
    state: ConnectionState,
    session: Option<Session>,
    next_session_id: u64,
    /// Last values queued for the vehicle, used for diff-only emission.
    last_throttle: Option<Throttle>,
    last_steer: Option<SteerAngle>,
    /// Set while activation resets the vehicle; vehicle notifications are
    /// not diffed until the reset has finished.
    settling: bool,
}

impl Link {
    fn is_current(&self, session_id: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == session_id)
    }
}

/// Resources owned by one open socket.
struct Session {
    id: u64,
    peer: SocketAddr,
    stream: TcpStream,
    outbound: Arc<Outbound>,
    queue: Arc<CommandQueue>,
    reader: Option<InboundReader>,
    ticker: Option<Ticker>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("peer", &self.peer_addr())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Connection {
    /// Create a disconnected link bound to `vehicle`, reporting to a
    /// [`TracingObserver`].
    pub fn new(vehicle: Vehicle, config: LinkConfig) -> Self {
        Self::with_observer(vehicle, config, Arc::new(TracingObserver))
    }

    /// Like [`new`][Self::new] with a caller-supplied observability sink.
    pub fn with_observer(
        vehicle: Vehicle,
        config: LinkConfig,
        observer: Arc<dyn LinkObserver>,
    ) -> Self {
        let inner = Arc::new_cyclic(|me| Inner {
            me: me.clone(),
            vehicle,
            config,
            observer,
            subscription: Mutex::new(None),
            link: Mutex::new(Link::default()),
        });

        let weak = Arc::downgrade(&inner);
        let id = inner.vehicle.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.vehicle_changed();
            }
        });
        *lock(&inner.subscription) = Some(id);

        Self { inner }
    }

    // -----------------------------------------------------------------------
    // Collaborator-facing API
    // -----------------------------------------------------------------------

    /// Open the link to `address:port` and send the handshake.
    ///
    /// On success the link is [`ConnectionState::Handshaking`]; it becomes
    /// active once the vehicle acknowledges.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::InvalidPort`] – `port` is not an integer in `0..=65535`.
    /// - [`ConnectionError::HostResolution`] – `address` does not resolve.
    /// - [`ConnectionError::SocketOpen`] – the TCP connection could not be opened.
    /// - [`ConnectionError::StreamSetup`] – socket options or worker threads failed.
    /// - [`ConnectionError::Write`] – the handshake could not be sent; the
    ///   link is torn down again.
    /// - [`ConnectionError::AlreadyConnected`] – a link is already open.
    pub fn connect(&self, address: &str, port: &str) -> Result<(), ConnectionError> {
        let port = protocol::validate_port(port)?;
        if self.state() != ConnectionState::Disconnected {
            return Err(ConnectionError::AlreadyConnected);
        }
        let peer = protocol::resolve(address, port)?;
        let stream = TcpStream::connect_timeout(&peer, self.inner.config.connect_timeout)
            .map_err(|e| ConnectionError::SocketOpen {
                address: peer.to_string(),
                details: e.to_string(),
            })?;
        info!(peer = %peer, "socket open");
        self.inner.open(stream, peer)
    }

    /// Tear the link down.  No-op when already disconnected; safe to call
    /// from any thread, any number of times.
    pub fn disconnect(&self) {
        self.inner.terminate(None, DisconnectReason::Local);
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.link).state
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        lock(&self.inner.link).session.as_ref().map(|s| s.peer)
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.inner.vehicle
    }

    // -----------------------------------------------------------------------
    // Callbacks (normally driven by the reader and the vehicle subscription)
    // -----------------------------------------------------------------------

    /// The vehicle acknowledged the handshake on the current link.  Only has
    /// an effect while [`ConnectionState::Handshaking`].
    pub fn on_handshake_ack(&self) {
        let current = lock(&self.inner.link).session.as_ref().map(|s| s.id);
        if let Some(id) = current {
            self.inner.handshake_acked(id);
        }
    }

    /// Re-evaluate the vehicle intent against what was last queued.
    pub fn on_vehicle_state_changed(&self) {
        self.inner.vehicle_changed();
    }
}

impl Inner {
    fn emit(&self, payload: LinkEventPayload) {
        self.observer.on_event(&LinkEvent::new(SOURCE, payload));
    }

    fn open(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), ConnectionError> {
        let setup = |e: io::Error| ConnectionError::StreamSetup(e.to_string());
        stream.set_nodelay(true).map_err(setup)?;
        stream
            .set_read_timeout(Some(self.config.read_poll_interval))
            .map_err(setup)?;
        stream
            .set_write_timeout(Some(self.config.write_timeout))
            .map_err(setup)?;
        let read_half = stream.try_clone().map_err(setup)?;
        let write_half = stream.try_clone().map_err(setup)?;
        let outbound = Arc::new(Outbound::new(write_half));

        let session_id = {
            let mut link = lock(&self.link);
            if link.state != ConnectionState::Disconnected {
                return Err(ConnectionError::AlreadyConnected);
            }
            let id = link.next_session_id;
            link.next_session_id += 1;

            let handler = Arc::new(SessionHandler {
                inner: self.me.clone(),
                session_id: id,
            });
            let reader = InboundReader::spawn(read_half, handler).map_err(setup)?;

            link.session = Some(Session {
                id,
                peer,
                stream,
                outbound: outbound.clone(),
                queue: Arc::new(CommandQueue::new()),
                reader: Some(reader),
                ticker: None,
            });
            link.last_throttle = None;
            link.last_steer = None;
            link.settling = false;
            link.state = ConnectionState::Handshaking;
            id
        };
        self.emit(LinkEventPayload::StateChanged {
            from: ConnectionState::Disconnected,
            to: ConnectionState::Handshaking,
        });

        // The state is Handshaking before the handshake leaves, so an ack
        // can never arrive ahead of it.
        if let Err(e) = outbound.send(&Command::Handshake) {
            warn!(peer = %peer, error = %e, "handshake send failed");
            self.terminate(Some(session_id), DisconnectReason::WriteFailed);
            return Err(e);
        }
        debug!(peer = %peer, session = session_id, "handshake sent");
        Ok(())
    }

    fn handshake_acked(&self, session_id: u64) {
        {
            let mut link = lock(&self.link);
            if !link.is_current(session_id) || link.state != ConnectionState::Handshaking {
                debug!(session = session_id, state = ?link.state, "ignoring handshake ack");
                return;
            }
            link.state = ConnectionState::Active;
            link.settling = true;
            // The neutral state goes out first, whatever the vehicle held
            // while the handshake was pending.
            if let Some(session) = link.session.as_ref() {
                session.queue.push(Command::Throttle(Throttle::Neutral));
                session.queue.push(Command::Steer(SteerAngle::default()));
            }
            link.last_throttle = Some(Throttle::Neutral);
            link.last_steer = Some(SteerAngle::default());
        }
        self.emit(LinkEventPayload::StateChanged {
            from: ConnectionState::Handshaking,
            to: ConnectionState::Active,
        });

        self.vehicle.set_active(true);
        self.vehicle.reset();

        {
            let mut link = lock(&self.link);
            if !link.is_current(session_id) {
                return;
            }
            link.settling = false;
            // Operator input that arrived during the reset was not diffed.
            let snapshot = self.vehicle.snapshot();
            while queue_change(&mut link, &snapshot) {}
        }

        if let Err(e) = self.start_ticker(session_id) {
            warn!(error = %e, "could not start dispatcher");
            self.terminate(Some(session_id), DisconnectReason::WriteFailed);
        }
    }

    fn start_ticker(&self, session_id: u64) -> Result<(), ConnectionError> {
        let mut link = lock(&self.link);
        if !link.is_current(session_id) || link.state != ConnectionState::Active {
            return Ok(());
        }
        let Some(session) = link.session.as_mut() else {
            return Ok(());
        };
        if session.ticker.is_some() {
            return Ok(());
        }
        let dispatcher = Dispatcher::new(session.queue.clone(), session.outbound.clone());
        let me = self.me.clone();
        let ticker = Ticker::spawn(dispatcher, self.config.heartbeat_period, move |_| {
            if let Some(inner) = me.upgrade() {
                inner.terminate(Some(session_id), DisconnectReason::WriteFailed);
            }
        })
        .map_err(|e| ConnectionError::StreamSetup(e.to_string()))?;
        session.ticker = Some(ticker);
        info!(period_ms = self.config.heartbeat_period.as_millis() as u64, "dispatcher started");
        Ok(())
    }

    /// Diff the vehicle's current intent against what was last queued.  The
    /// vehicle is read under the link lock, so notifications delivered out of
    /// order still converge on the latest state.
    fn vehicle_changed(&self) {
        let mut link = lock(&self.link);
        let state = link.state;
        match state {
            ConnectionState::Disconnected => {}
            ConnectionState::Handshaking => {
                let Some(session) = link.session.as_ref() else {
                    return;
                };
                // Not acknowledged yet: retry by sending the handshake again.
                let outbound = session.outbound.clone();
                let session_id = session.id;
                drop(link);
                if let Err(e) = outbound.send(&Command::Handshake) {
                    warn!(error = %e, "handshake resend failed");
                    self.terminate(Some(session_id), DisconnectReason::WriteFailed);
                }
            }
            ConnectionState::Active if link.settling => {}
            ConnectionState::Active => {
                let snapshot = self.vehicle.snapshot();
                queue_change(&mut link, &snapshot);
            }
        }
    }

    /// Single teardown path.  `session_id` scopes the request to one session
    /// so a late callback cannot close a newer link; `None` targets whatever
    /// link is current.
    fn terminate(&self, session_id: Option<u64>, reason: DisconnectReason) {
        let (from, session) = {
            let mut link = lock(&self.link);
            if link.state == ConnectionState::Disconnected {
                return;
            }
            if let Some(id) = session_id
                && !link.is_current(id)
            {
                return;
            }
            let from = link.state;
            link.state = ConnectionState::Disconnected;
            (from, link.session.take())
        };
        info!(?reason, "deactivating vehicle link");
        self.emit(LinkEventPayload::StateChanged {
            from,
            to: ConnectionState::Disconnected,
        });
        self.emit(LinkEventPayload::Disconnected { reason });

        self.vehicle.set_active(false);
        if let Some(session) = session {
            self.close_session(session, reason);
        }
    }

    fn close_session(&self, mut session: Session, reason: DisconnectReason) {
        if let Some(ticker) = session.ticker.take() {
            ticker.stop();
        }
        if let Some(reader) = session.reader.as_ref() {
            reader.request_stop();
        }
        if reason == DisconnectReason::Local
            && let Err(e) = session.outbound.send(&Command::Close)
        {
            debug!(error = %e, "could not send CLOSE");
        }

        // Best effort: the socket may already be broken.
        for (direction, stream) in [(Shutdown::Write, "output"), (Shutdown::Read, "input")] {
            if let Err(e) = session.stream.shutdown(direction) {
                self.emit(LinkEventPayload::CloseFault {
                    stream: stream.to_string(),
                    details: e.to_string(),
                });
            }
        }

        if let Some(reader) = session.reader.take() {
            reader.join();
        }
        debug!(peer = %session.peer, session = session.id, "session closed");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(id) = lock(&self.subscription).take() {
            self.vehicle.unsubscribe(id);
        }
        let session = lock(&self.link).session.take();
        if let Some(session) = session {
            self.close_session(session, DisconnectReason::Local);
        }
    }
}

/// Queue at most one command for what differs between `snapshot` and the
/// last queued values, steer first.  Returns `true` if a command was queued.
fn queue_change(link: &mut Link, snapshot: &VehicleSnapshot) -> bool {
    let Some(session) = link.session.as_ref() else {
        return false;
    };
    if link.last_steer != Some(snapshot.steer) {
        session.queue.push(Command::Steer(snapshot.steer));
        link.last_steer = Some(snapshot.steer);
    } else if link.last_throttle != Some(snapshot.throttle) {
        session.queue.push(Command::Throttle(snapshot.throttle));
        link.last_throttle = Some(snapshot.throttle);
    } else {
        return false;
    }
    true
}

/// Routes one session's reader callbacks back into the connection.
struct SessionHandler {
    inner: Weak<Inner>,
    session_id: u64,
}

impl InboundHandler for SessionHandler {
    fn on_handshake_ack(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handshake_acked(self.session_id);
        }
    }

    fn on_peer_close(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.terminate(Some(self.session_id), DisconnectReason::PeerClosed);
        }
    }

    fn on_read_failure(&self, error: Option<&io::Error>) {
        match error {
            Some(e) => warn!(error = %e, "inbound read failed"),
            None => info!("vehicle closed the stream"),
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.terminate(Some(self.session_id), DisconnectReason::ReadFailed);
        }
    }

    fn on_discarded(&self, line: &str) {
        if let Some(inner) = self.inner.upgrade() {
            inner.emit(LinkEventPayload::LineDiscarded {
                line: line.to_string(),
            });
        }
    }
}
