//! `rcdrive-link` – the vehicle link
//!
//! Drives a remote-controlled vehicle over one persistent TCP connection
//! using a newline-delimited text protocol.
//!
//! # Modules
//!
//! - [`protocol`] – wire codec (`encode` / `decode` / `steer_angle`) and
//!   connect-time address/port validation.
//! - [`queue`] – [`CommandQueue`][queue::CommandQueue]: thread-safe FIFO of
//!   pending outbound commands.
//! - [`outbound`] – [`CommandSink`][outbound::CommandSink] seam and the
//!   socket-backed [`Outbound`][outbound::Outbound] line writer.
//! - [`dispatcher`] – [`Dispatcher`][dispatcher::Dispatcher] tick (queued
//!   command or heartbeat) and the fixed-rate [`Ticker`][dispatcher::Ticker].
//! - [`reader`] – [`InboundReader`][reader::InboundReader]: background
//!   thread parsing the vehicle's handshake ack and close request.
//! - [`observer`] – [`LinkObserver`][observer::LinkObserver] sink for state
//!   changes, teardown reasons and swallowed close failures.
//! - [`connection`] – [`Connection`][connection::Connection]: the
//!   Disconnected → Handshaking → Active state machine tying it all
//!   together.

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod observer;
pub mod outbound;
pub mod protocol;
pub mod queue;
pub mod reader;

mod worker;

pub use config::LinkConfig;
pub use connection::Connection;
pub use dispatcher::{Dispatcher, Ticker};
pub use observer::{LinkObserver, TracingObserver};
pub use outbound::{CommandSink, Outbound};
pub use queue::CommandQueue;
pub use reader::{InboundHandler, InboundReader};
