//! Observability sink for link events.
//!
//! The connection reports state transitions, teardown reasons, swallowed
//! close failures and discarded inbound lines to a [`LinkObserver`].  The
//! default [`TracingObserver`] turns them into `tracing` records.

use rcdrive_types::{LinkEvent, LinkEventPayload};
use tracing::{debug, info, warn};

pub trait LinkObserver: Send + Sync {
    fn on_event(&self, event: &LinkEvent);
}

/// Logs every [`LinkEvent`] through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LinkObserver for TracingObserver {
    fn on_event(&self, event: &LinkEvent) {
        match &event.payload {
            LinkEventPayload::StateChanged { from, to } => {
                info!(source = %event.source, ?from, ?to, "link state changed");
            }
            LinkEventPayload::Disconnected { reason } => {
                info!(source = %event.source, ?reason, "link disconnected");
            }
            LinkEventPayload::CloseFault { stream, details } => {
                warn!(
                    source = %event.source,
                    stream = %stream,
                    error = %details,
                    "failed to close stream"
                );
            }
            LinkEventPayload::LineDiscarded { line } => {
                debug!(source = %event.source, line = %line, "discarded malformed inbound line");
            }
        }
    }
}
