//! Operator-facing link alerts.

use colored::Colorize;

use rcdrive_link::{LinkObserver, TracingObserver};
use rcdrive_types::{ConnectionState, DisconnectReason, LinkEvent, LinkEventPayload};

/// Prints link transitions the operator has to know about, then forwards
/// every event to [`TracingObserver`].
#[derive(Debug, Default)]
pub struct ConsoleObserver {
    tracing: TracingObserver,
}

impl LinkObserver for ConsoleObserver {
    fn on_event(&self, event: &LinkEvent) {
        if let Some(alert) = alert_for(&event.payload) {
            println!();
            println!("  {}", alert);
        }
        self.tracing.on_event(event);
    }
}

/// The line shown for `payload`, if any.
fn alert_for(payload: &LinkEventPayload) -> Option<String> {
    match payload {
        LinkEventPayload::StateChanged { to: ConnectionState::Active, .. } => {
            Some(format!("{} Vehicle acknowledged; link is active.", "✓".green()))
        }
        LinkEventPayload::Disconnected { reason } => match reason {
            DisconnectReason::Local => None,
            DisconnectReason::PeerClosed => {
                Some(format!("{} Vehicle closed the link.", "⚠".yellow()))
            }
            DisconnectReason::ReadFailed => {
                Some(format!("{} Lost the vehicle (read failed).", "⚠".red()))
            }
            DisconnectReason::WriteFailed => {
                Some(format!("{} Lost the vehicle (write failed).", "⚠".red()))
            }
        },
        _ => None,
    }
}
