//! `rcdrive-types` – shared vocabulary for the rcdrive workspace.
//!
//! Every other crate speaks in these types: the driving intents the operator
//! produces ([`Throttle`], [`Steer`], [`SteerAngle`]), the outbound
//! [`Command`] set, the link lifecycle ([`ConnectionState`],
//! [`DisconnectReason`]), the observability [`LinkEvent`] and the single
//! error type [`ConnectionError`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Wheel angle sent for a hard left turn.
pub const STEER_LEFT_DEG: u8 = 0;
/// Wheel angle sent when the wheels are straight.
pub const STEER_NEUTRAL_DEG: u8 = 90;
/// Wheel angle sent for a hard right turn.
pub const STEER_RIGHT_DEG: u8 = 180;

// ────────────────────────────────────────────────────────────────────────────
// Driving intents
// ────────────────────────────────────────────────────────────────────────────

/// Drive direction of the vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Throttle {
    #[default]
    Neutral,
    Forward,
    Reverse,
}

impl fmt::Display for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Throttle::Neutral => write!(f, "NEUTRAL"),
            Throttle::Forward => write!(f, "FORWARD"),
            Throttle::Reverse => write!(f, "REVERSE"),
        }
    }
}

/// Coarse steering direction, as produced by arrow keys or buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Steer {
    Left,
    #[default]
    Neutral,
    Right,
}

impl Steer {
    /// Wheel angle in degrees for this direction.
    pub const fn angle(self) -> u8 {
        match self {
            Steer::Left => STEER_LEFT_DEG,
            Steer::Right => STEER_RIGHT_DEG,
            Steer::Neutral => STEER_NEUTRAL_DEG,
        }
    }
}

/// A wheel angle in degrees, always within `0..=180`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct SteerAngle(u8);

impl SteerAngle {
    /// Build an angle, clamping anything above 180 degrees down to 180.
    pub const fn new(degrees: u8) -> Self {
        if degrees > STEER_RIGHT_DEG {
            Self(STEER_RIGHT_DEG)
        } else {
            Self(degrees)
        }
    }

    pub const fn degrees(self) -> u8 {
        self.0
    }
}

impl Default for SteerAngle {
    fn default() -> Self {
        Self(STEER_NEUTRAL_DEG)
    }
}

impl From<u8> for SteerAngle {
    fn from(degrees: u8) -> Self {
        Self::new(degrees)
    }
}

impl From<SteerAngle> for u8 {
    fn from(angle: SteerAngle) -> Self {
        angle.0
    }
}

impl From<Steer> for SteerAngle {
    fn from(dir: Steer) -> Self {
        Self(dir.angle())
    }
}

impl fmt::Display for SteerAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wire commands
// ────────────────────────────────────────────────────────────────────────────

/// One outbound protocol command.  The canonical wire text is produced by
/// `rcdrive_link::protocol::encode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "value")]
pub enum Command {
    Handshake,
    Heartbeat,
    Throttle(Throttle),
    Steer(SteerAngle),
    Close,
}

// ────────────────────────────────────────────────────────────────────────────
// Link lifecycle
// ────────────────────────────────────────────────────────────────────────────

/// Phase of the single vehicle link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Socket is open and a handshake was sent; waiting for the peer's ack.
    Handshaking,
    /// The peer acknowledged the handshake; commands and heartbeats flow.
    Active,
}

/// Why a link was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// The operator asked for it.
    Local,
    /// The peer sent `CLOSE`.
    PeerClosed,
    /// The inbound stream failed or hit end-of-stream.
    ReadFailed,
    /// An outbound write failed or timed out.
    WriteFailed,
}

/// Observability record emitted by the link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"rcdrive-link::connection"`
    pub source: String,
    pub payload: LinkEventPayload,
}

impl LinkEvent {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: LinkEventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// What happened on the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkEventPayload {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    Disconnected {
        reason: DisconnectReason,
    },
    /// Closing one direction of the socket failed during teardown.
    CloseFault { stream: String, details: String },
    /// An inbound line had too many tokens and was dropped.
    LineDiscarded { line: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type for everything the vehicle link can fail at.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionError {
    #[error("Invalid port number: '{0}'")]
    InvalidPort(String),

    #[error("Could not resolve host '{address}': {details}")]
    HostResolution { address: String, details: String },

    #[error("Could not open socket to {address}: {details}")]
    SocketOpen { address: String, details: String },

    #[error("Could not set up socket streams: {0}")]
    StreamSetup(String),

    #[error("Write to vehicle failed: {0}")]
    Write(String),

    #[error("Command queue is empty")]
    EmptyQueue,

    #[error("A vehicle link is already open")]
    AlreadyConnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steer_directions_map_to_angles() {
        assert_eq!(Steer::Left.angle(), 0);
        assert_eq!(Steer::Right.angle(), 180);
        assert_eq!(Steer::Neutral.angle(), 90);
        assert_eq!(Steer::default().angle(), 90);
    }

    #[test]
    fn steer_angle_clamps_to_range() {
        assert_eq!(SteerAngle::new(45).degrees(), 45);
        assert_eq!(SteerAngle::new(180).degrees(), 180);
        assert_eq!(SteerAngle::new(250).degrees(), 180);
        assert_eq!(SteerAngle::from(Steer::Left).degrees(), 0);
        assert_eq!(SteerAngle::default().degrees(), 90);
    }

    #[test]
    fn throttle_display_is_wire_name() {
        assert_eq!(Throttle::Neutral.to_string(), "NEUTRAL");
        assert_eq!(Throttle::Forward.to_string(), "FORWARD");
        assert_eq!(Throttle::Reverse.to_string(), "REVERSE");
    }

    #[test]
    fn link_event_roundtrip() {
        let event = LinkEvent::new(
            "rcdrive-link::connection",
            LinkEventPayload::StateChanged {
                from: ConnectionState::Handshaking,
                to: ConnectionState::Active,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: LinkEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
        assert_eq!(event.payload, back.payload);
    }

    #[test]
    fn command_serialization_roundtrip() {
        let cmd = Command::Steer(SteerAngle::new(45));
        let json = serde_json::to_string(&cmd).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, back);
    }

    #[test]
    fn connection_error_display() {
        let err = ConnectionError::HostResolution {
            address: "no.such.host".to_string(),
            details: "not found".to_string(),
        };
        assert!(err.to_string().contains("no.such.host"));
        assert!(ConnectionError::InvalidPort("abc".into()).to_string().contains("abc"));
    }
}
