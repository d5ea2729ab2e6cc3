//! Line protocol spoken with the vehicle.
//!
//! Every message is one newline-terminated ASCII line of the form
//! `KEY [VALUE]`.
//!
//! | Direction | Line | Meaning |
//! |---|---|---|
//! | out | `HANDSHAKE` | request link establishment |
//! | out | `HB` | heartbeat / keep-alive |
//! | out | `THROTTLE NEUTRAL\|FORWARD\|REVERSE` | set drive direction |
//! | out | `STEER <0-180>` | set wheel angle |
//! | out | `CLOSE` | ask the vehicle to terminate |
//! | in | `HANDSHAKE` | acknowledges link establishment |
//! | in | `CLOSE` | vehicle requests termination |
//!
//! Besides the codec this module holds the connect-time validation of the
//! operator-supplied address and port.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use rcdrive_types::{Command, ConnectionError, Steer};

pub const HANDSHAKE: &str = "HANDSHAKE";
pub const HEARTBEAT: &str = "HB";
pub const THROTTLE: &str = "THROTTLE";
pub const STEER: &str = "STEER";
pub const CLOSE: &str = "CLOSE";

/// Interval between two dispatcher ticks on an active link.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_millis(500);

/// Inbound lines with more whitespace-separated tokens than this are
/// malformed.
pub const MAX_INBOUND_TOKENS: usize = 2;

/// Control messages the vehicle may send us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Handshake,
    Close,
}

/// Classification of one inbound line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    Control(Control),
    /// Well-formed but not something the client reacts to (e.g. an echo).
    Ignored,
    /// Too many tokens; dropped.
    Malformed,
}

/// Wheel angle for a coarse steering direction: left is 0, right is 180 and
/// everything else is straight ahead (90).
pub fn steer_angle(dir: Steer) -> u8 {
    dir.angle()
}

/// Canonical wire text of `command`, without the line terminator.
pub fn encode(command: &Command) -> String {
    match command {
        Command::Handshake => HANDSHAKE.to_string(),
        Command::Heartbeat => HEARTBEAT.to_string(),
        Command::Close => CLOSE.to_string(),
        Command::Throttle(dir) => format!("{THROTTLE} {dir}"),
        Command::Steer(angle) => format!("{STEER} {angle}"),
    }
}

/// Recognise an inbound control line.  Only `HANDSHAKE` and `CLOSE` are ever
/// expected from the vehicle; everything else yields `None`.
pub fn decode(line: &str) -> Option<Control> {
    match line.trim() {
        HANDSHAKE => Some(Control::Handshake),
        CLOSE => Some(Control::Close),
        _ => None,
    }
}

/// Apply the token-count rule, then [`decode`].
pub fn parse_inbound(line: &str) -> Inbound {
    if line.split_whitespace().count() > MAX_INBOUND_TOKENS {
        return Inbound::Malformed;
    }
    match decode(line) {
        Some(control) => Inbound::Control(control),
        None => Inbound::Ignored,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Connect-time validation
// ────────────────────────────────────────────────────────────────────────────

/// Parse a decimal port in `0..=65535`.
///
/// Up to four digits are accepted as-is (leading zeros allowed); a
/// five-digit port must not start with `0`.  Signs, whitespace and anything
/// non-numeric are rejected.
pub fn validate_port(port: &str) -> Result<u16, ConnectionError> {
    let invalid = || ConnectionError::InvalidPort(port.to_string());
    if !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match port.len() {
        1..=4 => {}
        5 if !port.starts_with('0') => {}
        _ => return Err(invalid()),
    }
    port.parse::<u16>().map_err(|_| invalid())
}

pub fn is_valid_port(port: &str) -> bool {
    validate_port(port).is_ok()
}

/// Resolve `address` through the system resolver and pick the first result.
pub fn resolve(address: &str, port: u16) -> Result<SocketAddr, ConnectionError> {
    let unresolved = |details: String| ConnectionError::HostResolution {
        address: address.to_string(),
        details,
    };
    (address, port)
        .to_socket_addrs()
        .map_err(|e| unresolved(e.to_string()))?
        .next()
        .ok_or_else(|| unresolved("no addresses returned".to_string()))
}

pub fn is_valid_address(address: &str) -> bool {
    resolve(address, 0).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcdrive_types::{SteerAngle, Throttle};

    #[test]
    fn steer_angle_for_each_direction() {
        assert_eq!(steer_angle(Steer::Left), 0);
        assert_eq!(steer_angle(Steer::Right), 180);
        assert_eq!(steer_angle(Steer::Neutral), 90);
    }

    #[test]
    fn encode_produces_wire_lines() {
        assert_eq!(encode(&Command::Handshake), "HANDSHAKE");
        assert_eq!(encode(&Command::Heartbeat), "HB");
        assert_eq!(encode(&Command::Close), "CLOSE");
        assert_eq!(encode(&Command::Throttle(Throttle::Forward)), "THROTTLE FORWARD");
        assert_eq!(encode(&Command::Throttle(Throttle::Neutral)), "THROTTLE NEUTRAL");
        assert_eq!(encode(&Command::Steer(SteerAngle::new(45))), "STEER 45");
        assert_eq!(encode(&Command::Steer(Steer::Right.into())), "STEER 180");
    }

    #[test]
    fn decode_recognises_only_control_tokens() {
        assert_eq!(decode(&encode(&Command::Handshake)), Some(Control::Handshake));
        assert_eq!(decode(&encode(&Command::Close)), Some(Control::Close));
        assert_eq!(decode(&encode(&Command::Heartbeat)), None);
        assert_eq!(decode(&encode(&Command::Throttle(Throttle::Reverse))), None);
        assert_eq!(decode(&encode(&Command::Steer(SteerAngle::new(90)))), None);
    }

    #[test]
    fn decode_tolerates_line_terminators() {
        assert_eq!(decode("HANDSHAKE\r\n"), Some(Control::Handshake));
        assert_eq!(decode("CLOSE\n"), Some(Control::Close));
        assert_eq!(decode("close"), None);
    }

    #[test]
    fn parse_inbound_discards_lines_with_too_many_tokens() {
        assert_eq!(parse_inbound("STEER 10 20 30"), Inbound::Malformed);
        assert_eq!(parse_inbound("HANDSHAKE HANDSHAKE HANDSHAKE"), Inbound::Malformed);
        assert_eq!(parse_inbound("STEER 10"), Inbound::Ignored);
        assert_eq!(parse_inbound("HANDSHAKE"), Inbound::Control(Control::Handshake));
        assert_eq!(parse_inbound("CLOSE\n"), Inbound::Control(Control::Close));
        assert_eq!(parse_inbound(""), Inbound::Ignored);
    }

    #[test]
    fn port_validation_bounds() {
        assert_eq!(validate_port("65535"), Ok(65535));
        assert_eq!(validate_port("0"), Ok(0));
        assert_eq!(validate_port("8080"), Ok(8080));
        assert!(validate_port("65536").is_err());
        assert!(validate_port("-1").is_err());
        assert!(validate_port("abc").is_err());
        assert!(validate_port("").is_err());
        assert!(validate_port(" 80").is_err());
        assert!(validate_port("100000").is_err());
    }

    #[test]
    fn port_validation_leading_zeros() {
        assert_eq!(validate_port("0080"), Ok(80));
        assert!(validate_port("01234").is_err());
        assert!(is_valid_port("12345"));
    }

    #[test]
    fn resolve_loopback_literal() {
        let addr = resolve("127.0.0.1", 4000).expect("loopback must resolve");
        assert_eq!(addr.port(), 4000);
        assert!(addr.ip().is_loopback());
        assert!(is_valid_address("127.0.0.1"));
    }
}
