//! REPL – Read-Eval-Print Loop for the rcdrive interactive shell.
//!
//! Supported slash-commands:
//!   /help                               – show this list
//!   /connect [host] [port]              – open the link (defaults from config)
//!   /disconnect                         – close the link
//!   /status                             – link state and vehicle controls
//!   /throttle forward|reverse|neutral   – set the throttle
//!   /steer left|right|neutral|<0-180>   – set the steering angle
//!   /quit | /exit                       – disconnect and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};

use rcdrive_link::Connection;
use rcdrive_types::{ConnectionState, STEER_RIGHT_DEG, Steer, SteerAngle, Throttle};

use crate::config::Config;

/// One parsed line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Connect {
        host: Option<String>,
        port: Option<String>,
    },
    Disconnect,
    Status,
    Throttle(Throttle),
    Steer(SteerAngle),
    Quit,
}

impl ReplCommand {
    /// Parse a trimmed, non-empty input line.  The error is the message to
    /// show the operator.
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err("empty command".to_string());
        };
        let args: Vec<&str> = words.collect();

        let command = match head {
            "/help" => Self::Help,
            "/connect" => match args.as_slice() {
                [] => Self::Connect { host: None, port: None },
                [host] => Self::Connect { host: Some(host.to_string()), port: None },
                [host, port] => Self::Connect {
                    host: Some(host.to_string()),
                    port: Some(port.to_string()),
                },
                _ => return Err("usage: /connect [host] [port]".to_string()),
            },
            "/disconnect" => Self::Disconnect,
            "/status" => Self::Status,
            "/throttle" => match args.as_slice() {
                [dir] => Self::Throttle(parse_throttle(dir)?),
                _ => return Err("usage: /throttle forward|reverse|neutral".to_string()),
            },
            "/steer" => match args.as_slice() {
                [dir] => Self::Steer(parse_steer(dir)?),
                _ => return Err("usage: /steer left|right|neutral|<0-180>".to_string()),
            },
            "/quit" | "/exit" => Self::Quit,
            other => return Err(format!("Unknown command: '{}'", other)),
        };
        Ok(command)
    }
}

fn parse_throttle(word: &str) -> Result<Throttle, String> {
    match word.to_ascii_lowercase().as_str() {
        "forward" | "f" => Ok(Throttle::Forward),
        "reverse" | "r" => Ok(Throttle::Reverse),
        "neutral" | "n" => Ok(Throttle::Neutral),
        _ => Err(format!("'{}' is not a throttle direction", word)),
    }
}

fn parse_steer(word: &str) -> Result<SteerAngle, String> {
    match word.to_ascii_lowercase().as_str() {
        "left" | "l" => Ok(Steer::Left.into()),
        "right" | "r" => Ok(Steer::Right.into()),
        "neutral" | "n" => Ok(Steer::Neutral.into()),
        other => match other.parse::<u8>() {
            Ok(deg) if deg <= STEER_RIGHT_DEG => Ok(SteerAngle::new(deg)),
            _ => Err(format!("'{}' is not a direction or an angle in 0..=180", word)),
        },
    }
}

/// Entry point for the interactive REPL.
///
/// Returns on `/quit`, end of input or a read error, with the link closed.
pub fn run(link: &Connection, cfg: &Config) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", "rcdrive>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match ReplCommand::parse(input) {
            Ok(ReplCommand::Help) => cmd_help(),
            Ok(ReplCommand::Connect { host, port }) => cmd_connect(link, cfg, host, port),
            Ok(ReplCommand::Disconnect) => cmd_disconnect(link),
            Ok(ReplCommand::Status) => cmd_status(link),
            Ok(ReplCommand::Throttle(dir)) => {
                warn_if_inactive(link);
                link.vehicle().set_throttle(dir);
            }
            Ok(ReplCommand::Steer(angle)) => {
                warn_if_inactive(link);
                link.vehicle().set_steer(angle);
            }
            Ok(ReplCommand::Quit) => {
                link.disconnect();
                println!("{}", "Goodbye.".green());
                break;
            }
            Err(msg) => {
                println!(
                    "{} Type {} for available commands.",
                    msg.red(),
                    "/help".bold()
                );
            }
        }
    }

    link.disconnect();
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "rcdrive Commands".bold().underline());
    println!("  {}  – open the link", "/connect [host] [port]".bold().cyan());
    println!("  {}              – close the link", "/disconnect".bold().cyan());
    println!("  {}                  – link state and controls", "/status".bold().cyan());
    println!("  {}   – set the throttle", "/throttle forward|reverse|neutral".bold().cyan());
    println!("  {}   – set the steering", "/steer left|right|neutral|<0-180>".bold().cyan());
    println!("  {}             – disconnect and exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_connect(link: &Connection, cfg: &Config, host: Option<String>, port: Option<String>) {
    let host = host.unwrap_or_else(|| cfg.host.clone());
    let port = port.unwrap_or_else(|| cfg.port.to_string());

    print!("  Connecting to {}:{} … ", host.bold(), port.bold());
    io::stdout().flush().ok();
    match link.connect(&host, &port) {
        Ok(()) => {
            println!("{}", "handshake sent".green());
            println!("  Waiting for the vehicle to acknowledge.");
        }
        Err(e) => {
            println!("{}", "FAILED".red());
            println!("  {}", e.to_string().red());
        }
    }
}

fn cmd_disconnect(link: &Connection) {
    if link.state() == ConnectionState::Disconnected {
        println!("  {}", "Not connected.".dimmed());
        return;
    }
    link.disconnect();
    println!("  {} Disconnected.", "✓".green());
}

fn cmd_status(link: &Connection) {
    let snapshot = link.vehicle().snapshot();
    let state = match link.state() {
        ConnectionState::Disconnected => "disconnected".red(),
        ConnectionState::Handshaking => "handshaking".yellow(),
        ConnectionState::Active => "active".green(),
    };

    println!("{}", "Link Status".bold().underline());
    println!("  State    : {}", state);
    match link.peer_addr() {
        Some(peer) => println!("  Peer     : {}", peer.to_string().bold()),
        None => println!("  Peer     : {}", "-".dimmed()),
    }
    println!("  Throttle : {}", snapshot.throttle.to_string().yellow());
    println!("  Steer    : {}°", snapshot.steer.to_string().yellow());
}

fn warn_if_inactive(link: &Connection) {
    if !link.is_active() {
        println!(
            "  {} link is not active; the vehicle is reset when it comes up.",
            "Note:".yellow()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connect_variants() {
        assert_eq!(
            ReplCommand::parse("/connect"),
            Ok(ReplCommand::Connect { host: None, port: None })
        );
        assert_eq!(
            ReplCommand::parse("/connect 10.0.0.2 4000"),
            Ok(ReplCommand::Connect {
                host: Some("10.0.0.2".to_string()),
                port: Some("4000".to_string()),
            })
        );
        assert!(ReplCommand::parse("/connect a b c").is_err());
    }

    #[test]
    fn connect_port_is_passed_through_unvalidated() {
        // Port validation belongs to the link so its error reaches the user.
        assert_eq!(
            ReplCommand::parse("/connect host 99999"),
            Ok(ReplCommand::Connect {
                host: Some("host".to_string()),
                port: Some("99999".to_string()),
            })
        );
    }

    #[test]
    fn parses_throttle_directions() {
        let parse = ReplCommand::parse;
        assert_eq!(parse("/throttle forward"), Ok(ReplCommand::Throttle(Throttle::Forward)));
        assert_eq!(parse("/throttle REVERSE"), Ok(ReplCommand::Throttle(Throttle::Reverse)));
        assert_eq!(parse("/throttle n"), Ok(ReplCommand::Throttle(Throttle::Neutral)));
        assert!(ReplCommand::parse("/throttle sideways").is_err());
        assert!(ReplCommand::parse("/throttle").is_err());
    }

    #[test]
    fn parses_steer_directions_and_angles() {
        let steer = |deg: u8| -> Result<ReplCommand, String> {
            Ok(ReplCommand::Steer(SteerAngle::new(deg)))
        };
        assert_eq!(ReplCommand::parse("/steer left"), steer(0));
        assert_eq!(ReplCommand::parse("/steer right"), steer(180));
        assert_eq!(ReplCommand::parse("/steer neutral"), steer(90));
        assert_eq!(ReplCommand::parse("/steer 45"), steer(45));
        assert!(ReplCommand::parse("/steer 181").is_err());
        assert!(ReplCommand::parse("/steer -5").is_err());
    }

    #[test]
    fn parses_simple_commands() {
        assert_eq!(ReplCommand::parse("/help"), Ok(ReplCommand::Help));
        assert_eq!(ReplCommand::parse("/status"), Ok(ReplCommand::Status));
        assert_eq!(ReplCommand::parse("/disconnect"), Ok(ReplCommand::Disconnect));
        assert_eq!(ReplCommand::parse("/quit"), Ok(ReplCommand::Quit));
        assert_eq!(ReplCommand::parse("/exit"), Ok(ReplCommand::Quit));
    }

    #[test]
    fn unknown_command_is_reported() {
        let err = ReplCommand::parse("/fly").unwrap_err();
        assert!(err.contains("/fly"));
    }
}
