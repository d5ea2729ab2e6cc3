//! `rcdrive-cli` – interactive remote control for an RC vehicle.
//!
//! This binary:
//!
//! 1. Checks for `~/.rcdrive/config.toml`; runs a **First-Run Wizard** when
//!    the file is absent.
//! 2. Builds the vehicle model and its link from the config.
//! 3. Drops the user into an **interactive REPL** with slash-commands
//!    (`/connect`, `/throttle`, `/steer`, `/status`, `/help`).
//! 4. Intercepts **Ctrl-C** to close the link before exiting.

mod config;
mod console;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use tracing::{info, warn};

use rcdrive_link::Connection;
use rcdrive_vehicle::Vehicle;

use crate::console::ConsoleObserver;

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (default "warn" so logs do not interleave
    // with the prompt).  RCDRIVE_LOG_FORMAT=json emits newline-delimited JSON.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    if std::env::var("RCDRIVE_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    // ── First-Run Wizard ──────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::from_env()
        }
    };
    info!(
        host = %cfg.host,
        port = cfg.port,
        heartbeat_ms = cfg.heartbeat_ms,
        "configuration ready"
    );

    let link = Connection::with_observer(
        Vehicle::new(),
        cfg.link_config(),
        Arc::new(ConsoleObserver::default()),
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let link_for_ctrlc = link.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – closing the link …".yellow().bold());
        link_for_ctrlc.disconnect();
        println!("{}", "  ✓ Link closed.".green());
        println!("{}", "  ✓ Exiting rcdrive.".green());
        // The REPL is blocked on stdin, so exit from here.
        std::process::exit(0);
    }) {
        warn!(
            error = %e,
            "Failed to install Ctrl-C handler; the link will not be closed on Ctrl-C"
        );
    }

    println!();
    println!(
        "  Vehicle at {}.  Type {} to connect, {} for all commands.\n",
        format!("{}:{}", cfg.host, cfg.port).bold(),
        "/connect".bold().cyan(),
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&link, &cfg);
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

/// Prompt for the vehicle address, save it, and return it with the
/// `RCDRIVE_*` overrides applied.
fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       rcdrive First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Where is your vehicle?\n");

    let mut cfg = config::Config::default();

    cfg.host = prompt_line(&format!("  Vehicle host [{}]: ", cfg.host), &cfg.host);

    let port_str = prompt_line(
        &format!("  Vehicle port [{}]: ", cfg.port),
        &cfg.port.to_string(),
    );
    match port_str.trim().parse::<u16>() {
        Ok(p) => cfg.port = p,
        Err(_) => println!(
            "  {} '{}' is not a valid port number, keeping {}",
            "Warning:".yellow(),
            port_str,
            cfg.port
        ),
    }

    let hb_str = prompt_line(
        &format!("  Heartbeat period in ms [{}]: ", cfg.heartbeat_ms),
        &cfg.heartbeat_ms.to_string(),
    );
    if let Ok(ms) = hb_str.trim().parse::<u64>()
        && ms > 0
    {
        cfg.heartbeat_ms = ms;
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }

    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"                 __     _          "#.bold().cyan());
    println!("{}", r#"   _____________/ /____(_)   _____ "#.bold().cyan());
    println!("{}", r#"  / ___/ ___/ __  / ___/ / | / / _ \"#.bold().cyan());
    println!("{}", r#" / /  / /__/ /_/ / /  / /| |/ /  __/"#.bold().cyan());
    println!("{}", r#"/_/   \___/\__,_/_/  /_/ |___/\___/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "rcdrive".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Remote control for TCP-linked RC vehicles");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
