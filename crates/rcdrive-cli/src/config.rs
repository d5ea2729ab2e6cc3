//! Configuration Vault – reads/writes `~/.rcdrive/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rcdrive_link::LinkConfig;

/// Persisted user configuration stored in `~/.rcdrive/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Host name or IP literal of the vehicle.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port the vehicle listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Dispatcher heartbeat period in milliseconds.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,

    /// Upper bound for opening the TCP connection, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    9000
}
fn default_heartbeat_ms() -> u64 {
    500
}
fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            heartbeat_ms: default_heartbeat_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Config {
    /// Timing configuration for a new link.  A zero heartbeat falls back to
    /// the protocol default.
    pub fn link_config(&self) -> LinkConfig {
        let base = if self.heartbeat_ms == 0 {
            LinkConfig::default()
        } else {
            LinkConfig::with_heartbeat(Duration::from_millis(self.heartbeat_ms))
        };
        base.connect_timeout(Duration::from_millis(self.connect_timeout_ms))
    }
}

/// Return the path to `~/.rcdrive/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rcdrive").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Defaults with the `RCDRIVE_*` overrides applied, for when no usable file
/// exists.
pub fn from_env() -> Config {
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg);
    cfg
}

/// Apply `RCDRIVE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `RCDRIVE_HOST` | `host` |
/// | `RCDRIVE_PORT` | `port` |
/// | `RCDRIVE_HEARTBEAT_MS` | `heartbeat_ms` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("RCDRIVE_HOST")
        && !v.trim().is_empty()
    {
        cfg.host = v.trim().to_string();
    }
    if let Ok(v) = std::env::var("RCDRIVE_PORT")
        && let Ok(port) = v.trim().parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("RCDRIVE_HEARTBEAT_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
        && ms > 0
    {
        cfg.heartbeat_ms = ms;
    }
}

/// Save the config to disk, creating `~/.rcdrive/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serialises the tests that touch `RCDRIVE_*` variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode =
            std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_custom_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config {
            host: "rc-car.local".to_string(),
            port: 4242,
            heartbeat_ms: 250,
            connect_timeout_ms: 1500,
        };
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "host = \"10.0.0.7\"\n").expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.host, "10.0.0.7");
        assert_eq!(loaded.port, 9000);
        assert_eq!(loaded.heartbeat_ms, 500);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"\n").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_rcdrive_dir() {
        let p = config_path_for_home("/home/testuser");
        assert_eq!(p, PathBuf::from("/home/testuser/.rcdrive/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn link_config_follows_heartbeat() {
        let cfg = Config {
            heartbeat_ms: 200,
            connect_timeout_ms: 750,
            ..Config::default()
        };
        let link = cfg.link_config();
        assert_eq!(link.heartbeat_period, Duration::from_millis(200));
        assert_eq!(link.write_timeout, Duration::from_millis(700));
        assert_eq!(link.connect_timeout, Duration::from_millis(750));
    }

    #[test]
    fn zero_heartbeat_uses_protocol_default() {
        let cfg = Config {
            heartbeat_ms: 0,
            ..Config::default()
        };
        assert_eq!(cfg.link_config().heartbeat_period, Duration::from_millis(500));
    }

    #[test]
    fn apply_env_overrides_changes_host_and_port() {
        let _guard = ENV_LOCK.lock().unwrap();
        // SAFETY: env access is serialised by ENV_LOCK.
        unsafe {
            std::env::set_var("RCDRIVE_HOST", "192.168.4.1");
            std::env::set_var("RCDRIVE_PORT", "5555");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("RCDRIVE_HOST");
            std::env::remove_var("RCDRIVE_PORT");
        }
        assert_eq!(cfg.host, "192.168.4.1");
        assert_eq!(cfg.port, 5555);
    }

    #[test]
    fn fallback_config_keeps_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        // SAFETY: env access is serialised by ENV_LOCK.
        unsafe { std::env::set_var("RCDRIVE_HOST", "rover.lan") };
        let cfg = from_env();
        unsafe { std::env::remove_var("RCDRIVE_HOST") };
        assert_eq!(cfg.host, "rover.lan");
        assert_eq!(cfg.port, default_port());
    }

    #[test]
    fn apply_env_overrides_changes_heartbeat() {
        let _guard = ENV_LOCK.lock().unwrap();
        // SAFETY: env access is serialised by ENV_LOCK.
        unsafe { std::env::set_var("RCDRIVE_HEARTBEAT_MS", "125") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe { std::env::remove_var("RCDRIVE_HEARTBEAT_MS") };
        assert_eq!(cfg.heartbeat_ms, 125);
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        // SAFETY: env access is serialised by ENV_LOCK.
        unsafe {
            std::env::set_var("RCDRIVE_PORT", "70000");
            std::env::set_var("RCDRIVE_HEARTBEAT_MS", "soon");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("RCDRIVE_PORT");
            std::env::remove_var("RCDRIVE_HEARTBEAT_MS");
        }
        assert_eq!(cfg, Config::default());
    }
}
