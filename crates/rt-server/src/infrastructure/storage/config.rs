//! TOML-based configuration for the streaming server.
//!
//! Reads and writes [`ServerConfig`] at the platform-appropriate location:
//! - Linux:    `~/.config/rtstream/config.toml`
//! - macOS:    `~/Library/Application Support/RtStream/config.toml`
//! - Windows:  `%APPDATA%\RtStream\config.toml`
//!
//! Every field has a serde default, so a missing file or a partial file from
//! an older install loads cleanly.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Network port and bind-address settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// TCP port for the command/stream channel.
    #[serde(default = "default_port")]
    pub port: u16,
    /// IP address to bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Streaming behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    /// Per-client outbound queue capacity, in frames.  When a client falls
    /// this far behind, blocks start being dropped for it.
    #[serde(default = "default_client_queue_capacity")]
    pub client_queue_capacity: usize,
    /// Initial block size in samples, before any SET_BUFFER_SIZE command.
    #[serde(default = "default_buffer_size")]
    pub default_buffer_size: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_port() -> u16 {
    4218
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_client_queue_capacity() -> usize {
    64
}
fn default_buffer_size() -> u32 {
    500
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            stream: StreamConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            client_queue_capacity: default_client_queue_capacity(),
            default_buffer_size: default_buffer_size(),
        }
    }
}

impl ServerConfig {
    /// Full listen address, `bind_address:port`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.network.bind_address, self.network.port)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`ServerConfig`] from disk, returning the defaults if the file does
/// not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
    let path = config_file_path()?;

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let cfg: ServerConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to disk, creating the config directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &ServerConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("RtStream"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("rtstream"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("RtStream")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default_has_expected_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.network.port, 4218);
        assert_eq!(cfg.network.bind_address, "0.0.0.0");
        assert_eq!(cfg.stream.client_queue_capacity, 64);
        assert_eq!(cfg.stream.default_buffer_size, 500);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_listen_addr_joins_address_and_port() {
        let mut cfg = ServerConfig::default();
        cfg.network.bind_address = "127.0.0.1".to_string();
        cfg.network.port = 9000;
        assert_eq!(cfg.listen_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut cfg = ServerConfig::default();
        cfg.network.port = 9000;
        cfg.stream.client_queue_capacity = 8;
        cfg.log_level = "debug".to_string();

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: ServerConfig = toml::from_str(&toml_str).expect("deserialize");

        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: ServerConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_deserialize_partial_network_overrides_defaults() {
        let toml_str = r#"
[network]
port = 9999
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).expect("deserialize partial");
        assert_eq!(cfg.network.port, 9999);
        // Unspecified fields keep their defaults.
        assert_eq!(cfg.network.bind_address, "0.0.0.0");
        assert_eq!(cfg.stream.default_buffer_size, 500);
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<ServerConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_dir() {
        let dir = std::env::temp_dir().join(format!("rtstream_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let mut cfg = ServerConfig::default();
        cfg.network.port = 12345;
        cfg.log_level = "debug".to_string();

        // Serialize and write manually, mirroring save_config.
        let content = toml::to_string_pretty(&cfg).unwrap();
        std::fs::write(&path, &content).unwrap();
        let loaded: ServerConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(loaded.network.port, 12345);
        assert_eq!(loaded.log_level, "debug");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"));
        }
        // NoPlatformConfigDir in a stripped environment is also acceptable.
    }
}
