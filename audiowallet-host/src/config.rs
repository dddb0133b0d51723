//! Configuration recognised by the core (§6), layered: built-in defaults
//! < `--config` TOML file < CLI flags. The teacher only has CLI flags
//! (`RelayArgs`); a venue host also wants a saved room profile an
//! operator can reuse across runs, so a TOML layer is added underneath.

use std::path::PathBuf;

use audiowallet_core::{
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HEARTBEAT_TIMEOUT_MS, DEFAULT_IDLE_TRANSFER_TIMEOUT_MS,
    DEFAULT_MAX_FILE_BYTES, DEFAULT_MAX_IN_FLIGHT_BYTES, DEFAULT_PORT, DEFAULT_SEND_TIMEOUT_MS,
    wire::DEFAULT_CHUNK_SIZE,
};
use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug, Clone)]
#[command(name = "audiowallet-host")]
pub struct CliArgs {
    /// Optional TOML config file merged underneath these flags.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Interface to listen on; combined with `port` to form the bind
    /// address, so either may be overridden independently.
    #[arg(long)]
    pub bind_host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub room_name: Option<String>,
    #[arg(long)]
    pub locked: Option<bool>,
    #[arg(long)]
    pub max_file_mb: Option<u64>,
    #[arg(long)]
    pub heartbeat_interval_ms: Option<u64>,
    #[arg(long)]
    pub heartbeat_timeout_ms: Option<u64>,
    #[arg(long)]
    pub idle_transfer_timeout_ms: Option<u64>,
    #[arg(long)]
    pub send_timeout_ms: Option<u64>,
    #[arg(long)]
    pub max_in_flight_bytes_per_transfer: Option<u64>,
    #[arg(long)]
    pub chunk_size_bytes: Option<usize>,
    #[arg(long)]
    pub admin_token: Option<String>,
    /// Disable the mDNS announcer; peers must be reached by other means
    /// (QR code, manual IP) as described in §4.A.
    #[arg(long)]
    pub no_announce: bool,
}

/// A config file's worth of overrides. Every field is optional; an absent
/// field falls through to the built-in default or a lower-precedence CLI
/// flag is irrelevant here because CLI always wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub bind_host: Option<String>,
    pub port: Option<u16>,
    pub room_name: Option<String>,
    pub locked: Option<bool>,
    pub max_file_mb: Option<u64>,
    pub heartbeat_interval_ms: Option<u64>,
    pub heartbeat_timeout_ms: Option<u64>,
    pub idle_transfer_timeout_ms: Option<u64>,
    pub send_timeout_ms: Option<u64>,
    pub max_in_flight_bytes_per_transfer: Option<u64>,
    pub chunk_size_bytes: Option<usize>,
    pub admin_token: Option<String>,
}

/// The fully-resolved configuration the host runs with.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub bind_host: String,
    pub port: u16,
    pub room_name: String,
    pub locked: bool,
    pub max_file_bytes: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub idle_transfer_timeout_ms: u64,
    pub send_timeout_ms: u64,
    pub max_in_flight_bytes_per_transfer: u64,
    pub chunk_size_bytes: usize,
    pub admin_token: Option<String>,
    pub announce: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_owned(),
            port: DEFAULT_PORT,
            room_name: "Room".to_owned(),
            locked: false,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
            idle_transfer_timeout_ms: DEFAULT_IDLE_TRANSFER_TIMEOUT_MS,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            max_in_flight_bytes_per_transfer: DEFAULT_MAX_IN_FLIGHT_BYTES,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            admin_token: None,
            announce: true,
        }
    }
}

impl HostConfig {
    /// Resolve defaults, an optional TOML file, then CLI flags, in that
    /// precedence order (later layers override earlier ones).
    pub fn resolve(args: CliArgs) -> Result<Self, crate::error::HostError> {
        let mut config = HostConfig::default();

        if let Some(path) = &args.config {
            let text = std::fs::read_to_string(path).map_err(|source| crate::error::HostError::ConfigRead {
                path: path.display().to_string(),
                source,
            })?;
            let file: FileConfig = toml::from_str(&text).map_err(|source| crate::error::HostError::ConfigParse {
                path: path.display().to_string(),
                source,
            })?;
            config.apply_file(file);
        }

        config.apply_cli(args);
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.bind_host {
            self.bind_host = v;
        }
        if let Some(v) = file.port {
            self.port = v;
        }
        if let Some(v) = file.room_name {
            self.room_name = v;
        }
        if let Some(v) = file.locked {
            self.locked = v;
        }
        if let Some(v) = file.max_file_mb {
            self.max_file_bytes = v * 1024 * 1024;
        }
        if let Some(v) = file.heartbeat_interval_ms {
            self.heartbeat_interval_ms = v;
        }
        if let Some(v) = file.heartbeat_timeout_ms {
            self.heartbeat_timeout_ms = v;
        }
        if let Some(v) = file.idle_transfer_timeout_ms {
            self.idle_transfer_timeout_ms = v;
        }
        if let Some(v) = file.send_timeout_ms {
            self.send_timeout_ms = v;
        }
        if let Some(v) = file.max_in_flight_bytes_per_transfer {
            self.max_in_flight_bytes_per_transfer = v;
        }
        if let Some(v) = file.chunk_size_bytes {
            self.chunk_size_bytes = v;
        }
        if let Some(v) = file.admin_token {
            self.admin_token = Some(v);
        }
    }

    fn apply_cli(&mut self, args: CliArgs) {
        if let Some(v) = args.bind_host {
            self.bind_host = v;
        }
        if let Some(v) = args.port {
            self.port = v;
        }
        if let Some(v) = args.room_name {
            self.room_name = v;
        }
        if let Some(v) = args.locked {
            self.locked = v;
        }
        if let Some(v) = args.max_file_mb {
            self.max_file_bytes = v * 1024 * 1024;
        }
        if let Some(v) = args.heartbeat_interval_ms {
            self.heartbeat_interval_ms = v;
        }
        if let Some(v) = args.heartbeat_timeout_ms {
            self.heartbeat_timeout_ms = v;
        }
        if let Some(v) = args.idle_transfer_timeout_ms {
            self.idle_transfer_timeout_ms = v;
        }
        if let Some(v) = args.send_timeout_ms {
            self.send_timeout_ms = v;
        }
        if let Some(v) = args.max_in_flight_bytes_per_transfer {
            self.max_in_flight_bytes_per_transfer = v;
        }
        if let Some(v) = args.chunk_size_bytes {
            self.chunk_size_bytes = v;
        }
        if let Some(v) = args.admin_token {
            self.admin_token = Some(v);
        }
        if args.no_announce {
            self.announce = false;
        }
    }

    /// The socket address to bind the session endpoint on, combining
    /// `bind_host` and `port` so either may be overridden independently
    /// (unlike a single pre-joined `host:port` string).
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = HostConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.max_file_bytes, DEFAULT_MAX_FILE_BYTES);
        assert!(config.announce);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn cli_overrides_defaults() {
        let args = CliArgs {
            config: None,
            bind_host: None,
            port: Some(9999),
            room_name: Some("Club".to_owned()),
            locked: Some(true),
            max_file_mb: Some(10),
            heartbeat_interval_ms: None,
            heartbeat_timeout_ms: None,
            idle_transfer_timeout_ms: None,
            send_timeout_ms: None,
            max_in_flight_bytes_per_transfer: None,
            chunk_size_bytes: None,
            admin_token: None,
            no_announce: true,
        };
        let config = HostConfig::resolve(args).unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.room_name, "Club");
        assert!(config.locked);
        assert_eq!(config.max_file_bytes, 10 * 1024 * 1024);
        assert!(!config.announce);
        assert_eq!(config.listen_address(), "0.0.0.0:9999");
    }
}
