//! Server configuration.
//!
//! Settings come from command-line flags and an optional TOML file. A
//! flag always overrides the file. The file is taken from `--config`,
//! falling back to the `MOLBAR_CONFIG` environment variable.
//!
//! ```toml
//! [bind]
//! host = "127.0.0.1"
//! tcp_port = 5555
//! udp_port = 5556
//! # or: stream_path = "/tmp/molbar.sock", datagram_path = "/tmp/molbar.dgram"
//!
//! [inventory]
//! carbon = 100
//! hydrogen = 200
//! oxygen = 100
//! save_file = "/var/lib/molbar/stock.bin"
//!
//! [limits]
//! max_clients = 9
//! timeout_secs = 60
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use molbar_core::AtomCounts;
use serde::{Deserialize, Serialize};

use crate::transport::TransportBinding;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "MOLBAR_CONFIG";

/// Stream clients served at once unless configured otherwise.
pub const DEFAULT_MAX_CLIENTS: usize = 9;

/// Inet bind address unless configured otherwise.
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

// ============================================================================
// Command line
// ============================================================================

/// Molecule bar inventory server
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "molbard", version, about)]
pub struct ServerArgs {
    /// TCP port for atom suppliers
    #[arg(short = 'T', long)]
    pub tcp_port: Option<u16>,

    /// UDP port for molecule requests
    #[arg(short = 'U', long)]
    pub udp_port: Option<u16>,

    /// Address to bind the TCP and UDP ports on
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Unix stream socket path for atom suppliers
    #[arg(short = 's', long)]
    pub stream_path: Option<PathBuf>,

    /// Unix datagram socket path for molecule requests
    #[arg(short = 'd', long)]
    pub datagram_path: Option<PathBuf>,

    /// Initial carbon atoms
    #[arg(short = 'c', long)]
    pub carbon: Option<u64>,

    /// Initial hydrogen atoms
    #[arg(short = 'H', long)]
    pub hydrogen: Option<u64>,

    /// Initial oxygen atoms
    #[arg(short = 'o', long)]
    pub oxygen: Option<u64>,

    /// Idle timeout in seconds (0 disables it)
    #[arg(short = 't', long)]
    pub timeout: Option<u64>,

    /// Memory-mapped inventory file shared with other processes
    #[arg(short = 'f', long)]
    pub save_file: Option<PathBuf>,

    /// Maximum simultaneous stream clients
    #[arg(long)]
    pub max_clients: Option<usize>,

    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ServerArgs {
    /// Config file to read: `--config`, else `$MOLBAR_CONFIG`.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
    }
}

// ============================================================================
// Config file
// ============================================================================

/// Contents of the TOML config file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub bind: BindSection,
    pub inventory: InventorySection,
    pub limits: LimitsSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BindSection {
    pub host: Option<IpAddr>,
    pub tcp_port: Option<u16>,
    pub udp_port: Option<u16>,
    pub stream_path: Option<PathBuf>,
    pub datagram_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InventorySection {
    pub carbon: Option<u64>,
    pub hydrogen: Option<u64>,
    pub oxygen: Option<u64>,
    pub save_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsSection {
    pub max_clients: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { message } => ConfigError::ParseFile {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }
}

// ============================================================================
// Resolved config
// ============================================================================

/// Validated settings the server starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub binding: TransportBinding,
    pub initial: AtomCounts,
    pub save_file: Option<PathBuf>,
    pub max_clients: usize,
    /// `None` disables the idle timeout.
    pub idle_timeout: Option<Duration>,
}

impl ServerConfig {
    /// Reads the config file named by `args` (if any) and resolves.
    pub fn load(args: &ServerArgs) -> Result<Self, ConfigError> {
        let file = match args.config_path() {
            Some(path) => Some(FileConfig::from_file(&path)?),
            None => None,
        };
        Self::resolve(args, file.unwrap_or_default())
    }

    /// Merges flags over file values and validates the result.
    ///
    /// # Errors
    ///
    /// - `ConflictingBindings` when inet and local settings are both given
    /// - `MissingBinding` when neither is given
    /// - `IncompleteBinding` when only half of a pair is given
    /// - `InvalidPort` for port 0
    /// - `InvalidMaxClients` for a zero client limit
    pub fn resolve(args: &ServerArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let FileConfig {
            bind,
            inventory,
            limits,
        } = file;

        let tcp_port = args.tcp_port.or(bind.tcp_port);
        let udp_port = args.udp_port.or(bind.udp_port);
        let stream_path = args.stream_path.clone().or(bind.stream_path);
        let datagram_path = args.datagram_path.clone().or(bind.datagram_path);
        let host = args.host.or(bind.host).unwrap_or(DEFAULT_HOST);

        let wants_inet = tcp_port.is_some() || udp_port.is_some();
        let wants_local = stream_path.is_some() || datagram_path.is_some();

        let binding = match (wants_inet, wants_local) {
            (true, true) => return Err(ConfigError::ConflictingBindings),
            (false, false) => return Err(ConfigError::MissingBinding),
            (true, false) => {
                let stream_port = require(tcp_port, "tcp port")?;
                let datagram_port = require(udp_port, "udp port")?;
                check_port("tcp port", stream_port)?;
                check_port("udp port", datagram_port)?;
                TransportBinding::Inet {
                    host,
                    stream_port,
                    datagram_port,
                }
            }
            (false, true) => TransportBinding::Local {
                stream_path: require(stream_path, "stream socket path")?,
                datagram_path: require(datagram_path, "datagram socket path")?,
            },
        };

        let initial = AtomCounts::new(
            args.carbon.or(inventory.carbon).unwrap_or(0),
            args.hydrogen.or(inventory.hydrogen).unwrap_or(0),
            args.oxygen.or(inventory.oxygen).unwrap_or(0),
        );

        let max_clients = args
            .max_clients
            .or(limits.max_clients)
            .unwrap_or(DEFAULT_MAX_CLIENTS);
        if max_clients == 0 {
            return Err(ConfigError::InvalidMaxClients);
        }

        let idle_timeout = args
            .timeout
            .or(limits.timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            binding,
            initial,
            save_file: args.save_file.clone().or(inventory.save_file),
            max_clients,
            idle_timeout,
        })
    }
}

fn require<T>(value: Option<T>, missing: &'static str) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::IncompleteBinding { missing })
}

fn check_port(name: &'static str, port: u16) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(ConfigError::InvalidPort { name, port });
    }
    Ok(())
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config: {message}")]
    Parse { message: String },

    #[error("Failed to parse config file {path}: {message}")]
    ParseFile { path: PathBuf, message: String },

    #[error("TCP/UDP ports and Unix socket paths are mutually exclusive")]
    ConflictingBindings,

    #[error("No binding given: set TCP/UDP ports or Unix socket paths")]
    MissingBinding,

    #[error("Incomplete binding: missing {missing}")]
    IncompleteBinding { missing: &'static str },

    #[error("Invalid {name}: {port} (must be 1-65535)")]
    InvalidPort { name: &'static str, port: u16 },

    #[error("max_clients must be at least 1")]
    InvalidMaxClients,
}
