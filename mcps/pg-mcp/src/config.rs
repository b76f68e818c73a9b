//! Configuration for the Postgres MCP server
//!
//! Every setting is a CLI flag that can also come from the environment.
//! A `.env` file in the working directory is loaded before parsing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::dispatcher::UnknownMethodPolicy;
use crate::tunnel::TunnelConfig;

const TUNNEL_LOCAL_HOST: &str = "127.0.0.1";

/// Command-line arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "pg-mcp")]
#[command(about = "Expose a Postgres database over a line-oriented JSON-RPC protocol on stdio")]
#[command(version)]
pub struct Cli {
    /// Database host
    #[arg(long, env = "DB_HOST")]
    pub db_host: String,

    /// Database port
    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    pub db_port: u16,

    /// Database user
    #[arg(long, env = "DB_USER")]
    pub db_user: String,

    /// Database password
    #[arg(long, env = "DB_PASS", hide_env_values = true)]
    pub db_pass: String,

    /// Database name
    #[arg(long, env = "DB_NAME")]
    pub db_name: String,

    /// Maximum pooled connections
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Seconds to wait for a database (or bastion) connection
    #[arg(long, env = "DB_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Per-statement timeout in seconds (unset = no limit)
    #[arg(long, env = "DB_QUERY_TIMEOUT_SECS")]
    pub query_timeout_secs: Option<u64>,

    /// Only allow read-only statements and run them in a rolled-back READ ONLY transaction
    #[arg(long, env = "SQL_READ_ONLY", default_value_t = false)]
    pub read_only: bool,

    /// Answer unknown methods with a "method not found" error instead of dropping them
    #[arg(long, env = "MCP_REPLY_UNKNOWN_METHODS", default_value_t = false)]
    pub reply_unknown_methods: bool,

    /// Reach the database through an SSH bastion
    #[arg(long, env = "USE_SSH_TUNNEL", default_value_t = false)]
    pub use_ssh_tunnel: bool,

    /// Bastion host, either `host` or `host:port`
    #[arg(long, env = "SSH_BASTION_HOST")]
    pub ssh_bastion_host: Option<String>,

    /// Bastion SSH port, used when the host has no port
    #[arg(long, env = "SSH_BASTION_PORT", default_value_t = 22)]
    pub ssh_bastion_port: u16,

    /// Bastion user
    #[arg(long, env = "SSH_BASTION_USER")]
    pub ssh_bastion_user: Option<String>,

    /// Private key used to authenticate to the bastion
    #[arg(long, env = "SSH_PRIVATE_KEY_PATH")]
    pub ssh_private_key_path: Option<PathBuf>,

    /// Passphrase for an encrypted private key
    #[arg(long, env = "SSH_KEY_PASSPHRASE", hide_env_values = true)]
    pub ssh_key_passphrase: Option<String>,

    /// Destination host as seen from the bastion (defaults to the database host)
    #[arg(long, env = "SSH_REMOTE_HOST")]
    pub ssh_remote_host: Option<String>,

    /// Destination port as seen from the bastion (defaults to the database port)
    #[arg(long, env = "SSH_REMOTE_PORT")]
    pub ssh_remote_port: Option<u16>,

    /// Local port the tunnel listens on
    #[arg(long, env = "LOCAL_PORT", default_value_t = 3333)]
    pub local_port: u16,
}

/// Errors while turning arguments into a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is required when USE_SSH_TUNNEL is enabled")]
    MissingTunnelSetting(&'static str),

    #[error("invalid tunnel local address: {0}")]
    InvalidLocalAddress(#[from] std::net::AddrParseError),
}

/// Database connection settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub query_timeout: Option<Duration>,
    pub read_only: bool,
}

/// Dispatcher behaviour
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub read_only: bool,
    pub unknown_methods: UnknownMethodPolicy,
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Where the pool connects; the tunnel's local end when tunnelling
    pub database: DatabaseConfig,
    pub server: ServerOptions,
    pub tunnel: Option<TunnelConfig>,
}

impl Cli {
    /// Resolve defaults and validate tunnel settings
    pub fn into_config(self) -> Result<AppConfig, ConfigError> {
        let connect_timeout = Duration::from_secs(self.connect_timeout_secs);

        let tunnel = if self.use_ssh_tunnel {
            let bastion_host = self
                .ssh_bastion_host
                .clone()
                .ok_or(ConfigError::MissingTunnelSetting("SSH_BASTION_HOST"))?;
            let bastion_user = self
                .ssh_bastion_user
                .clone()
                .ok_or(ConfigError::MissingTunnelSetting("SSH_BASTION_USER"))?;
            let private_key_path = self
                .ssh_private_key_path
                .clone()
                .ok_or(ConfigError::MissingTunnelSetting("SSH_PRIVATE_KEY_PATH"))?;
            let local_addr: SocketAddr =
                format!("{}:{}", TUNNEL_LOCAL_HOST, self.local_port).parse()?;

            Some(TunnelConfig {
                bastion_addr: bastion_address(&bastion_host, self.ssh_bastion_port),
                bastion_user,
                private_key_path,
                key_passphrase: self.ssh_key_passphrase.clone().filter(|p| !p.is_empty()),
                remote_host: self
                    .ssh_remote_host
                    .clone()
                    .unwrap_or_else(|| self.db_host.clone()),
                remote_port: self.ssh_remote_port.unwrap_or(self.db_port),
                local_addr,
                connect_timeout,
            })
        } else {
            None
        };

        // With a tunnel the pool talks to the local end of it.
        let (host, port) = match &tunnel {
            Some(t) => (t.local_addr.ip().to_string(), t.local_addr.port()),
            None => (self.db_host.clone(), self.db_port),
        };

        let unknown_methods = if self.reply_unknown_methods {
            UnknownMethodPolicy::Reply
        } else {
            UnknownMethodPolicy::Drop
        };

        Ok(AppConfig {
            database: DatabaseConfig {
                host,
                port,
                user: self.db_user,
                password: self.db_pass,
                name: self.db_name,
                max_connections: self.max_connections,
                connect_timeout,
                query_timeout: self.query_timeout_secs.map(Duration::from_secs),
                read_only: self.read_only,
            },
            server: ServerOptions {
                read_only: self.read_only,
                unknown_methods,
            },
            tunnel,
        })
    }
}

/// Append the default port unless the host already carries one
fn bastion_address(host: &str, default_port: u16) -> String {
    let has_port = match host.rsplit_once(':') {
        // Bracketed IPv6 with a port, or a plain host:port
        Some((h, p)) => p.parse::<u16>().is_ok() && (!h.contains(':') || h.ends_with(']')),
        None => false,
    };
    if has_port {
        host.to_string()
    } else if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, default_port)
    } else {
        format!("{}:{}", host, default_port)
    }
}
