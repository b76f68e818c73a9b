//! Tracing setup for stdio servers
//!
//! stdout carries the protocol, so every log line goes to stderr.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT` from the environment; anything but `json` is text
    ///
    /// Matching is case-insensitive, so `JSON` works too.
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Initialize tracing for a server crate
///
/// Sets up logging to stderr (stdout is reserved for the protocol) with:
/// - Filtering from `RUST_LOG`, with `<crate_name>=info` added on top
/// - `LOG_FORMAT=json` for structured JSON lines, text otherwise
/// - ANSI colors disabled so logs stay clean when captured by a client
///
/// # Arguments
///
/// * `crate_name` - Target name of the server crate (e.g., "pg_mcp")
///
/// # Returns
///
/// * `Ok(())` once the global subscriber is installed
/// * `Err` if `crate_name` is not a valid filter target or a subscriber
///   is already installed
///
/// # Example
///
/// ```rust,ignore
/// mcp_common::init_tracing("pg_mcp")?;
/// ```
pub fn init_tracing(crate_name: &str) -> anyhow::Result<()> {
    let directive = format!("{}=info", crate_name);
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    let registry = tracing_subscriber::registry().with(filter);

    match LogFormat::from_env() {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?,
    }

    Ok(())
}
