//! Postgres MCP Server
//!
//! Serves a Postgres database over streamed JSON-RPC on stdio,
//! optionally through an SSH bastion.
//!
//! Exit codes: 0 after SIGINT/SIGTERM, 1 on startup or fatal read failure,
//! 2 when stdin closes.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use pg_mcp::{
    Cli, DispatchError, Diagnostics, Dispatcher, Handlers, PgGateway, RequireRows,
    StdioTransport, TracingDiagnostics, TunnelEngine,
};

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_STDIN_CLOSED: i32 = 2;

#[tokio::main]
async fn main() {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not failures
            let code = if e.use_stderr() { EXIT_FAILURE } else { EXIT_OK };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if let Err(e) = mcp_common::init_tracing("pg_mcp") {
        eprintln!("Failed to initialize logging: {:#}", e);
        std::process::exit(EXIT_FAILURE);
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FAILURE
        }
    };

    // A pending blocking stdin read would otherwise keep the runtime alive.
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = cli.into_config().context("invalid configuration")?;
    let diagnostics: Arc<dyn Diagnostics> = Arc::new(TracingDiagnostics);

    info!("Starting pg-mcp {}", env!("CARGO_PKG_VERSION"));

    let tunnel = match &config.tunnel {
        Some(tunnel_config) => Some(
            TunnelEngine::start(tunnel_config, Arc::clone(&diagnostics))
                .await
                .context("failed to start SSH tunnel")?,
        ),
        None => None,
    };

    let pg = match PgGateway::connect(&config.database).await {
        Ok(pg) => pg,
        Err(e) => {
            if let Some(tunnel) = tunnel {
                tunnel.shutdown().await;
            }
            return Err(e).context("database connection test failed");
        }
    };

    let handlers = Handlers::new(Arc::new(RequireRows::new(pg.clone())))
        .with_read_only(config.server.read_only);
    let mut dispatcher = Dispatcher::new(StdioTransport::stdio(), handlers, diagnostics)
        .with_unknown_methods(config.server.unknown_methods);

    info!(
        read_only = config.server.read_only,
        tunnel = tunnel.is_some(),
        "Serving requests on stdio"
    );

    let code = tokio::select! {
        outcome = dispatcher.run() => match outcome {
            Err(DispatchError::StreamClosed) => {
                info!("stdin closed, shutting down");
                EXIT_STDIN_CLOSED
            }
            Err(e) => {
                error!("{}", e);
                EXIT_FAILURE
            }
            Ok(never) => match never {},
        },
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
            EXIT_OK
        }
    };

    pg.close().await;
    if let Some(tunnel) = tunnel {
        tunnel.shutdown().await;
    }

    Ok(code)
}

/// Resolve on SIGINT, or SIGTERM where available
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
