//! Postgres MCP Library
//!
//! Serves a Postgres database to a tool-calling client over streamed
//! JSON-RPC on stdio, optionally reaching the database through an SSH
//! bastion.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pg_mcp::{Dispatcher, Handlers, JsonTransport, TracingDiagnostics};
//!
//! let handlers = Handlers::new(Arc::new(my_gateway));
//! let transport = JsonTransport::new(reader, writer);
//! let mut dispatcher = Dispatcher::new(transport, handlers, Arc::new(TracingDiagnostics));
//! dispatcher.run().await?;
//! ```

pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod gateway;
pub mod guard;
pub mod handlers;
pub mod protocol;
pub mod transport;
pub mod tunnel;

pub use config::{AppConfig, Cli, ConfigError, DatabaseConfig, ServerOptions};
pub use diagnostics::{DiagnosticEvent, Diagnostics, RecordingDiagnostics, TracingDiagnostics};
pub use dispatcher::{DispatchError, Dispatcher, UnknownMethodPolicy};
pub use gateway::{GatewayError, PgGateway, QueryGateway, RequireRows, Row, Scalar, Statement};
pub use handlers::{HandlerError, Handlers};
pub use transport::{JsonTransport, StdioTransport, TransportError};
pub use tunnel::{TunnelConfig, TunnelEngine, TunnelError, TunnelHandle};
