//! MCP Common - Shared protocol plumbing for JSON-RPC stdio servers
//!
//! - **JSON-RPC**: [`Request`] / [`Response`] envelopes with an exclusive
//!   result-or-error payload
//! - **Errors**: [`ErrorObject`] and the [`IntoErrorObject`] conversion trait
//! - **Results**: helpers for single text-block content results
//! - **Initialization**: stderr tracing setup
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_common::{json_content, Response};
//!
//! let response = Response::from_result(req.id, json_content(&rows));
//! ```

pub mod error;
pub mod init;
pub mod jsonrpc;
pub mod result;

pub use error::{ErrorObject, IntoErrorObject, APPLICATION_ERROR, METHOD_NOT_FOUND};
pub use init::{init_tracing, LogFormat};
pub use jsonrpc::{Payload, Request, Response, JSONRPC_VERSION};
pub use result::{json_content, text_content, Content, ContentResult};
