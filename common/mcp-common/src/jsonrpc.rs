//! JSON-RPC 2.0 envelope types
//!
//! Messages are plain JSON objects with no extra framing. Requests carry an integer
//! `id` that is echoed back on the single response produced for them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorObject, IntoErrorObject};

/// Protocol version stamped on every outgoing message
pub const JSONRPC_VERSION: &str = "2.0";

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Incoming request
///
/// `params` stays untyped until the method is known; each handler decodes
/// the shape it expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub method: String,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Request {
    /// Build a request with the current protocol version
    pub fn new(id: i64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            method: method.into(),
            id,
            params,
        }
    }
}

/// Either a result or an error, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Payload {
    Result(Value),
    Error(ErrorObject),
}

/// Outgoing response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: i64,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Response {
    /// Successful response carrying `result`
    pub fn success(id: i64, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            payload: Payload::Result(result),
        }
    }

    /// Error response carrying `error`
    pub fn error(id: i64, error: ErrorObject) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            payload: Payload::Error(error),
        }
    }

    /// Collapse a handler outcome into exactly one response
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the request being answered
    /// * `outcome` - The handler's result; any error type implementing
    ///   [`IntoErrorObject`] is accepted
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let response = Response::from_result(request.id, json_content(&rows));
    /// transport.send(&response).await?;
    /// ```
    pub fn from_result<E: IntoErrorObject>(id: i64, outcome: Result<Value, E>) -> Self {
        match outcome {
            Ok(result) => Self::success(id, result),
            Err(e) => Self::error(id, e.into_error_object()),
        }
    }

    /// The result value, or `None` for an error response
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Result(value) => Some(value),
            Payload::Error(_) => None,
        }
    }

    /// The error member, or `None` for a successful response
    pub fn error_object(&self) -> Option<&ErrorObject> {
        match &self.payload {
            Payload::Result(_) => None,
            Payload::Error(err) => Some(err),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, Payload::Error(_))
    }
}
