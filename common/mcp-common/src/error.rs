//! Error objects for JSON-RPC responses
//!
//! Every handler-level failure is reported with the single application
//! error code. `METHOD_NOT_FOUND` is only used when a server opts into
//! answering unknown methods.

use serde::{Deserialize, Serialize};

/// Code used for all handler-level failures
pub const APPLICATION_ERROR: i32 = -32000;

/// Standard JSON-RPC code for an unknown method
pub const METHOD_NOT_FOUND: i32 = -32601;

/// The `error` member of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
}

impl ErrorObject {
    /// Application error with the fixed code
    ///
    /// # Arguments
    ///
    /// * `message` - Human-readable cause, passed through to the client verbatim
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let err = ErrorObject::application("no rows returned");
    /// assert_eq!(err.code, APPLICATION_ERROR);
    /// ```
    pub fn application(message: impl Into<String>) -> Self {
        Self {
            code: APPLICATION_ERROR,
            message: message.into(),
        }
    }

    /// Error for a method the server does not implement
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("method not found: {}", method),
        }
    }
}

/// Trait for converting errors into response error objects
///
/// Implement this for a server's handler error type so that
/// [`Response::from_result`](crate::Response::from_result) can turn any
/// handler outcome into a response.
///
/// ```rust,ignore
/// impl IntoErrorObject for HandlerError {
///     fn into_error_object(self) -> ErrorObject {
///         ErrorObject::application(self.to_string())
///     }
/// }
/// ```
pub trait IntoErrorObject {
    fn into_error_object(self) -> ErrorObject;
}

impl IntoErrorObject for ErrorObject {
    fn into_error_object(self) -> ErrorObject {
        self
    }
}

impl IntoErrorObject for serde_json::Error {
    fn into_error_object(self) -> ErrorObject {
        ErrorObject::application(format!("JSON error: {}", self))
    }
}

impl IntoErrorObject for String {
    fn into_error_object(self) -> ErrorObject {
        ErrorObject::application(self)
    }
}

impl IntoErrorObject for &str {
    fn into_error_object(self) -> ErrorObject {
        ErrorObject::application(self)
    }
}
