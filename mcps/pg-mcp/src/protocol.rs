//! Methods, typed parameters and descriptors of the protocol surface
//!
//! The method set is closed. Parameters stay untyped in the envelope and
//! are decoded into the struct for their method only after the method is
//! known.

use std::fmt;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::handlers::HandlerError;

// ============================================================================
// Methods
// ============================================================================

/// Every method this server answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Initialize,
    ListTools,
    ListResources,
    ReadResource,
    CallTool,
}

impl Method {
    pub const ALL: [Method; 5] = [
        Method::Initialize,
        Method::ListTools,
        Method::ListResources,
        Method::ReadResource,
        Method::CallTool,
    ];

    /// Match a wire method name exactly
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Initialize => "initialize",
            Method::ListTools => "list_tools",
            Method::ListResources => "list_resources",
            Method::ReadResource => "read_resource",
            Method::CallTool => "call_tool",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request with its parameters decoded for the method
#[derive(Debug, Clone, PartialEq)]
pub enum MethodCall {
    Initialize,
    ListTools,
    ListResources,
    ReadResource(ReadResourceParams),
    CallTool(CallToolParams),
}

impl MethodCall {
    /// Decode `params` into the shape `method` expects
    ///
    /// Parameters of parameterless methods are ignored.
    pub fn decode(method: Method, params: Value) -> Result<Self, HandlerError> {
        Ok(match method {
            Method::Initialize => MethodCall::Initialize,
            Method::ListTools => MethodCall::ListTools,
            Method::ListResources => MethodCall::ListResources,
            Method::ReadResource => MethodCall::ReadResource(decode_params(params)?),
            Method::CallTool => MethodCall::CallTool(decode_params(params)?),
        })
    }

    pub fn method(&self) -> Method {
        match self {
            MethodCall::Initialize => Method::Initialize,
            MethodCall::ListTools => Method::ListTools,
            MethodCall::ListResources => Method::ListResources,
            MethodCall::ReadResource(_) => Method::ReadResource,
            MethodCall::CallTool(_) => Method::CallTool,
        }
    }
}

/// Absent or null params decode as an empty object
fn decode_params<T: DeserializeOwned>(params: Value) -> Result<T, HandlerError> {
    let params = match params {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(params).map_err(HandlerError::InvalidParams)
}

// ============================================================================
// Parameter Types
// ============================================================================

/// Parameters for `read_resource`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReadResourceParams {
    #[serde(default)]
    pub uri: String,
}

/// Parameters for `call_tool`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CallToolParams {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Map<String, Value>>,
}

/// Arguments of the `query` tool
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryArguments {
    /// SQL statement to execute
    pub sql: String,
}

impl QueryArguments {
    /// Extract a non-empty `sql` string from raw tool arguments
    pub fn from_arguments(arguments: Option<Map<String, Value>>) -> Result<Self, HandlerError> {
        let arguments = arguments.unwrap_or_default();
        let parsed: QueryArguments =
            serde_json::from_value(Value::Object(arguments)).map_err(|_| HandlerError::MissingSql)?;
        if parsed.sql.is_empty() {
            return Err(HandlerError::MissingSql);
        }
        Ok(parsed)
    }
}

// ============================================================================
// Resources and Tools
// ============================================================================

/// A parsed `<table>/schema` resource URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUri {
    pub table: String,
}

impl ResourceUri {
    /// Parse after trimming surrounding slashes
    ///
    /// Needs at least two segments, the second being literally `schema`.
    pub fn parse(uri: &str) -> Result<Self, HandlerError> {
        let segments: Vec<&str> = uri.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            [table, "schema", ..] if !table.is_empty() => Ok(Self {
                table: (*table).to_string(),
            }),
            _ => Err(HandlerError::InvalidResourceUri(uri.to_string())),
        }
    }
}

/// Tool entry returned by `list_tools`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Descriptor whose input schema is generated from `T`
    pub fn for_arguments<T: JsonSchema>(
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let mut input_schema = serde_json::to_value(schemars::schema_for!(T))
            .unwrap_or_else(|_| Value::Object(Map::new()));
        if let Value::Object(schema) = &mut input_schema {
            schema.remove("$schema");
            schema.remove("title");
            schema.remove("description");
        }
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}
