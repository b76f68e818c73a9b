//! Method handlers
//!
//! Each handler decodes its parameters, consults the gateway if it needs
//! data, and returns a result value. [`Handlers::handle`] folds the outcome
//! into exactly one [`Response`] carrying the request id.

use std::sync::Arc;

use mcp_common::{json_content, ErrorObject, IntoErrorObject, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::gateway::{GatewayError, QueryGateway, Statement};
use crate::guard::ReadOnlyGuard;
use crate::protocol::{
    CallToolParams, Method, MethodCall, QueryArguments, ReadResourceParams, ResourceUri,
    ToolDescriptor,
};

/// Name of the only tool
pub const QUERY_TOOL: &str = "query";

const QUERY_TOOL_DESCRIPTION: &str = "Execute a read-only SQL query";

const LIST_TABLES_SQL: &str = "SELECT table_name::text AS table_name \
     FROM information_schema.tables \
     WHERE table_schema = 'public'";

const TABLE_COLUMNS_SQL: &str = "SELECT column_name::text AS column_name, \
     data_type::text AS data_type \
     FROM information_schema.columns \
     WHERE table_name = $1 \
     ORDER BY ordinal_position";

/// Reasons a recognized request fails
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("invalid parameters: {0}")]
    InvalidParams(#[source] serde_json::Error),

    #[error("unsupported tool: {0}")]
    UnsupportedTool(String),

    #[error("missing or invalid 'sql' argument")]
    MissingSql,

    #[error("invalid resource URI: {0}")]
    InvalidResourceUri(String),

    #[error("only read-only queries ({0}) are allowed")]
    NotReadOnly(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("failed to encode result: {0}")]
    Encode(#[source] serde_json::Error),
}

impl IntoErrorObject for HandlerError {
    fn into_error_object(self) -> ErrorObject {
        ErrorObject::application(self.to_string())
    }
}

type HandlerResult = Result<Value, HandlerError>;

/// The five method handlers sharing one gateway
#[derive(Clone)]
pub struct Handlers {
    gateway: Arc<dyn QueryGateway>,
    guard: Option<ReadOnlyGuard>,
}

impl Handlers {
    pub fn new(gateway: Arc<dyn QueryGateway>) -> Self {
        Self {
            gateway,
            guard: None,
        }
    }

    /// Reject non-read statements in `call_tool` before they reach the gateway
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.guard = read_only.then(ReadOnlyGuard::new);
        self
    }

    /// Handle one request and produce its response
    pub async fn handle(&self, id: i64, method: Method, params: Value) -> Response {
        let outcome = match MethodCall::decode(method, params) {
            Ok(call) => self.dispatch(call).await,
            Err(e) => Err(e),
        };
        Response::from_result(id, outcome)
    }

    async fn dispatch(&self, call: MethodCall) -> HandlerResult {
        match call {
            MethodCall::Initialize => Ok(self.initialize()),
            MethodCall::ListTools => self.list_tools(),
            MethodCall::ListResources => self.list_resources().await,
            MethodCall::ReadResource(params) => self.read_resource(params).await,
            MethodCall::CallTool(params) => self.call_tool(params).await,
        }
    }

    /// Capability flags, returned as the bare result
    fn initialize(&self) -> Value {
        json!({
            "capabilities": {
                "list_tools": true,
                "call_tool": true,
                "list_resources": true,
                "read_resource": true,
            },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    fn list_tools(&self) -> HandlerResult {
        let tools = vec![ToolDescriptor::for_arguments::<QueryArguments>(
            QUERY_TOOL,
            QUERY_TOOL_DESCRIPTION,
        )];
        json_content(&tools).map_err(HandlerError::Encode)
    }

    async fn list_resources(&self) -> HandlerResult {
        self.run(&Statement::raw(LIST_TABLES_SQL)).await
    }

    async fn read_resource(&self, params: ReadResourceParams) -> HandlerResult {
        let uri = ResourceUri::parse(&params.uri)?;
        debug!(table = %uri.table, "reading table schema");
        self.run(&Statement::raw(TABLE_COLUMNS_SQL).bind(uri.table))
            .await
    }

    async fn call_tool(&self, params: CallToolParams) -> HandlerResult {
        if params.name != QUERY_TOOL {
            return Err(HandlerError::UnsupportedTool(params.name));
        }

        let args = QueryArguments::from_arguments(params.arguments)?;

        if let Some(guard) = &self.guard {
            if !guard.is_allowed(&args.sql) {
                return Err(HandlerError::NotReadOnly(guard.allowed_keywords()));
            }
        }

        self.run(&Statement::raw(args.sql)).await
    }

    async fn run(&self, statement: &Statement) -> HandlerResult {
        let rows = self.gateway.execute(statement).await?;
        json_content(&rows).map_err(HandlerError::Encode)
    }
}
