//! Request dispatcher
//!
//! Reads one request at a time and answers it before reading the next.
//! Nothing a client sends can stop the loop; only the end of the input
//! stream or a failing reader does.

use std::convert::Infallible;
use std::sync::Arc;

use mcp_common::{ErrorObject, Payload, Response};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::debug;

use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::handlers::Handlers;
use crate::protocol::Method;
use crate::transport::{JsonTransport, TransportError};

/// What to do with a request whose method is not implemented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownMethodPolicy {
    /// Report it as a diagnostic and send nothing
    #[default]
    Drop,
    /// Also answer with a "method not found" error
    Reply,
}

/// Why the dispatch loop stopped
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("input stream closed")]
    StreamClosed,

    #[error("failed to read request: {0}")]
    Read(#[source] std::io::Error),
}

pub struct Dispatcher<R, W> {
    transport: JsonTransport<R, W>,
    handlers: Handlers,
    diagnostics: Arc<dyn Diagnostics>,
    unknown_methods: UnknownMethodPolicy,
}

impl<R, W> Dispatcher<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        transport: JsonTransport<R, W>,
        handlers: Handlers,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            transport,
            handlers,
            diagnostics,
            unknown_methods: UnknownMethodPolicy::default(),
        }
    }

    pub fn with_unknown_methods(mut self, policy: UnknownMethodPolicy) -> Self {
        self.unknown_methods = policy;
        self
    }

    /// Serve requests until the input ends or cannot be read
    pub async fn run(&mut self) -> Result<Infallible, DispatchError> {
        loop {
            self.step().await?;
        }
    }

    /// Read and handle a single request
    pub async fn step(&mut self) -> Result<(), DispatchError> {
        let request = match self.transport.receive().await {
            Ok(Some(request)) => request,
            Ok(None) => return Err(DispatchError::StreamClosed),
            Err(TransportError::Decode(e)) => {
                self.diagnostics.emit(DiagnosticEvent::DecodeFailed {
                    error: e.to_string(),
                });
                return Ok(());
            }
            Err(TransportError::Io(e)) => return Err(DispatchError::Read(e)),
        };

        let id = request.id;
        debug!(id, method = %request.method, "received request");

        let response = match Method::parse(&request.method) {
            Some(method) => {
                let response = self.handlers.handle(id, method, request.params).await;
                if let Payload::Error(err) = &response.payload {
                    self.diagnostics.emit(DiagnosticEvent::RequestFailed {
                        id,
                        method: request.method,
                        message: err.message.clone(),
                    });
                }
                response
            }
            None => {
                let reply = match self.unknown_methods {
                    UnknownMethodPolicy::Drop => None,
                    UnknownMethodPolicy::Reply => Some(Response::error(
                        id,
                        ErrorObject::method_not_found(&request.method),
                    )),
                };
                self.diagnostics.emit(DiagnosticEvent::UnknownMethod {
                    id,
                    method: request.method,
                });
                match reply {
                    Some(response) => response,
                    None => return Ok(()),
                }
            }
        };

        if let Err(e) = self.transport.send(&response).await {
            self.diagnostics.emit(DiagnosticEvent::SendFailed {
                id,
                error: e.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use crate::gateway::{GatewayResult, QueryGateway, Row, Statement};
    use async_trait::async_trait;
    use mcp_common::METHOD_NOT_FOUND;

    struct OneRow;

    #[async_trait]
    impl QueryGateway for OneRow {
        async fn execute(&self, _statement: &Statement) -> GatewayResult<Vec<Row>> {
            Ok(vec![Row::new().with("table_name", "users")])
        }
    }

    type MemoryDispatcher = Dispatcher<&'static [u8], Vec<u8>>;

    fn dispatcher(input: &'static str) -> (MemoryDispatcher, Arc<RecordingDiagnostics>) {
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let transport = JsonTransport::new(input.as_bytes(), Vec::new());
        let d = Dispatcher::new(transport, Handlers::new(Arc::new(OneRow)), diagnostics.clone());
        (d, diagnostics)
    }

    fn responses(d: MemoryDispatcher) -> Vec<Response> {
        let (_, written) = d.transport.into_inner();
        String::from_utf8(written)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_each_request_gets_one_response() {
        let (mut d, _) = dispatcher(
            "{\"jsonrpc\":\"2.0\",\"method\":\"initialize\",\"id\":1}\n\
             {\"jsonrpc\":\"2.0\",\"method\":\"list_resources\",\"id\":2}\n",
        );

        let stop = d.run().await.unwrap_err();
        assert!(matches!(stop, DispatchError::StreamClosed));

        let out = responses(d);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, 1);
        assert_eq!(out[1].id, 2);
        assert!(out.iter().all(|r| !r.is_error()));
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped() {
        let (mut d, diagnostics) =
            dispatcher("not json at all\n{\"method\":\"list_tools\",\"id\":7}\n");

        assert!(d.run().await.is_err());

        let out = responses(d);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 7);
        assert_eq!(
            diagnostics.count(|e| matches!(e, DiagnosticEvent::DecodeFailed { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_method_dropped_by_default() {
        let (mut d, diagnostics) =
            dispatcher("{\"method\":\"ping\",\"id\":3}\n{\"method\":\"list_tools\",\"id\":4}\n");

        assert!(d.run().await.is_err());

        let out = responses(d);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 4);
        assert_eq!(
            diagnostics.events()[0],
            DiagnosticEvent::UnknownMethod {
                id: 3,
                method: "ping".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_method_reply_policy() {
        let (d, _) = dispatcher("{\"method\":\"ping\",\"id\":3}\n");
        let mut d = d.with_unknown_methods(UnknownMethodPolicy::Reply);

        assert!(d.run().await.is_err());

        let out = responses(d);
        assert_eq!(out.len(), 1);
        let err = out[0].error_object().unwrap();
        assert_eq!(err.code, METHOD_NOT_FOUND);
        assert!(err.message.contains("ping"));
    }

    #[tokio::test]
    async fn test_failed_request_is_reported() {
        let (mut d, diagnostics) = dispatcher(
            "{\"method\":\"call_tool\",\"id\":9,\"params\":{\"name\":\"nope\"}}\n",
        );

        assert!(d.run().await.is_err());

        assert!(responses(d)[0].is_error());
        assert_eq!(
            diagnostics.count(|e| matches!(e, DiagnosticEvent::RequestFailed { id: 9, .. })),
            1
        );
    }
}
