//! Query gateway - the boundary between protocol handlers and the database
//!
//! Handlers only see [`QueryGateway`]. The Postgres driver lives behind
//! [`PgGateway`]; the empty-result policy is layered on top by
//! [`RequireRows`] so the driver adapter stays a plain executor.

mod postgres;
mod value;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use postgres::PgGateway;
pub use value::{Row, Scalar};

/// SQL text plus positional text parameters (`$1`, `$2`, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<String>,
}

impl Statement {
    /// Statement executed verbatim with no parameters
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    /// Append the next positional parameter
    pub fn bind(mut self, value: impl Into<String>) -> Self {
        self.binds.push(value.into());
        self
    }
}

/// Errors surfaced by a gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The database rejected or failed the statement
    #[error("{0}")]
    Query(String),

    /// The statement succeeded but produced no rows
    #[error("no rows returned")]
    NoRows,

    /// The statement exceeded the configured timeout
    #[error("query timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The pool could not be created or the first connection failed
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Executes statements and returns rows
#[async_trait]
pub trait QueryGateway: Send + Sync {
    async fn execute(&self, statement: &Statement) -> GatewayResult<Vec<Row>>;
}

#[async_trait]
impl<G: QueryGateway + ?Sized> QueryGateway for std::sync::Arc<G> {
    async fn execute(&self, statement: &Statement) -> GatewayResult<Vec<Row>> {
        (**self).execute(statement).await
    }
}

/// Adapter that turns an empty row set into [`GatewayError::NoRows`]
///
/// Callers that need to tell "legitimately empty" apart from "failed"
/// should talk to the inner gateway directly.
#[derive(Debug, Clone)]
pub struct RequireRows<G> {
    inner: G,
}

impl<G> RequireRows<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<G: QueryGateway> QueryGateway for RequireRows<G> {
    async fn execute(&self, statement: &Statement) -> GatewayResult<Vec<Row>> {
        let rows = self.inner.execute(statement).await?;
        if rows.is_empty() {
            return Err(GatewayError::NoRows);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Row>);

    #[async_trait]
    impl QueryGateway for Fixed {
        async fn execute(&self, _statement: &Statement) -> GatewayResult<Vec<Row>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_statement_binds_in_order() {
        let stmt = Statement::raw("SELECT $1, $2").bind("a").bind("b");
        assert_eq!(stmt.binds, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_require_rows_rejects_empty() {
        let gateway = RequireRows::new(Fixed(vec![]));
        let result = gateway.execute(&Statement::raw("SELECT 1")).await;
        assert!(matches!(result, Err(GatewayError::NoRows)));
    }

    #[tokio::test]
    async fn test_require_rows_passes_rows_through() {
        let gateway = RequireRows::new(Fixed(vec![Row::new().with("one", 1i64)]));
        let rows = gateway.execute(&Statement::raw("SELECT 1")).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_timeout_message() {
        let err = GatewayError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "query timed out after 30s");
    }
}
