//! Postgres implementation of the query gateway

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgTypeInfo};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{BigDecimal, JsonValue, Uuid};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use super::{GatewayError, GatewayResult, QueryGateway, Row, Scalar, Statement};
use crate::config::DatabaseConfig;

/// Gateway backed by a sqlx connection pool
#[derive(Debug, Clone)]
pub struct PgGateway {
    pool: PgPool,
    read_only: bool,
    query_timeout: Option<Duration>,
}

impl PgGateway {
    /// Create the pool and open the first connection
    ///
    /// Fails when the credentials are rejected or the server is unreachable
    /// within the configured connect timeout.
    pub async fn connect(config: &DatabaseConfig) -> GatewayResult<Self> {
        info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            "Connecting to database"
        );

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(config.connect_timeout)
            .connect_with(options)
            .await
            .map_err(GatewayError::Connect)?;

        info!("Database connection established");

        Ok(Self::from_pool(pool, config.read_only, config.query_timeout))
    }

    pub fn from_pool(pool: PgPool, read_only: bool, query_timeout: Option<Duration>) -> Self {
        Self {
            pool,
            read_only,
            query_timeout,
        }
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }

    async fn fetch(&self, statement: &Statement) -> Result<Vec<PgRow>, sqlx::Error> {
        let mut query = sqlx::query(&statement.sql);
        for value in &statement.binds {
            query = query.bind(value.as_str());
        }

        if !self.read_only {
            return query.fetch_all(&self.pool).await;
        }

        // Read-only mode: the server enforces it, and nothing is ever committed.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        let rows = query.fetch_all(&mut *tx).await;
        if let Err(e) = tx.rollback().await {
            warn!("Failed to roll back read-only transaction: {}", e);
        }
        rows
    }
}

#[async_trait]
impl QueryGateway for PgGateway {
    async fn execute(&self, statement: &Statement) -> GatewayResult<Vec<Row>> {
        debug!(sql = %statement.sql, binds = statement.binds.len(), "executing statement");

        let rows = match self.query_timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetch(statement))
                .await
                .map_err(|_| GatewayError::Timeout(limit))?,
            None => self.fetch(statement).await,
        }
        .map_err(query_error)?;

        rows.iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)
    }
}

fn query_error(err: sqlx::Error) -> GatewayError {
    match err {
        sqlx::Error::Database(db) => match db.code() {
            Some(code) => GatewayError::Query(format!("{} (SQLSTATE {})", db.message(), code)),
            None => GatewayError::Query(db.message().to_string()),
        },
        other => GatewayError::Query(other.to_string()),
    }
}

fn decode_row(row: &PgRow) -> Result<Row, sqlx::Error> {
    let mut out = Row::with_capacity(row.columns().len());
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info())?;
        out.push(column.name(), value);
    }
    Ok(out)
}

fn decode_column(row: &PgRow, idx: usize, type_info: &PgTypeInfo) -> Result<Scalar, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Scalar::Null);
    }

    let value = match type_info.name() {
        "BOOL" => Scalar::Bool(row.try_get(idx)?),
        // The single-byte internal type; `char(n)` is reported as plain CHAR
        "\"CHAR\"" => Scalar::Int(row.try_get::<i8, _>(idx)?.into()),
        "INT2" => Scalar::Int(row.try_get::<i16, _>(idx)?.into()),
        "INT4" => Scalar::Int(row.try_get::<i32, _>(idx)?.into()),
        "INT8" => Scalar::Int(row.try_get(idx)?),
        "OID" => Scalar::Int(row.try_get::<Oid, _>(idx)?.0.into()),
        "FLOAT4" => Scalar::Float(row.try_get::<f32, _>(idx)?.into()),
        "FLOAT8" => Scalar::Float(row.try_get(idx)?),
        "NUMERIC" => Scalar::Text(row.try_get::<BigDecimal, _>(idx)?.to_string()),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "UNKNOWN" => {
            Scalar::Text(row.try_get(idx)?)
        }
        "UUID" => Scalar::Text(row.try_get::<Uuid, _>(idx)?.to_string()),
        "JSON" | "JSONB" => Scalar::Text(row.try_get::<JsonValue, _>(idx)?.to_string()),
        "BYTEA" => Scalar::Bytes(row.try_get(idx)?),
        "DATE" => Scalar::Text(row.try_get::<NaiveDate, _>(idx)?.to_string()),
        "TIME" => Scalar::Text(row.try_get::<NaiveTime, _>(idx)?.to_string()),
        "TIMESTAMP" => Scalar::Text(row.try_get::<NaiveDateTime, _>(idx)?.to_string()),
        "TIMESTAMPTZ" => Scalar::Text(row.try_get::<DateTime<Utc>, _>(idx)?.to_rfc3339()),
        other => Scalar::Text(format!("<unsupported {}>", other)),
    };
    Ok(value)
}
