use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sqlx::{
    Connection, PgConnection, Row,
    postgres::{PgConnectOptions, PgRow},
};

use crate::{
    config::UsageSourceConfig,
    db::{
        error::{DbError, DbResult},
        repos::UsageSource,
    },
    models::{RawUsageRow, ReportingWindow},
};

/// Reads usage snapshots from a PostgreSQL table owned by another system.
///
/// A run issues exactly one query, so a dedicated connection is opened per
/// fetch and closed before returning rather than keeping a pool around.
pub struct PostgresUsageSource {
    config: UsageSourceConfig,
    query: String,
}

impl PostgresUsageSource {
    pub fn new(config: UsageSourceConfig) -> Self {
        let query = build_usage_query(&config);
        Self { config, query }
    }

    async fn connect(&self) -> DbResult<PgConnection> {
        let options = PgConnectOptions::from_str(&self.config.url)?;
        let timeout = self.config.connect_timeout();
        match tokio::time::timeout(timeout, PgConnection::connect_with(&options)).await {
            Ok(conn) => Ok(conn?),
            Err(_) => Err(DbError::Timeout(timeout)),
        }
    }
}

/// Table and column names come from validated configuration and are
/// interpolated; all values are bound.
fn build_usage_query(config: &UsageSourceConfig) -> String {
    let UsageSourceConfig {
        table,
        key_column: key,
        quantity_column: quantity,
        timestamp_column: ts,
        ..
    } = config;

    format!(
        r#"
        SELECT
            CAST({key} AS TEXT) AS identity_key,
            CAST({quantity} AS NUMERIC) AS quantity,
            CAST({ts} AS TIMESTAMP) AS recorded_at
        FROM {table}
        WHERE CAST({ts} AS TIMESTAMP) >= $1
          AND CAST({ts} AS TIMESTAMP) < $2
          AND {key} IS NOT NULL
          AND {key} <> $3
        ORDER BY {key} ASC, CAST({ts} AS TIMESTAMP) ASC
        "#
    )
}

fn row_to_usage(row: &PgRow) -> DbResult<Option<RawUsageRow>> {
    let identity_key: String = row.try_get("identity_key")?;
    let quantity: Option<Decimal> = row.try_get("quantity")?;
    let recorded_at: NaiveDateTime = row.try_get("recorded_at")?;

    let Some(quantity) = quantity else {
        tracing::warn!(identity_key = %identity_key, "Skipping usage row with no quantity");
        return Ok(None);
    };

    Ok(Some(RawUsageRow::new(
        identity_key,
        quantity,
        recorded_at.and_utc(),
    )))
}

#[async_trait]
impl UsageSource for PostgresUsageSource {
    async fn fetch_recent_usage(&self, window: ReportingWindow) -> DbResult<Vec<RawUsageRow>> {
        let mut conn = self.connect().await?;

        let timeout = self.config.query_timeout();
        let result = tokio::time::timeout(
            timeout,
            sqlx::query(&self.query)
                .bind(window.start_at())
                .bind(window.end_at())
                .bind(&self.config.deleted_sentinel)
                .fetch_all(&mut conn),
        )
        .await;

        // Released whether or not the query succeeded.
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "Error closing usage database connection");
        }

        let rows = match result {
            Ok(rows) => rows?,
            Err(_) => return Err(DbError::Timeout(timeout)),
        };

        let mut usage = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(entry) = row_to_usage(row)? {
                usage.push(entry);
            }
        }

        tracing::debug!(
            window = %window,
            rows = usage.len(),
            "Fetched usage rows"
        );

        Ok(usage)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
