//! Concrete drivers built on single `sqlx` connections.
//!
//! Each submodule provides the same interface adapted to its backend:
//! - `mysql`: MySQL / MariaDB
//! - `pgsql`: PostgreSQL
//! - `sqlite`: SQLite
//!
//! The session bookkeeping every driver needs (elapsed time, affected rows,
//! last insert id, reporting of internal statements) lives in [`SessionState`].

mod mysql;
mod pgsql;
mod sqlite;

pub use mysql::MySqlDriver;
pub use pgsql::PgSqlDriver;
pub use sqlite::SqliteDriver;

use crate::db::connection::ConnectionConfig;
use crate::db::events::QueryReporter;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::QueryResult;
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use sqlx::Either;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Per-session bookkeeping shared by all drivers.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    reporter: Option<QueryReporter>,
    elapsed: Duration,
    affected_rows: u64,
    last_insert_id: Option<i64>,
}

impl SessionState {
    pub(crate) fn attach(&mut self, reporter: QueryReporter) {
        *self = Self {
            reporter: Some(reporter),
            ..Self::default()
        };
    }

    pub(crate) fn detach(&mut self) {
        self.reporter = None;
    }

    /// Store the outcome of a statement.
    ///
    /// `internal` marks statements the driver ran on its own: those are
    /// reported to the connection and leave the user-visible counters alone.
    pub(crate) fn finish(
        &mut self,
        sql: &str,
        elapsed: Duration,
        outcome: &DbResult<QueryResult>,
        internal: bool,
    ) {
        if !internal {
            self.elapsed = elapsed;
            if let Ok(result) = outcome {
                self.affected_rows = result.rows_affected;
                self.last_insert_id = result.last_insert_id;
            }
        }
        debug!(
            sql = %sql,
            elapsed_ms = elapsed.as_millis() as u64,
            ok = outcome.is_ok(),
            "Statement finished"
        );
        if internal {
            if let Some(reporter) = &self.reporter {
                reporter.report(sql, elapsed, outcome);
            }
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub(crate) fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub(crate) fn last_insert_id(&self) -> i64 {
        self.last_insert_id.unwrap_or(0)
    }
}

/// Summary values carried by a backend's per-statement result.
pub(crate) trait StatementOutcome {
    fn affected(&self) -> u64;
    fn inserted_id(&self) -> Option<i64>;
}

impl StatementOutcome for sqlx::mysql::MySqlQueryResult {
    fn affected(&self) -> u64 {
        self.rows_affected()
    }

    fn inserted_id(&self) -> Option<i64> {
        Some(self.last_insert_id() as i64).filter(|id| *id != 0)
    }
}

impl StatementOutcome for sqlx::postgres::PgQueryResult {
    fn affected(&self) -> u64 {
        self.rows_affected()
    }

    fn inserted_id(&self) -> Option<i64> {
        None
    }
}

impl StatementOutcome for sqlx::sqlite::SqliteQueryResult {
    fn affected(&self) -> u64 {
        self.rows_affected()
    }

    fn inserted_id(&self) -> Option<i64> {
        Some(self.last_insert_rowid()).filter(|id| *id != 0)
    }
}

/// Drain a `fetch_many` stream into a [`QueryResult`].
///
/// Rows of every statement are kept; affected rows are summed.
pub(crate) async fn collect_results<D, R>(
    mut stream: BoxStream<'_, Result<Either<D, R>, sqlx::Error>>,
    sql: &str,
) -> DbResult<QueryResult>
where
    D: StatementOutcome,
    R: RowToJson,
{
    let mut result = QueryResult::default();
    while let Some(item) = stream
        .try_next()
        .await
        .map_err(|e| DbError::from(e).with_sql(sql))?
    {
        match item {
            Either::Left(done) => {
                result.rows_affected += done.affected();
                if let Some(id) = done.inserted_id() {
                    result.last_insert_id = Some(id);
                }
            }
            Either::Right(row) => {
                if result.columns.is_empty() {
                    result.columns = row.column_names();
                }
                result.rows.push(row.to_json_map());
            }
        }
    }
    Ok(result)
}

/// Read the first cell of a result as an integer.
pub(crate) fn scalar_i64(result: &QueryResult, sql: &str) -> DbResult<i64> {
    let value = result
        .scalar()
        .ok_or_else(|| DbError::query("Statement returned no value", sql, None))?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| DbError::query(format!("Expected an integer, got {}", value), sql, None))
}

/// Parse an optional numeric connection option.
pub(crate) fn parsed_option<T: FromStr>(config: &ConnectionConfig, key: &str) -> DbResult<Option<T>> {
    match config.option(key) {
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            DbError::configuration(format!("Option '{}' has an invalid value: {}", key, raw))
        }),
        None => Ok(None),
    }
}

/// Interpret a boolean connection option (`true`/`1`/`yes`).
pub(crate) fn flag_option(config: &ConnectionConfig, key: &str) -> Option<bool> {
    config.option(key).map(|v| {
        let v = v.to_ascii_lowercase();
        v == "true" || v == "1" || v == "yes"
    })
}

/// Generate a helpful suggestion for connection errors.
pub(crate) fn connection_suggestion(backend: &str, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!("Check that the {} server is running and accessible", backend);
    }
    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the username and password".to_string();
    }
    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }
    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }
    format!("Verify the {} connection options", backend)
}
