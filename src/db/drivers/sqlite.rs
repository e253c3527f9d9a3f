//! SQLite driver.
//!
//! The session is a single `SqliteConnection`. The target is either a full
//! `url` (`sqlite:path?mode=rwc`, `sqlite::memory:`) or a `filename`, with
//! `create_if_missing` controlling whether a missing file is created.

use super::{SessionState, connection_suggestion, flag_option};
use crate::db::connection::ConnectionConfig;
use crate::db::driver::Driver;
use crate::db::events::QueryReporter;
use crate::db::platform::{Platform, SqlitePlatform};
use crate::error::{DbError, DbResult};
use crate::models::{IsolationLevel, QueryResult, json_to_string};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteQueryResult, SqliteRow};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const MEMORY: &str = ":memory:";

#[derive(Default)]
pub struct SqliteDriver {
    conn: Option<SqliteConnection>,
    state: SessionState,
}

crate::impl_session_driver!(SqliteDriver, SqliteConnection, SqliteQueryResult, SqliteRow, "sqlite");

impl SqliteDriver {
    fn connect_options(config: &ConnectionConfig) -> DbResult<SqliteConnectOptions> {
        let target = match (config.option("url"), config.option("filename")) {
            (Some(url), _) => url.to_string(),
            (None, Some(MEMORY)) => format!("sqlite:{}", MEMORY),
            (None, Some(filename)) => {
                return Ok(SqliteConnectOptions::new()
                    .filename(filename)
                    .create_if_missing(flag_option(config, "create_if_missing").unwrap_or(false)));
            }
            (None, None) => {
                return Err(DbError::configuration(
                    "SQLite driver needs a 'url' or 'filename' option",
                ));
            }
        };

        let mut options = SqliteConnectOptions::from_str(&target).map_err(|e| {
            DbError::connection(
                format!("Invalid SQLite connection string: {}", e),
                "Check the connection URL format: sqlite:path/to/db.sqlite",
            )
        })?;
        if let Some(create) = flag_option(config, "create_if_missing") {
            options = options.create_if_missing(create);
        }
        Ok(options)
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn connect(&mut self, config: &ConnectionConfig, reporter: QueryReporter) -> DbResult<()> {
        let options = Self::connect_options(config)?;
        let conn = <SqliteConnection as sqlx::Connection>::connect_with(&options)
            .await
            .map_err(|e| {
                DbError::connection(
                    format!("Failed to connect: {}", e),
                    connection_suggestion("SQLite", &e),
                )
            })?;
        self.conn = Some(conn);
        self.state.attach(reporter);
        info!(driver = "sqlite", filename = %options.get_filename().display(), "Session opened");
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.close_session().await;
    }

    fn is_connected(&self) -> bool {
        self.has_session()
    }

    async fn query(&mut self, sql: &str) -> DbResult<QueryResult> {
        self.execute(sql).await
    }

    fn query_elapsed_time(&self) -> Duration {
        self.state.elapsed()
    }

    async fn last_inserted_id(&mut self, _sequence: Option<&str>) -> DbResult<i64> {
        Ok(self.state.last_insert_id())
    }

    fn affected_rows(&self) -> u64 {
        self.state.affected_rows()
    }

    fn create_platform(&self) -> Arc<dyn Platform> {
        Arc::new(SqlitePlatform)
    }

    async fn server_version(&mut self) -> DbResult<String> {
        let sql = "SELECT sqlite_version()";
        let result = self.internal(sql).await?;
        result
            .scalar()
            .and_then(json_to_string)
            .ok_or_else(|| DbError::query("SQLite did not report a version", sql, None))
    }

    async fn ping(&mut self) -> bool {
        self.ping_session().await
    }

    /// SQLite transactions are serializable; only dirty reads can be toggled.
    async fn set_transaction_isolation_level(&mut self, level: IsolationLevel) -> DbResult<()> {
        let flag = matches!(level, IsolationLevel::ReadUncommitted) as u8;
        let sql = format!("PRAGMA read_uncommitted = {}", flag);
        self.internal(&sql).await.map(drop)
    }

    async fn begin_transaction(&mut self) -> DbResult<()> {
        self.internal("BEGIN").await.map(drop)
    }

    async fn commit_transaction(&mut self) -> DbResult<()> {
        self.internal("COMMIT").await.map(drop)
    }

    async fn rollback_transaction(&mut self) -> DbResult<()> {
        self.internal("ROLLBACK").await.map(drop)
    }

    async fn create_savepoint(&mut self, name: &str) -> DbResult<()> {
        let sql = format!("SAVEPOINT {}", self.quote_identifier(name));
        self.internal(&sql).await.map(drop)
    }

    async fn release_savepoint(&mut self, name: &str) -> DbResult<()> {
        let sql = format!("RELEASE SAVEPOINT {}", self.quote_identifier(name));
        self.internal(&sql).await.map(drop)
    }

    async fn rollback_savepoint(&mut self, name: &str) -> DbResult<()> {
        let sql = format!("ROLLBACK TO SAVEPOINT {}", self.quote_identifier(name));
        self.internal(&sql).await.map(drop)
    }

    fn format_bool(&self, value: bool) -> String {
        if value { "1" } else { "0" }.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> ConnectionConfig {
        ConnectionConfig::named("sqlite").with_option("filename", MEMORY)
    }

    #[test]
    fn test_missing_target_is_configuration_error() {
        let err = SqliteDriver::connect_options(&ConnectionConfig::named("sqlite")).unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_internal_statements_are_reported() {
        let (reporter, mut receiver) = QueryReporter::channel();
        let mut driver = SqliteDriver::new();
        driver.connect(&memory_config(), reporter).await.unwrap();

        driver.begin_transaction().await.unwrap();
        driver.create_savepoint("sp").await.unwrap();
        driver.query("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)").await.unwrap();
        driver.release_savepoint("sp").await.unwrap();
        driver.commit_transaction().await.unwrap();

        let reported: Vec<String> = std::iter::from_fn(|| receiver.try_recv().ok())
            .map(|record| record.sql)
            .collect();
        assert_eq!(
            reported,
            vec!["BEGIN", "SAVEPOINT \"sp\"", "RELEASE SAVEPOINT \"sp\"", "COMMIT"]
        );
        driver.disconnect().await;
        assert!(!driver.is_connected());
    }

    #[tokio::test]
    async fn test_affected_rows_and_insert_id() {
        let (reporter, _receiver) = QueryReporter::channel();
        let mut driver = SqliteDriver::new();
        driver.connect(&memory_config(), reporter).await.unwrap();
        driver.query("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)").await.unwrap();

        driver.query("INSERT INTO t (v) VALUES ('a'), ('b')").await.unwrap();
        assert_eq!(driver.affected_rows(), 2);
        assert_eq!(driver.last_inserted_id(None).await.unwrap(), 2);

        let result = driver.query("SELECT v FROM t ORDER BY id").await.unwrap();
        assert_eq!(result.columns, vec!["v"]);
        assert_eq!(result.row_count(), 2);
        assert!(driver.ping().await);
        assert!(!driver.server_version().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_query_carries_sql() {
        let (reporter, _receiver) = QueryReporter::channel();
        let mut driver = SqliteDriver::new();
        driver.connect(&memory_config(), reporter).await.unwrap();

        let err = driver.query("SELECT * FROM missing_table").await.unwrap_err();
        assert_eq!(err.sql(), Some("SELECT * FROM missing_table"));
    }
}
