//! Driver abstraction.
//!
//! A driver owns one live database session. The connection manager depends
//! only on this trait; concrete backends live in `db::drivers`.

use crate::db::connection::ConnectionConfig;
use crate::db::events::QueryReporter;
use crate::db::platform::Platform;
use crate::error::DbResult;
use crate::models::{IsolationLevel, QueryResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait Driver: Send + Sync + std::fmt::Debug {
    /// Registry identifier, e.g. `"pgsql"`.
    fn name(&self) -> &'static str;

    /// Open the session. Statements the driver issues by itself must be
    /// reported through `reporter`.
    async fn connect(&mut self, config: &ConnectionConfig, reporter: QueryReporter)
    -> DbResult<()>;

    /// Close the session. Close failures are logged, not returned.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Run a final SQL string. Not reported; the connection fires the hooks.
    async fn query(&mut self, sql: &str) -> DbResult<QueryResult>;

    /// Duration of the last `query` call, including failed ones.
    fn query_elapsed_time(&self) -> Duration;

    /// Identifier generated by the last insert. PostgreSQL reads `sequence`
    /// (or `LASTVAL()` when absent); other backends ignore it.
    async fn last_inserted_id(&mut self, sequence: Option<&str>) -> DbResult<i64>;

    /// Rows affected by the last `query` call.
    fn affected_rows(&self) -> u64;

    fn create_platform(&self) -> Arc<dyn Platform>;

    async fn server_version(&mut self) -> DbResult<String>;

    /// Never fails; a broken session reports `false`.
    async fn ping(&mut self) -> bool;

    async fn set_transaction_isolation_level(&mut self, level: IsolationLevel) -> DbResult<()>;

    async fn begin_transaction(&mut self) -> DbResult<()>;

    async fn commit_transaction(&mut self) -> DbResult<()>;

    async fn rollback_transaction(&mut self) -> DbResult<()>;

    async fn create_savepoint(&mut self, name: &str) -> DbResult<()>;

    async fn release_savepoint(&mut self, name: &str) -> DbResult<()>;

    async fn rollback_savepoint(&mut self, name: &str) -> DbResult<()>;

    /// Quote a string literal for this dialect.
    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Quote an identifier; dotted names are quoted per segment.
    fn quote_identifier(&self, value: &str) -> String {
        value
            .split('.')
            .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn format_bool(&self, value: bool) -> String {
        if value { "TRUE" } else { "FALSE" }.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::drivers::SqliteDriver;

    #[test]
    fn test_default_quoting() {
        let driver = SqliteDriver::new();
        assert_eq!(driver.quote_string("it's"), "'it''s'");
        assert_eq!(driver.quote_identifier("main.users"), "\"main\".\"users\"");
        assert_eq!(driver.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
