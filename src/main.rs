//! dbal - Main entry point.
//!
//! Runs the given SQL statements on one connection, wrapped in the requested
//! number of nested transactions, and prints result rows as JSON lines.

use dbal_connection::config::Config;
use dbal_connection::db::Connection;
use dbal_connection::error::{DbError, DbResult};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries query results.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Execute statements in order, stopping at the first failure.
async fn execute_all(connection: &mut Connection, statements: &[String]) -> DbResult<()> {
    for sql in statements {
        let result = connection.native_query(sql).await?;
        for row in &result.rows {
            let line = serde_json::to_string(row)
                .map_err(|e| DbError::internal(format!("Cannot serialize row: {e}")))?;
            println!("{line}");
        }
        if result.columns.is_empty() {
            info!(rows_affected = result.rows_affected, "Statement done");
        }
    }
    Ok(())
}

/// Unwind every open level. A failed commit rolls back what is left.
async fn close_transactions(connection: &mut Connection, commit: bool) -> DbResult<()> {
    if commit {
        while connection.nesting_level() > 0 {
            if let Err(e) = connection.commit_transaction().await {
                rollback_all(connection).await;
                return Err(e);
            }
        }
        Ok(())
    } else {
        let depth = connection.nesting_level();
        rollback_all(connection).await;
        info!(depth, "Rolled back");
        Ok(())
    }
}

async fn rollback_all(connection: &mut Connection) {
    while connection.nesting_level() > 0 {
        if let Err(e) = connection.rollback_transaction().await {
            warn!(error = %e, "Rollback failed");
        }
    }
}

async fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut connection = Connection::new(config.connection_config()?)?;
    connection.on_query(|_, event| match event.outcome {
        Ok(result) => info!(
            sql = %event.sql,
            elapsed_ms = event.elapsed.as_secs_f64() * 1000.0,
            rows = result.row_count(),
            rows_affected = result.rows_affected,
            "Query"
        ),
        Err(e) => warn!(sql = %event.sql, error = %e, "Query failed"),
    });

    connection.connect().await?;
    for _ in 0..config.nested {
        connection.begin_transaction().await?;
    }

    let outcome = tokio::select! {
        outcome = execute_all(&mut connection, &config.statements) => outcome,
        _ = tokio::signal::ctrl_c() => Err(DbError::internal("Interrupted")),
    };

    let closed = close_transactions(&mut connection, outcome.is_ok() && !config.rollback).await;
    connection.disconnect().await;

    outcome?;
    closed?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    init_tracing(&config);

    info!(
        nested = config.nested,
        statements = config.statements.len(),
        "Starting dbal v{}",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = run(&config).await {
        error!(error = %e, "dbal failed");
        return Err(e);
    }
    Ok(())
}
