//! Error types for the connection layer.
//!
//! All failures are expressed through [`DbError`], built with `thiserror`.
//! Driver-level failures keep enough context (SQL text, SQLSTATE) for query
//! hooks and callers to report them without re-running anything.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DbError {
    /// Missing or invalid driver specification, bad connection options.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// Empty when the failing statement is not known yet.
        sql: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    /// Commit or rollback requested while no transaction is open.
    #[error("Transaction discipline violated: {operation} called with no open transaction")]
    TransactionDiscipline { operation: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a query error for the given statement.
    pub fn query(
        message: impl Into<String>,
        sql: impl Into<String>,
        sql_state: Option<String>,
    ) -> Self {
        Self::Query {
            message: message.into(),
            sql: sql.into(),
            sql_state,
        }
    }

    /// Create a transaction discipline error.
    pub fn transaction_discipline(operation: impl Into<String>) -> Self {
        Self::TransactionDiscipline {
            operation: operation.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Error returned by drivers when an operation needs a live session.
    pub fn not_connected(driver: &str) -> Self {
        Self::connection(
            format!("{} driver is not connected", driver),
            "Call connect() or run a query first",
        )
    }

    /// Attach the failing SQL to a query error that does not carry it yet.
    pub fn with_sql(self, statement: &str) -> Self {
        match self {
            Self::Query {
                message,
                sql,
                sql_state,
            } if sql.is_empty() => Self::Query {
                message,
                sql: statement.to_string(),
                sql_state,
            },
            other => other,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// The failing SQL, for query errors.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Query { sql, .. } if !sql.is_empty() => Some(sql),
            _ => None,
        }
    }

    /// Check if this error is retryable. Nothing in this crate retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::configuration(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::query(db_err.message(), "", code)
            }
            sqlx::Error::RowNotFound => DbError::query("No rows returned", "", None),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                DbError::connection(err.to_string(), "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::query(format!("Column not found: {}", col), "", None)
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::connection(
                "Database worker crashed",
                "Reconnect to the database",
            ),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
