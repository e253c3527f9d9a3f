//! Data models shared by drivers, platforms and the connection.

pub mod connection;
pub mod query;
pub mod schema;

pub use connection::{DatabaseType, IsolationLevel};
pub use query::{QueryParam, QueryResult, json_to_string};
pub use schema::{ColumnInfo, ForeignKeyInfo, TableInfo, TableType};
