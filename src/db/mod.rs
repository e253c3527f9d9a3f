//! Database abstraction layer.
//!
//! This module provides:
//! - The connection manager with nested transaction handling
//! - The driver trait and its sqlx-backed implementations
//! - Platform introspection per backend
//! - The SQL query processor and query builder
//! - Connection event hooks

pub mod connection;
pub mod driver;
pub mod drivers;
pub mod events;
#[macro_use]
pub mod macros;
pub mod platform;
pub mod processor;
pub mod query_builder;
pub mod registry;
pub mod types;

pub use connection::{Connection, ConnectionConfig, DriverSpec, savepoint_name};
pub use driver::Driver;
pub use drivers::{MySqlDriver, PgSqlDriver, SqliteDriver};
pub use events::{EventHooks, QueryEvent, QueryRecord, QueryReporter};
pub use platform::{MySqlPlatform, Platform, PlatformFeature, PostgresPlatform, SqlitePlatform};
pub use processor::{QueryProcessor, SqlProcessor, SqlProcessorFactory};
pub use query_builder::QueryBuilder;
pub use registry::{create_driver, driver_names};
