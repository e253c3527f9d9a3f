//! Transactional SQL connection manager.
//!
//! A [`Connection`] wraps one driver session (MySQL, PostgreSQL or SQLite),
//! connects lazily, renders queries through a modifier-based SQL processor
//! and maps nested transactions onto savepoints.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::Config;
pub use db::{Connection, ConnectionConfig, DriverSpec};
pub use error::DbError;
