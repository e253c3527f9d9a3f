//! Driver registry.
//!
//! Maps the identifiers accepted in a configuration (`driver = "pgsql"`) to
//! constructors of the built-in drivers. Lookups are case-insensitive.

use crate::db::driver::Driver;
use crate::db::drivers::{MySqlDriver, PgSqlDriver, SqliteDriver};
use crate::error::{DbError, DbResult};

type DriverConstructor = fn() -> Box<dyn Driver>;

fn mysql() -> Box<dyn Driver> {
    Box::new(MySqlDriver::new())
}

fn pgsql() -> Box<dyn Driver> {
    Box::new(PgSqlDriver::new())
}

fn sqlite() -> Box<dyn Driver> {
    Box::new(SqliteDriver::new())
}

const DRIVERS: &[(&str, DriverConstructor)] = &[
    ("mysql", mysql),
    ("mysqli", mysql),
    ("mariadb", mysql),
    ("pgsql", pgsql),
    ("postgres", pgsql),
    ("postgresql", pgsql),
    ("sqlite", sqlite),
    ("sqlite3", sqlite),
];

/// All registered identifiers, in registration order.
pub fn driver_names() -> impl Iterator<Item = &'static str> {
    DRIVERS.iter().map(|(name, _)| *name)
}

/// Construct a fresh driver for `name`.
pub fn create_driver(name: &str) -> DbResult<Box<dyn Driver>> {
    let wanted = name.trim();
    if wanted.is_empty() {
        return Err(DbError::configuration(format!(
            "Driver is not specified; choose one of: {}",
            driver_names().collect::<Vec<_>>().join(", ")
        )));
    }

    DRIVERS
        .iter()
        .find(|(id, _)| id.eq_ignore_ascii_case(wanted))
        .map(|(_, construct)| construct())
        .ok_or_else(|| {
            DbError::configuration(format!(
                "Unsupported driver '{}'; choose one of: {}",
                wanted,
                driver_names().collect::<Vec<_>>().join(", ")
            ))
        })
}
