//! Connection event hooks.
//!
//! Three ordered observer lists are kept per [`Connection`]: `on_connect`,
//! `on_disconnect` and `on_query`. Observers run in registration order and
//! receive the connection by mutable reference, so a hook may run queries or
//! open transactions of its own.
//!
//! While a list fires it is moved out of the connection. Statements a hook
//! issues are therefore not reported back to the list that is running, and
//! hooks registered from inside a hook are appended once firing finishes.
//!
//! Drivers report the statements they issue on their own (transaction
//! control, savepoints) through a [`QueryReporter`]; the connection
//! relays those records to the `on_query` observers after each driver call.

use crate::db::connection::Connection;
use crate::error::DbError;
use crate::models::QueryResult;
use futures_util::future::BoxFuture;
use std::time::Duration;
use tokio::sync::mpsc;

/// Observer for connect and disconnect events.
pub type ConnectionHook =
    Box<dyn for<'c> Fn(&'c mut Connection) -> BoxFuture<'c, ()> + Send + Sync>;

/// Observer for executed queries.
pub type QueryHook = Box<
    dyn for<'c> Fn(&'c mut Connection, &'c QueryEvent<'c>) -> BoxFuture<'c, ()> + Send + Sync,
>;

/// A finished query as seen by `on_query` observers.
#[derive(Debug, Clone, Copy)]
pub struct QueryEvent<'a> {
    pub sql: &'a str,
    /// Measured by the driver, reported for failures too.
    pub elapsed: Duration,
    pub outcome: Result<&'a QueryResult, &'a DbError>,
}

impl<'a> QueryEvent<'a> {
    pub fn result(&self) -> Option<&'a QueryResult> {
        self.outcome.ok()
    }

    pub fn error(&self) -> Option<&'a DbError> {
        self.outcome.err()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Registered observers of one connection.
#[derive(Default)]
pub struct EventHooks {
    pub on_connect: Vec<ConnectionHook>,
    pub on_disconnect: Vec<ConnectionHook>,
    pub on_query: Vec<QueryHook>,
}

/// Put `taken` back into `slot`, keeping hooks added to `slot` meanwhile after it.
pub(crate) fn restore<T>(slot: &mut Vec<T>, mut taken: Vec<T>) {
    taken.append(slot);
    *slot = taken;
}

impl std::fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHooks")
            .field("on_connect", &self.on_connect.len())
            .field("on_disconnect", &self.on_disconnect.len())
            .field("on_query", &self.on_query.len())
            .finish()
    }
}

/// Owned record of a statement a driver ran by itself.
#[derive(Debug, Clone)]
pub struct QueryRecord {
    pub sql: String,
    pub elapsed: Duration,
    pub outcome: Result<QueryResult, DbError>,
}

impl QueryRecord {
    pub fn as_event(&self) -> QueryEvent<'_> {
        QueryEvent {
            sql: &self.sql,
            elapsed: self.elapsed,
            outcome: self.outcome.as_ref(),
        }
    }
}

/// Handle given to drivers on connect for reporting internal statements.
#[derive(Debug, Clone)]
pub struct QueryReporter {
    sender: mpsc::UnboundedSender<QueryRecord>,
}

impl QueryReporter {
    /// Create a reporter and the receiver the connection drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<QueryRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Report a statement. Records sent after the connection is gone are dropped.
    pub fn report(&self, sql: &str, elapsed: Duration, outcome: &Result<QueryResult, DbError>) {
        let record = QueryRecord {
            sql: sql.to_string(),
            elapsed,
            outcome: outcome.clone(),
        };
        let _ = self.sender.send(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_delivers_in_order() {
        let (reporter, mut receiver) = QueryReporter::channel();
        reporter.report("BEGIN", Duration::from_millis(1), &Ok(QueryResult::default()));
        reporter.report(
            "COMMIT",
            Duration::from_millis(2),
            &Err(DbError::query("failed", "COMMIT", None)),
        );

        let first = receiver.try_recv().unwrap();
        assert_eq!(first.sql, "BEGIN");
        assert!(first.as_event().is_success());

        let second = receiver.try_recv().unwrap();
        assert_eq!(second.sql, "COMMIT");
        assert!(second.as_event().error().is_some());
        assert!(second.as_event().result().is_none());

        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_report_after_receiver_dropped_is_ignored() {
        let (reporter, receiver) = QueryReporter::channel();
        drop(receiver);
        reporter.report("SELECT 1", Duration::ZERO, &Ok(QueryResult::default()));
    }

    #[test]
    fn test_hooks_debug_shows_counts() {
        let mut connection =
            Connection::new(crate::db::ConnectionConfig::named("sqlite")).unwrap();
        connection.on_connect(|_| {});
        let debug = format!("{:?}", connection);
        assert!(debug.contains("on_connect: 1"));
    }

    #[test]
    fn test_restore_keeps_registration_order() {
        let mut slot = vec![3, 4];
        restore(&mut slot, vec![1, 2]);
        assert_eq!(slot, vec![1, 2, 3, 4]);
    }
}
