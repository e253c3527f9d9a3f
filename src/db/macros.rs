//! Macros shared by the `sqlx`-backed drivers.
//!
//! Every concrete driver wraps one `Option<Connection>` plus a
//! [`SessionState`](crate::db::drivers::SessionState). The session plumbing
//! around that pair is identical across backends, so it is generated here and
//! each driver only spells out its dialect.

/// Generate the session plumbing for a driver struct.
///
/// The struct must have the fields `conn: Option<$conn>` and
/// `state: SessionState`. Generated items:
/// - `new()` and `Debug`
/// - `execute(sql)` for user statements, `internal(sql)` for statements the
///   driver issues on its own (reported to the connection)
/// - `close_session()`, `ping_session()`, `has_session()`
#[macro_export]
macro_rules! impl_session_driver {
    ($driver:ident, $conn:ty, $outcome:ty, $row:ty, $label:literal) => {
        impl $driver {
            pub fn new() -> Self {
                Self::default()
            }

            async fn run(
                &mut self,
                sql: &str,
                internal: bool,
            ) -> $crate::error::DbResult<$crate::models::QueryResult> {
                let conn = self
                    .conn
                    .as_mut()
                    .ok_or_else(|| $crate::error::DbError::not_connected($label))?;
                let start = ::std::time::Instant::now();
                let stream = ::sqlx::Executor::fetch_many(&mut *conn, sql);
                let outcome =
                    $crate::db::drivers::collect_results::<$outcome, $row>(stream, sql).await;
                self.state.finish(sql, start.elapsed(), &outcome, internal);
                outcome
            }

            async fn execute(
                &mut self,
                sql: &str,
            ) -> $crate::error::DbResult<$crate::models::QueryResult> {
                self.run(sql, false).await
            }

            async fn internal(
                &mut self,
                sql: &str,
            ) -> $crate::error::DbResult<$crate::models::QueryResult> {
                self.run(sql, true).await
            }

            async fn close_session(&mut self) {
                if let Some(conn) = self.conn.take() {
                    if let Err(e) = ::sqlx::Connection::close(conn).await {
                        ::tracing::warn!(driver = $label, error = %e, "Failed to close session cleanly");
                    }
                    ::tracing::info!(driver = $label, "Session closed");
                }
                self.state.detach();
            }

            async fn ping_session(&mut self) -> bool {
                match self.conn.as_mut() {
                    Some(conn) => ::sqlx::Connection::ping(conn).await.is_ok(),
                    None => false,
                }
            }

            fn has_session(&self) -> bool {
                self.conn.is_some()
            }
        }

        impl ::std::fmt::Debug for $driver {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($driver))
                    .field("connected", &self.conn.is_some())
                    .field("state", &self.state)
                    .finish()
            }
        }
    };
}

pub use impl_session_driver;
