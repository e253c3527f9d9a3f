//! Connection manager tests against a recording driver.
//!
//! Tests verify that:
//! - Nested transactions map onto one real transaction plus savepoints
//! - The nesting level survives driver failures consistently
//! - Query hooks see every statement, including driver-internal ones
//! - Connecting is lazy and reconfiguration resets transaction state

use async_trait::async_trait;
use dbal_connection::db::{
    Connection, ConnectionConfig, Driver, Platform, QueryProcessor, QueryReporter,
    SqlProcessorFactory, SqlitePlatform, savepoint_name,
};
use dbal_connection::error::{DbError, DbResult};
use dbal_connection::models::{IsolationLevel, QueryParam, QueryResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct Journal {
    calls: Vec<String>,
    failing: HashSet<String>,
}

/// Shared view of what a [`RecordingDriver`] was asked to do.
#[derive(Debug, Clone, Default)]
struct Recorder(Arc<Mutex<Journal>>);

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().calls.clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Make every call whose first word is `operation` fail.
    fn fail(&self, operation: &str) {
        self.0.lock().unwrap().failing.insert(operation.to_string());
    }

    fn heal(&self, operation: &str) {
        self.0.lock().unwrap().failing.remove(operation);
    }

    fn clear(&self) {
        self.0.lock().unwrap().calls.clear();
    }
}

#[derive(Debug)]
struct RecordingDriver {
    recorder: Recorder,
    reporter: Option<QueryReporter>,
    connected: bool,
}

impl RecordingDriver {
    fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: recorder.clone(),
            reporter: None,
            connected: false,
        }
    }

    fn record(&self, call: String) -> DbResult<()> {
        let mut journal = self.recorder.0.lock().unwrap();
        let operation = call.split(' ').next().unwrap_or_default().to_string();
        journal.calls.push(call.clone());
        if journal.failing.contains(&operation) {
            Err(DbError::query(format!("{} refused", operation), call, None))
        } else {
            Ok(())
        }
    }

    /// Record a statement the driver issues by itself and report it.
    fn internal(&self, call: String, sql: &str) -> DbResult<()> {
        let result = self.record(call);
        if let Some(reporter) = &self.reporter {
            let outcome = result.clone().map(|_| QueryResult::default());
            reporter.report(sql, Duration::from_millis(1), &outcome);
        }
        result
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn connect(&mut self, _config: &ConnectionConfig, reporter: QueryReporter) -> DbResult<()> {
        self.record("connect".to_string())?;
        self.reporter = Some(reporter);
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        let _ = self.record("disconnect".to_string());
        self.reporter = None;
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn query(&mut self, sql: &str) -> DbResult<QueryResult> {
        // Real drivers leave the SQL out; the connection attaches it.
        self.record(format!("query {}", sql))
            .map_err(|_| DbError::query("query refused", "", None))?;
        Ok(QueryResult::write_result(3, Some(7)))
    }

    fn query_elapsed_time(&self) -> Duration {
        Duration::from_millis(2)
    }

    async fn last_inserted_id(&mut self, sequence: Option<&str>) -> DbResult<i64> {
        self.record(format!("last_id {}", sequence.unwrap_or("-")))?;
        Ok(7)
    }

    fn affected_rows(&self) -> u64 {
        3
    }

    fn create_platform(&self) -> Arc<dyn Platform> {
        Arc::new(SqlitePlatform)
    }

    async fn server_version(&mut self) -> DbResult<String> {
        self.record("version".to_string())?;
        Ok("1.2.3".to_string())
    }

    async fn ping(&mut self) -> bool {
        self.record("ping".to_string()).is_ok()
    }

    async fn set_transaction_isolation_level(&mut self, level: IsolationLevel) -> DbResult<()> {
        self.internal(format!("isolation {}", level.as_sql()), "SET ISOLATION")
    }

    async fn begin_transaction(&mut self) -> DbResult<()> {
        self.internal("begin".to_string(), "BEGIN")
    }

    async fn commit_transaction(&mut self) -> DbResult<()> {
        self.internal("commit".to_string(), "COMMIT")
    }

    async fn rollback_transaction(&mut self) -> DbResult<()> {
        self.internal("rollback".to_string(), "ROLLBACK")
    }

    async fn create_savepoint(&mut self, name: &str) -> DbResult<()> {
        self.internal(format!("savepoint {}", name), &format!("SAVEPOINT {}", name))
    }

    async fn release_savepoint(&mut self, name: &str) -> DbResult<()> {
        self.internal(format!("release {}", name), &format!("RELEASE SAVEPOINT {}", name))
    }

    async fn rollback_savepoint(&mut self, name: &str) -> DbResult<()> {
        self.internal(
            format!("rollback_to {}", name),
            &format!("ROLLBACK TO SAVEPOINT {}", name),
        )
    }
}

fn connection_with(recorder: &Recorder, savepoints: bool) -> Connection {
    let config = ConnectionConfig::with_instance(Box::new(RecordingDriver::new(recorder)))
        .with_savepoints(savepoints);
    Connection::new(config).unwrap()
}

/// Collect the SQL of every event seen by `on_query`.
fn capture_queries(connection: &mut Connection) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    connection.on_query(move |_, event| sink.lock().unwrap().push(event.sql.to_string()));
    seen
}

// =============================================================================
// Nesting
// =============================================================================

#[tokio::test]
async fn test_nested_commit_uses_savepoints() {
    for depth in 1..=5u32 {
        let recorder = Recorder::default();
        let mut connection = connection_with(&recorder, true);

        for _ in 0..depth {
            connection.begin_transaction().await.unwrap();
        }
        assert_eq!(connection.nesting_level(), depth);
        for _ in 0..depth {
            connection.commit_transaction().await.unwrap();
        }
        assert_eq!(connection.nesting_level(), 0);

        let mut expected = vec!["connect".to_string(), "begin".to_string()];
        expected.extend((2..=depth).map(|d| format!("savepoint {}", savepoint_name(d))));
        expected.extend((2..=depth).rev().map(|d| format!("release {}", savepoint_name(d))));
        expected.push("commit".to_string());
        assert_eq!(recorder.calls(), expected, "depth {}", depth);
    }
}

#[tokio::test]
async fn test_nested_commit_without_savepoints() {
    for depth in 1..=4u32 {
        let recorder = Recorder::default();
        let mut connection = connection_with(&recorder, false);

        for _ in 0..depth {
            connection.begin_transaction().await.unwrap();
        }
        for _ in 0..depth {
            connection.commit_transaction().await.unwrap();
        }

        assert_eq!(connection.nesting_level(), 0);
        assert_eq!(recorder.calls(), vec!["connect", "begin", "commit"]);
    }
}

#[tokio::test]
async fn test_inner_rollback_then_outer_commit() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);

    connection.begin_transaction().await.unwrap();
    connection.begin_transaction().await.unwrap();
    connection.rollback_transaction().await.unwrap();
    connection.commit_transaction().await.unwrap();

    assert_eq!(
        recorder.calls(),
        vec![
            "connect",
            "begin",
            "savepoint NEXTRAS_SAVEPOINT_1",
            "rollback_to NEXTRAS_SAVEPOINT_1",
            "commit",
        ]
    );
    assert_eq!(connection.nesting_level(), 0);
}

#[tokio::test]
async fn test_commit_and_rollback_at_depth_zero() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);

    let commit = connection.commit_transaction().await;
    assert!(matches!(commit, Err(DbError::TransactionDiscipline { .. })));
    let rollback = connection.rollback_transaction().await;
    assert!(matches!(rollback, Err(DbError::TransactionDiscipline { .. })));

    assert_eq!(connection.nesting_level(), 0);
    assert!(recorder.calls().is_empty());
}

#[tokio::test]
async fn test_failed_begin_keeps_level() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    connection.begin_transaction().await.unwrap();

    recorder.fail("savepoint");
    assert!(connection.begin_transaction().await.is_err());
    assert_eq!(connection.nesting_level(), 1);
}

#[tokio::test]
async fn test_failed_commit_keeps_level() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    connection.begin_transaction().await.unwrap();

    recorder.fail("commit");
    assert!(connection.commit_transaction().await.is_err());
    assert_eq!(connection.nesting_level(), 1);

    connection.rollback_transaction().await.unwrap();
    assert_eq!(connection.nesting_level(), 0);
}

#[tokio::test]
async fn test_failed_rollback_still_unwinds() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    connection.begin_transaction().await.unwrap();
    connection.begin_transaction().await.unwrap();

    recorder.fail("rollback_to");
    assert!(connection.rollback_transaction().await.is_err());
    assert_eq!(connection.nesting_level(), 1);
}

// =============================================================================
// transactional
// =============================================================================

#[tokio::test]
async fn test_transactional_commits_on_success() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);

    let value = connection
        .transactional(async |conn: &mut Connection| {
            conn.native_query("INSERT INTO t VALUES (1)").await?;
            Ok(conn.nesting_level())
        })
        .await
        .unwrap();

    assert_eq!(value, 1);
    assert_eq!(connection.nesting_level(), 0);
    assert_eq!(
        recorder.calls(),
        vec!["connect", "begin", "query INSERT INTO t VALUES (1)", "commit"]
    );
}

#[tokio::test]
async fn test_transactional_rolls_back_and_keeps_error() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);

    let result: DbResult<()> = connection
        .transactional(async |_conn: &mut Connection| Err(DbError::invalid_input("work failed")))
        .await;

    match result {
        Err(DbError::InvalidInput { message }) => assert_eq!(message, "work failed"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(recorder.count("rollback"), 1);
    assert_eq!(recorder.count("commit"), 0);
    assert_eq!(connection.nesting_level(), 0);
}

#[tokio::test]
async fn test_nested_transactional_rolls_back_savepoint() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    connection.begin_transaction().await.unwrap();

    let result: DbResult<()> = connection
        .transactional(async |_conn: &mut Connection| Err(DbError::internal("inner")))
        .await;

    assert!(result.is_err());
    assert_eq!(connection.nesting_level(), 1);
    assert_eq!(
        recorder.calls()[2..],
        ["savepoint NEXTRAS_SAVEPOINT_1", "rollback_to NEXTRAS_SAVEPOINT_1"]
    );
    assert_eq!(recorder.count("rollback"), 1);
}

#[tokio::test]
async fn test_transactional_rollback_failure_returns_original_error() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    recorder.fail("rollback");

    let result: DbResult<()> = connection
        .transactional(async |_conn: &mut Connection| Err(DbError::invalid_input("original")))
        .await;

    assert!(matches!(result, Err(DbError::InvalidInput { .. })));
    assert_eq!(connection.nesting_level(), 0);
}

#[tokio::test]
async fn test_transactional_commit_failure_rolls_back() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    recorder.fail("commit");

    let result = connection
        .transactional(async |_conn: &mut Connection| Ok(1))
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.sql(), Some("commit"));
    assert_eq!(recorder.count("rollback"), 1);
    assert_eq!(connection.nesting_level(), 0);
}

// =============================================================================
// Queries and hooks
// =============================================================================

#[tokio::test]
async fn test_query_connects_lazily_once() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    assert!(!connection.is_connected());

    connection.query(&[QueryParam::from("SELECT %i"), 1.into()]).await.unwrap();
    connection.query(&[QueryParam::from("SELECT 2")]).await.unwrap();

    assert!(connection.is_connected());
    assert_eq!(recorder.count("connect"), 1);
    assert_eq!(recorder.calls()[1..], ["query SELECT 1", "query SELECT 2"]);
}

#[tokio::test]
async fn test_query_failure_fires_hook_once() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    connection.on_query(move |_, event| {
        if let Some(error) = event.error() {
            assert!(event.result().is_none());
            sink.lock().unwrap().push((event.sql.to_string(), error.sql().map(str::to_string)));
        }
    });

    recorder.fail("query");
    let err = connection.native_query("SELECT broken").await.unwrap_err();

    assert_eq!(err.sql(), Some("SELECT broken"));
    let failures = failures.lock().unwrap();
    assert_eq!(
        *failures,
        vec![("SELECT broken".to_string(), Some("SELECT broken".to_string()))]
    );
}

#[tokio::test]
async fn test_internal_statements_reach_query_hooks() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    let seen = capture_queries(&mut connection);

    connection.begin_transaction().await.unwrap();
    connection.begin_transaction().await.unwrap();
    connection.native_query("SELECT 1").await.unwrap();
    connection.commit_transaction().await.unwrap();
    connection.commit_transaction().await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "BEGIN",
            "SAVEPOINT NEXTRAS_SAVEPOINT_1",
            "SELECT 1",
            "RELEASE SAVEPOINT NEXTRAS_SAVEPOINT_1",
            "COMMIT",
        ]
    );
}

#[tokio::test]
async fn test_query_event_carries_result_and_elapsed() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    connection.on_query(move |conn, event| {
        let affected = event.result().map(|r| r.rows_affected);
        sink.lock()
            .unwrap()
            .push((affected, event.elapsed, conn.is_connected()));
    });

    connection.native_query("UPDATE t SET a = 1").await.unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![(Some(3), Duration::from_millis(2), true)]
    );
}

#[tokio::test]
async fn test_hooks_run_in_registration_order() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    let order = Arc::new(Mutex::new(Vec::new()));

    let (a, b, c) = (order.clone(), order.clone(), order.clone());
    connection
        .on_connect(move |_| a.lock().unwrap().push("connect-a"))
        .on_connect(move |_| b.lock().unwrap().push("connect-b"))
        .on_disconnect(move |conn| {
            assert!(!conn.is_connected());
            c.lock().unwrap().push("disconnect");
        });

    connection.connect().await.unwrap();
    connection.connect().await.unwrap();
    connection.disconnect().await;
    connection.disconnect().await;

    assert_eq!(*order.lock().unwrap(), vec!["connect-a", "connect-b", "disconnect"]);
    assert_eq!(recorder.calls(), vec!["connect", "disconnect"]);
}

#[tokio::test]
async fn test_failed_connect_fires_no_hooks() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    let fired = Arc::new(Mutex::new(false));
    let flag = fired.clone();
    connection.on_connect(move |_| *flag.lock().unwrap() = true);

    recorder.fail("connect");
    let err = connection.native_query("SELECT 1").await.unwrap_err();

    assert!(matches!(err, DbError::Connection { .. }));
    assert!(!connection.is_connected());
    assert!(!*fired.lock().unwrap());

    recorder.heal("connect");
    connection.native_query("SELECT 1").await.unwrap();
    assert!(*fired.lock().unwrap());
}

#[tokio::test]
async fn test_query_hook_runs_statements_inside_open_transaction() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    connection.on_query_async(|conn, event| {
        Box::pin(async move {
            if event.sql == "UPDATE stock SET n = n - 1" {
                conn.begin_transaction().await.unwrap();
                conn.native_query("INSERT INTO audit VALUES (1)").await.unwrap();
                conn.commit_transaction().await.unwrap();
            }
        })
    });
    let seen = capture_queries(&mut connection);

    connection.begin_transaction().await.unwrap();
    connection.begin_transaction().await.unwrap();
    connection.native_query("UPDATE stock SET n = n - 1").await.unwrap();

    assert_eq!(connection.nesting_level(), 2);
    assert!(connection.is_connected());
    assert_eq!(
        recorder.calls(),
        vec![
            "connect".to_string(),
            "begin".to_string(),
            format!("savepoint {}", savepoint_name(2)),
            "query UPDATE stock SET n = n - 1".to_string(),
            format!("savepoint {}", savepoint_name(3)),
            "query INSERT INTO audit VALUES (1)".to_string(),
            format!("release {}", savepoint_name(3)),
        ]
    );
    // Statements issued by hooks are not reported to the hooks again.
    assert_eq!(seen.lock().unwrap().len(), 3);

    connection.commit_transaction().await.unwrap();
    connection.commit_transaction().await.unwrap();
    assert_eq!(connection.nesting_level(), 0);
}

#[tokio::test]
async fn test_connect_hook_may_open_transaction() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    connection.on_connect_async(|conn| {
        Box::pin(async move {
            conn.set_transaction_isolation_level(IsolationLevel::Serializable)
                .await
                .unwrap();
            conn.begin_transaction().await.unwrap();
        })
    });

    connection.native_query("SELECT 1").await.unwrap();

    assert!(connection.is_connected());
    assert_eq!(connection.nesting_level(), 1);
    assert_eq!(
        recorder.calls(),
        vec!["connect", "isolation SERIALIZABLE", "begin", "query SELECT 1"]
    );
}

#[tokio::test]
async fn test_hook_registered_while_firing_runs_later() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    connection.on_connect(move |conn| {
        let sink = sink.clone();
        conn.on_query(move |_, event| sink.lock().unwrap().push(event.sql.to_string()));
    });

    connection.native_query("SELECT 1").await.unwrap();
    connection.native_query("SELECT 2").await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["SELECT 1", "SELECT 2"]);
    assert_eq!(connection.hooks_mut().on_connect.len(), 1);
    assert_eq!(connection.hooks_mut().on_query.len(), 1);
}

#[tokio::test]
async fn test_connected_instance_is_not_reconnected() {
    let recorder = Recorder::default();
    let mut driver = RecordingDriver::new(&recorder);
    driver.connected = true;
    let mut connection = Connection::new(ConnectionConfig::with_instance(Box::new(driver))).unwrap();

    assert!(connection.is_connected());
    connection.native_query("SELECT 1").await.unwrap();
    assert_eq!(recorder.calls(), vec!["query SELECT 1"]);
}

#[tokio::test]
async fn test_ping_never_connects() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);

    assert!(!connection.ping().await);
    assert!(!connection.is_connected());
    assert!(recorder.calls().is_empty());

    connection.connect().await.unwrap();
    assert!(connection.ping().await);
}

#[tokio::test]
async fn test_session_accessors_connect_lazily() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);

    assert_eq!(connection.server_version().await.unwrap(), "1.2.3");
    assert_eq!(connection.last_inserted_id(Some("users_id_seq")).await.unwrap(), 7);
    assert_eq!(connection.affected_rows().await.unwrap(), 3);
    connection
        .set_transaction_isolation_level(IsolationLevel::Serializable)
        .await
        .unwrap();

    assert_eq!(
        recorder.calls(),
        vec![
            "connect",
            "version",
            "last_id users_id_seq",
            "isolation SERIALIZABLE"
        ]
    );
}

#[tokio::test]
async fn test_manual_savepoints_delegate_to_driver() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    connection.begin_transaction().await.unwrap();
    recorder.clear();

    connection.create_savepoint("before_import").await.unwrap();
    connection.rollback_savepoint("before_import").await.unwrap();
    connection.release_savepoint("before_import").await.unwrap();

    assert_eq!(
        recorder.calls(),
        vec![
            "savepoint before_import",
            "rollback_to before_import",
            "release before_import"
        ]
    );
    assert_eq!(connection.nesting_level(), 1);
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_disconnect_resets_nesting() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    connection.begin_transaction().await.unwrap();
    connection.begin_transaction().await.unwrap();

    connection.disconnect().await;

    assert_eq!(connection.nesting_level(), 0);
    assert!(!connection.is_connected());
}

#[tokio::test]
async fn test_reconnect_with_config_replaces_driver() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    connection.begin_transaction().await.unwrap();
    connection.begin_transaction().await.unwrap();
    assert_eq!(connection.nesting_level(), 2);

    let result = connection
        .reconnect_with_config(
            ConnectionConfig::named("pgsql").with_option("url", "postgres://nobody@127.0.0.1:1/none"),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(connection.nesting_level(), 0);
    assert_eq!(connection.driver().name(), "pgsql");
    assert!(!connection.is_connected());
    assert!(recorder.calls().contains(&"disconnect".to_string()));
}

#[tokio::test]
async fn test_reconnect_with_config_keeps_driver_and_drops_platform() {
    let recorder = Recorder::default();
    let mut connection = connection_with(&recorder, true);
    connection.connect().await.unwrap();
    let before = connection.get_platform();
    assert!(Arc::ptr_eq(&before, &connection.get_platform()));

    connection
        .reconnect_with_config(ConnectionConfig::new().with_savepoints(false))
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&before, &connection.get_platform()));
    assert_eq!(connection.driver().name(), "recording");
    assert!(!connection.savepoints_enabled());
    assert_eq!(recorder.calls(), vec!["connect", "disconnect", "connect"]);
}

#[test]
fn test_unknown_driver_lists_choices() {
    let err = Connection::new(ConnectionConfig::named("oracle")).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("oracle"));
    assert!(message.contains("pgsql"));
    assert!(message.contains("sqlite"));
}

#[derive(Debug)]
struct FixedProcessor(&'static str);

impl QueryProcessor for FixedProcessor {
    fn process(&self, _driver: &dyn Driver, _args: &[QueryParam]) -> DbResult<String> {
        Ok(self.0.to_string())
    }
}

#[derive(Debug)]
struct FixedProcessorFactory;

impl SqlProcessorFactory for FixedProcessorFactory {
    fn create(&self, connection: &Connection) -> Box<dyn QueryProcessor> {
        assert!(!connection.is_connected());
        Box::new(FixedProcessor("SELECT 42"))
    }
}

#[tokio::test]
async fn test_processor_factory_overrides_default() {
    let recorder = Recorder::default();
    let config = ConnectionConfig::with_instance(Box::new(RecordingDriver::new(&recorder)))
        .with_processor_factory(Arc::new(FixedProcessorFactory));
    let mut connection = Connection::new(config).unwrap();

    connection.query(&[QueryParam::from("SELECT %i"), 1.into()]).await.unwrap();

    assert_eq!(recorder.calls(), vec!["connect", "query SELECT 42"]);
}
