//! Connection manager.
//!
//! [`Connection`] owns exactly one driver session. It connects lazily,
//! renders queries through its [`QueryProcessor`], reports every executed
//! statement to the `on_query` observers, and maps nested transactions onto
//! one real transaction plus savepoints.
//!
//! # Nesting
//!
//! | depth after `begin` | driver call |
//! |---------------------|-------------|
//! | 1 | `begin_transaction` |
//! | n > 1, savepoints on | `create_savepoint(savepoint_name(n))` |
//! | n > 1, savepoints off | none |
//!
//! `commit` and `rollback` mirror this at the current depth. A commit only
//! lowers the depth after the driver call succeeds; a rollback always does.
//!
//! All state changes need `&mut self`, so one connection serves one task at
//! a time. Hooks get `&mut Connection` and may issue queries themselves; the
//! nesting level and connected flag they leave behind are what the caller
//! sees afterwards.

use crate::db::driver::Driver;
use crate::db::events::{self, EventHooks, QueryEvent, QueryRecord, QueryReporter};
use crate::db::platform::Platform;
use crate::db::processor::{QueryProcessor, SqlProcessor, SqlProcessorFactory};
use crate::db::query_builder::QueryBuilder;
use crate::db::registry;
use crate::error::{DbError, DbResult};
use crate::models::{IsolationLevel, QueryParam, QueryResult};
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const SAVEPOINT_PREFIX: &str = "NEXTRAS_SAVEPOINT_";

/// Name of the automatic savepoint guarding nesting depth `depth` (>= 2).
///
/// The first nested level gets `NEXTRAS_SAVEPOINT_1`. Upstream nextras/dbal
/// suffixes the current depth instead (`NEXTRAS_SAVEPOINT_2` for the first
/// nested level); this crate numbers savepoints from one on purpose. Begin,
/// commit and rollback at the same depth always agree on the name.
pub fn savepoint_name(depth: u32) -> String {
    format!("{}{}", SAVEPOINT_PREFIX, depth.saturating_sub(1))
}

/// How the connection obtains its driver.
#[derive(Debug)]
pub enum DriverSpec {
    /// Registry identifier, e.g. `"pgsql"`.
    Named(String),
    /// A ready driver, possibly already connected. Moved into the connection.
    Instance(Box<dyn Driver>),
}

/// Connection configuration.
///
/// Backend options are opaque strings handed to the driver unchanged.
#[derive(Debug, Default)]
pub struct ConnectionConfig {
    pub driver: Option<DriverSpec>,
    /// Defaults to `true`.
    pub nested_transactions_with_savepoint: Option<bool>,
    pub sql_processor_factory: Option<Arc<dyn SqlProcessorFactory>>,
    pub options: BTreeMap<String, String>,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration resolving its driver through the registry.
    pub fn named(driver: impl Into<String>) -> Self {
        Self {
            driver: Some(DriverSpec::Named(driver.into())),
            ..Self::default()
        }
    }

    /// Configuration carrying a live driver instance.
    pub fn with_instance(driver: Box<dyn Driver>) -> Self {
        Self {
            driver: Some(DriverSpec::Instance(driver)),
            ..Self::default()
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_savepoints(mut self, enabled: bool) -> Self {
        self.nested_transactions_with_savepoint = Some(enabled);
        self
    }

    pub fn with_processor_factory(mut self, factory: Arc<dyn SqlProcessorFactory>) -> Self {
        self.sql_processor_factory = Some(factory);
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn savepoints_enabled(&self) -> bool {
        self.nested_transactions_with_savepoint.unwrap_or(true)
    }

    /// Overlay `other` on top of `self`; keys set in `other` win.
    pub fn merge(mut self, other: ConnectionConfig) -> Self {
        if other.driver.is_some() {
            self.driver = other.driver;
        }
        if other.nested_transactions_with_savepoint.is_some() {
            self.nested_transactions_with_savepoint = other.nested_transactions_with_savepoint;
        }
        if other.sql_processor_factory.is_some() {
            self.sql_processor_factory = other.sql_processor_factory;
        }
        self.options.extend(other.options);
        self
    }

    /// Take the driver out of the configuration.
    ///
    /// A named driver stays in the configuration so later reconfiguration
    /// can build it again; a live instance is moved out.
    fn take_driver(&mut self) -> DbResult<Option<Box<dyn Driver>>> {
        match self.driver.take() {
            Some(DriverSpec::Instance(driver)) => Ok(Some(driver)),
            Some(DriverSpec::Named(name)) => {
                let driver = registry::create_driver(&name);
                self.driver = Some(DriverSpec::Named(name));
                driver.map(Some)
            }
            None => Ok(None),
        }
    }
}

pub struct Connection {
    config: ConnectionConfig,
    driver: Box<dyn Driver>,
    platform: Option<Arc<dyn Platform>>,
    processor: Box<dyn QueryProcessor>,
    connected: bool,
    savepoints: bool,
    nesting_level: u32,
    hooks: EventHooks,
    reporter: QueryReporter,
    reports: mpsc::UnboundedReceiver<QueryRecord>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("driver", &self.driver.name())
            .field("connected", &self.connected)
            .field("nesting_level", &self.nesting_level)
            .field("savepoints", &self.savepoints)
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Connection {
    /// Build a connection. Does not connect.
    pub fn new(mut config: ConnectionConfig) -> DbResult<Self> {
        let driver = config.take_driver()?.ok_or_else(|| {
            DbError::configuration(format!(
                "Driver is not specified; choose one of: {}",
                registry::driver_names().collect::<Vec<_>>().join(", ")
            ))
        })?;
        let (reporter, reports) = QueryReporter::channel();

        let mut connection = Self {
            connected: driver.is_connected(),
            savepoints: config.savepoints_enabled(),
            config,
            driver,
            platform: None,
            processor: Box::new(SqlProcessor::new()),
            nesting_level: 0,
            hooks: EventHooks::default(),
            reporter,
            reports,
        };
        connection.processor = connection.create_processor();
        Ok(connection)
    }

    fn create_processor(&self) -> Box<dyn QueryProcessor> {
        match &self.config.sql_processor_factory {
            Some(factory) => factory.create(self),
            None => Box::new(SqlProcessor::new()),
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    pub async fn connect(&mut self) -> DbResult<()> {
        if self.connected {
            return Ok(());
        }

        let driver_name = self.driver.name();
        info!(driver = driver_name, "Connecting");
        let result = self.driver.connect(&self.config, self.reporter.clone()).await;
        self.relay_reports().await;
        if let Err(e) = result {
            warn!(driver = driver_name, error = %e, "Connection failed");
            return Err(match e {
                DbError::Connection { .. } | DbError::Configuration { .. } => e,
                other => DbError::connection(other.to_string(), "Check the connection options"),
            });
        }

        self.connected = true;
        self.savepoints = self.config.savepoints_enabled();
        info!(
            driver = driver_name,
            savepoints = self.savepoints,
            "Connected"
        );
        self.fire_connect().await;
        Ok(())
    }

    /// Close the session and forget any open transaction.
    pub async fn disconnect(&mut self) {
        if !self.connected {
            return;
        }

        self.driver.disconnect().await;
        self.relay_reports().await;
        self.connected = false;
        if self.nesting_level > 0 {
            warn!(depth = self.nesting_level, "Disconnected with an open transaction");
        }
        self.nesting_level = 0;
        info!(driver = self.driver.name(), "Disconnected");
        self.fire_disconnect().await;
    }

    pub async fn reconnect(&mut self) -> DbResult<()> {
        self.disconnect().await;
        self.connect().await
    }

    /// Disconnect, overlay `config` on the current configuration and connect
    /// again. Without a driver in the merged configuration the current driver
    /// instance is kept.
    pub async fn reconnect_with_config(&mut self, config: ConnectionConfig) -> DbResult<()> {
        self.disconnect().await;

        let mut merged = std::mem::take(&mut self.config).merge(config);
        let driver = merged.take_driver();
        self.config = merged;
        if let Some(driver) = driver? {
            self.driver = driver;
        }

        self.platform = None;
        self.nesting_level = 0;
        self.connected = self.driver.is_connected();
        self.processor = self.create_processor();
        info!(driver = self.driver.name(), "Reconnecting with new configuration");
        self.connect().await
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Render `args` through the query processor and execute the result.
    pub async fn query(&mut self, args: &[QueryParam]) -> DbResult<QueryResult> {
        self.connect().await?;
        let sql = self.processor.process(self.driver.as_ref(), args)?;
        self.native_query(&sql).await
    }

    pub async fn query_with_args(
        &mut self,
        template: &str,
        args: &[QueryParam],
    ) -> DbResult<QueryResult> {
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(QueryParam::from(template));
        all.extend_from_slice(args);
        self.query(&all).await
    }

    pub async fn query_by_query_builder(&mut self, builder: &QueryBuilder) -> DbResult<QueryResult> {
        self.query_with_args(&builder.query_sql(), &builder.query_parameters())
            .await
    }

    /// Execute final SQL without processing.
    pub async fn native_query(&mut self, sql: &str) -> DbResult<QueryResult> {
        self.connect().await?;

        let outcome = self.driver.query(sql).await.map_err(|e| e.with_sql(sql));
        self.relay_reports().await;
        let event = QueryEvent {
            sql,
            elapsed: self.driver.query_elapsed_time(),
            outcome: outcome.as_ref(),
        };
        self.fire_query(&event).await;
        outcome
    }

    pub async fn last_inserted_id(&mut self, sequence: Option<&str>) -> DbResult<i64> {
        self.connect().await?;
        let id = self.driver.last_inserted_id(sequence).await;
        self.relay_reports().await;
        id
    }

    pub async fn affected_rows(&mut self) -> DbResult<u64> {
        self.connect().await?;
        Ok(self.driver.affected_rows())
    }

    /// Platform of the current driver, created on first use.
    pub fn get_platform(&mut self) -> Arc<dyn Platform> {
        let driver = &self.driver;
        self.platform
            .get_or_insert_with(|| driver.create_platform())
            .clone()
    }

    pub fn create_query_builder(&self) -> QueryBuilder {
        QueryBuilder::new()
    }

    pub async fn set_transaction_isolation_level(&mut self, level: IsolationLevel) -> DbResult<()> {
        self.connect().await?;
        let result = self.driver.set_transaction_isolation_level(level).await;
        self.relay_reports().await;
        result
    }

    pub async fn server_version(&mut self) -> DbResult<String> {
        self.connect().await?;
        let version = self.driver.server_version().await;
        self.relay_reports().await;
        version
    }

    /// `false` without connecting when no session was ever opened.
    pub async fn ping(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        let alive = self.driver.ping().await;
        self.relay_reports().await;
        alive
    }

    // -------------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------------

    /// Run `work` inside a (possibly nested) transaction.
    ///
    /// Commits when `work` succeeds. When `work` fails the transaction is
    /// rolled back and the original error is returned; a failing rollback is
    /// only logged.
    pub async fn transactional<T, F>(&mut self, work: F) -> DbResult<T>
    where
        F: AsyncFnOnce(&mut Connection) -> DbResult<T>,
    {
        self.begin_transaction().await?;

        match work(&mut *self).await {
            Ok(value) => match self.commit_transaction().await {
                Ok(()) => Ok(value),
                Err(e) => {
                    self.rollback_after_failure(&e).await;
                    Err(e)
                }
            },
            Err(e) => {
                self.rollback_after_failure(&e).await;
                Err(e)
            }
        }
    }

    async fn rollback_after_failure(&mut self, cause: &DbError) {
        if let Err(rollback_error) = self.rollback_transaction().await {
            warn!(
                error = %rollback_error,
                cause = %cause,
                "Rollback failed, keeping the original error"
            );
        }
    }

    pub async fn begin_transaction(&mut self) -> DbResult<()> {
        self.connect().await?;

        self.nesting_level += 1;
        let depth = self.nesting_level;
        let result = if depth == 1 {
            self.driver.begin_transaction().await
        } else if self.savepoints {
            self.driver.create_savepoint(&savepoint_name(depth)).await
        } else {
            Ok(())
        };
        self.relay_reports().await;

        if let Err(e) = result {
            self.nesting_level -= 1;
            return Err(e);
        }
        debug!(depth, "Transaction begun");
        Ok(())
    }

    pub async fn commit_transaction(&mut self) -> DbResult<()> {
        let depth = self.nesting_level;
        if depth == 0 {
            return Err(DbError::transaction_discipline("commit_transaction"));
        }

        let result = if depth == 1 {
            self.driver.commit_transaction().await
        } else if self.savepoints {
            self.driver.release_savepoint(&savepoint_name(depth)).await
        } else {
            Ok(())
        };
        self.relay_reports().await;

        result?;
        self.nesting_level -= 1;
        debug!(depth, "Transaction committed");
        Ok(())
    }

    pub async fn rollback_transaction(&mut self) -> DbResult<()> {
        let depth = self.nesting_level;
        if depth == 0 {
            return Err(DbError::transaction_discipline("rollback_transaction"));
        }

        let result = if depth == 1 {
            self.driver.rollback_transaction().await
        } else if self.savepoints {
            self.driver.rollback_savepoint(&savepoint_name(depth)).await
        } else {
            Ok(())
        };
        self.relay_reports().await;

        self.nesting_level -= 1;
        debug!(depth, ok = result.is_ok(), "Transaction rolled back");
        result
    }

    /// Manual savepoint; names must not collide with [`savepoint_name`].
    pub async fn create_savepoint(&mut self, name: &str) -> DbResult<()> {
        let result = self.driver.create_savepoint(name).await;
        self.relay_reports().await;
        result
    }

    pub async fn release_savepoint(&mut self, name: &str) -> DbResult<()> {
        let result = self.driver.release_savepoint(name).await;
        self.relay_reports().await;
        result
    }

    pub async fn rollback_savepoint(&mut self, name: &str) -> DbResult<()> {
        let result = self.driver.rollback_savepoint(name).await;
        self.relay_reports().await;
        result
    }

    // -------------------------------------------------------------------------
    // Hooks
    // -------------------------------------------------------------------------

    pub fn on_connect(
        &mut self,
        hook: impl Fn(&mut Connection) + Send + Sync + 'static,
    ) -> &mut Self {
        self.on_connect_async(move |conn| {
            hook(conn);
            Box::pin(std::future::ready(()))
        })
    }

    /// Register a connect hook that may await connection operations.
    pub fn on_connect_async<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'c> Fn(&'c mut Connection) -> BoxFuture<'c, ()> + Send + Sync + 'static,
    {
        self.hooks.on_connect.push(Box::new(hook));
        self
    }

    pub fn on_disconnect(
        &mut self,
        hook: impl Fn(&mut Connection) + Send + Sync + 'static,
    ) -> &mut Self {
        self.on_disconnect_async(move |conn| {
            hook(conn);
            Box::pin(std::future::ready(()))
        })
    }

    pub fn on_disconnect_async<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'c> Fn(&'c mut Connection) -> BoxFuture<'c, ()> + Send + Sync + 'static,
    {
        self.hooks.on_disconnect.push(Box::new(hook));
        self
    }

    pub fn on_query(
        &mut self,
        hook: impl Fn(&mut Connection, &QueryEvent<'_>) + Send + Sync + 'static,
    ) -> &mut Self {
        self.on_query_async(move |conn, event| {
            hook(conn, event);
            Box::pin(std::future::ready(()))
        })
    }

    /// Register a query hook that may run statements of its own.
    ///
    /// Statements issued from the hook are not reported to `on_query` hooks.
    pub fn on_query_async<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'c> Fn(&'c mut Connection, &'c QueryEvent<'c>) -> BoxFuture<'c, ()>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.on_query.push(Box::new(hook));
        self
    }

    pub fn hooks_mut(&mut self) -> &mut EventHooks {
        &mut self.hooks
    }

    /// Forward statements the driver reported on its own.
    async fn relay_reports(&mut self) {
        while let Ok(record) = self.reports.try_recv() {
            self.fire_query(&record.as_event()).await;
        }
    }

    async fn fire_connect(&mut self) {
        let hooks = std::mem::take(&mut self.hooks.on_connect);
        for hook in &hooks {
            hook(&mut *self).await;
        }
        events::restore(&mut self.hooks.on_connect, hooks);
    }

    async fn fire_disconnect(&mut self) {
        let hooks = std::mem::take(&mut self.hooks.on_disconnect);
        for hook in &hooks {
            hook(&mut *self).await;
        }
        events::restore(&mut self.hooks.on_disconnect, hooks);
    }

    async fn fire_query(&mut self, event: &QueryEvent<'_>) {
        if let Err(e) = event.outcome {
            debug!(sql = %event.sql, error = %e, "Query failed");
        }
        let hooks = std::mem::take(&mut self.hooks.on_query);
        for hook in &hooks {
            hook(&mut *self, event).await;
        }
        events::restore(&mut self.hooks.on_query, hooks);
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn nesting_level(&self) -> u32 {
        self.nesting_level
    }

    /// Savepoint flag as read at the last connect.
    pub fn savepoints_enabled(&self) -> bool {
        self.savepoints
    }
}
