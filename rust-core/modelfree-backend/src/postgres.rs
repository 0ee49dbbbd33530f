// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PostgreSQL-backed relational backend for ModelFree.
//
// Each collection maps to a two-column table (`key VARCHAR(n) PRIMARY KEY`,
// `value TEXT` holding the JSON document) inside a logical database that is
// created on demand.
//
// # Design
//
// - The target database is checked through the query pool. Only when it
//   reports SQLSTATE 3D000 does the backend open a one-connection admin pool
//   on the maintenance database and issue `CREATE DATABASE`. The result is
//   cached in a flag that is cleared whenever a query reports 3D000, so a
//   database dropped out-of-band is re-created on the next call.
// - Tables are created lazily with `CREATE TABLE IF NOT EXISTS`; their key
//   sizes are cached per name, once created, for the lifetime of the backend.
// - Upsert is `INSERT .. ON CONFLICT (key) DO UPDATE`: last writer wins,
//   with no optimistic concurrency check.
// - `delete_by_key` and `random_one` are single statements. The delete
//   result comes from `rows_affected`; the random offset and the row it
//   selects are computed against the same statement snapshot.
// - Change notification installs an AFTER INSERT OR UPDATE trigger per
//   collection that calls `pg_notify` with the written key. One background
//   task per backend owns a `PgListener` and fans notifications out to the
//   subscribers of the matching collection. Triggers and LISTEN
//   registrations are kept after the last unsubscribe.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgListener, PgPool, PgPoolOptions};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::{check_key_fits, check_key_size, require_key, Backend, Record};
use crate::config::PostgresConfig;
use crate::error::{StorageError, StorageResult};
use crate::notify::{ChangeCallback, ChangeNotifier, SubscriptionId};

/// Longest collection name accepted, leaving room for the derived trigger,
/// function and channel names within the 63-byte identifier limit.
pub const MAX_COLLECTION_NAME_LEN: usize = 40;

/// SQLSTATE invalid_catalog_name.
const UNDEFINED_DATABASE: &str = "3D000";
/// SQLSTATE undefined_table.
const UNDEFINED_TABLE: &str = "42P01";
/// SQLSTATE duplicate_database.
const DUPLICATE_DATABASE: &str = "42P04";

/// Check that `name` can be used as a table name and as the stem of the
/// derived trigger and channel names.
pub fn validate_collection_name(name: &str) -> StorageResult<()> {
    if name.is_empty() {
        return Err(StorageError::InvalidArgument(
            "collection name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(StorageError::InvalidArgument(format!(
            "collection name '{name}' exceeds {MAX_COLLECTION_NAME_LEN} bytes"
        )));
    }
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StorageError::InvalidArgument(format!(
            "collection name '{name}' must match [A-Za-z_][A-Za-z0-9_]*"
        )));
    }
    Ok(())
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Notification channel for a collection.
pub fn channel_name(collection: &str) -> String {
    format!("modelfree_{collection}")
}

fn notify_function_name(collection: &str) -> String {
    format!("modelfree_{collection}_notify")
}

fn trigger_name(collection: &str) -> String {
    format!("modelfree_{collection}_changed")
}

mod sql {
    use super::{channel_name, notify_function_name, quote_ident, trigger_name};

    pub fn create_table(table: &str, key_size: usize) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\"key\" VARCHAR({key_size}) PRIMARY KEY, \"value\" TEXT)",
            quote_ident(table)
        )
    }

    pub fn key_width() -> &'static str {
        "SELECT character_maximum_length::int4 FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1 AND column_name = 'key'"
    }

    pub fn count(table: &str) -> String {
        format!("SELECT count(*) FROM {}", quote_ident(table))
    }

    pub fn upsert(table: &str) -> String {
        format!(
            "INSERT INTO {} (\"key\", \"value\") VALUES ($1, $2) \
             ON CONFLICT (\"key\") DO UPDATE SET \"value\" = EXCLUDED.\"value\"",
            quote_ident(table)
        )
    }

    pub fn select_by_key(table: &str) -> String {
        format!("SELECT \"value\" FROM {} WHERE \"key\" = $1", quote_ident(table))
    }

    pub fn select_all(table: &str) -> String {
        format!("SELECT \"key\", \"value\" FROM {}", quote_ident(table))
    }

    pub fn select_random(table: &str) -> String {
        let table = quote_ident(table);
        format!(
            "SELECT \"key\", \"value\" FROM {table} \
             OFFSET floor(random() * (SELECT count(*) FROM {table}))::bigint LIMIT 1"
        )
    }

    pub fn delete_by_key(table: &str) -> String {
        format!("DELETE FROM {} WHERE \"key\" = $1", quote_ident(table))
    }

    pub fn delete_all(table: &str) -> String {
        format!("DELETE FROM {}", quote_ident(table))
    }

    pub fn ping() -> &'static str {
        "SELECT 1"
    }

    pub fn database_exists() -> &'static str {
        "SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)"
    }

    pub fn create_database(database: &str) -> String {
        format!("CREATE DATABASE {}", quote_ident(database))
    }

    /// Function and trigger publishing the written key on the collection's
    /// channel. Runs as one implicit transaction.
    pub fn install_trigger(table: &str) -> String {
        let function = quote_ident(&notify_function_name(table));
        let trigger = quote_ident(&trigger_name(table));
        let channel = channel_name(table);
        let table = quote_ident(table);
        format!(
            "CREATE OR REPLACE FUNCTION {function}() RETURNS trigger AS $modelfree$\n\
             BEGIN\n\
             \x20   PERFORM pg_notify('{channel}', NEW.\"key\");\n\
             \x20   RETURN NEW;\n\
             END;\n\
             $modelfree$ LANGUAGE plpgsql;\n\
             DROP TRIGGER IF EXISTS {trigger} ON {table};\n\
             CREATE TRIGGER {trigger} AFTER INSERT OR UPDATE ON {table} \
             FOR EACH ROW EXECUTE FUNCTION {function}();"
        )
    }
}

enum ListenerCommand {
    Listen {
        collection: String,
        channel: String,
        reply: oneshot::Sender<StorageResult<()>>,
    },
}

struct ListenerHandle {
    commands: mpsc::UnboundedSender<ListenerCommand>,
    task: JoinHandle<()>,
    watched: HashSet<String>,
}

#[derive(Debug, Default)]
struct Catalog {
    /// Key size fixed per collection for the lifetime of the backend.
    key_sizes: HashMap<String, usize>,
    /// Tables known to exist.
    ready: HashSet<String>,
}

/// A relational backend storing each collection in a PostgreSQL table.
///
/// Construction performs no I/O; the database, tables and triggers are
/// provisioned on first use. Must be created inside a Tokio runtime.
///
/// # Example
///
/// ```rust,no_run
/// use modelfree_backend::backend::Backend;
/// use modelfree_backend::config::PostgresConfig;
/// use modelfree_backend::postgres::PostgresBackend;
///
/// # tokio_test::block_on(async {
/// let backend = PostgresBackend::new(PostgresConfig::from_url(
///     "postgres://postgres@localhost:5432/modelfree",
/// ))
/// .unwrap();
/// backend.upsert("widgets", "w1", &serde_json::json!({"name": "a"})).await.unwrap();
/// backend.dispose().await.unwrap();
/// # });
/// ```
pub struct PostgresBackend {
    config: PostgresConfig,
    options: PgConnectOptions,
    database: String,
    pool: PgPool,
    database_ready: AtomicBool,
    catalog: Mutex<Catalog>,
    notifier: Arc<ChangeNotifier>,
    listener: tokio::sync::Mutex<Option<ListenerHandle>>,
    disposed: AtomicBool,
}

impl PostgresBackend {
    /// Create a backend from `config` with a lazily connecting pool.
    pub fn new(config: PostgresConfig) -> StorageResult<Self> {
        config.validate()?;
        let options = config.connect_options()?;
        let database = options
            .get_database()
            .unwrap_or(config.database_name.as_str())
            .to_string();
        if database.is_empty() {
            return Err(StorageError::Configuration(
                "no database name configured".to_string(),
            ));
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy_with(options.clone());

        debug!(database = %database, "created postgres backend");

        Ok(Self {
            config,
            options,
            database,
            pool,
            database_ready: AtomicBool::new(false),
            catalog: Mutex::new(Catalog::default()),
            notifier: Arc::new(ChangeNotifier::new()),
            listener: tokio::sync::Mutex::new(None),
            disposed: AtomicBool::new(false),
        })
    }

    /// Name of the logical database holding the collection tables.
    pub fn database(&self) -> &str {
        &self.database
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(StorageError::Disposed);
        }
        Ok(())
    }

    /// Log a failed statement and convert the driver error.
    fn query_failed(&self, statement: &str, err: sqlx::Error) -> StorageError {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some(UNDEFINED_DATABASE) => self.database_ready.store(false, Ordering::Release),
                Some(UNDEFINED_TABLE) => self.catalog.lock().ready.clear(),
                _ => {}
            }
        }
        error!(statement, error = %err, "query failed");
        StorageError::Backend {
            message: err.to_string(),
            statement: Some(statement.to_string()),
        }
    }

    async fn ensure_database(&self) -> StorageResult<()> {
        if self.database_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        // The target database is reachable for most roles; only a missing
        // one needs the maintenance database.
        match sqlx::query_scalar::<_, i32>(sql::ping()).fetch_one(&self.pool).await {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNDEFINED_DATABASE) =>
            {
                debug!(database = %self.database, "target database missing");
                self.create_database().await?;
            }
            Err(e) => return Err(self.query_failed(sql::ping(), e)),
        }

        self.database_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Create the target database over a one-connection admin pool.
    async fn create_database(&self) -> StorageResult<()> {
        let admin_options = self
            .options
            .clone()
            .database(&self.config.maintenance_database);
        let admin = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(admin_options)
            .await
            .map_err(|e| self.query_failed("connect", e))?;

        let result = self.create_database_on(&admin).await;
        admin.close().await;
        result
    }

    async fn create_database_on(&self, admin: &PgPool) -> StorageResult<()> {
        let exists: bool = sqlx::query_scalar(sql::database_exists())
            .bind(&self.database)
            .fetch_one(admin)
            .await
            .map_err(|e| self.query_failed(sql::database_exists(), e))?;
        if exists {
            return Ok(());
        }

        let statement = sql::create_database(&self.database);
        match sqlx::raw_sql(&statement).execute(admin).await {
            Ok(_) => {
                info!(database = %self.database, "created database");
                Ok(())
            }
            // Lost a race with another creator.
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(DUPLICATE_DATABASE) =>
            {
                Ok(())
            }
            Err(e) => Err(self.query_failed(&statement, e)),
        }
    }

    /// Provision the database and the table for `name`, returning its key size.
    ///
    /// The key size is recorded only once the table is known to exist.
    async fn ensure_table(&self, name: &str, key_size: Option<usize>) -> StorageResult<usize> {
        self.check_open()?;
        validate_collection_name(name)?;
        let requested = check_key_size(key_size.unwrap_or(self.config.key_size))?;
        self.ensure_database().await?;

        let (fixed, ready) = {
            let catalog = self.catalog.lock();
            (catalog.key_sizes.get(name).copied(), catalog.ready.contains(name))
        };
        if let (Some(size), true) = (fixed, ready) {
            return Ok(size);
        }

        let mut size = fixed.unwrap_or(requested);
        let statement = sql::create_table(name, size);
        sqlx::raw_sql(&statement)
            .execute(&self.pool)
            .await
            .map_err(|e| self.query_failed(&statement, e))?;

        if fixed.is_none() {
            // A table left by an earlier process keeps its original width.
            let width: Option<Option<i32>> = sqlx::query_scalar(sql::key_width())
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| self.query_failed(sql::key_width(), e))?;
            if let Some(Some(actual)) = width {
                let actual = usize::try_from(actual).unwrap_or(size);
                if actual != size {
                    info!(collection = name, requested = size, actual, "adopting existing key width");
                    size = actual;
                }
            }
        }

        let mut catalog = self.catalog.lock();
        let size = *catalog.key_sizes.entry(name.to_string()).or_insert(size);
        catalog.ready.insert(name.to_string());
        debug!(collection = name, key_size = size, "table ready");
        Ok(size)
    }

    fn decode(name: &str, key: &str, text: &str) -> StorageResult<Value> {
        serde_json::from_str(text).map_err(|e| {
            StorageError::CorruptedData(format!(
                "value for key '{key}' in collection '{name}' is not valid JSON: {e}"
            ))
        })
    }

    async fn start_listener(&self) -> StorageResult<ListenerHandle> {
        let listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| self.query_failed("LISTEN", e))?;
        let (commands, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_listener(listener, receiver, Arc::clone(&self.notifier)));
        info!(database = %self.database, "change listener started");
        Ok(ListenerHandle {
            commands,
            task,
            watched: HashSet::new(),
        })
    }

    /// Install the trigger for `name` and LISTEN on its channel, once.
    async fn watch(&self, name: &str) -> StorageResult<()> {
        let mut guard = self.listener.lock().await;
        if guard.as_ref().is_some_and(|h| h.watched.contains(name)) {
            return Ok(());
        }

        let statement = sql::install_trigger(name);
        sqlx::raw_sql(&statement)
            .execute(&self.pool)
            .await
            .map_err(|e| self.query_failed(&statement, e))?;
        debug!(collection = name, "change trigger installed");

        if guard.is_none() {
            *guard = Some(self.start_listener().await?);
        }
        let Some(handle) = guard.as_mut() else {
            return Err(StorageError::backend("change listener unavailable"));
        };

        let (reply, ack) = oneshot::channel();
        handle
            .commands
            .send(ListenerCommand::Listen {
                collection: name.to_string(),
                channel: channel_name(name),
                reply,
            })
            .map_err(|_| StorageError::backend("change listener stopped"))?;
        ack.await
            .map_err(|_| StorageError::backend("change listener stopped"))??;

        handle.watched.insert(name.to_string());
        Ok(())
    }
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("database", &self.database)
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Background loop owning the LISTEN connection.
///
/// Exits when the command sender is dropped or the listener fails.
async fn run_listener(
    mut listener: PgListener,
    mut commands: mpsc::UnboundedReceiver<ListenerCommand>,
    notifier: Arc<ChangeNotifier>,
) {
    let mut channels: HashMap<String, String> = HashMap::new();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(ListenerCommand::Listen { collection, channel, reply }) => {
                    let result = listener.listen(&channel).await.map_err(|e| {
                        error!(channel = %channel, error = %e, "LISTEN failed");
                        StorageError::backend(e.to_string())
                    });
                    if result.is_ok() {
                        channels.insert(channel, collection);
                    }
                    let _ = reply.send(result);
                }
                None => break,
            },
            received = listener.recv() => match received {
                Ok(notification) => match channels.get(notification.channel()) {
                    Some(collection) => notifier.notify(collection, notification.payload()),
                    None => debug!(channel = notification.channel(), "notification on unknown channel"),
                },
                Err(e) => {
                    error!(error = %e, "change listener failed");
                    break;
                }
            },
        }
    }
    debug!("change listener stopped");
}

#[async_trait]
impl Backend for PostgresBackend {
    async fn ensure_collection(&self, name: &str, key_size: Option<usize>) -> StorageResult<usize> {
        self.ensure_table(name, key_size).await
    }

    async fn key_size(&self, name: &str) -> StorageResult<usize> {
        self.check_open()?;
        self.catalog
            .lock()
            .key_sizes
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::NotProvisioned(name.to_string()))
    }

    async fn count(&self, name: &str) -> StorageResult<u64> {
        self.ensure_table(name, None).await?;
        let statement = sql::count(name);
        let count: i64 = sqlx::query_scalar(&statement)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.query_failed(&statement, e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn upsert(&self, name: &str, key: &str, value: &Value) -> StorageResult<()> {
        let key_size = self.ensure_table(name, None).await?;
        check_key_fits(name, key, key_size)?;
        let text = serde_json::to_string(value)?;
        let statement = sql::upsert(name);
        sqlx::query(&statement)
            .bind(key)
            .bind(text)
            .execute(&self.pool)
            .await
            .map_err(|e| self.query_failed(&statement, e))?;
        Ok(())
    }

    async fn get_by_key(&self, name: &str, key: &str) -> StorageResult<Option<Value>> {
        self.ensure_table(name, None).await?;
        let statement = sql::select_by_key(name);
        let text: Option<String> = sqlx::query_scalar(&statement)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.query_failed(&statement, e))?;
        text.map(|t| Self::decode(name, key, &t)).transpose()
    }

    async fn all(&self, name: &str) -> StorageResult<Vec<Record>> {
        self.ensure_table(name, None).await?;
        let statement = sql::select_all(name);
        let rows: Vec<(String, String)> = sqlx::query_as(&statement)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.query_failed(&statement, e))?;
        rows.into_iter()
            .map(|(key, text)| {
                let value = Self::decode(name, &key, &text)?;
                Ok(Record { key, value })
            })
            .collect()
    }

    async fn random_one(&self, name: &str) -> StorageResult<Option<Record>> {
        self.ensure_table(name, None).await?;
        let statement = sql::select_random(name);
        let row: Option<(String, String)> = sqlx::query_as(&statement)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.query_failed(&statement, e))?;
        row.map(|(key, text)| {
            let value = Self::decode(name, &key, &text)?;
            Ok(Record { key, value })
        })
        .transpose()
    }

    async fn delete_by_key(&self, name: &str, key: &str) -> StorageResult<bool> {
        require_key(key, "delete")?;
        self.ensure_table(name, None).await?;
        let statement = sql::delete_by_key(name);
        let result = sqlx::query(&statement)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| self.query_failed(&statement, e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, name: &str) -> StorageResult<()> {
        self.ensure_table(name, None).await?;
        let statement = sql::delete_all(name);
        sqlx::raw_sql(&statement)
            .execute(&self.pool)
            .await
            .map_err(|e| self.query_failed(&statement, e))?;
        Ok(())
    }

    async fn subscribe(&self, name: &str, callback: ChangeCallback) -> StorageResult<SubscriptionId> {
        self.ensure_table(name, None).await?;
        let id = self.notifier.subscribe(name, callback);
        if let Err(e) = self.watch(name).await {
            self.notifier.unsubscribe(name, id);
            return Err(e);
        }
        Ok(id)
    }

    async fn unsubscribe(&self, name: &str, id: SubscriptionId) -> StorageResult<bool> {
        self.check_open()?;
        Ok(self.notifier.unsubscribe(name, id))
    }

    async fn dispose(&self) -> StorageResult<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let handle = self.listener.lock().await.take();
        if let Some(handle) = handle {
            drop(handle.commands);
            if let Err(e) = handle.task.await {
                warn!(error = %e, "change listener task ended abnormally");
            }
        }
        self.notifier.clear();
        self.pool.close().await;
        info!(database = %self.database, "postgres backend disposed");
        Ok(())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
