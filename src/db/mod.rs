//! Database module for Boxroom.
//!
//! This module provides SQLite connectivity (via sqlx), migration management
//! and the shared state every structural operation goes through: the
//! structure lock and the root folder cache.

mod schema;

pub use schema::MIGRATIONS;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::library::RootCache;
use crate::Result;

/// Connection pool type used by all repositories.
pub type DbPool = SqlitePool;

/// A single pooled connection.
pub type DbConnection = PoolConnection<Sqlite>;

/// An open transaction.
pub type DbTransaction = Transaction<'static, Sqlite>;

/// Tables in dependency order (dependents first).
const TABLES: &[&str] = &["permissions", "user_files", "folders", "user_groups"];

/// Database wrapper owning the pool and library-wide state.
pub struct Database {
    pool: DbPool,
    structure_lock: Mutex<()>,
    root: RootCache,
}

impl Database {
    /// Open a database at the specified path.
    ///
    /// If the database file doesn't exist, it will be created.
    /// Migrations are automatically applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_pool_size(path, 5).await
    }

    /// Open the database described by the configuration.
    pub async fn open_with_config(config: &DatabaseConfig) -> Result<Self> {
        Self::open_with_pool_size(&config.path, config.max_connections).await
    }

    async fn open_with_pool_size(path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening database at {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let db = Self::from_pool(pool);
        db.migrate().await?;
        Ok(db)
    }

    /// Open an in-memory database for testing.
    ///
    /// Every connection to `:memory:` is a separate database, so the pool
    /// holds exactly one connection that is never recycled.
    pub async fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory database");
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self::from_pool(pool);
        db.migrate().await?;
        Ok(db)
    }

    fn from_pool(pool: DbPool) -> Self {
        Self {
            pool,
            structure_lock: Mutex::new(()),
            root: RootCache::new(),
        }
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Acquire a connection from the pool.
    pub async fn acquire(&self) -> Result<DbConnection> {
        Ok(self.pool.acquire().await?)
    }

    /// Begin a write transaction.
    ///
    /// The write lock is taken up front (`BEGIN IMMEDIATE`), so a
    /// transaction that reads before it writes never fails with
    /// `SQLITE_BUSY_SNAPSHOT`; a competing writer waits out the busy timeout.
    pub async fn begin(&self) -> Result<DbTransaction> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Begin a read-only transaction over a consistent snapshot.
    pub async fn begin_read(&self) -> Result<DbTransaction> {
        Ok(self.pool.begin().await?)
    }

    /// Serialize structural mutations (create, move, copy, destroy).
    ///
    /// Held for the whole transaction so ancestry checks and the writes
    /// that depend on them cannot interleave with another mutation.
    pub async fn lock_structure(&self) -> MutexGuard<'_, ()> {
        self.structure_lock.lock().await
    }

    /// The cached root folder id.
    pub fn root_cache(&self) -> &RootCache {
        &self.root
    }

    /// Get the current schema version.
    pub async fn schema_version(&self) -> Result<i64> {
        if !self.table_exists("schema_version").await? {
            return Ok(0);
        }

        let version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
                .fetch_one(&self.pool)
                .await?;

        Ok(version)
    }

    /// Check if a table exists in the database.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(table_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        let current_version = self.schema_version().await?;
        let migrations = MIGRATIONS;

        if current_version as usize >= migrations.len() {
            debug!("Database is up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating database from version {} to {}",
            current_version,
            migrations.len()
        );

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version     INTEGER PRIMARY KEY,
                applied_at  TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        for (i, migration) in migrations.iter().enumerate().skip(current_version as usize) {
            let version = (i + 1) as i64;
            info!("Applying migration v{}", version);

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(migration).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            debug!("Migration v{} applied successfully", version);
        }

        info!(
            "Database migration complete (now at version {})",
            migrations.len()
        );

        Ok(())
    }

    /// Delete every library row and forget the cached root.
    ///
    /// The store is left migrated; the next `root()` call recreates the
    /// root folder.
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.lock_structure().await;

        let mut tx = self.begin().await?;
        for table in TABLES {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.root.invalidate();
        info!("Library store reset");
        Ok(())
    }

    /// Close the pool, waiting for connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
