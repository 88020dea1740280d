mod animal_dao;
mod codec;
mod dao;
mod health_record_dao;
mod live;
mod milk_production_dao;
mod preferences;
mod reproduction_record_dao;

pub use animal_dao::AnimalDao;
pub use dao::{Bind, EntityDao, RowCodec};
pub use health_record_dao::HealthRecordDao;
pub use live::LiveQuery;
use live::QueryFn;
pub use milk_production_dao::MilkProductionDao;
pub use preferences::PreferenceStore;
pub use reproduction_record_dao::ReproductionRecordDao;

use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::models::EntityKind;

/// Tables in the local database. Writes are announced per table so live
/// queries only re-run when something they read has changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Animals,
    HealthRecords,
    MilkProduction,
    ReproductionRecords,
    Preferences,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Animals => "animals",
            Table::HealthRecords => "health_records",
            Table::MilkProduction => "milk_production",
            Table::ReproductionRecords => "reproduction_records",
            Table::Preferences => "preferences",
        }
    }

    /// The table itself plus every table whose rows are removed by
    /// `ON DELETE CASCADE` when a row of this table goes away.
    pub fn with_cascades(&self) -> &'static [Table] {
        match self {
            Table::Animals => &[
                Table::Animals,
                Table::HealthRecords,
                Table::MilkProduction,
                Table::ReproductionRecords,
            ],
            Table::HealthRecords => &[Table::HealthRecords],
            Table::MilkProduction => &[Table::MilkProduction],
            Table::ReproductionRecords => &[Table::ReproductionRecords],
            Table::Preferences => &[Table::Preferences],
        }
    }
}

impl From<EntityKind> for Table {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Animal => Table::Animals,
            EntityKind::HealthRecord => Table::HealthRecords,
            EntityKind::MilkProduction => Table::MilkProduction,
            EntityKind::ReproductionRecord => Table::ReproductionRecords,
        }
    }
}

/// Errors raised by the local database. These are never retried.
#[derive(Debug)]
pub enum LocalStoreError {
    /// Failed to create the directory holding the database file.
    Io(PathBuf, std::io::Error),
    /// Schema migration failed.
    Migrate(sqlx::migrate::MigrateError),
    /// Query, constraint or connection failure.
    Sqlx(sqlx::Error),
    /// A stored value could not be decoded.
    CorruptRow {
        table: &'static str,
        id: String,
        detail: String,
    },
}

impl std::fmt::Display for LocalStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocalStoreError::Io(path, e) => {
                write!(f, "Failed to prepare database at '{}': {}", path.display(), e)
            }
            LocalStoreError::Migrate(e) => write!(f, "Database migration failed: {}", e),
            LocalStoreError::Sqlx(e) => write!(f, "Database error: {}", e),
            LocalStoreError::CorruptRow { table, id, detail } => {
                write!(f, "Corrupt row {} in {}: {}", id, table, detail)
            }
        }
    }
}

impl std::error::Error for LocalStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LocalStoreError::Io(_, e) => Some(e),
            LocalStoreError::Migrate(e) => Some(e),
            LocalStoreError::Sqlx(e) => Some(e),
            LocalStoreError::CorruptRow { .. } => None,
        }
    }
}

impl From<sqlx::Error> for LocalStoreError {
    fn from(e: sqlx::Error) -> Self {
        LocalStoreError::Sqlx(e)
    }
}

impl From<sqlx::migrate::MigrateError> for LocalStoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        LocalStoreError::Migrate(e)
    }
}

/// Initialize the database connection pool and run migrations
pub async fn init_db(path: &Path) -> Result<SqlitePool, LocalStoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LocalStoreError::Io(parent.to_path_buf(), e))?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Handle to the local database plus the change feed that drives live
/// queries. Cheap to clone; every clone shares the pool and the feed.
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    changes: broadcast::Sender<Table>,
}

impl LocalStore {
    pub async fn open(path: &Path) -> Result<Self, LocalStoreError> {
        let pool = init_db(path).await?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self { pool, changes }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Announces a committed write. Call only after the statement or
    /// transaction has completed.
    pub fn notify(&self, tables: &[Table]) {
        for table in tables {
            // No receivers just means nobody is watching.
            let _ = self.changes.send(*table);
        }
    }

    /// Builds a query that re-runs whenever one of `tables` is written.
    pub fn live<T, F, Fut>(&self, tables: &[Table], query: F) -> LiveQuery<T>
    where
        T: Send + 'static,
        F: Fn(SqlitePool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, LocalStoreError>> + Send + 'static,
    {
        let query: QueryFn<T> = Arc::new(
            move |pool: SqlitePool| -> BoxFuture<'static, Result<T, LocalStoreError>> {
                Box::pin(query(pool))
            },
        );
        LiveQuery::new(
            self.pool.clone(),
            tables.to_vec(),
            self.changes.subscribe(),
            query,
        )
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
