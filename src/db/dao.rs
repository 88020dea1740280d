use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqlitePool;

use super::codec::encode_timestamp;
use super::{LiveQuery, LocalStore, LocalStoreError, Table};
use crate::models::SyncRecord;

/// A positional parameter for queries assembled at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Text(String),
    Real(f64),
    Int(i64),
}

impl From<&str> for Bind {
    fn from(v: &str) -> Self {
        Bind::Text(v.to_string())
    }
}

impl From<String> for Bind {
    fn from(v: String) -> Self {
        Bind::Text(v)
    }
}

impl From<i64> for Bind {
    fn from(v: i64) -> Self {
        Bind::Int(v)
    }
}

impl From<f64> for Bind {
    fn from(v: f64) -> Self {
        Bind::Real(v)
    }
}

macro_rules! bind_all {
    ($query:expr, $binds:expr) => {{
        let mut query = $query;
        for bind in $binds.iter() {
            query = match bind {
                Bind::Text(v) => query.bind(v.clone()),
                Bind::Real(v) => query.bind(*v),
                Bind::Int(v) => query.bind(*v),
            };
        }
        query
    }};
}

/// Maps a record kind onto its table and raw row shape.
pub trait RowCodec: SyncRecord {
    const TABLE: Table;

    type Row: for<'r> sqlx::FromRow<'r, SqliteRow> + Send + Unpin + 'static;

    fn from_row(row: Self::Row) -> Result<Self, LocalStoreError>;
}

pub(crate) fn select_sql<R: RowCodec>(clause: &str) -> String {
    if clause.is_empty() {
        format!("SELECT * FROM {}", R::TABLE.name())
    } else {
        format!("SELECT * FROM {} {}", R::TABLE.name(), clause)
    }
}

pub(crate) async fn fetch_records<R: RowCodec>(
    pool: &SqlitePool,
    sql: &str,
    binds: &[Bind],
) -> Result<Vec<R>, LocalStoreError> {
    let rows = bind_all!(sqlx::query_as::<_, R::Row>(sql), binds)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(R::from_row).collect()
}

pub(crate) async fn fetch_optional_record<R: RowCodec>(
    pool: &SqlitePool,
    sql: &str,
    binds: &[Bind],
) -> Result<Option<R>, LocalStoreError> {
    let row = bind_all!(sqlx::query_as::<_, R::Row>(sql), binds)
        .fetch_optional(pool)
        .await?;
    row.map(R::from_row).transpose()
}

pub(crate) async fn fetch_count(
    pool: &SqlitePool,
    sql: &str,
    binds: &[Bind],
) -> Result<i64, LocalStoreError> {
    let count = bind_all!(sqlx::query_scalar::<_, i64>(sql), binds)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub(crate) async fn fetch_total(
    pool: &SqlitePool,
    sql: &str,
    binds: &[Bind],
) -> Result<f64, LocalStoreError> {
    let total = bind_all!(sqlx::query_scalar::<_, f64>(sql), binds)
        .fetch_one(pool)
        .await?;
    Ok(total)
}

/// Live list of records for `SELECT * FROM <table> <clause>`.
pub(crate) fn live_records<R: RowCodec>(
    store: &LocalStore,
    tables: &[Table],
    clause: &str,
    binds: Vec<Bind>,
) -> LiveQuery<Vec<R>> {
    let sql = select_sql::<R>(clause);
    store.live(tables, move |pool| {
        let sql = sql.clone();
        let binds = binds.clone();
        async move { fetch_records::<R>(&pool, &sql, &binds).await }
    })
}

pub(crate) fn live_count(
    store: &LocalStore,
    tables: &[Table],
    sql: String,
    binds: Vec<Bind>,
) -> LiveQuery<i64> {
    store.live(tables, move |pool| {
        let sql = sql.clone();
        let binds = binds.clone();
        async move { fetch_count(&pool, &sql, &binds).await }
    })
}

/// Local persistence for one record kind.
///
/// Implementors write the kind-specific `insert` and `update` statements;
/// lookups, deletes and synchronized-flag bookkeeping are shared.
#[async_trait]
pub trait EntityDao: Clone + Send + Sync + 'static {
    type Record: RowCodec;

    fn store(&self) -> &LocalStore;

    async fn insert(&self, record: &Self::Record) -> Result<(), LocalStoreError>;

    /// Replaces the payload, `updated_at` and flag of an existing row.
    /// `created_at` and `created_by` are left as stored. Returns the
    /// affected row count; 0 means the id does not exist.
    async fn update(&self, record: &Self::Record) -> Result<u64, LocalStoreError>;

    async fn delete_by_id(&self, id: &str) -> Result<u64, LocalStoreError> {
        let table = <Self::Record as RowCodec>::TABLE;
        let sql = format!("DELETE FROM {} WHERE id = ?", table.name());
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(self.store().pool())
            .await?;

        if result.rows_affected() > 0 {
            self.store().notify(table.with_cascades());
        }
        Ok(result.rows_affected())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Self::Record>, LocalStoreError> {
        let sql = select_sql::<Self::Record>("WHERE id = ?");
        fetch_optional_record(self.store().pool(), &sql, &[Bind::from(id)]).await
    }

    fn watch_by_id(&self, id: &str) -> LiveQuery<Option<Self::Record>> {
        let sql = select_sql::<Self::Record>("WHERE id = ?");
        let binds = vec![Bind::from(id)];
        self.store()
            .live(&[<Self::Record as RowCodec>::TABLE], move |pool| {
                let sql = sql.clone();
                let binds = binds.clone();
                async move { fetch_optional_record::<Self::Record>(&pool, &sql, &binds).await }
            })
    }

    /// Most recently updated first.
    fn watch_all(&self) -> LiveQuery<Vec<Self::Record>> {
        live_records(
            self.store(),
            &[<Self::Record as RowCodec>::TABLE],
            "ORDER BY updated_at DESC",
            Vec::new(),
        )
    }

    fn watch_unsynced(&self) -> LiveQuery<Vec<Self::Record>> {
        live_records(
            self.store(),
            &[<Self::Record as RowCodec>::TABLE],
            "WHERE synced = 0 ORDER BY updated_at ASC",
            Vec::new(),
        )
    }

    /// Snapshot of the rows still waiting for a remote mirror.
    async fn unsynced(&self) -> Result<Vec<Self::Record>, LocalStoreError> {
        let sql = select_sql::<Self::Record>("WHERE synced = 0 ORDER BY updated_at ASC");
        fetch_records(self.store().pool(), &sql, &[]).await
    }

    async fn count_unsynced(&self) -> Result<i64, LocalStoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE synced = 0",
            <Self::Record as RowCodec>::TABLE.name()
        );
        fetch_count(self.store().pool(), &sql, &[]).await
    }

    /// Flags every listed row as synchronized in a single statement.
    async fn mark_synced(&self, ids: &[String]) -> Result<u64, LocalStoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let table = <Self::Record as RowCodec>::TABLE;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE {} SET synced = 1 WHERE synced = 0 AND id IN ({})",
            table.name(),
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let result = query.execute(self.store().pool()).await?;

        if result.rows_affected() > 0 {
            self.store().notify(&[table]);
        }
        Ok(result.rows_affected())
    }

    /// Flags the row as synchronized only if it still carries `updated_at`.
    /// Returns false when the row changed or vanished in the meantime.
    async fn mark_synced_if_current(
        &self,
        id: &str,
        updated_at: &DateTime<Utc>,
    ) -> Result<bool, LocalStoreError> {
        let table = <Self::Record as RowCodec>::TABLE;
        let sql = format!(
            "UPDATE {} SET synced = 1 WHERE id = ? AND updated_at = ? AND synced = 0",
            table.name()
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(encode_timestamp(updated_at))
            .execute(self.store().pool())
            .await?;

        if result.rows_affected() > 0 {
            self.store().notify(&[table]);
            return Ok(true);
        }
        Ok(false)
    }
}
