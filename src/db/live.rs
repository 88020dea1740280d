use futures::future::BoxFuture;
use futures::Stream;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use super::{LocalStoreError, Table};

pub(crate) type QueryFn<T> =
    Arc<dyn Fn(SqlitePool) -> BoxFuture<'static, Result<T, LocalStoreError>> + Send + Sync>;

/// A read that stays current.
///
/// The first call to [`LiveQuery::next`] yields the current result. Every
/// later call waits until a write lands on one of the tables the query reads
/// and then yields the re-computed result. Several writes that arrive while
/// the caller is busy collapse into a single re-run.
pub struct LiveQuery<T> {
    pool: SqlitePool,
    tables: Vec<Table>,
    changes: broadcast::Receiver<Table>,
    query: QueryFn<T>,
    primed: bool,
}

impl<T: Send + 'static> LiveQuery<T> {
    pub(crate) fn new(
        pool: SqlitePool,
        tables: Vec<Table>,
        changes: broadcast::Receiver<Table>,
        query: QueryFn<T>,
    ) -> Self {
        Self {
            pool,
            tables,
            changes,
            query,
            primed: false,
        }
    }

    /// Tables whose writes re-trigger this query.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Runs the query once without touching the subscription.
    pub async fn current(&self) -> Result<T, LocalStoreError> {
        (self.query)(self.pool.clone()).await
    }

    /// Next result set, or `None` once the store that feeds this query is gone.
    pub async fn next(&mut self) -> Option<Result<T, LocalStoreError>> {
        if !self.primed {
            self.primed = true;
            self.drain_pending();
            return Some(self.current().await);
        }

        loop {
            match self.changes.recv().await {
                Ok(table) if self.tables.contains(&table) => break,
                Ok(_) => continue,
                // Missed notifications may have touched our tables.
                Err(RecvError::Lagged(_)) => break,
                Err(RecvError::Closed) => return None,
            }
        }

        self.drain_pending();
        Some(self.current().await)
    }

    fn drain_pending(&mut self) {
        loop {
            match self.changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<T, LocalStoreError>> + Send {
        futures::stream::unfold(self, |mut live| async move {
            live.next().await.map(|item| (item, live))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_store;
    use futures::StreamExt;
    use std::time::Duration;

    async fn count_preferences(pool: SqlitePool) -> Result<i64, LocalStoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM preferences")
            .fetch_one(&pool)
            .await?;
        Ok(count)
    }

    async fn insert_preference(pool: &SqlitePool, key: &str) {
        sqlx::query("INSERT INTO preferences (key, value) VALUES (?, '[]')")
            .bind(key)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_next_yields_current_result() {
        let ctx = setup_store().await;
        insert_preference(ctx.store.pool(), "a").await;

        let mut live = ctx.store.live(&[Table::Preferences], count_preferences);
        assert_eq!(live.next().await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reemits_after_relevant_write() {
        let ctx = setup_store().await;
        let mut live = ctx.store.live(&[Table::Preferences], count_preferences);
        assert_eq!(live.next().await.unwrap().unwrap(), 0);

        insert_preference(ctx.store.pool(), "a").await;
        ctx.store.notify(&[Table::Preferences]);

        assert_eq!(live.next().await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ignores_unrelated_tables() {
        let ctx = setup_store().await;
        let mut live = ctx.store.live(&[Table::Preferences], count_preferences);
        live.next().await.unwrap().unwrap();

        ctx.store.notify(&[Table::Animals]);

        let waited = tokio::time::timeout(Duration::from_millis(50), live.next()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_burst_of_writes_collapses() {
        let ctx = setup_store().await;
        let mut live = ctx.store.live(&[Table::Preferences], count_preferences);
        live.next().await.unwrap().unwrap();

        for key in ["a", "b", "c"] {
            insert_preference(ctx.store.pool(), key).await;
            ctx.store.notify(&[Table::Preferences]);
        }

        assert_eq!(live.next().await.unwrap().unwrap(), 3);
        let waited = tokio::time::timeout(Duration::from_millis(50), live.next()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_stream_ends_when_store_dropped() {
        let ctx = setup_store().await;
        let live = ctx.store.live(&[Table::Preferences], count_preferences);
        let pool = ctx.store.pool().clone();
        let mut stream = Box::pin(live.into_stream());

        assert_eq!(stream.next().await.unwrap().unwrap(), 0);
        insert_preference(&pool, "a").await;
        ctx.store.notify(&[Table::Preferences]);
        assert_eq!(stream.next().await.unwrap().unwrap(), 1);

        drop(ctx);
        assert!(stream.next().await.is_none());
    }
}
