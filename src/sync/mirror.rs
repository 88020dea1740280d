use std::future::Future;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::error_log::SyncOperation;
use super::SyncContext;
use crate::db::{EntityDao, LocalStoreError};
use crate::models::{EntityKind, SyncRecord};
use crate::remote::{encode_document, RemoteError};

/// Result of pushing one record to the remote store.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorOutcome {
    /// Remote accepted the document and the local flag was set.
    Synced,
    /// Remote accepted the document but the local row changed (or was
    /// deleted) meanwhile, so the flag was left alone.
    Superseded,
    Failed(RemoteError),
}

/// Background remote calls owned by one repository. Dropping the scope
/// aborts whatever is still running.
#[derive(Default)]
pub struct MirrorScope {
    tasks: Mutex<JoinSet<()>>,
}

impl MirrorScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Waits for every in-flight remote call to finish, including ones
    /// spawned while waiting. The lock is only held to swap the set out, so
    /// `spawn` never queues behind a remote call.
    pub async fn settle(&self) {
        loop {
            let mut pending = std::mem::take(&mut *self.tasks.lock().await);
            if pending.is_empty() {
                return;
            }
            while let Some(result) = pending.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        error!("Remote mirror task panicked: {}", e);
                    }
                }
            }
        }
    }

    pub async fn in_flight(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Aborts every in-flight remote call and waits for them to stop.
    pub async fn shutdown(&self) {
        self.tasks.lock().await.shutdown().await;
    }
}

/// Pushes `record` to the remote store and, on success, flags the local row
/// as synchronized if it still holds this version.
pub(crate) async fn mirror_record<D: EntityDao>(
    dao: &D,
    ctx: &SyncContext,
    record: &D::Record,
) -> Result<MirrorOutcome, LocalStoreError> {
    let kind = <D::Record as SyncRecord>::KIND;
    let id = record.id();
    debug!(%kind, id = %id, "Mirroring record");

    let result = match encode_document(record) {
        Ok(document) => ctx.remote.upsert(kind.collection(), id, document).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            ctx.quarantine.reset(kind, id);
            if dao.mark_synced_if_current(id, &record.meta().updated_at).await? {
                debug!(%kind, id = %id, "Record synced");
                Ok(MirrorOutcome::Synced)
            } else {
                debug!(%kind, id = %id, "Record changed while mirroring; flag left unset");
                Ok(MirrorOutcome::Superseded)
            }
        }
        Err(error) => {
            warn!(%kind, id = %id, error = %error, "Remote upsert failed; record stays unsynced");
            ctx.errors
                .record(kind, id, SyncOperation::Upsert, error.clone());
            if ctx.quarantine.track_failure(kind, id, &error) {
                warn!(
                    %kind,
                    id = %id,
                    "Record quarantined after {} permanent failures",
                    ctx.quarantine.threshold()
                );
            }
            Ok(MirrorOutcome::Failed(error))
        }
    }
}

/// Best-effort remote delete. Failures are logged and forgotten.
pub(crate) async fn delete_remote(ctx: &SyncContext, kind: EntityKind, id: &str) {
    match ctx.remote.delete(kind.collection(), id).await {
        Ok(()) => debug!(%kind, id = %id, "Remote document deleted"),
        Err(error) => {
            warn!(%kind, id = %id, error = %error, "Remote delete failed; document left behind");
            ctx.errors
                .record(kind, id, SyncOperation::Delete, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_settle_waits_for_all_tasks() {
        let scope = MirrorScope::new();
        let done = Arc::new(AtomicUsize::new(0));
        for delay in [30, 10, 20] {
            let done = done.clone();
            scope
                .spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        scope.settle().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(scope.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_pending_tasks() {
        let scope = MirrorScope::new();
        let done = Arc::new(AtomicUsize::new(0));
        let flag = done.clone();
        scope
            .spawn(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                flag.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        scope.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 0);
        assert_eq!(scope.in_flight().await, 0);
    }
}
