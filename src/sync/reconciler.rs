use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::mirror::{mirror_record, MirrorOutcome};
use super::SyncContext;
use crate::db::{
    AnimalDao, EntityDao, HealthRecordDao, LocalStore, LocalStoreError, MilkProductionDao,
    ReproductionRecordDao,
};
use crate::models::{EntityKind, SyncRecord};

/// Counts from one sweep over every unsynchronized record.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: usize,
    pub synced: usize,
    /// Accepted remotely, but the local row changed during the call.
    pub superseded: usize,
    /// Transient failures left for the next sweep.
    pub deferred: usize,
    /// Non-transient failures.
    pub failed: usize,
    pub newly_quarantined: usize,
    /// Records skipped because they are quarantined.
    pub skipped: usize,
}

impl SweepReport {
    pub fn merge(&mut self, other: &SweepReport) {
        self.attempted += other.attempted;
        self.synced += other.synced;
        self.superseded += other.superseded;
        self.deferred += other.deferred;
        self.failed += other.failed;
        self.newly_quarantined += other.newly_quarantined;
        self.skipped += other.skipped;
    }

    pub fn is_clean(&self) -> bool {
        self.deferred == 0 && self.failed == 0 && self.skipped == 0
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempted, {} synced, {} superseded, {} deferred, {} failed ({} newly quarantined), {} skipped",
            self.attempted,
            self.synced,
            self.superseded,
            self.deferred,
            self.failed,
            self.newly_quarantined,
            self.skipped
        )
    }
}

/// Pushes every locally unsynchronized record to the remote store.
///
/// Each record is attempted on its own; a failing record never stops the
/// sweep. Sweeps never overlap: a second caller waits for the first.
pub struct Reconciler {
    animals: AnimalDao,
    health_records: HealthRecordDao,
    milk_production: MilkProductionDao,
    reproduction_records: ReproductionRecordDao,
    ctx: SyncContext,
    running: Mutex<()>,
}

impl Reconciler {
    pub fn new(store: LocalStore, ctx: SyncContext) -> Self {
        Self {
            animals: AnimalDao::new(store.clone()),
            health_records: HealthRecordDao::new(store.clone()),
            milk_production: MilkProductionDao::new(store.clone()),
            reproduction_records: ReproductionRecordDao::new(store),
            ctx,
            running: Mutex::new(()),
        }
    }

    /// Runs one sweep. Animals go first so dependents never reach the
    /// remote store ahead of their owner within a sweep.
    pub async fn sweep(&self) -> Result<SweepReport, LocalStoreError> {
        let _guard = self.running.lock().await;
        let mut report = SweepReport::default();

        report.merge(&sweep_kind(&self.animals, &self.ctx).await?);
        report.merge(&sweep_kind(&self.health_records, &self.ctx).await?);
        report.merge(&sweep_kind(&self.milk_production, &self.ctx).await?);
        report.merge(&sweep_kind(&self.reproduction_records, &self.ctx).await?);

        if report.attempted > 0 || report.skipped > 0 {
            info!("Sync sweep finished: {}", report);
        } else {
            debug!("Sync sweep found nothing to do");
        }
        Ok(report)
    }

    /// Releases every quarantined record and sweeps again.
    pub async fn retry_quarantined(&self) -> Result<SweepReport, LocalStoreError> {
        let released = self.ctx.quarantine.release_all();
        if released > 0 {
            info!("Released {} quarantined records", released);
        }
        self.sweep().await
    }

    /// Sweeps every `interval` until the future is dropped. Local failures
    /// are logged and the next tick tries again.
    pub async fn run_periodic(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep().await {
                error!("Sync sweep aborted: {}", e);
            }
        }
    }

    /// Number of unsynchronized records per kind.
    pub async fn unsynced_counts(&self) -> Result<Vec<(EntityKind, i64)>, LocalStoreError> {
        Ok(vec![
            (EntityKind::Animal, self.animals.count_unsynced().await?),
            (EntityKind::HealthRecord, self.health_records.count_unsynced().await?),
            (EntityKind::MilkProduction, self.milk_production.count_unsynced().await?),
            (
                EntityKind::ReproductionRecord,
                self.reproduction_records.count_unsynced().await?,
            ),
        ])
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }
}

async fn sweep_kind<D: EntityDao>(
    dao: &D,
    ctx: &SyncContext,
) -> Result<SweepReport, LocalStoreError> {
    let kind = <D::Record as SyncRecord>::KIND;
    let mut report = SweepReport::default();

    for record in dao.unsynced().await? {
        if ctx.quarantine.is_quarantined(kind, record.id()) {
            report.skipped += 1;
            continue;
        }

        report.attempted += 1;
        match mirror_record(dao, ctx, &record).await? {
            MirrorOutcome::Synced => report.synced += 1,
            MirrorOutcome::Superseded => report.superseded += 1,
            MirrorOutcome::Failed(e) if e.is_transient() => report.deferred += 1,
            MirrorOutcome::Failed(_) => {
                report.failed += 1;
                if ctx.quarantine.is_quarantined(kind, record.id()) {
                    report.newly_quarantined += 1;
                }
            }
        }
    }

    if report.skipped > 0 {
        warn!(%kind, "{} quarantined records skipped", report.skipped);
    }
    Ok(report)
}
