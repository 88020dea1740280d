//! Offline-first synchronization between the local store and a remote
//! document store.
//!
//! Every write goes to the local SQLite database first and is reported
//! as done once it commits. The matching remote upsert or delete runs in
//! the background; its only visible effect is the record's `synced` flag.
//! Records the background call could not push are picked up later by the
//! [`Reconciler`].
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use finca_sync::db::LocalStore;
//! use finca_sync::models::{Animal, Species};
//! use finca_sync::remote::OfflineRemoteStore;
//! use finca_sync::sync::{Repositories, StaticAuthProvider, SyncContext};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LocalStore::open("finca.db".as_ref()).await?;
//! let ctx = SyncContext::new(
//!     Arc::new(OfflineRemoteStore),
//!     Arc::new(StaticAuthProvider::new("farmer")),
//! );
//! let repos = Repositories::new(store, ctx);
//!
//! let id = repos.animals.save(Animal::new("BOV-001", Species::Bovine)).await?;
//! let report = repos.reconciler.sweep().await?;
//! println!("{} -> {}", id, report);
//! # Ok(())
//! # }
//! ```

mod auth;
mod error;
mod error_log;
mod mirror;
mod reconciler;
mod repository;

pub use auth::{AuthProvider, StaticAuthProvider};
pub use error::RepositoryError;
pub use error_log::{
    Quarantine, SyncErrorLog, SyncFailure, SyncOperation, DEFAULT_ERROR_LOG_CAPACITY,
    DEFAULT_MAX_PERMANENT_FAILURES,
};
pub use mirror::{MirrorOutcome, MirrorScope};
pub use reconciler::{Reconciler, SweepReport};
pub use repository::{
    AnimalRepository, HealthRecordRepository, MilkProductionRepository,
    ReproductionRecordRepository, SyncRepository,
};

use std::sync::Arc;

use crate::db::{LocalStore, PreferenceStore};
use crate::remote::RemoteStore;

/// Collaborators shared by every repository and the reconciler.
#[derive(Clone)]
pub struct SyncContext {
    pub remote: Arc<dyn RemoteStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub errors: Arc<SyncErrorLog>,
    pub quarantine: Arc<Quarantine>,
}

impl SyncContext {
    pub fn new(remote: Arc<dyn RemoteStore>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            remote,
            auth,
            errors: Arc::new(SyncErrorLog::default()),
            quarantine: Arc::new(Quarantine::default()),
        }
    }

    /// Replaces the quarantine with a fresh one using `threshold`.
    pub fn with_quarantine_threshold(mut self, threshold: usize) -> Self {
        self.quarantine = Arc::new(Quarantine::new(threshold));
        self
    }
}

/// One repository per record kind plus the preference store and the
/// reconciler, all sharing one local store and one [`SyncContext`].
pub struct Repositories {
    pub animals: AnimalRepository,
    pub health_records: HealthRecordRepository,
    pub milk_production: MilkProductionRepository,
    pub reproduction_records: ReproductionRecordRepository,
    pub preferences: PreferenceStore,
    pub reconciler: Reconciler,
}

impl Repositories {
    pub fn new(store: LocalStore, ctx: SyncContext) -> Self {
        Self {
            animals: AnimalRepository::open(store.clone(), ctx.clone()),
            health_records: HealthRecordRepository::open(store.clone(), ctx.clone()),
            milk_production: MilkProductionRepository::open(store.clone(), ctx.clone()),
            reproduction_records: ReproductionRecordRepository::open(store.clone(), ctx.clone()),
            preferences: PreferenceStore::new(store.clone()),
            reconciler: Reconciler::new(store, ctx),
        }
    }

    pub fn context(&self) -> &SyncContext {
        self.reconciler.context()
    }

    /// Waits for every background remote call started so far.
    pub async fn settle(&self) {
        self.animals.settle().await;
        self.health_records.settle().await;
        self.milk_production.settle().await;
        self.reproduction_records.settle().await;
    }

    /// Abandons background remote calls still in flight.
    pub async fn shutdown(&self) {
        self.animals.shutdown().await;
        self.health_records.shutdown().await;
        self.milk_production.shutdown().await;
        self.reproduction_records.shutdown().await;
    }
}
