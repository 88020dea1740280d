use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use super::mirror::{delete_remote, mirror_record, MirrorScope};
use super::{RepositoryError, SyncContext};
use crate::db::{
    AnimalDao, EntityDao, HealthRecordDao, LiveQuery, LocalStore, MilkProductionDao,
    ReproductionRecordDao,
};
use crate::models::{
    now, Animal, AnimalStatus, DailyProduction, HealthRecord, MilkProduction, Patch,
    ReproductionRecord, Species, SyncRecord,
};

/// Offline-first repository for one record kind.
///
/// Writes commit to the local store and return; the remote mirror runs in
/// the background and only ever flips the synchronized flag. Reads come
/// from the local store alone.
pub struct SyncRepository<D: EntityDao> {
    dao: D,
    ctx: SyncContext,
    mirrors: MirrorScope,
}

pub type AnimalRepository = SyncRepository<AnimalDao>;
pub type HealthRecordRepository = SyncRepository<HealthRecordDao>;
pub type MilkProductionRepository = SyncRepository<MilkProductionDao>;
pub type ReproductionRecordRepository = SyncRepository<ReproductionRecordDao>;

impl<D: EntityDao> SyncRepository<D> {
    pub fn new(dao: D, ctx: SyncContext) -> Self {
        Self {
            dao,
            ctx,
            mirrors: MirrorScope::new(),
        }
    }

    /// Entity-specific local queries.
    pub fn dao(&self) -> &D {
        &self.dao
    }

    /// Creates the record when its id is empty, otherwise updates it.
    /// Returns the record id once the local write has committed.
    pub async fn save(&self, mut record: D::Record) -> Result<String, RepositoryError> {
        let kind = <D::Record as SyncRecord>::KIND;
        let timestamp = now();

        let record = if record.meta().is_new() {
            let created_by = self.ctx.auth.current_user();
            let meta = record.meta_mut();
            meta.id = Uuid::new_v4().to_string();
            meta.created_by = created_by;
            meta.created_at = timestamp;
            meta.updated_at = timestamp;
            meta.synced = false;

            self.dao.insert(&record).await?;
            debug!(%kind, id = %record.id(), "Record created locally");
            record
        } else {
            let meta = record.meta_mut();
            meta.updated_at = timestamp;
            meta.synced = false;

            if self.dao.update(&record).await? == 0 {
                return Err(RepositoryError::NotFound {
                    kind,
                    id: record.id().to_string(),
                });
            }
            debug!(%kind, id = %record.id(), "Record updated locally");

            // Mirror the stored row so immutable creation fields come from
            // the local store rather than the caller.
            self.dao
                .find_by_id(record.id())
                .await?
                .ok_or_else(|| RepositoryError::NotFound {
                    kind,
                    id: record.id().to_string(),
                })?
        };

        let id = record.id().to_string();
        self.ctx.quarantine.reset(kind, &id);
        self.spawn_mirror(record).await;
        Ok(id)
    }

    /// Applies typed field changes to the stored record and saves it.
    pub async fn patch(
        &self,
        id: &str,
        changes: impl IntoIterator<Item = <D::Record as Patch>::Change>,
    ) -> Result<String, RepositoryError>
    where
        D::Record: Patch,
    {
        let mut record =
            self.dao
                .find_by_id(id)
                .await?
                .ok_or_else(|| RepositoryError::NotFound {
                    kind: <D::Record as SyncRecord>::KIND,
                    id: id.to_string(),
                })?;
        record.apply_all(changes);
        self.save(record).await
    }

    /// Deletes locally and reports whether a row was removed. The remote
    /// delete is attempted in the background and never retried.
    pub async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let kind = <D::Record as SyncRecord>::KIND;
        let deleted = self.dao.delete_by_id(id).await? > 0;
        debug!(%kind, id = %id, deleted, "Record deleted locally");
        self.ctx.quarantine.reset(kind, id);

        let ctx = self.ctx.clone();
        let id = id.to_string();
        self.mirrors
            .spawn(async move { delete_remote(&ctx, kind, &id).await })
            .await;
        Ok(deleted)
    }

    pub fn get_by_id(&self, id: &str) -> LiveQuery<Option<D::Record>> {
        self.dao.watch_by_id(id)
    }

    pub fn get_all(&self) -> LiveQuery<Vec<D::Record>> {
        self.dao.watch_all()
    }

    pub fn get_unsynced(&self) -> LiveQuery<Vec<D::Record>> {
        self.dao.watch_unsynced()
    }

    /// Waits until every background remote call has finished.
    pub async fn settle(&self) {
        self.mirrors.settle().await;
    }

    /// Abandons background remote calls still in flight.
    pub async fn shutdown(&self) {
        self.mirrors.shutdown().await;
    }

    async fn spawn_mirror(&self, record: D::Record) {
        let dao = self.dao.clone();
        let ctx = self.ctx.clone();
        self.mirrors
            .spawn(async move {
                if let Err(e) = mirror_record(&dao, &ctx, &record).await {
                    tracing::error!(id = %record.id(), "Failed to record mirror result: {}", e);
                }
            })
            .await;
    }
}

impl AnimalRepository {
    pub fn open(store: LocalStore, ctx: SyncContext) -> Self {
        Self::new(AnimalDao::new(store), ctx)
    }

    pub fn search(&self, query: &str) -> LiveQuery<Vec<Animal>> {
        self.dao.search(query)
    }

    pub fn get_by_status(&self, status: AnimalStatus) -> LiveQuery<Vec<Animal>> {
        self.dao.watch_by_status(status)
    }

    pub fn get_by_species(&self, species: &[Species]) -> LiveQuery<Vec<Animal>> {
        self.dao.watch_by_species_set(species)
    }

    pub fn get_in_selected_species(&self) -> LiveQuery<Vec<Animal>> {
        self.dao.watch_in_selected_species()
    }
}

impl HealthRecordRepository {
    pub fn open(store: LocalStore, ctx: SyncContext) -> Self {
        Self::new(HealthRecordDao::new(store), ctx)
    }

    pub fn get_by_animal(&self, animal_id: &str) -> LiveQuery<Vec<HealthRecord>> {
        self.dao.watch_by_animal(animal_id)
    }

    pub fn get_by_date_range(&self, from: NaiveDate, to: NaiveDate) -> LiveQuery<Vec<HealthRecord>> {
        self.dao.watch_by_date_range(from, to)
    }
}

impl MilkProductionRepository {
    pub fn open(store: LocalStore, ctx: SyncContext) -> Self {
        Self::new(MilkProductionDao::new(store), ctx)
    }

    pub fn get_by_animal(&self, animal_id: &str) -> LiveQuery<Vec<MilkProduction>> {
        self.dao.watch_by_animal(animal_id)
    }

    pub fn get_by_date_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LiveQuery<Vec<MilkProduction>> {
        self.dao.watch_by_date_range(from, to)
    }

    pub fn total_for_animal(&self, animal_id: &str, from: NaiveDate, to: NaiveDate) -> LiveQuery<f64> {
        self.dao.total_for_animal(animal_id, from, to)
    }

    pub fn daily_totals(&self, from: NaiveDate, to: NaiveDate) -> LiveQuery<Vec<DailyProduction>> {
        self.dao.daily_totals(from, to)
    }
}

impl ReproductionRecordRepository {
    pub fn open(store: LocalStore, ctx: SyncContext) -> Self {
        Self::new(ReproductionRecordDao::new(store), ctx)
    }

    pub fn get_by_animal(&self, animal_id: &str) -> LiveQuery<Vec<ReproductionRecord>> {
        self.dao.watch_by_animal(animal_id)
    }

    pub fn get_by_date_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LiveQuery<Vec<ReproductionRecord>> {
        self.dao.watch_by_date_range(from, to)
    }

    pub fn get_upcoming_births(&self, after: NaiveDate) -> LiveQuery<Vec<ReproductionRecord>> {
        self.dao.watch_upcoming_births(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{setup_store, TestStore};
    use crate::models::{AnimalChange, MilkingTime};
    use crate::remote::{MemoryRemoteStore, RemoteErrorKind, RemoteStore};
    use crate::sync::StaticAuthProvider;
    use std::sync::Arc;

    struct TestContext {
        remote: Arc<MemoryRemoteStore>,
        ctx: SyncContext,
        db: TestStore,
    }

    async fn setup() -> TestContext {
        let db = setup_store().await;
        let remote = Arc::new(MemoryRemoteStore::new());
        let ctx = SyncContext::new(remote.clone(), Arc::new(StaticAuthProvider::new("farmer")));
        TestContext { remote, ctx, db }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let t = setup().await;
        let repo = AnimalRepository::open(t.db.store.clone(), t.ctx.clone());
        t.remote.set_reachable(false);

        let id = repo
            .save(Animal::new("BOV-001", Species::Bovine).with_name("Bella"))
            .await
            .unwrap();
        repo.settle().await;

        let animal = repo.get_by_id(&id).current().await.unwrap().unwrap();
        assert!(!animal.meta.synced);
        assert_eq!(animal.meta.created_at, animal.meta.updated_at);
        assert_eq!(animal.meta.created_by, "farmer");
        assert_eq!(animal.name, "Bella");
    }

    #[tokio::test]
    async fn test_mirror_flips_flag_when_reachable() {
        let t = setup().await;
        let repo = AnimalRepository::open(t.db.store.clone(), t.ctx.clone());

        let id = repo.save(Animal::new("BOV-001", Species::Bovine)).await.unwrap();
        repo.settle().await;

        let animal = repo.get_by_id(&id).current().await.unwrap().unwrap();
        assert!(animal.meta.synced);
        let document = t.remote.document("animals", &id).unwrap();
        assert_eq!(document["identification"], "BOV-001");
        assert!(document.get("synced").is_none());
    }

    #[tokio::test]
    async fn test_live_subscriber_sees_flag_flip() {
        let t = setup().await;
        let repo = AnimalRepository::open(t.db.store.clone(), t.ctx.clone());
        t.remote.set_reachable(false);
        let id = repo.save(Animal::new("BOV-001", Species::Bovine)).await.unwrap();
        repo.settle().await;

        let mut live = repo.get_by_id(&id);
        assert!(!live.next().await.unwrap().unwrap().unwrap().meta.synced);

        t.remote.set_reachable(true);
        let animal = repo.get_by_id(&id).current().await.unwrap().unwrap();
        repo.save(animal).await.unwrap();

        loop {
            let animal = live.next().await.unwrap().unwrap().unwrap();
            if animal.meta.synced {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_update_resets_flag_and_keeps_creation_fields() {
        let t = setup().await;
        let repo = AnimalRepository::open(t.db.store.clone(), t.ctx.clone());
        let id = repo.save(Animal::new("BOV-001", Species::Bovine)).await.unwrap();
        repo.settle().await;
        let original = repo.get_by_id(&id).current().await.unwrap().unwrap();
        assert!(original.meta.synced);

        t.remote.set_reachable(false);
        let mut changed = original.clone();
        changed.name = "Luna".to_string();
        changed.meta.created_by = "intruder".to_string();
        repo.save(changed).await.unwrap();
        repo.settle().await;

        let stored = repo.get_by_id(&id).current().await.unwrap().unwrap();
        assert!(!stored.meta.synced);
        assert_eq!(stored.name, "Luna");
        assert_eq!(stored.meta.created_by, "farmer");
        assert_eq!(stored.meta.created_at, original.meta.created_at);
        assert!(stored.meta.updated_at >= original.meta.updated_at);
    }

    #[tokio::test]
    async fn test_update_of_unknown_id_is_not_found() {
        let t = setup().await;
        let repo = AnimalRepository::open(t.db.store.clone(), t.ctx.clone());

        let mut ghost = Animal::new("BOV-404", Species::Bovine);
        ghost.meta.id = "missing".to_string();
        let err = repo.save(ghost).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
        assert_eq!(t.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_local_failure_is_surfaced() {
        let t = setup().await;
        let repo = MilkProductionRepository::open(t.db.store.clone(), t.ctx.clone());

        let err = repo
            .save(MilkProduction::new("no-such-animal", date(2025, 5, 1), 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Local(_)));
        repo.settle().await;
        assert_eq!(t.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_is_swallowed_and_logged() {
        let t = setup().await;
        let repo = AnimalRepository::open(t.db.store.clone(), t.ctx.clone());
        t.remote.set_reachable(false);

        repo.save(Animal::new("BOV-001", Species::Bovine)).await.unwrap();
        repo.settle().await;

        let failures = t.ctx.errors.entries();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error.kind, RemoteErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_patch_applies_typed_changes() {
        let t = setup().await;
        let repo = AnimalRepository::open(t.db.store.clone(), t.ctx.clone());
        let id = repo.save(Animal::new("BOV-001", Species::Bovine)).await.unwrap();

        repo.patch(
            &id,
            [
                AnimalChange::Name("Bella".into()),
                AnimalChange::Status(AnimalStatus::Sold),
            ],
        )
        .await
        .unwrap();
        repo.settle().await;

        let animal = repo.get_by_id(&id).current().await.unwrap().unwrap();
        assert_eq!(animal.name, "Bella");
        assert_eq!(animal.status, AnimalStatus::Sold);
        let document = t.remote.document("animals", &id).unwrap();
        assert_eq!(document["status"], "sold");

        let err = repo
            .patch("missing", [AnimalChange::Name("x".into())])
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_is_local_first_and_remote_best_effort() {
        let t = setup().await;
        let repo = AnimalRepository::open(t.db.store.clone(), t.ctx.clone());
        let id = repo.save(Animal::new("BOV-001", Species::Bovine)).await.unwrap();
        repo.settle().await;
        assert!(t.remote.document("animals", &id).is_some());

        t.remote.set_reachable(false);
        assert!(repo.delete(&id).await.unwrap());
        repo.settle().await;

        assert!(repo.get_by_id(&id).current().await.unwrap().is_none());
        assert!(t.remote.document("animals", &id).is_some());
        assert!(!repo.delete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_remote_write_leaves_flag_unset() {
        let t = setup().await;
        let repo = MilkProductionRepository::open(t.db.store.clone(), t.ctx.clone());
        let animals = AnimalRepository::open(t.db.store.clone(), t.ctx.clone());
        let cow = animals.save(Animal::new("BOV-001", Species::Bovine)).await.unwrap();
        let id = repo
            .save(
                MilkProduction::new(&cow, date(2025, 5, 1), 10.0)
                    .with_milking_time(MilkingTime::Night),
            )
            .await
            .unwrap();
        repo.settle().await;

        // Another device wrote a newer version in the meantime.
        let mut newer = t.remote.document("milk_production", &id).unwrap();
        newer.insert(
            "updatedAt".to_string(),
            serde_json::json!("2999-01-01T00:00:00Z"),
        );
        t.remote.upsert("milk_production", &id, newer).await.unwrap();

        repo.patch(&id, [crate::models::MilkProductionChange::QuantityLitres(11.0)])
            .await
            .unwrap();
        repo.settle().await;

        let milk = repo.get_by_id(&id).current().await.unwrap().unwrap();
        assert!(!milk.meta.synced);
        let last = t.ctx.errors.entries().pop().unwrap();
        assert_eq!(last.error.kind, RemoteErrorKind::Stale);
    }

    #[tokio::test]
    async fn test_entity_filters_through_repository() {
        let t = setup().await;
        let animals = AnimalRepository::open(t.db.store.clone(), t.ctx.clone());
        let milk = MilkProductionRepository::open(t.db.store.clone(), t.ctx.clone());
        let cow = animals
            .save(Animal::new("BOV-001", Species::Bovine).with_name("Bella"))
            .await
            .unwrap();
        for (day, litres) in [(1, 10.0), (2, 12.0), (3, 8.0)] {
            milk.save(MilkProduction::new(&cow, date(2025, 5, day), litres))
                .await
                .unwrap();
        }

        assert_eq!(animals.search("ell").current().await.unwrap().len(), 1);
        assert_eq!(
            milk.total_for_animal(&cow, date(2025, 5, 1), date(2025, 5, 31))
                .current()
                .await
                .unwrap(),
            30.0
        );
        assert_eq!(milk.get_by_animal(&cow).current().await.unwrap().len(), 3);
    }

    struct SlowRemote {
        inner: MemoryRemoteStore,
        delay: std::time::Duration,
    }

    #[async_trait::async_trait]
    impl RemoteStore for SlowRemote {
        async fn upsert(
            &self,
            collection: &str,
            id: &str,
            document: crate::remote::Document,
        ) -> Result<(), crate::remote::RemoteError> {
            tokio::time::sleep(self.delay).await;
            self.inner.upsert(collection, id, document).await
        }

        async fn delete(&self, collection: &str, id: &str) -> Result<(), crate::remote::RemoteError> {
            self.inner.delete(collection, id).await
        }

        async fn get(
            &self,
            collection: &str,
            id: &str,
        ) -> Result<Option<crate::remote::Document>, crate::remote::RemoteError> {
            self.inner.get(collection, id).await
        }

        async fn query(
            &self,
            collection: &str,
            query: &crate::remote::RemoteQuery,
        ) -> Result<Vec<crate::remote::Document>, crate::remote::RemoteError> {
            self.inner.query(collection, query).await
        }
    }

    #[tokio::test]
    async fn test_save_returns_while_another_caller_settles() {
        let db = setup_store().await;
        let remote = Arc::new(SlowRemote {
            inner: MemoryRemoteStore::new(),
            delay: std::time::Duration::from_secs(2),
        });
        let ctx = SyncContext::new(remote, Arc::new(StaticAuthProvider::new("farmer")));
        let repo = Arc::new(AnimalRepository::open(db.store.clone(), ctx));

        repo.save(Animal::new("BOV-001", Species::Bovine)).await.unwrap();
        let settling = {
            let repo = repo.clone();
            tokio::spawn(async move { repo.settle().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        let second = repo.save(Animal::new("BOV-002", Species::Bovine)).await.unwrap();
        assert!(started.elapsed() < std::time::Duration::from_millis(500));
        assert!(repo.get_by_id(&second).current().await.unwrap().is_some());

        // Mirrors spawned during the wait are awaited too.
        settling.await.unwrap();
        assert!(repo.get_by_id(&second).current().await.unwrap().unwrap().meta.synced);
    }
}
