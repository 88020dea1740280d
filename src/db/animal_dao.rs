use async_trait::async_trait;
use sqlx::SqlitePool;

use super::codec::{encode_optional_date, encode_timestamp, escape_like, RowDecoder};
use super::dao::{
    fetch_records, live_count, live_records, select_sql, Bind, EntityDao, RowCodec,
};
use super::preferences::read_selected_species;
use super::{LiveQuery, LocalStore, LocalStoreError, Table};
use crate::models::{Animal, AnimalStatus, RecordMeta, Species};

#[derive(sqlx::FromRow)]
pub struct AnimalRow {
    id: String,
    identification: String,
    name: String,
    species: String,
    breed: String,
    sex: Option<String>,
    birth_date: Option<String>,
    weight_kg: f64,
    color: String,
    origin: String,
    mother_id: String,
    father_id: String,
    acquisition_date: Option<String>,
    acquisition_price: f64,
    status: String,
    created_by: String,
    created_at: String,
    updated_at: String,
    synced: bool,
}

impl RowCodec for Animal {
    const TABLE: Table = Table::Animals;

    type Row = AnimalRow;

    fn from_row(row: AnimalRow) -> Result<Self, LocalStoreError> {
        let d = RowDecoder::new(Self::TABLE, &row.id);
        Ok(Animal {
            identification: row.identification,
            name: row.name,
            species: d.label(&row.species)?,
            breed: row.breed,
            sex: d.optional_label(row.sex.as_deref())?,
            birth_date: d.optional_date(row.birth_date.as_deref())?,
            weight_kg: row.weight_kg,
            color: row.color,
            origin: row.origin,
            mother_id: row.mother_id,
            father_id: row.father_id,
            acquisition_date: d.optional_date(row.acquisition_date.as_deref())?,
            acquisition_price: row.acquisition_price,
            status: d.label(&row.status)?,
            meta: RecordMeta {
                created_by: row.created_by,
                created_at: d.timestamp(&row.created_at)?,
                updated_at: d.timestamp(&row.updated_at)?,
                synced: row.synced,
                id: row.id,
            },
        })
    }
}

#[derive(Clone)]
pub struct AnimalDao {
    store: LocalStore,
}

impl AnimalDao {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    pub fn watch_by_status(&self, status: AnimalStatus) -> LiveQuery<Vec<Animal>> {
        live_records(
            &self.store,
            &[Table::Animals],
            "WHERE status = ? ORDER BY updated_at DESC",
            vec![Bind::from(status.as_str())],
        )
    }

    pub fn watch_by_species(&self, species: Species) -> LiveQuery<Vec<Animal>> {
        self.watch_by_species_set(&[species])
    }

    /// Animals whose species is in `species`. An empty set means no filter.
    pub fn watch_by_species_set(&self, species: &[Species]) -> LiveQuery<Vec<Animal>> {
        if species.is_empty() {
            return self.watch_all();
        }
        let placeholders = vec!["?"; species.len()].join(", ");
        let clause = format!(
            "WHERE species IN ({}) ORDER BY updated_at DESC",
            placeholders
        );
        let binds = species.iter().map(|s| Bind::from(s.as_str())).collect();
        live_records(&self.store, &[Table::Animals], &clause, binds)
    }

    /// Animals in the species the user selected, or every animal when the
    /// selection is empty. Re-runs when either the herd or the selection
    /// changes.
    pub fn watch_in_selected_species(&self) -> LiveQuery<Vec<Animal>> {
        self.store
            .live(&[Table::Animals, Table::Preferences], fetch_in_selected_species)
    }

    /// Case-insensitive substring match on identification or name.
    pub fn search(&self, query: &str) -> LiveQuery<Vec<Animal>> {
        let pattern = escape_like(query);
        live_records(
            &self.store,
            &[Table::Animals],
            "WHERE LOWER(identification) LIKE '%' || LOWER(?) || '%' ESCAPE '\\' \
             OR LOWER(name) LIKE '%' || LOWER(?) || '%' ESCAPE '\\' \
             ORDER BY identification",
            vec![Bind::from(pattern.clone()), Bind::from(pattern)],
        )
    }

    pub fn watch_recent(&self, limit: i64) -> LiveQuery<Vec<Animal>> {
        live_records(
            &self.store,
            &[Table::Animals],
            "ORDER BY created_at DESC LIMIT ?",
            vec![Bind::from(limit)],
        )
    }

    pub fn count_by_species(&self, species: Species) -> LiveQuery<i64> {
        live_count(
            &self.store,
            &[Table::Animals],
            "SELECT COUNT(*) FROM animals WHERE species = ?".to_string(),
            vec![Bind::from(species.as_str())],
        )
    }

    pub fn count_by_status(&self, status: AnimalStatus) -> LiveQuery<i64> {
        live_count(
            &self.store,
            &[Table::Animals],
            "SELECT COUNT(*) FROM animals WHERE status = ?".to_string(),
            vec![Bind::from(status.as_str())],
        )
    }

    /// Head count per species, largest group first.
    pub fn counts_by_species(&self) -> LiveQuery<Vec<(Species, i64)>> {
        self.store.live(&[Table::Animals], fetch_species_counts)
    }
}

async fn fetch_in_selected_species(pool: SqlitePool) -> Result<Vec<Animal>, LocalStoreError> {
    let species = read_selected_species(&pool).await?;
    let (clause, binds) = if species.is_empty() {
        ("ORDER BY updated_at DESC".to_string(), Vec::new())
    } else {
        let placeholders = vec!["?"; species.len()].join(", ");
        (
            format!("WHERE species IN ({}) ORDER BY updated_at DESC", placeholders),
            species.iter().map(|s| Bind::from(s.as_str())).collect(),
        )
    };
    fetch_records(&pool, &select_sql::<Animal>(&clause), &binds).await
}

async fn fetch_species_counts(pool: SqlitePool) -> Result<Vec<(Species, i64)>, LocalStoreError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT species, COUNT(*) AS n FROM animals GROUP BY species ORDER BY n DESC, species",
    )
    .fetch_all(&pool)
    .await?;

    let mut counts = Vec::with_capacity(rows.len());
    for (label, count) in rows {
        let species = RowDecoder::new(Table::Animals, &label).label(&label)?;
        counts.push((species, count));
    }
    Ok(counts)
}

#[async_trait]
impl EntityDao for AnimalDao {
    type Record = Animal;

    fn store(&self) -> &LocalStore {
        &self.store
    }

    async fn insert(&self, animal: &Animal) -> Result<(), LocalStoreError> {
        sqlx::query(
            r#"
            INSERT INTO animals (id, identification, name, species, breed, sex, birth_date, weight_kg,
                                 color, origin, mother_id, father_id, acquisition_date, acquisition_price,
                                 status, created_by, created_at, updated_at, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&animal.meta.id)
        .bind(&animal.identification)
        .bind(&animal.name)
        .bind(animal.species.as_str())
        .bind(&animal.breed)
        .bind(animal.sex.map(|s| s.as_str()))
        .bind(encode_optional_date(&animal.birth_date))
        .bind(animal.weight_kg)
        .bind(&animal.color)
        .bind(&animal.origin)
        .bind(&animal.mother_id)
        .bind(&animal.father_id)
        .bind(encode_optional_date(&animal.acquisition_date))
        .bind(animal.acquisition_price)
        .bind(animal.status.as_str())
        .bind(&animal.meta.created_by)
        .bind(encode_timestamp(&animal.meta.created_at))
        .bind(encode_timestamp(&animal.meta.updated_at))
        .bind(animal.meta.synced)
        .execute(self.store.pool())
        .await?;

        self.store.notify(&[Table::Animals]);
        Ok(())
    }

    async fn update(&self, animal: &Animal) -> Result<u64, LocalStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE animals
            SET identification = ?, name = ?, species = ?, breed = ?, sex = ?, birth_date = ?,
                weight_kg = ?, color = ?, origin = ?, mother_id = ?, father_id = ?,
                acquisition_date = ?, acquisition_price = ?, status = ?, updated_at = ?, synced = ?
            WHERE id = ?
            "#,
        )
        .bind(&animal.identification)
        .bind(&animal.name)
        .bind(animal.species.as_str())
        .bind(&animal.breed)
        .bind(animal.sex.map(|s| s.as_str()))
        .bind(encode_optional_date(&animal.birth_date))
        .bind(animal.weight_kg)
        .bind(&animal.color)
        .bind(&animal.origin)
        .bind(&animal.mother_id)
        .bind(&animal.father_id)
        .bind(encode_optional_date(&animal.acquisition_date))
        .bind(animal.acquisition_price)
        .bind(animal.status.as_str())
        .bind(encode_timestamp(&animal.meta.updated_at))
        .bind(animal.meta.synced)
        .bind(&animal.meta.id)
        .execute(self.store.pool())
        .await?;

        if result.rows_affected() > 0 {
            self.store.notify(&[Table::Animals]);
        }
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::test_support::setup_store;
    use crate::models::now;
    use chrono::Duration;
    use uuid::Uuid;

    pub(crate) fn saved(identification: &str, name: &str, species: Species) -> Animal {
        let mut animal = Animal::new(identification, species).with_name(name);
        animal.meta.id = Uuid::new_v4().to_string();
        animal.meta.created_by = "tester".to_string();
        animal
    }

    #[tokio::test]
    async fn test_insert_and_find_roundtrip() {
        let ctx = setup_store().await;
        let dao = AnimalDao::new(ctx.store.clone());

        let animal = saved("BOV-001", "Bella", Species::Bovine)
            .with_birth_date(chrono::NaiveDate::from_ymd_opt(2021, 4, 3).unwrap())
            .with_weight(412.5);
        dao.insert(&animal).await.unwrap();

        let found = dao.find_by_id(&animal.meta.id).await.unwrap().unwrap();
        assert_eq!(found, animal);
    }

    #[tokio::test]
    async fn test_update_missing_row_affects_nothing() {
        let ctx = setup_store().await;
        let dao = AnimalDao::new(ctx.store.clone());

        let animal = saved("BOV-001", "Bella", Species::Bovine);
        assert_eq!(dao.update(&animal).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_keeps_creation_fields() {
        let ctx = setup_store().await;
        let dao = AnimalDao::new(ctx.store.clone());
        let animal = saved("BOV-001", "Bella", Species::Bovine);
        dao.insert(&animal).await.unwrap();

        let mut changed = animal.clone();
        changed.name = "Luna".to_string();
        changed.meta.created_by = "someone-else".to_string();
        changed.meta.updated_at = now() + Duration::seconds(5);
        assert_eq!(dao.update(&changed).await.unwrap(), 1);

        let found = dao.find_by_id(&animal.meta.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Luna");
        assert_eq!(found.meta.created_by, "tester");
        assert_eq!(found.meta.created_at, animal.meta.created_at);
        assert_eq!(found.meta.updated_at, changed.meta.updated_at);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_over_both_fields() {
        let ctx = setup_store().await;
        let dao = AnimalDao::new(ctx.store.clone());
        dao.insert(&saved("BOV-001", "Bella", Species::Bovine))
            .await
            .unwrap();

        assert_eq!(dao.search("bov").current().await.unwrap().len(), 1);
        assert_eq!(dao.search("ELL").current().await.unwrap().len(), 1);
        assert!(dao.search("xyz").current().await.unwrap().is_empty());
        assert!(dao.search("%").current().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_keeps_surrounding_spaces() {
        let ctx = setup_store().await;
        let dao = AnimalDao::new(ctx.store.clone());
        dao.insert(&saved("BOV-001", "Bella", Species::Bovine))
            .await
            .unwrap();
        dao.insert(&saved("BOV-002", "Bella Vista", Species::Bovine))
            .await
            .unwrap();

        let found = dao.search("bella ").current().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identification, "BOV-002");
        assert_eq!(dao.search("").current().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_species_set_filter() {
        let ctx = setup_store().await;
        let dao = AnimalDao::new(ctx.store.clone());
        dao.insert(&saved("BOV-001", "Bella", Species::Bovine))
            .await
            .unwrap();
        dao.insert(&saved("OV-001", "Dolly", Species::Ovine))
            .await
            .unwrap();
        dao.insert(&saved("CAP-001", "Blanca", Species::Caprine))
            .await
            .unwrap();

        let some = dao
            .watch_by_species_set(&[Species::Bovine, Species::Ovine])
            .current()
            .await
            .unwrap();
        assert_eq!(some.len(), 2);
        assert!(some.iter().all(|a| a.species != Species::Caprine));

        let all = dao.watch_by_species_set(&[]).current().await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_selected_species_follows_preferences() {
        let ctx = setup_store().await;
        let dao = AnimalDao::new(ctx.store.clone());
        let prefs = crate::db::PreferenceStore::new(ctx.store.clone());
        dao.insert(&saved("BOV-001", "Bella", Species::Bovine))
            .await
            .unwrap();
        dao.insert(&saved("OV-001", "Dolly", Species::Ovine))
            .await
            .unwrap();

        let mut live = dao.watch_in_selected_species();
        assert_eq!(live.next().await.unwrap().unwrap().len(), 2);

        prefs.save_selected_species(&[Species::Ovine]).await.unwrap();
        let narrowed = live.next().await.unwrap().unwrap();
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].identification, "OV-001");
    }

    #[tokio::test]
    async fn test_counts() {
        let ctx = setup_store().await;
        let dao = AnimalDao::new(ctx.store.clone());
        dao.insert(&saved("BOV-001", "", Species::Bovine)).await.unwrap();
        dao.insert(&saved("BOV-002", "", Species::Bovine)).await.unwrap();
        dao.insert(&saved("OV-001", "", Species::Ovine).with_status(AnimalStatus::Sold))
            .await
            .unwrap();

        assert_eq!(dao.count_by_species(Species::Bovine).current().await.unwrap(), 2);
        assert_eq!(dao.count_by_status(AnimalStatus::Sold).current().await.unwrap(), 1);
        assert_eq!(
            dao.counts_by_species().current().await.unwrap(),
            vec![(Species::Bovine, 2), (Species::Ovine, 1)]
        );
    }

    #[tokio::test]
    async fn test_watch_all_reemits_on_insert() {
        let ctx = setup_store().await;
        let dao = AnimalDao::new(ctx.store.clone());
        let mut live = dao.watch_all();
        assert!(live.next().await.unwrap().unwrap().is_empty());

        dao.insert(&saved("BOV-001", "Bella", Species::Bovine))
            .await
            .unwrap();

        assert_eq!(live.next().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_synced_in_one_statement() {
        let ctx = setup_store().await;
        let dao = AnimalDao::new(ctx.store.clone());
        let a = saved("BOV-001", "", Species::Bovine);
        let b = saved("BOV-002", "", Species::Bovine);
        dao.insert(&a).await.unwrap();
        dao.insert(&b).await.unwrap();
        assert_eq!(dao.unsynced().await.unwrap().len(), 2);

        let affected = dao
            .mark_synced(&[a.meta.id.clone(), b.meta.id.clone()])
            .await
            .unwrap();
        assert_eq!(affected, 2);
        assert!(dao.watch_unsynced().current().await.unwrap().is_empty());
        assert_eq!(dao.mark_synced(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_synced_if_current_rejects_newer_row() {
        let ctx = setup_store().await;
        let dao = AnimalDao::new(ctx.store.clone());
        let animal = saved("BOV-001", "", Species::Bovine);
        dao.insert(&animal).await.unwrap();

        let mut newer = animal.clone();
        newer.meta.updated_at = animal.meta.updated_at + Duration::seconds(1);
        dao.update(&newer).await.unwrap();

        let flipped = dao
            .mark_synced_if_current(&animal.meta.id, &animal.meta.updated_at)
            .await
            .unwrap();
        assert!(!flipped);
        assert_eq!(dao.count_unsynced().await.unwrap(), 1);

        let flipped = dao
            .mark_synced_if_current(&animal.meta.id, &newer.meta.updated_at)
            .await
            .unwrap();
        assert!(flipped);
        assert_eq!(dao.count_unsynced().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_by_id() {
        let ctx = setup_store().await;
        let dao = AnimalDao::new(ctx.store.clone());
        let animal = saved("BOV-001", "", Species::Bovine);
        dao.insert(&animal).await.unwrap();

        assert_eq!(dao.delete_by_id(&animal.meta.id).await.unwrap(), 1);
        assert_eq!(dao.delete_by_id(&animal.meta.id).await.unwrap(), 0);
        assert!(dao.watch_by_id(&animal.meta.id).current().await.unwrap().is_none());
    }
}
