use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;

use super::codec::{encode_date, encode_timestamp, RowDecoder};
use super::dao::{fetch_total, live_count, live_records, Bind, EntityDao, RowCodec};
use super::{LiveQuery, LocalStore, LocalStoreError, Table};
use crate::models::{DailyProduction, MilkProduction, MilkingTime, RecordMeta};

#[derive(sqlx::FromRow)]
pub struct MilkProductionRow {
    id: String,
    animal_id: String,
    date: String,
    milking_time: String,
    quantity_litres: f64,
    quality: String,
    fat_percent: Option<f64>,
    protein_percent: Option<f64>,
    notes: String,
    created_by: String,
    created_at: String,
    updated_at: String,
    synced: bool,
}

impl RowCodec for MilkProduction {
    const TABLE: Table = Table::MilkProduction;

    type Row = MilkProductionRow;

    fn from_row(row: MilkProductionRow) -> Result<Self, LocalStoreError> {
        let d = RowDecoder::new(Self::TABLE, &row.id);
        Ok(MilkProduction {
            animal_id: row.animal_id,
            date: d.date(&row.date)?,
            milking_time: d.label(&row.milking_time)?,
            quantity_litres: row.quantity_litres,
            quality: row.quality,
            fat_percent: row.fat_percent,
            protein_percent: row.protein_percent,
            notes: row.notes,
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
pub struct MilkProductionDao {
    store: LocalStore,
}

impl MilkProductionDao {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    fn live(&self, clause: &str, binds: Vec<Bind>) -> LiveQuery<Vec<MilkProduction>> {
        live_records(&self.store, &[Table::MilkProduction], clause, binds)
    }

    pub fn watch_by_animal(&self, animal_id: &str) -> LiveQuery<Vec<MilkProduction>> {
        self.live(
            "WHERE animal_id = ? ORDER BY date DESC, milking_time",
            vec![Bind::from(animal_id)],
        )
    }

    pub fn watch_by_date_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LiveQuery<Vec<MilkProduction>> {
        self.live(
            "WHERE date BETWEEN ? AND ? ORDER BY date DESC",
            vec![Bind::from(encode_date(&from)), Bind::from(encode_date(&to))],
        )
    }

    pub fn watch_by_milking_time(&self, milking_time: MilkingTime) -> LiveQuery<Vec<MilkProduction>> {
        self.live(
            "WHERE milking_time = ? ORDER BY date DESC",
            vec![Bind::from(milking_time.as_str())],
        )
    }

    pub fn watch_recent(&self, limit: i64) -> LiveQuery<Vec<MilkProduction>> {
        self.live("ORDER BY created_at DESC LIMIT ?", vec![Bind::from(limit)])
    }

    /// Litres produced by one animal within `[from, to]`; 0 when nothing
    /// was recorded.
    pub fn total_for_animal(
        &self,
        animal_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LiveQuery<f64> {
        let binds = vec![
            Bind::from(animal_id),
            Bind::from(encode_date(&from)),
            Bind::from(encode_date(&to)),
        ];
        self.store.live(&[Table::MilkProduction], move |pool| {
            let binds = binds.clone();
            async move {
                fetch_total(
                    &pool,
                    "SELECT TOTAL(quantity_litres) FROM milk_production \
                     WHERE animal_id = ? AND date BETWEEN ? AND ?",
                    &binds,
                )
                .await
            }
        })
    }

    /// Per-day herd totals within `[from, to]`, oldest day first. Days
    /// without records are absent.
    pub fn daily_totals(&self, from: NaiveDate, to: NaiveDate) -> LiveQuery<Vec<DailyProduction>> {
        let (from, to) = (encode_date(&from), encode_date(&to));
        self.store.live(&[Table::MilkProduction], move |pool| {
            fetch_daily_totals(pool, from.clone(), to.clone())
        })
    }

    pub fn count_by_milking_time(&self, milking_time: MilkingTime) -> LiveQuery<i64> {
        live_count(
            &self.store,
            &[Table::MilkProduction],
            "SELECT COUNT(*) FROM milk_production WHERE milking_time = ?".to_string(),
            vec![Bind::from(milking_time.as_str())],
        )
    }
}

async fn fetch_daily_totals(
    pool: SqlitePool,
    from: String,
    to: String,
) -> Result<Vec<DailyProduction>, LocalStoreError> {
    let rows: Vec<(String, f64)> = sqlx::query_as(
        "SELECT date, TOTAL(quantity_litres) FROM milk_production \
         WHERE date BETWEEN ? AND ? GROUP BY date ORDER BY date",
    )
    .bind(&from)
    .bind(&to)
    .fetch_all(&pool)
    .await?;

    let mut totals = Vec::with_capacity(rows.len());
    for (day, total_litres) in rows {
        let date = RowDecoder::new(Table::MilkProduction, &day).date(&day)?;
        totals.push(DailyProduction { date, total_litres });
    }
    Ok(totals)
}

#[async_trait]
impl EntityDao for MilkProductionDao {
    type Record = MilkProduction;

    fn store(&self) -> &LocalStore {
        &self.store
    }

    async fn insert(&self, milk: &MilkProduction) -> Result<(), LocalStoreError> {
        sqlx::query(
            r#"
            INSERT INTO milk_production (id, animal_id, date, milking_time, quantity_litres, quality,
                                         fat_percent, protein_percent, notes,
                                         created_by, created_at, updated_at, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&milk.meta.id)
        .bind(&milk.animal_id)
        .bind(encode_date(&milk.date))
        .bind(milk.milking_time.as_str())
        .bind(milk.quantity_litres)
        .bind(&milk.quality)
        .bind(milk.fat_percent)
        .bind(milk.protein_percent)
        .bind(&milk.notes)
        .bind(&milk.meta.created_by)
        .bind(encode_timestamp(&milk.meta.created_at))
        .bind(encode_timestamp(&milk.meta.updated_at))
        .bind(milk.meta.synced)
        .execute(self.store.pool())
        .await?;

        self.store.notify(&[Table::MilkProduction]);
        Ok(())
    }

    async fn update(&self, milk: &MilkProduction) -> Result<u64, LocalStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE milk_production
            SET animal_id = ?, date = ?, milking_time = ?, quantity_litres = ?, quality = ?,
                fat_percent = ?, protein_percent = ?, notes = ?, updated_at = ?, synced = ?
            WHERE id = ?
            "#,
        )
        .bind(&milk.animal_id)
        .bind(encode_date(&milk.date))
        .bind(milk.milking_time.as_str())
        .bind(milk.quantity_litres)
        .bind(&milk.quality)
        .bind(milk.fat_percent)
        .bind(milk.protein_percent)
        .bind(&milk.notes)
        .bind(encode_timestamp(&milk.meta.updated_at))
        .bind(milk.meta.synced)
        .bind(&milk.meta.id)
        .execute(self.store.pool())
        .await?;

        if result.rows_affected() > 0 {
            self.store.notify(&[Table::MilkProduction]);
        }
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::animal_dao::tests::saved;
    use crate::db::test_support::setup_store;
    use crate::db::AnimalDao;
    use crate::models::Species;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn milk(animal_id: &str, on: NaiveDate, litres: f64) -> MilkProduction {
        let mut milk = MilkProduction::new(animal_id, on, litres);
        milk.meta.id = Uuid::new_v4().to_string();
        milk.meta.created_by = "tester".to_string();
        milk
    }

    #[tokio::test]
    async fn test_total_follows_inserts_and_deletes() {
        let ctx = setup_store().await;
        let animals = AnimalDao::new(ctx.store.clone());
        let dao = MilkProductionDao::new(ctx.store.clone());
        let cow = saved("BOV-001", "Bella", Species::Bovine);
        animals.insert(&cow).await.unwrap();

        let mut total = dao.total_for_animal(&cow.meta.id, date(2025, 5, 1), date(2025, 5, 31));
        assert_eq!(total.next().await.unwrap().unwrap(), 0.0);

        let first = milk(&cow.meta.id, date(2025, 5, 1), 10.0);
        dao.insert(&first).await.unwrap();
        dao.insert(&milk(&cow.meta.id, date(2025, 5, 2), 12.0))
            .await
            .unwrap();
        dao.insert(&milk(&cow.meta.id, date(2025, 5, 3), 8.0))
            .await
            .unwrap();
        assert_eq!(total.next().await.unwrap().unwrap(), 30.0);

        dao.delete_by_id(&first.meta.id).await.unwrap();
        assert_eq!(total.next().await.unwrap().unwrap(), 20.0);
    }

    #[tokio::test]
    async fn test_daily_totals_group_by_day() {
        let ctx = setup_store().await;
        let animals = AnimalDao::new(ctx.store.clone());
        let dao = MilkProductionDao::new(ctx.store.clone());
        let a = saved("BOV-001", "Bella", Species::Bovine);
        let b = saved("BOV-002", "Luna", Species::Bovine);
        animals.insert(&a).await.unwrap();
        animals.insert(&b).await.unwrap();

        dao.insert(&milk(&a.meta.id, date(2025, 5, 1), 10.0)).await.unwrap();
        dao.insert(
            &milk(&a.meta.id, date(2025, 5, 1), 6.5).with_milking_time(MilkingTime::Afternoon),
        )
        .await
        .unwrap();
        dao.insert(&milk(&b.meta.id, date(2025, 5, 1), 9.0)).await.unwrap();
        dao.insert(&milk(&b.meta.id, date(2025, 5, 3), 11.0)).await.unwrap();
        dao.insert(&milk(&b.meta.id, date(2025, 6, 1), 99.0)).await.unwrap();

        let totals = dao
            .daily_totals(date(2025, 5, 1), date(2025, 5, 31))
            .current()
            .await
            .unwrap();
        assert_eq!(
            totals,
            vec![
                DailyProduction {
                    date: date(2025, 5, 1),
                    total_litres: 25.5
                },
                DailyProduction {
                    date: date(2025, 5, 3),
                    total_litres: 11.0
                },
            ]
        );

        assert_eq!(
            dao.count_by_milking_time(MilkingTime::Morning)
                .current()
                .await
                .unwrap(),
            4
        );
    }

    #[tokio::test]
    async fn test_animal_delete_cascades_and_notifies() {
        let ctx = setup_store().await;
        let animals = AnimalDao::new(ctx.store.clone());
        let dao = MilkProductionDao::new(ctx.store.clone());
        let cow = saved("BOV-001", "Bella", Species::Bovine);
        animals.insert(&cow).await.unwrap();
        dao.insert(&milk(&cow.meta.id, date(2025, 5, 1), 10.0))
            .await
            .unwrap();

        let mut live = dao.watch_by_animal(&cow.meta.id);
        assert_eq!(live.next().await.unwrap().unwrap().len(), 1);

        animals.delete_by_id(&cow.meta.id).await.unwrap();

        assert!(live.next().await.unwrap().unwrap().is_empty());
    }
}
