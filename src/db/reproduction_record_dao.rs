use async_trait::async_trait;
use chrono::NaiveDate;

use super::codec::{encode_date, encode_optional_date, encode_timestamp, RowDecoder};
use super::dao::{live_count, live_records, Bind, EntityDao, RowCodec};
use super::{LiveQuery, LocalStore, LocalStoreError, Table};
use crate::models::{RecordMeta, ReproductionRecord, ReproductiveEvent};

#[derive(sqlx::FromRow)]
pub struct ReproductionRecordRow {
    id: String,
    animal_id: String,
    date: String,
    event_type: String,
    sire_id: String,
    semen_type: String,
    inseminator: String,
    offspring_count: i64,
    offspring_ids: String,
    complications: String,
    diagnosis_result: Option<String>,
    diagnosis_method: String,
    gestation_days: Option<i64>,
    expected_birth_date: Option<String>,
    notes: String,
    created_by: String,
    created_at: String,
    updated_at: String,
    synced: bool,
}

impl RowCodec for ReproductionRecord {
    const TABLE: Table = Table::ReproductionRecords;

    type Row = ReproductionRecordRow;

    fn from_row(row: ReproductionRecordRow) -> Result<Self, LocalStoreError> {
        let d = RowDecoder::new(Self::TABLE, &row.id);
        Ok(ReproductionRecord {
            animal_id: row.animal_id,
            date: d.date(&row.date)?,
            event: d.label(&row.event_type)?,
            sire_id: row.sire_id,
            semen_type: row.semen_type,
            inseminator: row.inseminator,
            offspring_count: row.offspring_count,
            offspring_ids: d.string_list(&row.offspring_ids)?,
            complications: row.complications,
            diagnosis_result: d.optional_label(row.diagnosis_result.as_deref())?,
            diagnosis_method: row.diagnosis_method,
            gestation_days: row.gestation_days,
            expected_birth_date: d.optional_date(row.expected_birth_date.as_deref())?,
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

fn encode_offspring(ids: &[String]) -> String {
    serde_json::to_string(ids).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Clone)]
pub struct ReproductionRecordDao {
    store: LocalStore,
}

impl ReproductionRecordDao {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    fn live(&self, clause: &str, binds: Vec<Bind>) -> LiveQuery<Vec<ReproductionRecord>> {
        live_records(&self.store, &[Table::ReproductionRecords], clause, binds)
    }

    pub fn watch_by_animal(&self, animal_id: &str) -> LiveQuery<Vec<ReproductionRecord>> {
        self.live(
            "WHERE animal_id = ? ORDER BY date DESC",
            vec![Bind::from(animal_id)],
        )
    }

    pub fn watch_by_event(&self, event: ReproductiveEvent) -> LiveQuery<Vec<ReproductionRecord>> {
        self.live(
            "WHERE event_type = ? ORDER BY date DESC",
            vec![Bind::from(event.as_str())],
        )
    }

    pub fn watch_by_date_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LiveQuery<Vec<ReproductionRecord>> {
        self.live(
            "WHERE date BETWEEN ? AND ? ORDER BY date DESC",
            vec![Bind::from(encode_date(&from)), Bind::from(encode_date(&to))],
        )
    }

    pub fn watch_births_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LiveQuery<Vec<ReproductionRecord>> {
        self.live(
            "WHERE event_type = ? AND date BETWEEN ? AND ? ORDER BY date DESC",
            vec![
                Bind::from(ReproductiveEvent::Birth.as_str()),
                Bind::from(encode_date(&from)),
                Bind::from(encode_date(&to)),
            ],
        )
    }

    /// Pregnancy diagnoses expecting a birth after `after`, soonest first.
    pub fn watch_upcoming_births(&self, after: NaiveDate) -> LiveQuery<Vec<ReproductionRecord>> {
        self.live(
            "WHERE event_type = ? AND expected_birth_date IS NOT NULL AND expected_birth_date > ? \
             ORDER BY expected_birth_date ASC",
            vec![
                Bind::from(ReproductiveEvent::PregnancyDiagnosis.as_str()),
                Bind::from(encode_date(&after)),
            ],
        )
    }

    pub fn watch_births_by_mother(&self, mother_id: &str) -> LiveQuery<Vec<ReproductionRecord>> {
        self.live(
            "WHERE event_type = ? AND animal_id = ? ORDER BY date DESC",
            vec![
                Bind::from(ReproductiveEvent::Birth.as_str()),
                Bind::from(mother_id),
            ],
        )
    }

    pub fn watch_recent(&self, limit: i64) -> LiveQuery<Vec<ReproductionRecord>> {
        self.live("ORDER BY created_at DESC LIMIT ?", vec![Bind::from(limit)])
    }

    pub fn count_by_event(&self, event: ReproductiveEvent) -> LiveQuery<i64> {
        live_count(
            &self.store,
            &[Table::ReproductionRecords],
            "SELECT COUNT(*) FROM reproduction_records WHERE event_type = ?".to_string(),
            vec![Bind::from(event.as_str())],
        )
    }
}

#[async_trait]
impl EntityDao for ReproductionRecordDao {
    type Record = ReproductionRecord;

    fn store(&self) -> &LocalStore {
        &self.store
    }

    async fn insert(&self, record: &ReproductionRecord) -> Result<(), LocalStoreError> {
        sqlx::query(
            r#"
            INSERT INTO reproduction_records (id, animal_id, date, event_type, sire_id, semen_type,
                                              inseminator, offspring_count, offspring_ids, complications,
                                              diagnosis_result, diagnosis_method, gestation_days,
                                              expected_birth_date, notes,
                                              created_by, created_at, updated_at, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.meta.id)
        .bind(&record.animal_id)
        .bind(encode_date(&record.date))
        .bind(record.event.as_str())
        .bind(&record.sire_id)
        .bind(&record.semen_type)
        .bind(&record.inseminator)
        .bind(record.offspring_count)
        .bind(encode_offspring(&record.offspring_ids))
        .bind(&record.complications)
        .bind(record.diagnosis_result.map(|r| r.as_str()))
        .bind(&record.diagnosis_method)
        .bind(record.gestation_days)
        .bind(encode_optional_date(&record.expected_birth_date))
        .bind(&record.notes)
        .bind(&record.meta.created_by)
        .bind(encode_timestamp(&record.meta.created_at))
        .bind(encode_timestamp(&record.meta.updated_at))
        .bind(record.meta.synced)
        .execute(self.store.pool())
        .await?;

        self.store.notify(&[Table::ReproductionRecords]);
        Ok(())
    }

    async fn update(&self, record: &ReproductionRecord) -> Result<u64, LocalStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE reproduction_records
            SET animal_id = ?, date = ?, event_type = ?, sire_id = ?, semen_type = ?, inseminator = ?,
                offspring_count = ?, offspring_ids = ?, complications = ?, diagnosis_result = ?,
                diagnosis_method = ?, gestation_days = ?, expected_birth_date = ?, notes = ?,
                updated_at = ?, synced = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.animal_id)
        .bind(encode_date(&record.date))
        .bind(record.event.as_str())
        .bind(&record.sire_id)
        .bind(&record.semen_type)
        .bind(&record.inseminator)
        .bind(record.offspring_count)
        .bind(encode_offspring(&record.offspring_ids))
        .bind(&record.complications)
        .bind(record.diagnosis_result.map(|r| r.as_str()))
        .bind(&record.diagnosis_method)
        .bind(record.gestation_days)
        .bind(encode_optional_date(&record.expected_birth_date))
        .bind(&record.notes)
        .bind(encode_timestamp(&record.meta.updated_at))
        .bind(record.meta.synced)
        .bind(&record.meta.id)
        .execute(self.store.pool())
        .await?;

        if result.rows_affected() > 0 {
            self.store.notify(&[Table::ReproductionRecords]);
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
    use crate::models::{DiagnosisResult, Species};
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn with_id(mut record: ReproductionRecord) -> ReproductionRecord {
        record.meta.id = Uuid::new_v4().to_string();
        record.meta.created_by = "tester".to_string();
        record
    }

    #[tokio::test]
    async fn test_offspring_list_roundtrip() {
        let ctx = setup_store().await;
        let animals = AnimalDao::new(ctx.store.clone());
        let dao = ReproductionRecordDao::new(ctx.store.clone());
        let cow = saved("BOV-001", "Bella", Species::Bovine);
        animals.insert(&cow).await.unwrap();

        let birth = with_id(
            ReproductionRecord::new(&cow.meta.id, date(2025, 2, 10), ReproductiveEvent::Birth)
                .with_offspring(vec!["calf-1".into(), "calf-2".into()]),
        );
        dao.insert(&birth).await.unwrap();

        let found = dao.find_by_id(&birth.meta.id).await.unwrap().unwrap();
        assert_eq!(found, birth);
        assert_eq!(found.offspring_count, 2);
    }

    #[tokio::test]
    async fn test_upcoming_births_and_births_by_mother() {
        let ctx = setup_store().await;
        let animals = AnimalDao::new(ctx.store.clone());
        let dao = ReproductionRecordDao::new(ctx.store.clone());
        let bella = saved("BOV-001", "Bella", Species::Bovine);
        let luna = saved("BOV-002", "Luna", Species::Bovine);
        animals.insert(&bella).await.unwrap();
        animals.insert(&luna).await.unwrap();

        let later = with_id(ReproductionRecord::diagnosis(
            &bella.meta.id,
            date(2025, 3, 1),
            DiagnosisResult::Positive,
            Some(date(2025, 12, 1)),
        ));
        let sooner = with_id(ReproductionRecord::diagnosis(
            &luna.meta.id,
            date(2025, 3, 2),
            DiagnosisResult::Positive,
            Some(date(2025, 10, 1)),
        ));
        let already_due = with_id(ReproductionRecord::diagnosis(
            &luna.meta.id,
            date(2024, 3, 2),
            DiagnosisResult::Positive,
            Some(date(2024, 12, 1)),
        ));
        for r in [&later, &sooner, &already_due] {
            dao.insert(r).await.unwrap();
        }
        dao.insert(&with_id(ReproductionRecord::new(
            &luna.meta.id,
            date(2024, 12, 3),
            ReproductiveEvent::Birth,
        )))
        .await
        .unwrap();

        let upcoming = dao
            .watch_upcoming_births(date(2025, 6, 1))
            .current()
            .await
            .unwrap();
        let ids: Vec<&str> = upcoming.iter().map(|r| r.meta.id.as_str()).collect();
        assert_eq!(ids, vec![sooner.meta.id.as_str(), later.meta.id.as_str()]);

        let births = dao
            .watch_births_by_mother(&luna.meta.id)
            .current()
            .await
            .unwrap();
        assert_eq!(births.len(), 1);
        assert!(dao
            .watch_births_by_mother(&bella.meta.id)
            .current()
            .await
            .unwrap()
            .is_empty());

        let in_range = dao
            .watch_births_in_range(date(2024, 12, 1), date(2024, 12, 31))
            .current()
            .await
            .unwrap();
        assert_eq!(in_range.len(), 1);

        assert_eq!(
            dao.count_by_event(ReproductiveEvent::PregnancyDiagnosis)
                .current()
                .await
                .unwrap(),
            3
        );
    }
}
