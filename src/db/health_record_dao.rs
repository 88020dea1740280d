use async_trait::async_trait;
use chrono::NaiveDate;

use super::codec::{encode_date, encode_optional_date, encode_timestamp, RowDecoder};
use super::dao::{live_count, live_records, Bind, EntityDao, RowCodec};
use super::{LiveQuery, LocalStore, LocalStoreError, Table};
use crate::models::{HealthRecord, HealthRecordType, RecordMeta};

#[derive(sqlx::FromRow)]
pub struct HealthRecordRow {
    id: String,
    animal_id: String,
    date: String,
    record_type: String,
    description: String,
    product: String,
    dose: String,
    route: String,
    responsible: String,
    notes: String,
    next_treatment_date: Option<String>,
    created_by: String,
    created_at: String,
    updated_at: String,
    synced: bool,
}

impl RowCodec for HealthRecord {
    const TABLE: Table = Table::HealthRecords;

    type Row = HealthRecordRow;

    fn from_row(row: HealthRecordRow) -> Result<Self, LocalStoreError> {
        let d = RowDecoder::new(Self::TABLE, &row.id);
        Ok(HealthRecord {
            animal_id: row.animal_id,
            date: d.date(&row.date)?,
            record_type: d.label(&row.record_type)?,
            description: row.description,
            product: row.product,
            dose: row.dose,
            route: row.route,
            responsible: row.responsible,
            notes: row.notes,
            next_treatment_date: d.optional_date(row.next_treatment_date.as_deref())?,
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
pub struct HealthRecordDao {
    store: LocalStore,
}

impl HealthRecordDao {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    fn live(&self, clause: &str, binds: Vec<Bind>) -> LiveQuery<Vec<HealthRecord>> {
        live_records(&self.store, &[Table::HealthRecords], clause, binds)
    }

    pub fn watch_by_animal(&self, animal_id: &str) -> LiveQuery<Vec<HealthRecord>> {
        self.live(
            "WHERE animal_id = ? ORDER BY date DESC",
            vec![Bind::from(animal_id)],
        )
    }

    pub fn watch_by_type(&self, record_type: HealthRecordType) -> LiveQuery<Vec<HealthRecord>> {
        self.live(
            "WHERE record_type = ? ORDER BY date DESC",
            vec![Bind::from(record_type.as_str())],
        )
    }

    /// Records dated within `[from, to]`, newest first.
    pub fn watch_by_date_range(&self, from: NaiveDate, to: NaiveDate) -> LiveQuery<Vec<HealthRecord>> {
        self.live(
            "WHERE date BETWEEN ? AND ? ORDER BY date DESC",
            vec![Bind::from(encode_date(&from)), Bind::from(encode_date(&to))],
        )
    }

    /// Records with a follow-up scheduled after `after`, soonest first.
    pub fn watch_pending_follow_ups(&self, after: NaiveDate) -> LiveQuery<Vec<HealthRecord>> {
        self.live(
            "WHERE next_treatment_date IS NOT NULL AND next_treatment_date > ? \
             ORDER BY next_treatment_date ASC",
            vec![Bind::from(encode_date(&after))],
        )
    }

    pub fn watch_recent(&self, limit: i64) -> LiveQuery<Vec<HealthRecord>> {
        self.live("ORDER BY created_at DESC LIMIT ?", vec![Bind::from(limit)])
    }

    pub fn count_by_type(&self, record_type: HealthRecordType) -> LiveQuery<i64> {
        live_count(
            &self.store,
            &[Table::HealthRecords],
            "SELECT COUNT(*) FROM health_records WHERE record_type = ?".to_string(),
            vec![Bind::from(record_type.as_str())],
        )
    }
}

#[async_trait]
impl EntityDao for HealthRecordDao {
    type Record = HealthRecord;

    fn store(&self) -> &LocalStore {
        &self.store
    }

    async fn insert(&self, record: &HealthRecord) -> Result<(), LocalStoreError> {
        sqlx::query(
            r#"
            INSERT INTO health_records (id, animal_id, date, record_type, description, product, dose,
                                        route, responsible, notes, next_treatment_date,
                                        created_by, created_at, updated_at, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.meta.id)
        .bind(&record.animal_id)
        .bind(encode_date(&record.date))
        .bind(record.record_type.as_str())
        .bind(&record.description)
        .bind(&record.product)
        .bind(&record.dose)
        .bind(&record.route)
        .bind(&record.responsible)
        .bind(&record.notes)
        .bind(encode_optional_date(&record.next_treatment_date))
        .bind(&record.meta.created_by)
        .bind(encode_timestamp(&record.meta.created_at))
        .bind(encode_timestamp(&record.meta.updated_at))
        .bind(record.meta.synced)
        .execute(self.store.pool())
        .await?;

        self.store.notify(&[Table::HealthRecords]);
        Ok(())
    }

    async fn update(&self, record: &HealthRecord) -> Result<u64, LocalStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE health_records
            SET animal_id = ?, date = ?, record_type = ?, description = ?, product = ?, dose = ?,
                route = ?, responsible = ?, notes = ?, next_treatment_date = ?,
                updated_at = ?, synced = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.animal_id)
        .bind(encode_date(&record.date))
        .bind(record.record_type.as_str())
        .bind(&record.description)
        .bind(&record.product)
        .bind(&record.dose)
        .bind(&record.route)
        .bind(&record.responsible)
        .bind(&record.notes)
        .bind(encode_optional_date(&record.next_treatment_date))
        .bind(encode_timestamp(&record.meta.updated_at))
        .bind(record.meta.synced)
        .bind(&record.meta.id)
        .execute(self.store.pool())
        .await?;

        if result.rows_affected() > 0 {
            self.store.notify(&[Table::HealthRecords]);
        }
        Ok(result.rows_affected())
    }
}
