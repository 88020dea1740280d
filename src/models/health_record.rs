use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::record::{text_enum, EntityKind, Patch, RecordMeta, SyncRecord};

text_enum! {
    HealthRecordType("health record type") {
        Vaccination => "vaccination",
        Deworming => "deworming",
        Treatment => "treatment",
        Diagnosis => "diagnosis",
        Checkup => "checkup",
        Surgery => "surgery",
        Other => "other",
    }
}

/// A treatment, vaccine, diagnosis or other veterinary intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub animal_id: String,
    pub date: NaiveDate,
    pub record_type: HealthRecordType,
    pub description: String,
    /// Medicine or vaccine name.
    pub product: String,
    pub dose: String,
    /// Intramuscular, subcutaneous, oral, ...
    pub route: String,
    pub responsible: String,
    pub notes: String,
    pub next_treatment_date: Option<NaiveDate>,
}

impl HealthRecord {
    pub fn new(
        animal_id: impl Into<String>,
        date: NaiveDate,
        record_type: HealthRecordType,
    ) -> Self {
        Self {
            meta: RecordMeta::draft(),
            animal_id: animal_id.into(),
            date,
            record_type,
            description: String::new(),
            product: String::new(),
            dose: String::new(),
            route: String::new(),
            responsible: String::new(),
            notes: String::new(),
            next_treatment_date: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_product(mut self, product: impl Into<String>, dose: impl Into<String>) -> Self {
        self.product = product.into();
        self.dose = dose.into();
        self
    }

    pub fn with_next_treatment(mut self, date: NaiveDate) -> Self {
        self.next_treatment_date = Some(date);
        self
    }
}

impl SyncRecord for HealthRecord {
    const KIND: EntityKind = EntityKind::HealthRecord;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.animal_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HealthRecordChange {
    Date(NaiveDate),
    RecordType(HealthRecordType),
    Description(String),
    Product(String),
    Dose(String),
    Route(String),
    Responsible(String),
    Notes(String),
    NextTreatmentDate(Option<NaiveDate>),
}

impl Patch for HealthRecord {
    type Change = HealthRecordChange;

    fn apply(&mut self, change: HealthRecordChange) {
        match change {
            HealthRecordChange::Date(v) => self.date = v,
            HealthRecordChange::RecordType(v) => self.record_type = v,
            HealthRecordChange::Description(v) => self.description = v,
            HealthRecordChange::Product(v) => self.product = v,
            HealthRecordChange::Dose(v) => self.dose = v,
            HealthRecordChange::Route(v) => self.route = v,
            HealthRecordChange::Responsible(v) => self.responsible = v,
            HealthRecordChange::Notes(v) => self.notes = v,
            HealthRecordChange::NextTreatmentDate(v) => self.next_treatment_date = v,
        }
    }
}

impl fmt::Display for HealthRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {:<12}", self.date, self.record_type)?;
        if !self.product.is_empty() {
            write!(f, " {}", self.product)?;
            if !self.dose.is_empty() {
                write!(f, " ({})", self.dose)?;
            }
        }
        if !self.description.is_empty() {
            write!(f, " - {}", self.description)?;
        }
        if let Some(next) = self.next_treatment_date {
            write!(f, " [next: {}]", next)?;
        }
        Ok(())
    }
}
