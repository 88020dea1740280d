use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::record::{text_enum, EntityKind, Patch, RecordMeta, SyncRecord};

text_enum! {
    ReproductiveEvent("reproductive event") {
        Heat => "heat",
        Mating => "mating",
        Insemination => "insemination",
        PregnancyDiagnosis => "pregnancy_diagnosis",
        Birth => "birth",
        Abortion => "abortion",
        Other => "other",
    }
}

text_enum! {
    DiagnosisResult("diagnosis result") {
        Positive => "positive",
        Negative => "negative",
        Pending => "pending",
    }
}

/// A heat, service, diagnosis or birth event, usually recorded on the dam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReproductionRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub animal_id: String,
    pub date: NaiveDate,
    pub event: ReproductiveEvent,
    /// Sire for natural mating.
    pub sire_id: String,
    pub semen_type: String,
    pub inseminator: String,
    pub offspring_count: i64,
    pub offspring_ids: Vec<String>,
    pub complications: String,
    pub diagnosis_result: Option<DiagnosisResult>,
    pub diagnosis_method: String,
    pub gestation_days: Option<i64>,
    pub expected_birth_date: Option<NaiveDate>,
    pub notes: String,
}

impl ReproductionRecord {
    pub fn new(animal_id: impl Into<String>, date: NaiveDate, event: ReproductiveEvent) -> Self {
        Self {
            meta: RecordMeta::draft(),
            animal_id: animal_id.into(),
            date,
            event,
            sire_id: String::new(),
            semen_type: String::new(),
            inseminator: String::new(),
            offspring_count: 0,
            offspring_ids: Vec::new(),
            complications: String::new(),
            diagnosis_result: None,
            diagnosis_method: String::new(),
            gestation_days: None,
            expected_birth_date: None,
            notes: String::new(),
        }
    }

    /// A pregnancy diagnosis with its outcome and projected birth date.
    pub fn diagnosis(
        animal_id: impl Into<String>,
        date: NaiveDate,
        result: DiagnosisResult,
        expected_birth_date: Option<NaiveDate>,
    ) -> Self {
        let mut record = Self::new(animal_id, date, ReproductiveEvent::PregnancyDiagnosis);
        record.diagnosis_result = Some(result);
        record.expected_birth_date = expected_birth_date;
        record
    }

    pub fn with_offspring(mut self, offspring_ids: Vec<String>) -> Self {
        self.offspring_count = offspring_ids.len() as i64;
        self.offspring_ids = offspring_ids;
        self
    }

    pub fn with_sire(mut self, sire_id: impl Into<String>) -> Self {
        self.sire_id = sire_id.into();
        self
    }
}

impl SyncRecord for ReproductionRecord {
    const KIND: EntityKind = EntityKind::ReproductionRecord;

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
pub enum ReproductionRecordChange {
    Date(NaiveDate),
    Event(ReproductiveEvent),
    SireId(String),
    SemenType(String),
    Inseminator(String),
    Offspring(Vec<String>),
    Complications(String),
    DiagnosisResult(Option<DiagnosisResult>),
    DiagnosisMethod(String),
    GestationDays(Option<i64>),
    ExpectedBirthDate(Option<NaiveDate>),
    Notes(String),
}

impl Patch for ReproductionRecord {
    type Change = ReproductionRecordChange;

    fn apply(&mut self, change: ReproductionRecordChange) {
        match change {
            ReproductionRecordChange::Date(v) => self.date = v,
            ReproductionRecordChange::Event(v) => self.event = v,
            ReproductionRecordChange::SireId(v) => self.sire_id = v,
            ReproductionRecordChange::SemenType(v) => self.semen_type = v,
            ReproductionRecordChange::Inseminator(v) => self.inseminator = v,
            ReproductionRecordChange::Offspring(ids) => {
                self.offspring_count = ids.len() as i64;
                self.offspring_ids = ids;
            }
            ReproductionRecordChange::Complications(v) => self.complications = v,
            ReproductionRecordChange::DiagnosisResult(v) => self.diagnosis_result = v,
            ReproductionRecordChange::DiagnosisMethod(v) => self.diagnosis_method = v,
            ReproductionRecordChange::GestationDays(v) => self.gestation_days = v,
            ReproductionRecordChange::ExpectedBirthDate(v) => self.expected_birth_date = v,
            ReproductionRecordChange::Notes(v) => self.notes = v,
        }
    }
}

impl fmt::Display for ReproductionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {}", self.date, self.event)?;
        if let Some(result) = self.diagnosis_result {
            write!(f, " ({})", result)?;
        }
        if let Some(expected) = self.expected_birth_date {
            write!(f, " expected birth {}", expected)?;
        }
        if self.offspring_count > 0 {
            write!(f, " offspring: {}", self.offspring_count)?;
        }
        Ok(())
    }
}
