use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::record::{text_enum, EntityKind, Patch, RecordMeta, SyncRecord};

text_enum! {
    /// Livestock species; also the category the user selects to narrow lists.
    Species("species") {
        Bovine => "bovine",
        Ovine => "ovine",
        Caprine => "caprine",
        Porcine => "porcine",
        Equine => "equine",
        Avian => "avian",
        Other => "other",
    }
}

text_enum! {
    Sex("sex") {
        Male => "male",
        Female => "female",
    }
}

text_enum! {
    /// Where the animal stands in the herd.
    AnimalStatus("animal status") {
        Active => "active",
        Sold => "sold",
        Deceased => "deceased",
        Slaughtered => "slaughtered",
        Transferred => "transferred",
        Other => "other",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Animal {
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Official tag or ear number.
    pub identification: String,
    pub name: String,
    pub species: Species,
    pub breed: String,
    pub sex: Option<Sex>,
    pub birth_date: Option<NaiveDate>,
    pub weight_kg: f64,
    pub color: String,
    /// Born on the farm, purchased, ...
    pub origin: String,
    pub mother_id: String,
    pub father_id: String,
    pub acquisition_date: Option<NaiveDate>,
    pub acquisition_price: f64,
    pub status: AnimalStatus,
}

impl Animal {
    pub fn new(identification: impl Into<String>, species: Species) -> Self {
        Self {
            meta: RecordMeta::draft(),
            identification: identification.into(),
            name: String::new(),
            species,
            breed: String::new(),
            sex: None,
            birth_date: None,
            weight_kg: 0.0,
            color: String::new(),
            origin: String::new(),
            mother_id: String::new(),
            father_id: String::new(),
            acquisition_date: None,
            acquisition_price: 0.0,
            status: AnimalStatus::Active,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_breed(mut self, breed: impl Into<String>) -> Self {
        self.breed = breed.into();
        self
    }

    pub fn with_sex(mut self, sex: Sex) -> Self {
        self.sex = Some(sex);
        self
    }

    pub fn with_birth_date(mut self, date: NaiveDate) -> Self {
        self.birth_date = Some(date);
        self
    }

    pub fn with_weight(mut self, weight_kg: f64) -> Self {
        self.weight_kg = weight_kg;
        self
    }

    pub fn with_status(mut self, status: AnimalStatus) -> Self {
        self.status = status;
        self
    }
}

impl SyncRecord for Animal {
    const KIND: EntityKind = EntityKind::Animal;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

/// A single field assignment on an [`Animal`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnimalChange {
    Identification(String),
    Name(String),
    Species(Species),
    Breed(String),
    Sex(Option<Sex>),
    BirthDate(Option<NaiveDate>),
    WeightKg(f64),
    Color(String),
    Origin(String),
    MotherId(String),
    FatherId(String),
    AcquisitionDate(Option<NaiveDate>),
    AcquisitionPrice(f64),
    Status(AnimalStatus),
}

impl Patch for Animal {
    type Change = AnimalChange;

    fn apply(&mut self, change: AnimalChange) {
        match change {
            AnimalChange::Identification(v) => self.identification = v,
            AnimalChange::Name(v) => self.name = v,
            AnimalChange::Species(v) => self.species = v,
            AnimalChange::Breed(v) => self.breed = v,
            AnimalChange::Sex(v) => self.sex = v,
            AnimalChange::BirthDate(v) => self.birth_date = v,
            AnimalChange::WeightKg(v) => self.weight_kg = v,
            AnimalChange::Color(v) => self.color = v,
            AnimalChange::Origin(v) => self.origin = v,
            AnimalChange::MotherId(v) => self.mother_id = v,
            AnimalChange::FatherId(v) => self.father_id = v,
            AnimalChange::AcquisitionDate(v) => self.acquisition_date = v,
            AnimalChange::AcquisitionPrice(v) => self.acquisition_price = v,
            AnimalChange::Status(v) => self.status = v,
        }
    }
}

impl fmt::Display for Animal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = if self.name.is_empty() {
            self.identification.clone()
        } else {
            format!("{} ({})", self.identification, self.name)
        };
        writeln!(f, "{}", title)?;
        writeln!(f, "{}", "=".repeat(title.len()))?;
        writeln!(f, "ID:       {}", self.meta.id)?;
        writeln!(f, "Species:  {}", self.species)?;
        if !self.breed.is_empty() {
            writeln!(f, "Breed:    {}", self.breed)?;
        }
        if let Some(sex) = self.sex {
            writeln!(f, "Sex:      {}", sex)?;
        }
        if let Some(date) = self.birth_date {
            writeln!(f, "Born:     {}", date)?;
        }
        if self.weight_kg > 0.0 {
            writeln!(f, "Weight:   {} kg", self.weight_kg)?;
        }
        writeln!(f, "Status:   {}", self.status)?;
        writeln!(
            f,
            "Synced:   {}",
            if self.meta.synced { "yes" } else { "pending" }
        )?;
        Ok(())
    }
}
