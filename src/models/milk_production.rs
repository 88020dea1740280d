use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::record::{text_enum, EntityKind, Patch, RecordMeta, SyncRecord};

text_enum! {
    MilkingTime("milking time") {
        Morning => "morning",
        Afternoon => "afternoon",
        Night => "night",
        Other => "other",
    }
}

/// One milking session for one animal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilkProduction {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub animal_id: String,
    pub date: NaiveDate,
    pub milking_time: MilkingTime,
    pub quantity_litres: f64,
    pub quality: String,
    pub fat_percent: Option<f64>,
    pub protein_percent: Option<f64>,
    pub notes: String,
}

impl MilkProduction {
    pub fn new(animal_id: impl Into<String>, date: NaiveDate, quantity_litres: f64) -> Self {
        Self {
            meta: RecordMeta::draft(),
            animal_id: animal_id.into(),
            date,
            milking_time: MilkingTime::Morning,
            quantity_litres,
            quality: String::new(),
            fat_percent: None,
            protein_percent: None,
            notes: String::new(),
        }
    }

    pub fn with_milking_time(mut self, milking_time: MilkingTime) -> Self {
        self.milking_time = milking_time;
        self
    }

    pub fn with_composition(mut self, fat_percent: f64, protein_percent: f64) -> Self {
        self.fat_percent = Some(fat_percent);
        self.protein_percent = Some(protein_percent);
        self
    }
}

impl SyncRecord for MilkProduction {
    const KIND: EntityKind = EntityKind::MilkProduction;

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
pub enum MilkProductionChange {
    Date(NaiveDate),
    MilkingTime(MilkingTime),
    QuantityLitres(f64),
    Quality(String),
    FatPercent(Option<f64>),
    ProteinPercent(Option<f64>),
    Notes(String),
}

impl Patch for MilkProduction {
    type Change = MilkProductionChange;

    fn apply(&mut self, change: MilkProductionChange) {
        match change {
            MilkProductionChange::Date(v) => self.date = v,
            MilkProductionChange::MilkingTime(v) => self.milking_time = v,
            MilkProductionChange::QuantityLitres(v) => self.quantity_litres = v,
            MilkProductionChange::Quality(v) => self.quality = v,
            MilkProductionChange::FatPercent(v) => self.fat_percent = v,
            MilkProductionChange::ProteinPercent(v) => self.protein_percent = v,
            MilkProductionChange::Notes(v) => self.notes = v,
        }
    }
}

/// Litres collected on one calendar day across all animals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyProduction {
    pub date: NaiveDate,
    pub total_litres: f64,
}

impl fmt::Display for MilkProduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {:<9} {:>7.2} L",
            self.date, self.milking_time, self.quantity_litres
        )?;
        if let Some(fat) = self.fat_percent {
            write!(f, "  fat {:.1}%", fat)?;
        }
        if let Some(protein) = self.protein_percent {
            write!(f, "  protein {:.1}%", protein)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milk_production_defaults() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
        let milk = MilkProduction::new("cow-1", date, 12.5);
        assert_eq!(milk.milking_time, MilkingTime::Morning);
        assert_eq!(milk.owner_id(), Some("cow-1"));
        assert!(milk.fat_percent.is_none());
    }

    #[test]
    fn test_apply_quantity_change() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
        let mut milk = MilkProduction::new("cow-1", date, 12.5);
        milk.apply(MilkProductionChange::QuantityLitres(9.0));
        milk.apply(MilkProductionChange::MilkingTime(MilkingTime::Night));
        assert_eq!(milk.quantity_litres, 9.0);
        assert_eq!(milk.milking_time, MilkingTime::Night);
    }
}
