mod animal;
mod health_record;
mod milk_production;
mod record;
mod reproduction_record;

pub use animal::{Animal, AnimalChange, AnimalStatus, Sex, Species};
pub use health_record::{HealthRecord, HealthRecordChange, HealthRecordType};
pub use milk_production::{DailyProduction, MilkProduction, MilkProductionChange, MilkingTime};
pub use record::{now, EntityKind, Patch, RecordMeta, SyncRecord};
pub use reproduction_record::{
    DiagnosisResult, ReproductionRecord, ReproductionRecordChange, ReproductiveEvent,
};
