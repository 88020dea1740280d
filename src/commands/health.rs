use chrono::NaiveDate;
use clap::{Args, Subcommand};

use super::{print_list, today, CommandResult, OutputFormat};
use finca_sync::models::{HealthRecord, HealthRecordType};
use finca_sync::sync::HealthRecordRepository;

#[derive(Args)]
pub struct HealthCommand {
    #[command(subcommand)]
    pub command: HealthSubcommand,
}

#[derive(Subcommand)]
pub enum HealthSubcommand {
    /// Record a treatment, vaccination, checkup, ...
    Add {
        /// Animal ID
        animal_id: String,

        /// vaccination, deworming, treatment, diagnosis, checkup, surgery or other
        #[arg(long = "type", short = 't')]
        record_type: HealthRecordType,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        description: Option<String>,

        /// Product applied
        #[arg(long)]
        product: Option<String>,

        #[arg(long, requires = "product")]
        dose: Option<String>,

        /// Date of the next scheduled treatment (YYYY-MM-DD)
        #[arg(long)]
        next: Option<NaiveDate>,
    },

    /// List health records
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Only records for this animal
        #[arg(long)]
        animal: Option<String>,

        /// Only records of this type
        #[arg(long = "type", short = 't', conflicts_with = "animal")]
        record_type: Option<HealthRecordType>,

        /// Start of the date range (YYYY-MM-DD)
        #[arg(long, requires = "to", conflicts_with_all = ["animal", "record_type"])]
        from: Option<NaiveDate>,

        /// End of the date range (YYYY-MM-DD)
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,

        /// Only treatments scheduled after today
        #[arg(long, conflicts_with_all = ["animal", "record_type", "from"])]
        follow_ups: bool,
    },
}

impl HealthCommand {
    pub async fn run(&self, repo: &HealthRecordRepository) -> CommandResult {
        match &self.command {
            HealthSubcommand::Add {
                animal_id,
                record_type,
                date,
                description,
                product,
                dose,
                next,
            } => {
                let mut record =
                    HealthRecord::new(animal_id, date.unwrap_or_else(today), *record_type);
                if let Some(description) = description {
                    record = record.with_description(description);
                }
                if let Some(product) = product {
                    record = record.with_product(product, dose.clone().unwrap_or_default());
                }
                if let Some(next) = next {
                    record = record.with_next_treatment(*next);
                }

                let id = repo.save(record).await?;
                println!("Created health record: {}", id);
                Ok(())
            }

            HealthSubcommand::List {
                format,
                animal,
                record_type,
                from,
                to,
                follow_ups,
            } => {
                let query = if let Some(animal) = animal {
                    repo.get_by_animal(animal)
                } else if let Some(record_type) = record_type {
                    repo.dao().watch_by_type(*record_type)
                } else if let (Some(from), Some(to)) = (from, to) {
                    repo.get_by_date_range(*from, *to)
                } else if *follow_ups {
                    repo.dao().watch_pending_follow_ups(today())
                } else {
                    repo.get_all()
                };

                print_list(&query.current().await?, *format, "health record(s)")
            }
        }
    }
}
