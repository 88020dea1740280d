use chrono::NaiveDate;
use clap::{Args, Subcommand};

use super::{print_list, today, CommandResult, OutputFormat};
use finca_sync::models::{DiagnosisResult, ReproductionRecord, ReproductiveEvent};
use finca_sync::sync::ReproductionRecordRepository;

#[derive(Args)]
pub struct ReproCommand {
    #[command(subcommand)]
    pub command: ReproSubcommand,
}

#[derive(Subcommand)]
pub enum ReproSubcommand {
    /// Record a reproductive event
    Add {
        /// Animal ID
        animal_id: String,

        /// heat, mating, insemination, pregnancy_diagnosis, birth, abortion or other
        event: ReproductiveEvent,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Sire animal ID
        #[arg(long)]
        sire: Option<String>,

        /// Offspring animal ID (can be repeated)
        #[arg(long = "offspring", value_name = "ID")]
        offspring: Vec<String>,

        /// positive, negative or pending
        #[arg(long)]
        diagnosis: Option<DiagnosisResult>,

        /// Expected birth date (YYYY-MM-DD)
        #[arg(long)]
        expected_birth: Option<NaiveDate>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// List reproductive events
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Only events for this animal
        #[arg(long)]
        animal: Option<String>,

        /// Only events of this type
        #[arg(long, conflicts_with = "animal")]
        event: Option<ReproductiveEvent>,

        /// Only births by this mother
        #[arg(long, conflicts_with_all = ["animal", "event"])]
        mother: Option<String>,
    },

    /// Pregnancies with an expected birth date after today
    Upcoming {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Look after this date instead of today (YYYY-MM-DD)
        #[arg(long)]
        after: Option<NaiveDate>,
    },
}

impl ReproCommand {
    pub async fn run(&self, repo: &ReproductionRecordRepository) -> CommandResult {
        match &self.command {
            ReproSubcommand::Add {
                animal_id,
                event,
                date,
                sire,
                offspring,
                diagnosis,
                expected_birth,
                notes,
            } => {
                let mut record = ReproductionRecord::new(animal_id, date.unwrap_or_else(today), *event);
                if let Some(sire) = sire {
                    record = record.with_sire(sire);
                }
                if !offspring.is_empty() {
                    record = record.with_offspring(offspring.clone());
                }
                record.diagnosis_result = *diagnosis;
                record.expected_birth_date = *expected_birth;
                if let Some(notes) = notes {
                    record.notes = notes.clone();
                }

                let id = repo.save(record).await?;
                println!("Created reproduction record: {}", id);
                Ok(())
            }

            ReproSubcommand::List {
                format,
                animal,
                event,
                mother,
            } => {
                let query = if let Some(animal) = animal {
                    repo.get_by_animal(animal)
                } else if let Some(event) = event {
                    repo.dao().watch_by_event(*event)
                } else if let Some(mother) = mother {
                    repo.dao().watch_births_by_mother(mother)
                } else {
                    repo.get_all()
                };

                print_list(&query.current().await?, *format, "reproduction record(s)")
            }

            ReproSubcommand::Upcoming { format, after } => {
                let after = after.unwrap_or_else(today);
                let records = repo.get_upcoming_births(after).current().await?;
                print_list(&records, *format, "upcoming birth(s)")
            }
        }
    }
}
