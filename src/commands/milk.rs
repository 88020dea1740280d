use chrono::{Duration, NaiveDate};
use clap::{Args, Subcommand};

use super::{print_list, today, CommandResult, OutputFormat};
use finca_sync::models::{MilkProduction, MilkingTime};
use finca_sync::sync::MilkProductionRepository;

#[derive(Args)]
pub struct MilkCommand {
    #[command(subcommand)]
    pub command: MilkSubcommand,
}

#[derive(Subcommand)]
pub enum MilkSubcommand {
    /// Log one milking session
    Log {
        /// Animal ID
        animal_id: String,

        /// Quantity in litres
        litres: f64,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// morning, afternoon, night or other
        #[arg(long, short = 't', default_value = "morning")]
        time: MilkingTime,

        /// Fat percentage
        #[arg(long, requires = "protein")]
        fat: Option<f64>,

        /// Protein percentage
        #[arg(long, requires = "fat")]
        protein: Option<f64>,
    },

    /// List milking sessions
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Only sessions for this animal
        #[arg(long)]
        animal: Option<String>,

        /// Only sessions at this time of day
        #[arg(long, short = 't', conflicts_with = "animal")]
        time: Option<MilkingTime>,

        /// Start of the date range (YYYY-MM-DD)
        #[arg(long, requires = "to", conflicts_with_all = ["animal", "time"])]
        from: Option<NaiveDate>,

        /// End of the date range (YYYY-MM-DD)
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
    },

    /// Total litres for one animal over a date range
    Total {
        /// Animal ID
        animal_id: String,

        /// Start date (YYYY-MM-DD), defaults to 30 days ago
        #[arg(long)]
        from: Option<NaiveDate>,

        /// End date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Litres per day across all animals
    Daily {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Start date (YYYY-MM-DD), defaults to 7 days ago
        #[arg(long)]
        from: Option<NaiveDate>,

        /// End date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

impl MilkCommand {
    pub async fn run(&self, repo: &MilkProductionRepository) -> CommandResult {
        match &self.command {
            MilkSubcommand::Log {
                animal_id,
                litres,
                date,
                time,
                fat,
                protein,
            } => {
                if *litres <= 0.0 {
                    return Err("Quantity must be a positive number".into());
                }

                let mut record = MilkProduction::new(animal_id, date.unwrap_or_else(today), *litres)
                    .with_milking_time(*time);
                if let (Some(fat), Some(protein)) = (fat, protein) {
                    record = record.with_composition(*fat, *protein);
                }

                let id = repo.save(record).await?;
                println!("Logged milking: {}", id);
                Ok(())
            }

            MilkSubcommand::List {
                format,
                animal,
                time,
                from,
                to,
            } => {
                let query = if let Some(animal) = animal {
                    repo.get_by_animal(animal)
                } else if let Some(time) = time {
                    repo.dao().watch_by_milking_time(*time)
                } else if let (Some(from), Some(to)) = (from, to) {
                    repo.get_by_date_range(*from, *to)
                } else {
                    repo.get_all()
                };

                print_list(&query.current().await?, *format, "milking(s)")
            }

            MilkSubcommand::Total {
                animal_id,
                from,
                to,
            } => {
                let to = to.unwrap_or_else(today);
                let from = from.unwrap_or(to - Duration::days(30));
                let total = repo.total_for_animal(animal_id, from, to).current().await?;
                println!("{} to {}: {:.2} L", from, to, total);
                Ok(())
            }

            MilkSubcommand::Daily { format, from, to } => {
                let to = to.unwrap_or_else(today);
                let from = from.unwrap_or(to - Duration::days(7));
                let days = repo.daily_totals(from, to).current().await?;

                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&days)?),
                    OutputFormat::Text => {
                        if days.is_empty() {
                            println!("No milkings between {} and {}", from, to);
                            return Ok(());
                        }
                        println!("{:<10}  {:>9}", "DATE", "LITRES");
                        println!("{}", "-".repeat(21));
                        for day in &days {
                            println!("{:<10}  {:>9.2}", day.date, day.total_litres);
                        }
                        let total: f64 = days.iter().map(|d| d.total_litres).sum();
                        println!("\nTotal: {:.2} L over {} day(s)", total, days.len());
                    }
                }
                Ok(())
            }
        }
    }
}
