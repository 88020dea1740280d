use clap::{Args, Subcommand};

use super::{CommandResult, OutputFormat};
use finca_sync::db::{AnimalDao, PreferenceStore};
use finca_sync::models::Species;

#[derive(Args)]
pub struct SpeciesCommand {
    #[command(subcommand)]
    pub command: SpeciesSubcommand,
}

#[derive(Subcommand)]
pub enum SpeciesSubcommand {
    /// Show the selected species and herd counts
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Choose which species `animal list --selected` shows
    Select {
        /// Species to keep; none clears the selection
        species: Vec<Species>,
    },
}

impl SpeciesCommand {
    pub async fn run(&self, preferences: &PreferenceStore, animals: &AnimalDao) -> CommandResult {
        match &self.command {
            SpeciesSubcommand::Show { format } => {
                let selected = preferences.selected_species().await?;
                let counts = animals.counts_by_species().current().await?;

                match format {
                    OutputFormat::Json => {
                        let counts: serde_json::Map<String, serde_json::Value> = counts
                            .iter()
                            .map(|(species, n)| (species.to_string(), (*n).into()))
                            .collect();
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&serde_json::json!({
                                "selected": selected,
                                "counts": counts,
                            }))?
                        );
                    }
                    OutputFormat::Text => {
                        if selected.is_empty() {
                            println!("Selected: all species");
                        } else {
                            let names: Vec<&str> = selected.iter().map(Species::as_str).collect();
                            println!("Selected: {}", names.join(", "));
                        }
                        println!();
                        for (species, count) in &counts {
                            let mark = if selected.contains(species) { "*" } else { " " };
                            println!("{} {:<8}  {:>5}", mark, species, count);
                        }
                    }
                }
                Ok(())
            }

            SpeciesSubcommand::Select { species } => {
                preferences.save_selected_species(species).await?;
                if species.is_empty() {
                    println!("Selection cleared; all species are shown");
                } else {
                    let names: Vec<&str> = species.iter().map(Species::as_str).collect();
                    println!("Selected: {}", names.join(", "));
                }
                Ok(())
            }
        }
    }
}
