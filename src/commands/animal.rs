use chrono::NaiveDate;
use clap::{Args, Subcommand};
use futures::StreamExt;

use super::{confirm, CommandResult, OutputFormat};
use finca_sync::models::{Animal, AnimalChange, AnimalStatus, Sex, Species};
use finca_sync::sync::AnimalRepository;

#[derive(Args)]
pub struct AnimalCommand {
    #[command(subcommand)]
    pub command: AnimalSubcommand,
}

#[derive(Subcommand)]
pub enum AnimalSubcommand {
    /// Register a new animal
    Add {
        /// Ear tag or other official identification
        identification: String,

        /// Species (bovine, ovine, caprine, porcine, equine, avian, other)
        #[arg(long, short)]
        species: Species,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        breed: Option<String>,

        /// male or female
        #[arg(long)]
        sex: Option<Sex>,

        /// Birth date (YYYY-MM-DD)
        #[arg(long)]
        born: Option<NaiveDate>,

        /// Weight in kilograms
        #[arg(long)]
        weight: Option<f64>,
    },

    /// List animals
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Only animals with this status
        #[arg(long)]
        status: Option<AnimalStatus>,

        /// Only these species (can be repeated)
        #[arg(long = "species", value_name = "SPECIES")]
        species: Vec<Species>,

        /// Only the species chosen with `species select`
        #[arg(long, conflicts_with = "species")]
        selected: bool,

        /// Only animals not yet mirrored to the remote store
        #[arg(long)]
        unsynced: bool,

        /// Keep running and print the list again after every change
        #[arg(long)]
        watch: bool,
    },

    /// Show an animal's details
    Show {
        /// Animal ID
        id: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Search identification and name (case-insensitive)
    Search {
        query: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing animal
    Update {
        /// Animal ID
        id: String,

        #[arg(long)]
        identification: Option<String>,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        breed: Option<String>,

        #[arg(long)]
        weight: Option<f64>,

        #[arg(long)]
        status: Option<AnimalStatus>,
    },

    /// Delete an animal and, locally, all of its records
    Delete {
        /// Animal ID
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

fn print_table(animals: &[Animal], format: OutputFormat) -> CommandResult {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(animals)?),
        OutputFormat::Text => {
            if animals.is_empty() {
                println!("No animals found");
                return Ok(());
            }
            println!(
                "{:<36}  {:<12}  {:<20}  {:<8}  {:<11}  SYNCED",
                "ID", "TAG", "NAME", "SPECIES", "STATUS"
            );
            println!("{}", "-".repeat(100));
            for animal in animals {
                let name = if animal.name.chars().count() > 20 {
                    format!("{}...", animal.name.chars().take(17).collect::<String>())
                } else {
                    animal.name.clone()
                };
                println!(
                    "{:<36}  {:<12}  {:<20}  {:<8}  {:<11}  {}",
                    animal.meta.id,
                    animal.identification,
                    name,
                    animal.species,
                    animal.status,
                    if animal.meta.synced { "yes" } else { "no" }
                );
            }
            println!("\nTotal: {} animal(s)", animals.len());
        }
    }
    Ok(())
}

impl AnimalCommand {
    pub async fn run(&self, repo: &AnimalRepository) -> CommandResult {
        match &self.command {
            AnimalSubcommand::Add {
                identification,
                species,
                name,
                breed,
                sex,
                born,
                weight,
            } => {
                if identification.trim().is_empty() {
                    return Err("Identification cannot be empty".into());
                }

                let mut animal = Animal::new(identification.trim(), *species);
                if let Some(name) = name {
                    animal = animal.with_name(name);
                }
                if let Some(breed) = breed {
                    animal = animal.with_breed(breed);
                }
                if let Some(sex) = sex {
                    animal = animal.with_sex(*sex);
                }
                if let Some(born) = born {
                    animal = animal.with_birth_date(*born);
                }
                if let Some(weight) = weight {
                    animal = animal.with_weight(*weight);
                }

                let id = repo.save(animal).await?;
                println!("Created animal: {}", id);
                Ok(())
            }

            AnimalSubcommand::List {
                format,
                status,
                species,
                selected,
                unsynced,
                watch,
            } => {
                let query = if *unsynced {
                    repo.get_unsynced()
                } else if let Some(status) = status {
                    repo.get_by_status(*status)
                } else if *selected {
                    repo.get_in_selected_species()
                } else if !species.is_empty() {
                    repo.get_by_species(species)
                } else {
                    repo.get_all()
                };

                if !*watch {
                    return print_table(&query.current().await?, *format);
                }

                let mut updates = Box::pin(query.into_stream());
                while let Some(animals) = updates.next().await {
                    print_table(&animals?, *format)?;
                    println!();
                }
                Ok(())
            }

            AnimalSubcommand::Show { id, format } => match repo.get_by_id(id).current().await? {
                Some(animal) => {
                    match format {
                        OutputFormat::Json => {
                            println!("{}", serde_json::to_string_pretty(&animal)?)
                        }
                        OutputFormat::Text => print!("{}", animal),
                    }
                    Ok(())
                }
                None => Err(format!("Animal not found: {}", id).into()),
            },

            AnimalSubcommand::Search { query, format } => {
                print_table(&repo.search(query).current().await?, *format)
            }

            AnimalSubcommand::Update {
                id,
                identification,
                name,
                breed,
                weight,
                status,
            } => {
                let mut changes = Vec::new();
                if let Some(identification) = identification {
                    changes.push(AnimalChange::Identification(identification.clone()));
                }
                if let Some(name) = name {
                    changes.push(AnimalChange::Name(name.clone()));
                }
                if let Some(breed) = breed {
                    changes.push(AnimalChange::Breed(breed.clone()));
                }
                if let Some(weight) = weight {
                    changes.push(AnimalChange::WeightKg(*weight));
                }
                if let Some(status) = status {
                    changes.push(AnimalChange::Status(*status));
                }

                if changes.is_empty() {
                    return Err("Nothing to update. Provide at least one option.".into());
                }

                repo.patch(id, changes).await?;
                println!("Updated animal: {}", id);
                Ok(())
            }

            AnimalSubcommand::Delete { id, force } => {
                let animal = match repo.get_by_id(id).current().await? {
                    Some(animal) => animal,
                    None => return Err(format!("Animal not found: {}", id).into()),
                };

                if !force
                    && !confirm(&format!(
                        "Delete animal '{}' and all of its records?",
                        animal.identification
                    ))?
                {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                repo.delete(id).await?;
                println!("Deleted animal: {}", animal.identification);
                Ok(())
            }
        }
    }
}
