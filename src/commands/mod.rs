mod animal;
mod config_cmd;
mod health;
mod milk;
mod repro;
mod species;
mod sync_cmd;

pub use animal::AnimalCommand;
pub use config_cmd::ConfigCommand;
pub use health::HealthCommand;
pub use milk::MilkCommand;
pub use repro::ReproCommand;
pub use species::SpeciesCommand;
pub use sync_cmd::SyncCommand;

use chrono::{Local, NaiveDate};
use clap::ValueEnum;
use finca_sync::models::SyncRecord;
use std::io::{self, Write};

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Prints records as pretty JSON or, for text, one line each prefixed with
/// the record id and followed by a total.
pub(crate) fn print_list<T: SyncRecord + std::fmt::Display>(
    items: &[T],
    format: OutputFormat,
    noun: &str,
) -> CommandResult {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No {} found", noun);
                return Ok(());
            }
            for item in items {
                let pending = if item.meta().synced { "" } else { "  *" };
                println!("{}  {}{}", item.id(), item, pending);
            }
            println!("\nTotal: {} {} (* not yet synced)", items.len(), noun);
        }
    }
    Ok(())
}

/// Asks for a y/N confirmation on stdin.
pub(crate) fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
