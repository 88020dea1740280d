use clap::{Args, Subcommand};

use super::{CommandResult, OutputFormat};
use finca_sync::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> CommandResult {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        let mut value = serde_json::to_value(config)?;
                        // Never print the full key.
                        if let Some(key) = value.pointer_mut("/remote/api_key") {
                            if !key.is_null() {
                                *key = "********".into();
                            }
                        }
                        println!("{}", serde_json::to_string_pretty(&value)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!("created_by: {}", config.created_by.value);
                        println!("  source: {}", config.created_by.source);
                        println!();

                        let remote = &config.remote;
                        println!(
                            "remote.server_url: {}",
                            remote.server_url.as_deref().unwrap_or("(none, offline)")
                        );
                        println!(
                            "remote.api_key: {}",
                            if remote.api_key.is_some() { "set" } else { "(none)" }
                        );
                        println!("remote.timeout_secs: {}", remote.timeout_secs);
                        println!("remote.sweep_interval_secs: {}", remote.sweep_interval_secs);
                        println!(
                            "remote.max_permanent_failures: {}",
                            remote.max_permanent_failures
                        );
                    }
                }
                Ok(())
            }
        }
    }
}
