use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{
    AnimalCommand, ConfigCommand, HealthCommand, MilkCommand, ReproCommand, SpeciesCommand,
    SyncCommand,
};
use finca_sync::config::Config;
use finca_sync::db::{AnimalDao, LocalStore};
use finca_sync::remote::{HttpRemoteStore, OfflineRemoteStore, RemoteStore};
use finca_sync::sync::{Repositories, StaticAuthProvider, SyncContext};

#[derive(Parser)]
#[command(name = "finca")]
#[command(version)]
#[command(about = "Offline-first livestock records", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage animals
    Animal(AnimalCommand),

    /// Manage health records
    Health(HealthCommand),

    /// Log and report milk production
    Milk(MilkCommand),

    /// Manage reproduction records
    Repro(ReproCommand),

    /// Choose which species are shown
    Species(SpeciesCommand),

    /// Push pending records to the remote store
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "finca_sync=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn open(config: &Config) -> Result<(LocalStore, Repositories), Box<dyn std::error::Error>> {
    let store = LocalStore::open(&config.database_path.value).await?;

    let remote: Arc<dyn RemoteStore> = match (&config.remote.server_url, &config.remote.api_key) {
        (Some(url), Some(key)) => Arc::new(HttpRemoteStore::new(
            url.as_str(),
            key.as_str(),
            config.remote.timeout(),
        )?),
        _ => Arc::new(OfflineRemoteStore),
    };
    let auth = Arc::new(StaticAuthProvider::new(config.created_by.value.as_str()));
    let ctx = SyncContext::new(remote, auth)
        .with_quarantine_threshold(config.remote.max_permanent_failures);

    Ok((store.clone(), Repositories::new(store, ctx)))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    let command = match cli.command {
        Some(Commands::Config(cmd)) => return cmd.run(&config),
        Some(command) => command,
        None => {
            println!("Use --help to see available commands");
            return Ok(());
        }
    };

    let (store, repos) = open(&config).await?;

    let result = match command {
        Commands::Animal(cmd) => cmd.run(&repos.animals).await,
        Commands::Health(cmd) => cmd.run(&repos.health_records).await,
        Commands::Milk(cmd) => cmd.run(&repos.milk_production).await,
        Commands::Repro(cmd) => cmd.run(&repos.reproduction_records).await,
        Commands::Species(cmd) => {
            cmd.run(&repos.preferences, &AnimalDao::new(store.clone()))
                .await
        }
        Commands::Sync(cmd) => cmd
            .run(&repos.reconciler, &config)
            .await
            .map_err(Into::into),
        Commands::Config(_) => Ok(()),
    };

    // Writes already committed locally; give their background mirrors a
    // bounded chance to finish before the process exits.
    if config.remote.is_configured()
        && tokio::time::timeout(config.remote.timeout(), repos.settle())
            .await
            .is_err()
    {
        tracing::warn!("Remote mirror still running at exit; records stay pending for the next sync");
    }
    repos.shutdown().await;
    store.close().await;

    result
}
