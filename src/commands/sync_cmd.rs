//! Sync CLI commands for pushing unsynchronized records to the remote store.

use clap::{Args, Subcommand};

use finca_sync::config::Config;
use finca_sync::db::LocalStoreError;
use finca_sync::models::EntityKind;
use finca_sync::remote::RemoteQuery;
use finca_sync::sync::Reconciler;

/// Push pending records to the remote store
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,

    /// Keep sweeping every `remote.sweep_interval_secs` until interrupted
    #[arg(long)]
    watch: bool,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show remote configuration, reachability and pending counts
    Status,
}

impl SyncCommand {
    pub async fn run(&self, reconciler: &Reconciler, config: &Config) -> Result<(), SyncCommandError> {
        match &self.command {
            None if self.watch => self.watch(reconciler, config).await,
            None => self.sync(reconciler, config).await,
            Some(SyncSubcommand::Status) => self.status(reconciler, config).await,
        }
    }

    async fn sync(&self, reconciler: &Reconciler, config: &Config) -> Result<(), SyncCommandError> {
        if !config.remote.is_configured() {
            println!("No remote store configured; records stay local.");
            println!("Run `finca sync status` for setup instructions.");
            return Ok(());
        }

        println!("Syncing with remote store...");
        println!();

        let report = reconciler.sweep().await?;
        if report.attempted == 0 && report.skipped == 0 {
            println!("Already up to date.");
            return Ok(());
        }

        println!("  synced:     {}", report.synced);
        if report.superseded > 0 {
            println!("  superseded: {}", report.superseded);
        }
        if report.deferred > 0 {
            println!("  deferred:   {} (remote unreachable, retried next sync)", report.deferred);
        }
        if report.failed > 0 {
            println!("  failed:     {}", report.failed);
        }

        let failures = reconciler.context().errors.entries();
        if !failures.is_empty() {
            println!();
            println!("Failures:");
            for failure in &failures {
                println!("  {}", failure);
            }
        }

        println!();
        if report.is_clean() {
            println!("Sync complete.");
        } else {
            println!("Sync incomplete; pending records stay queued.");
        }
        Ok(())
    }

    async fn watch(&self, reconciler: &Reconciler, config: &Config) -> Result<(), SyncCommandError> {
        if !config.remote.is_configured() {
            println!("No remote store configured; nothing to watch.");
            return Ok(());
        }

        let interval = config.remote.sweep_interval();
        println!(
            "Sweeping every {}s. Press Ctrl-C to stop.",
            interval.as_secs()
        );

        tokio::select! {
            _ = reconciler.run_periodic(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Stopped.");
            }
        }
        Ok(())
    }

    async fn status(&self, reconciler: &Reconciler, config: &Config) -> Result<(), SyncCommandError> {
        println!("Remote Configuration");
        println!("====================");
        println!();

        let configured = config.remote.is_configured();
        match (&config.remote.server_url, &config.remote.api_key) {
            (Some(server_url), Some(api_key)) => {
                let shown: String = api_key.chars().take(8).collect();
                println!("Server:    {}", server_url);
                println!("API Key:   {}...", shown);
                println!("Timeout:   {}s", config.remote.timeout_secs);
                println!();
            }
            _ => {
                println!("Status: Not configured");
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  remote:");
                println!("    server_url: \"http://localhost:8080\"");
                println!("    api_key: \"your-api-key\"");
                println!();
                println!("Or set environment variables:");
                println!("  FINCA_REMOTE_URL");
                println!("  FINCA_REMOTE_API_KEY");
                println!();
            }
        }

        if configured {
            print!("Server status: ");
            let probe = RemoteQuery::new().limit(1);
            match reconciler
                .context()
                .remote
                .query(EntityKind::Animal.collection(), &probe)
                .await
            {
                Ok(_) => println!("✓ connected"),
                Err(e) if e.is_transient() => println!("✗ unreachable ({})", e.message),
                Err(e) => println!("✗ error: {}", e),
            }
            println!();
        }

        println!("Pending records:");
        let mut total = 0;
        for (kind, count) in reconciler.unsynced_counts().await? {
            total += count;
            println!("  {:<22} {}", kind.collection(), count);
        }
        if total == 0 {
            println!();
            println!("Everything is synced.");
        }
        Ok(())
    }
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    Local(LocalStoreError),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::Local(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::Local(e) => Some(e),
        }
    }
}

impl From<LocalStoreError> for SyncCommandError {
    fn from(e: LocalStoreError) -> Self {
        SyncCommandError::Local(e)
    }
}
