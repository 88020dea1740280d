//! Finca Sync Library
//!
//! Livestock records kept in a local SQLite database and mirrored, best
//! effort, to a shared remote document store.

pub mod config;
pub mod db;
pub mod models;
pub mod remote;
pub mod server;
pub mod sync;

pub use config::{Config, ConfigError};
pub use db::{LiveQuery, LocalStore, LocalStoreError};
pub use models::{
    Animal, EntityKind, HealthRecord, MilkProduction, RecordMeta, ReproductionRecord, SyncRecord,
};
pub use remote::{HttpRemoteStore, MemoryRemoteStore, RemoteError, RemoteErrorKind, RemoteStore};
pub use sync::{Reconciler, Repositories, RepositoryError, SyncContext};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
