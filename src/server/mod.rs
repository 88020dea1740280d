//! Server-side modules for the finca remote document store.

pub mod routes;
pub mod storage;

pub use routes::{router, ApiKeyEntry, ApiKeyStore, AppState, AuthUser};
pub use storage::{ServerStorage, ServerStorageError};
