//! The shared document store that local records are mirrored into.
//!
//! One collection per record kind, keyed by record id. Documents carry the
//! full field set of the record (minus the local synchronized flag), so an
//! upsert always replaces the previous document in full.

mod error;
mod http;
mod memory;
mod query;

pub use error::{RemoteError, RemoteErrorKind};
pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;
pub use query::{Filter, FilterOp, Order, RemoteQuery};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::SyncRecord;

pub type Document = serde_json::Map<String, Value>;

/// Field every document carries; used to reject out-of-order writes.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Remote document store. Implementations never retry internally.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Replaces the whole document stored under `id`.
    async fn upsert(&self, collection: &str, id: &str, document: Document)
        -> Result<(), RemoteError>;

    /// Removes the document. Deleting a missing document succeeds.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError>;

    async fn query(
        &self,
        collection: &str,
        query: &RemoteQuery,
    ) -> Result<Vec<Document>, RemoteError>;
}

/// Remote store used when no server is configured; every call fails as
/// unreachable so records simply stay unsynchronized.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRemoteStore;

#[async_trait]
impl RemoteStore for OfflineRemoteStore {
    async fn upsert(&self, _: &str, _: &str, _: Document) -> Result<(), RemoteError> {
        Err(RemoteError::unavailable("no remote store configured"))
    }

    async fn delete(&self, _: &str, _: &str) -> Result<(), RemoteError> {
        Err(RemoteError::unavailable("no remote store configured"))
    }

    async fn get(&self, _: &str, _: &str) -> Result<Option<Document>, RemoteError> {
        Err(RemoteError::unavailable("no remote store configured"))
    }

    async fn query(&self, _: &str, _: &RemoteQuery) -> Result<Vec<Document>, RemoteError> {
        Err(RemoteError::unavailable("no remote store configured"))
    }
}

/// Serializes a record into its remote document.
pub fn encode_document<R: SyncRecord>(record: &R) -> Result<Document, RemoteError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(mut document)) => {
            document.remove("synced");
            Ok(document)
        }
        Ok(_) => Err(RemoteError::malformed("record did not serialize to an object")),
        Err(e) => Err(RemoteError::malformed(e.to_string())),
    }
}

/// Parses a remote document back into a record. The result is always
/// flagged unsynchronized; callers decide what the local flag should be.
pub fn decode_document<R: SyncRecord>(document: Document) -> Result<R, RemoteError> {
    serde_json::from_value(Value::Object(document)).map_err(|e| RemoteError::malformed(e.to_string()))
}

pub fn document_updated_at(document: &Document) -> Option<DateTime<Utc>> {
    document
        .get(UPDATED_AT_FIELD)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

/// Rejects `incoming` when `existing` was written by a newer local state.
/// Equal versions are accepted so repeating a mirror is harmless.
pub fn check_version(existing: Option<&Document>, incoming: &Document) -> Result<(), RemoteError> {
    let Some(incoming_at) = document_updated_at(incoming) else {
        return Err(RemoteError::malformed(format!(
            "document is missing a valid '{}'",
            UPDATED_AT_FIELD
        )));
    };

    if let Some(stored_at) = existing.and_then(document_updated_at) {
        if incoming_at < stored_at {
            return Err(RemoteError::new(
                RemoteErrorKind::Stale,
                format!(
                    "stored version {} is newer than {}",
                    stored_at.to_rfc3339(),
                    incoming_at.to_rfc3339()
                ),
            ));
        }
    }
    Ok(())
}
