//! On-disk document storage for the remote store server.
//!
//! Each collection lives in one JSON file under the data directory:
//! ```text
//! <DATA_DIR>/
//!   animals.json
//!   health_records.json
//!   milk_production.json
//!   reproduction_records.json
//! ```
//!
//! Every write rewrites the whole file through a temp file and a rename.
//! Writers are serialized by a process-wide lock.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::models::EntityKind;
use crate::remote::{check_version, Document, RemoteError, RemoteQuery};

type Collection = BTreeMap<String, Document>;

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum ServerStorageError {
    /// I/O error reading or writing a file.
    IoError(PathBuf, io::Error),
    /// A collection file exists but is not valid JSON.
    CorruptCollection(PathBuf, serde_json::Error),
    /// Collection name outside the known set.
    UnknownCollection(String),
    /// Empty document id.
    InvalidId(String),
    /// The document was refused (older version, missing or mismatched fields).
    Rejected(RemoteError),
}

impl std::fmt::Display for ServerStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStorageError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            ServerStorageError::CorruptCollection(path, e) => {
                write!(f, "Failed to load collection {}: {}", path.display(), e)
            }
            ServerStorageError::UnknownCollection(name) => {
                write!(f, "Unknown collection: {}", name)
            }
            ServerStorageError::InvalidId(id) => write!(f, "Invalid document id: '{}'", id),
            ServerStorageError::Rejected(e) => write!(f, "Document rejected: {}", e.message),
        }
    }
}

impl std::error::Error for ServerStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerStorageError::IoError(_, e) => Some(e),
            ServerStorageError::CorruptCollection(_, e) => Some(e),
            ServerStorageError::Rejected(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RemoteError> for ServerStorageError {
    fn from(e: RemoteError) -> Self {
        ServerStorageError::Rejected(e)
    }
}

/// Server-side storage for remote documents.
#[derive(Debug)]
pub struct ServerStorage {
    data_dir: PathBuf,
    lock: Mutex<()>,
}

impl ServerStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Resolves a collection name from a request path.
    pub fn collection(name: &str) -> Result<EntityKind, ServerStorageError> {
        EntityKind::from_collection(name)
            .ok_or_else(|| ServerStorageError::UnknownCollection(name.to_string()))
    }

    fn validate_id(id: &str) -> Result<(), ServerStorageError> {
        if id.trim().is_empty() {
            return Err(ServerStorageError::InvalidId(id.to_string()));
        }
        Ok(())
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn collection_path(&self, kind: EntityKind) -> PathBuf {
        self.data_dir.join(format!("{}.json", kind.collection()))
    }

    /// Loads a whole collection; a missing file is an empty collection.
    fn load(&self, kind: EntityKind) -> Result<Collection, ServerStorageError> {
        let path = self.collection_path(kind);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| ServerStorageError::CorruptCollection(path, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Collection::new()),
            Err(e) => Err(ServerStorageError::IoError(path, e)),
        }
    }

    fn save(&self, kind: EntityKind, docs: &Collection) -> Result<(), ServerStorageError> {
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| ServerStorageError::IoError(self.data_dir.clone(), e))?;

        let path = self.collection_path(kind);
        let bytes = serde_json::to_vec_pretty(docs)
            .map_err(|e| ServerStorageError::CorruptCollection(path.clone(), e))?;

        // Write atomically using temp file + rename
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, bytes)
            .map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;
        fs::rename(&temp_path, &path).map_err(|e| ServerStorageError::IoError(path, e))?;

        Ok(())
    }

    /// Replaces the stored document unless the stored one is newer.
    pub fn upsert(
        &self,
        kind: EntityKind,
        id: &str,
        document: Document,
    ) -> Result<(), ServerStorageError> {
        Self::validate_id(id)?;
        if let Some(body_id) = document.get("id").and_then(|v| v.as_str()) {
            if body_id != id {
                return Err(RemoteError::malformed(format!(
                    "document id '{}' does not match path id '{}'",
                    body_id, id
                ))
                .into());
            }
        }

        let _guard = self.guard();
        let mut docs = self.load(kind)?;
        check_version(docs.get(id), &document)?;
        docs.insert(id.to_string(), document);
        self.save(kind, &docs)
    }

    /// Removes a document. Returns false when it was not there.
    pub fn delete(&self, kind: EntityKind, id: &str) -> Result<bool, ServerStorageError> {
        Self::validate_id(id)?;
        let _guard = self.guard();
        let mut docs = self.load(kind)?;
        if docs.remove(id).is_none() {
            return Ok(false);
        }
        self.save(kind, &docs)?;
        Ok(true)
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Document>, ServerStorageError> {
        Self::validate_id(id)?;
        let _guard = self.guard();
        Ok(self.load(kind)?.remove(id))
    }

    pub fn query(
        &self,
        kind: EntityKind,
        query: &RemoteQuery,
    ) -> Result<Vec<Document>, ServerStorageError> {
        let _guard = self.guard();
        let docs = self.load(kind)?;
        Ok(query.apply(docs.into_values()))
    }

    pub fn len(&self, kind: EntityKind) -> Result<usize, ServerStorageError> {
        let _guard = self.guard();
        Ok(self.load(kind)?.len())
    }
}
