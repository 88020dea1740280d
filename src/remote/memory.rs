use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{check_version, Document, RemoteError, RemoteErrorKind, RemoteQuery, RemoteStore};

#[derive(Default)]
struct State {
    collections: HashMap<String, BTreeMap<String, Document>>,
    unreachable: bool,
    failing: HashMap<(String, String), RemoteErrorKind>,
    upserts: usize,
    deletes: usize,
    reads: usize,
}

/// In-process remote store. Applies the same version guard as the server
/// and can be switched offline or told to reject specific documents.
#[derive(Default)]
pub struct MemoryRemoteStore {
    state: Mutex<State>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().unreachable = !reachable;
    }

    /// Every later write or delete of this document fails with `kind`.
    pub fn fail_document(&self, collection: &str, id: &str, kind: RemoteErrorKind) {
        self.lock()
            .failing
            .insert((collection.to_string(), id.to_string()), kind);
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    pub fn upsert_count(&self) -> usize {
        self.lock().upserts
    }

    pub fn delete_count(&self) -> usize {
        self.lock().deletes
    }

    /// All calls attempted, including ones that failed.
    pub fn call_count(&self) -> usize {
        let state = self.lock();
        state.upserts + state.deletes + state.reads
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

impl State {
    fn check_reachable(&self) -> Result<(), RemoteError> {
        if self.unreachable {
            return Err(RemoteError::unavailable("remote store is offline"));
        }
        Ok(())
    }

    fn check_failing(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        match self.failing.get(&(collection.to_string(), id.to_string())) {
            Some(kind) => Err(RemoteError::new(*kind, format!("{}/{} rejected", collection, id))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn upsert(&self, collection: &str, id: &str, document: Document) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.upserts += 1;
        state.check_reachable()?;
        state.check_failing(collection, id)?;

        let docs = state.collections.entry(collection.to_string()).or_default();
        check_version(docs.get(id), &document)?;
        docs.insert(id.to_string(), document);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.deletes += 1;
        state.check_reachable()?;
        state.check_failing(collection, id)?;

        if let Some(docs) = state.collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError> {
        let mut state = self.lock();
        state.reads += 1;
        state.check_reachable()?;

        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query(&self, collection: &str, query: &RemoteQuery) -> Result<Vec<Document>, RemoteError> {
        let mut state = self.lock();
        state.reads += 1;
        state.check_reachable()?;

        let docs = state
            .collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(query.apply(docs))
    }
}
