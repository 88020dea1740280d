use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::models::{now, EntityKind};
use crate::remote::RemoteError;

pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 64;
pub const DEFAULT_MAX_PERMANENT_FAILURES: usize = 3;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Upsert,
    Delete,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOperation::Upsert => write!(f, "upsert"),
            SyncOperation::Delete => write!(f, "delete"),
        }
    }
}

/// One swallowed remote failure.
#[derive(Debug, Clone)]
pub struct SyncFailure {
    pub at: DateTime<Utc>,
    pub kind: EntityKind,
    pub id: String,
    pub operation: SyncOperation,
    pub error: RemoteError,
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}/{}: {}",
            self.at.format("%Y-%m-%d %H:%M:%S"),
            self.operation,
            self.kind,
            self.id,
            self.error
        )
    }
}

/// Bounded log of remote failures, oldest dropped first.
pub struct SyncErrorLog {
    capacity: usize,
    entries: Mutex<VecDeque<SyncFailure>>,
}

impl SyncErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(&self, kind: EntityKind, id: &str, operation: SyncOperation, error: RemoteError) {
        let mut entries = lock(&self.entries);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(SyncFailure {
            at: now(),
            kind,
            id: id.to_string(),
            operation,
            error,
        });
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<SyncFailure> {
        lock(&self.entries).iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

impl Default for SyncErrorLog {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_LOG_CAPACITY)
    }
}

type RecordKey = (EntityKind, String);

#[derive(Default)]
struct QuarantineState {
    failures: HashMap<RecordKey, usize>,
    quarantined: HashSet<RecordKey>,
}

/// Counts consecutive non-transient failures per record and parks records
/// that reach the threshold so sweeps stop retrying them.
pub struct Quarantine {
    threshold: usize,
    state: Mutex<QuarantineState>,
}

impl Quarantine {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            state: Mutex::new(QuarantineState::default()),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Returns true when this failure put the record into quarantine.
    /// Transient failures are ignored.
    pub fn track_failure(&self, kind: EntityKind, id: &str, error: &RemoteError) -> bool {
        if error.is_transient() {
            return false;
        }
        let key = (kind, id.to_string());
        let mut state = lock(&self.state);
        let count = state.failures.entry(key.clone()).or_insert(0);
        *count += 1;
        if *count >= self.threshold {
            return state.quarantined.insert(key);
        }
        false
    }

    /// Forgets the record's failure history.
    pub fn reset(&self, kind: EntityKind, id: &str) {
        let key = (kind, id.to_string());
        let mut state = lock(&self.state);
        state.failures.remove(&key);
        state.quarantined.remove(&key);
    }

    pub fn is_quarantined(&self, kind: EntityKind, id: &str) -> bool {
        lock(&self.state)
            .quarantined
            .contains(&(kind, id.to_string()))
    }

    pub fn quarantined(&self) -> Vec<(EntityKind, String)> {
        let mut records: Vec<_> = lock(&self.state).quarantined.iter().cloned().collect();
        records.sort();
        records
    }

    /// Releases every quarantined record; returns how many were released.
    pub fn release_all(&self) -> usize {
        let mut state = lock(&self.state);
        let released: Vec<RecordKey> = state.quarantined.drain().collect();
        for key in &released {
            state.failures.remove(key);
        }
        released.len()
    }
}

impl Default for Quarantine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PERMANENT_FAILURES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteErrorKind;

    fn denied() -> RemoteError {
        RemoteError::new(RemoteErrorKind::PermissionDenied, "nope")
    }

    #[test]
    fn test_error_log_is_bounded() {
        let log = SyncErrorLog::new(2);
        for id in ["a", "b", "c"] {
            log.record(EntityKind::Animal, id, SyncOperation::Upsert, denied());
        }
        let ids: Vec<String> = log.entries().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_quarantine_after_threshold() {
        let quarantine = Quarantine::new(3);
        assert!(!quarantine.track_failure(EntityKind::Animal, "a1", &denied()));
        assert!(!quarantine.track_failure(EntityKind::Animal, "a1", &denied()));
        assert!(quarantine.track_failure(EntityKind::Animal, "a1", &denied()));
        assert!(quarantine.is_quarantined(EntityKind::Animal, "a1"));
        assert!(!quarantine.is_quarantined(EntityKind::MilkProduction, "a1"));
    }

    #[test]
    fn test_transient_failures_never_quarantine() {
        let quarantine = Quarantine::new(1);
        let offline = RemoteError::unavailable("offline");
        for _ in 0..5 {
            assert!(!quarantine.track_failure(EntityKind::Animal, "a1", &offline));
        }
        assert!(quarantine.quarantined().is_empty());
    }

    #[test]
    fn test_reset_and_release() {
        let quarantine = Quarantine::new(1);
        quarantine.track_failure(EntityKind::Animal, "a1", &denied());
        quarantine.track_failure(EntityKind::Animal, "a2", &denied());

        quarantine.reset(EntityKind::Animal, "a1");
        assert!(!quarantine.is_quarantined(EntityKind::Animal, "a1"));

        assert_eq!(quarantine.release_all(), 1);
        assert!(quarantine.quarantined().is_empty());
    }
}
