use crate::db::LocalStoreError;
use crate::models::EntityKind;

/// Failure of a repository call. Remote failures never surface here; they
/// only leave the record unsynchronized.
#[derive(Debug)]
pub enum RepositoryError {
    /// The local write or read failed. Not retried.
    Local(LocalStoreError),
    /// An update or patch named a record that does not exist locally.
    NotFound { kind: EntityKind, id: String },
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::Local(e) => write!(f, "Local storage error: {}", e),
            RepositoryError::NotFound { kind, id } => {
                write!(f, "No record '{}' in {}", id, kind)
            }
        }
    }
}

impl std::error::Error for RepositoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RepositoryError::Local(e) => Some(e),
            RepositoryError::NotFound { .. } => None,
        }
    }
}

impl From<LocalStoreError> for RepositoryError {
    fn from(e: LocalStoreError) -> Self {
        RepositoryError::Local(e)
    }
}
