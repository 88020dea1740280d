use std::fmt;

/// Why a remote call failed. Only the kind decides whether a retry can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// The store could not be reached (offline, refused, 5xx).
    Unavailable,
    Timeout,
    /// Credentials missing, unknown or expired.
    Unauthorized,
    PermissionDenied,
    /// Rate limit or storage quota hit.
    QuotaExceeded,
    /// The store rejected the document or the request.
    Malformed,
    /// The store already holds a newer version of the document.
    Stale,
    NotFound,
}

impl RemoteErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorKind::Unavailable => "unavailable",
            RemoteErrorKind::Timeout => "timeout",
            RemoteErrorKind::Unauthorized => "unauthorized",
            RemoteErrorKind::PermissionDenied => "permission denied",
            RemoteErrorKind::QuotaExceeded => "quota exceeded",
            RemoteErrorKind::Malformed => "malformed",
            RemoteErrorKind::Stale => "stale",
            RemoteErrorKind::NotFound => "not found",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure of a single remote store call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Unavailable, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Malformed, message)
    }

    /// True when the same call may succeed later without anything changing
    /// on our side.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            RemoteErrorKind::Unavailable | RemoteErrorKind::Timeout | RemoteErrorKind::QuotaExceeded
        )
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Remote store {}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteError {}
