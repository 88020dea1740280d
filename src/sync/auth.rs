/// Supplies the identity of the acting user. Consulted once per created
/// record to fill `created_by`.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> String;
}

/// A fixed user, typically taken from configuration.
#[derive(Debug, Clone)]
pub struct StaticAuthProvider {
    user: String,
}

impl StaticAuthProvider {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }
}

impl AuthProvider for StaticAuthProvider {
    fn current_user(&self) -> String {
        self.user.clone()
    }
}
