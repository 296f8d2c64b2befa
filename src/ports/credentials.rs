//! Credential Provider Port
//!
//! Supplies the one-time password used to bootstrap key access on a host.
//! The CLI reads it from the controlling terminal; tests inject a fixed one.

use zeroize::Zeroizing;

use crate::domain::UserHost;
use crate::error::Result;

/// Source of passwords for key bootstrap
pub trait CredentialProvider: Send + Sync {
    /// Get the login password for `target`
    fn password_for(&self, target: &UserHost) -> Result<Zeroizing<String>>;
}

/// Always answers with the same password
pub struct StaticPassword(Zeroizing<String>);

impl StaticPassword {
    #[must_use]
    pub fn new(password: impl Into<String>) -> Self {
        Self(Zeroizing::new(password.into()))
    }
}

impl CredentialProvider for StaticPassword {
    fn password_for(&self, _target: &UserHost) -> Result<Zeroizing<String>> {
        Ok(self.0.clone())
    }
}
