//! Terminal password prompt

use zeroize::Zeroizing;

use crate::domain::UserHost;
use crate::error::{OrchError, Result};
use crate::ports::CredentialProvider;

/// Reads the bootstrap password from the controlling terminal without echo
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl CredentialProvider for TerminalPrompt {
    fn password_for(&self, target: &UserHost) -> Result<Zeroizing<String>> {
        eprintln!("One time setup for {target}!");
        rpassword::prompt_password("Password: ")
            .map(Zeroizing::new)
            .map_err(|e| OrchError::Credentials {
                reason: format!("Failed to read password for {target}: {e}"),
            })
    }
}
