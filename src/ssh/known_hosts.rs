//! Host key checks against `~/.ssh/known_hosts`
//!
//! Thin wrapper around russh's `known_hosts` support. The default mode learns
//! keys of hosts seen for the first time, since a run usually reaches hosts
//! that were never contacted before.

use russh::keys::known_hosts::{check_known_hosts, learn_known_hosts};
use russh::keys::{Error as KeyError, HashAlg, PublicKey};
use tracing::{debug, info, warn};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use crate::config::HostKeyVerification;
use crate::error::{OrchError, Result};

/// Result of verifying a host key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// Key matches a known entry
    Match,
    /// Key does not match the expected key (line number where mismatch occurred)
    Mismatch { line: usize },
    /// Host is not in `known_hosts`
    Unknown,
}

/// Verify a host key against `known_hosts`
///
/// # Errors
///
/// Returns an error if the `known_hosts` file cannot be read or parsed.
pub fn verify(hostname: &str, port: u16, key: &PublicKey) -> Result<VerifyResult> {
    match check_known_hosts(hostname, port, key) {
        Ok(true) => {
            debug!(hostname = %hostname, port = %port, "Host key verified");
            Ok(VerifyResult::Match)
        }
        Ok(false) => {
            debug!(hostname = %hostname, port = %port, "Host key not in known_hosts");
            Ok(VerifyResult::Unknown)
        }
        Err(KeyError::KeyChanged { line }) => {
            warn!(
                hostname = %hostname,
                port = %port,
                line = %line,
                "Host key mismatch detected"
            );
            Ok(VerifyResult::Mismatch { line })
        }
        Err(e) => Err(OrchError::SshConnection {
            host: hostname.to_string(),
            reason: format!("Failed to check known_hosts: {e}"),
        }),
    }
}

/// Add a host key to `known_hosts`
///
/// Uses russh's built-in `learn_known_hosts` which appends to the file.
///
/// # Errors
///
/// Returns an error if the `known_hosts` file cannot be written to.
pub fn add_key(hostname: &str, port: u16, key: &PublicKey) -> Result<()> {
    learn_known_hosts(hostname, port, key).map_err(|e| OrchError::SshConnection {
        host: hostname.to_string(),
        reason: format!("Failed to add host key to known_hosts: {e}"),
    })?;

    debug!(hostname = %hostname, port = %port, "Added host key to known_hosts");
    Ok(())
}

/// Get the fingerprint of a public key
#[must_use]
pub fn fingerprint(key: &PublicKey) -> String {
    key.fingerprint(HashAlg::Sha256).to_string()
}

/// Check that the `known_hosts` file has secure permissions (Unix only).
///
/// Warns if the file is readable by others (mode not 0600 or 0644).
#[cfg(unix)]
fn check_known_hosts_permissions() {
    let Some(home) = dirs::home_dir() else {
        return;
    };
    let known_hosts_path = home.join(".ssh").join("known_hosts");
    if let Ok(metadata) = std::fs::metadata(&known_hosts_path) {
        let mode = metadata.mode() & 0o777;
        if mode & 0o077 != 0 && mode != 0o644 {
            warn!(
                path = %known_hosts_path.display(),
                mode = format!("{mode:o}"),
                "known_hosts is writable or readable by others"
            );
        }
    }
}

#[cfg(not(unix))]
const fn check_known_hosts_permissions() {}

/// Verify a host key according to the verification mode
///
/// # Errors
///
/// Returns an error if:
/// - The host key is mismatched (in `Strict` or `AcceptNew` mode)
/// - The host is unknown (in `Strict` mode)
/// - The `known_hosts` file cannot be read or written to
pub fn verify_host_key(
    hostname: &str,
    port: u16,
    key: &PublicKey,
    mode: HostKeyVerification,
) -> Result<()> {
    if mode == HostKeyVerification::Off {
        warn!(hostname = %hostname, "Host key verification is disabled, accepting any key");
        return Ok(());
    }

    check_known_hosts_permissions();

    match (verify(hostname, port, key)?, mode) {
        (VerifyResult::Match, _) => Ok(()),
        (VerifyResult::Mismatch { line }, _) => Err(OrchError::SshHostKeyMismatch {
            host: hostname.to_string(),
            expected: format!("key from known_hosts line {line}"),
            actual: fingerprint(key),
        }),
        (VerifyResult::Unknown, HostKeyVerification::AcceptNew) => {
            info!(hostname = %hostname, fingerprint = %fingerprint(key), "Learning new host key");
            add_key(hostname, port, key)
        }
        (VerifyResult::Unknown, _) => Err(OrchError::SshHostKeyUnknown {
            host: hostname.to_string(),
            fingerprint: fingerprint(key),
        }),
    }
}
