//! SSH Connector Port
//!
//! This module defines traits for SSH connection creation and operations,
//! abstracting away the underlying SSH implementation for testability.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::config::LimitsConfig;
use crate::domain::UserHost;
use crate::error::Result;
use crate::ssh::CommandOutput;

/// Trait for creating SSH connections
///
/// This trait abstracts the SSH connection creation, allowing for
/// mock implementations in tests without requiring real SSH servers.
#[async_trait]
pub trait SshConnector: Send + Sync {
    /// The type of client returned by this connector
    type Client: SshClientTrait;

    /// Connect and authenticate with the identities offered by the SSH agent
    async fn connect(&self, target: &UserHost) -> Result<Self::Client>;

    /// Connect and authenticate with a password
    ///
    /// Only used to bootstrap key access on a host that rejects our keys.
    async fn connect_with_password(&self, target: &UserHost, password: &str)
    -> Result<Self::Client>;
}

/// Trait for SSH client operations
///
/// This trait abstracts operations on an established SSH connection,
/// allowing for mock implementations in tests.
#[async_trait]
pub trait SshClientTrait: Send + Sync {
    /// Execute a command on the remote host in a fresh session channel
    async fn exec(&self, command: &str, limits: &LimitsConfig) -> Result<CommandOutput>;

    /// Get the `user@host` this client is bound to
    fn host_name(&self) -> &str;

    /// Close the connection
    fn close(self) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}
