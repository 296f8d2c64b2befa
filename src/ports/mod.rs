//! Ports module - Trait definitions for hexagonal architecture
//!
//! This module contains the trait definitions (ports) that define
//! the boundaries between the orchestration core and external adapters.

mod connector;
mod credentials;

pub use connector::{SshClientTrait, SshConnector};
pub use credentials::{CredentialProvider, StaticPassword};

#[cfg(test)]
pub use connector::mock::{MockEvent, MockSshClient, MockSshConnector};
