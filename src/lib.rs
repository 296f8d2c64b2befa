#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod ssh;

pub use config::{Document, load_document};
pub use domain::{ConnectionRegistry, ExecutionEngine, RunReport, UserHost};
pub use error::{ErrorKind, OrchError, Result};
pub use ports::{CredentialProvider, SshClientTrait, SshConnector};
