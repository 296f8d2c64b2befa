//! Domain module - Core orchestration logic
//!
//! Login identities, the connection registry with its key bootstrap loop, and
//! the execution engine that runs commands over registered connections.

pub mod bootstrap;
pub mod engine;
pub mod identity;
pub mod registry;

pub use bootstrap::{Bootstrapper, ConnectState, authorized_keys_command};
pub use engine::{CommandFailure, CommandOutcome, ExecutionEngine, RunReport};
pub use identity::{
    AliasDefinition, UserHost, parse_alias_block, parse_alias_line, validate_user_host,
};
pub use registry::ConnectionRegistry;
