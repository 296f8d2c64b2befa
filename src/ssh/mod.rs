mod client;
mod connector;
pub mod known_hosts;
mod retry;

pub use client::{CommandOutput, ConnectOptions, SshClient};
pub use connector::RealSshConnector;
pub use known_hosts::{VerifyResult, verify_host_key};
pub use retry::{RetryPolicy, triggers_bootstrap};
