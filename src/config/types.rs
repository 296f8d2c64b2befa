use serde::{Deserialize, Serialize};

use crate::domain::{AliasDefinition, parse_alias_block};
use crate::error::Result;
use crate::ssh::RetryPolicy;

/// An orchestration document: alias definitions plus an ordered command list
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Document {
    /// Multi-line block of `alias = user@host` definitions
    #[serde(rename = "define-alias", default)]
    pub define_alias: String,

    /// Commands, run in order
    #[serde(default)]
    pub exec: Vec<ExecEntry>,

    #[serde(default)]
    pub settings: Settings,
}

impl Document {
    /// Parse the `define-alias` block.
    ///
    /// # Errors
    ///
    /// Returns `MalformedAlias` naming the first bad line.
    pub fn alias_definitions(&self) -> Result<Vec<AliasDefinition>> {
        parse_alias_block(&self.define_alias)
    }
}

/// One command to run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecEntry {
    /// Alias or literal `user@host`
    pub login: String,

    /// Shell command text, possibly multi-line
    pub cmd: String,

    /// Expected output; a mismatch is reported but does not fail the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,

    /// Follow-up command whose output is discarded
    #[serde(rename = "quiet-cmd", default, skip_serializing_if = "Option::is_none")]
    pub quiet_cmd: Option<String>,

    /// Free-form note, only logged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ExecEntry {
    #[must_use]
    pub fn new(login: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            cmd: cmd.into(),
            out: None,
            quiet_cmd: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// SSH port used for every host
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public key installed on hosts that reject key authentication
    #[serde(default = "default_public_key")]
    pub public_key: String,

    #[serde(default)]
    pub host_key_verification: HostKeyVerification,

    /// What to do when a command fails
    #[serde(default)]
    pub on_error: FailurePolicy,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: default_port(),
            public_key: default_public_key(),
            host_key_verification: HostKeyVerification::default(),
            on_error: FailurePolicy::default(),
            limits: LimitsConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

const fn default_port() -> u16 {
    22
}

fn default_public_key() -> String {
    "~/.ssh/id_rsa.pub".to_string()
}

/// Host key verification mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// Strict: reject unknown hosts, reject mismatched keys
    Strict,
    /// Accept new: add unknown hosts to `known_hosts`, reject mismatched keys.
    /// Default, since first contact with a host is the normal case here.
    #[default]
    #[serde(alias = "acceptnew")]
    AcceptNew,
    /// Off: accept all keys (insecure, for testing only)
    Off,
}

/// Whether a failed command stops the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failure
    #[default]
    Abort,
    /// Record the failure and move on to the next command
    Continue,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,

    #[serde(default = "default_keepalive")]
    pub keepalive_interval_seconds: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            command_timeout_seconds: default_command_timeout(),
            max_output_bytes: default_max_output_bytes(),
            connection_timeout_seconds: default_connection_timeout(),
            keepalive_interval_seconds: default_keepalive(),
        }
    }
}

const fn default_command_timeout() -> u64 {
    3600
}

const fn default_max_output_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

const fn default_connection_timeout() -> u64 {
    30
}

const fn default_keepalive() -> u64 {
    30
}
