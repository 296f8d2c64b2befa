use thiserror::Error;

/// Broad category of an [`OrchError`], used by callers that decide whether to
/// abort the run or continue with the next command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Connection,
    Execution,
    Lookup,
}

#[derive(Error, Debug)]
pub enum OrchError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Document not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Invalid document: {field} - {reason}")]
    ConfigInvalid { field: String, reason: String },

    #[error("Malformed alias definition (expected `alias = user@host`): {line}")]
    MalformedAlias { line: String },

    #[error("Invalid login '{login}': must be a defined alias or user@host")]
    InvalidLogin { login: String },

    // Connection errors
    #[error("SSH connection failed to {host}: {reason}")]
    SshConnection { host: String, reason: String },

    #[error("SSH authentication failed for {user}@{host}")]
    SshAuth { user: String, host: String },

    #[error("SSH agent unavailable: {reason}")]
    SshAgent { reason: String },

    #[error("SSH host key mismatch for {host}: expected {expected}, got {actual}")]
    SshHostKeyMismatch {
        host: String,
        expected: String,
        actual: String,
    },

    #[error("SSH host key unknown for {host} (fingerprint: {fingerprint})")]
    SshHostKeyUnknown { host: String, fingerprint: String },

    #[error("Key bootstrap failed for {target}: {reason}")]
    Bootstrap { target: String, reason: String },

    #[error("Key authentication for {target} still failing after {rounds} bootstrap round(s)")]
    BootstrapExhausted { target: String, rounds: u32 },

    #[error("Skipping {target}, an earlier connection attempt failed: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("Failed to read credentials: {reason}")]
    Credentials { reason: String },

    // Execution errors
    #[error("SSH command execution failed: {reason}")]
    SshExec { reason: String },

    #[error("SSH command timeout after {seconds}s")]
    SshTimeout { seconds: u64 },

    #[error("SSH output too large (limit: {limit_bytes} bytes)")]
    SshOutputTooLarge { limit_bytes: usize },

    #[error("Command on {login} exited with status {exit_code}: {command}")]
    CommandFailed {
        login: String,
        command: String,
        exit_code: u32,
        output: String,
    },

    // Lookup errors
    #[error("Unknown login: {login} (not registered)")]
    UnknownLogin { login: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // YAML errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

impl OrchError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::ConfigNotFound { .. }
            | Self::ConfigInvalid { .. }
            | Self::MalformedAlias { .. }
            | Self::InvalidLogin { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Yaml(_) => ErrorKind::Config,
            Self::SshConnection { .. }
            | Self::SshAuth { .. }
            | Self::SshAgent { .. }
            | Self::SshHostKeyMismatch { .. }
            | Self::SshHostKeyUnknown { .. }
            | Self::Bootstrap { .. }
            | Self::BootstrapExhausted { .. }
            | Self::Unreachable { .. }
            | Self::Credentials { .. } => ErrorKind::Connection,
            Self::SshExec { .. }
            | Self::SshTimeout { .. }
            | Self::SshOutputTooLarge { .. }
            | Self::CommandFailed { .. } => ErrorKind::Execution,
            Self::UnknownLogin { .. } => ErrorKind::Lookup,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchError>;
