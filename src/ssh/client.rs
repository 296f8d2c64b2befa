use std::sync::Arc;
use std::time::Duration;

use russh::ChannelMsg;
use russh::client::{self, Config, Handle, Handler};
use russh::keys::PublicKey;
use serde::Serialize;
use tokio::time::timeout;

use crate::config::{HostKeyVerification, LimitsConfig};
use crate::domain::UserHost;
use crate::error::{OrchError, Result};
use crate::ssh::known_hosts;

/// Sanitize SSH error messages to prevent credential leakage.
/// Masks authentication method names and truncates data dumps.
pub(crate) fn sanitize_ssh_error(error: &impl std::fmt::Display) -> String {
    let mut msg = error.to_string();
    for method in &["publickey", "keyboard-interactive", "gssapi-with-mic"] {
        msg = msg.replace(method, "***");
    }
    if msg.len() > 500 {
        let mut end = 500;
        while !msg.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &msg[..end])
    } else {
        msg
    }
}

/// Output from a command execution
///
/// Standard output and standard error arrive on the same channel and are kept
/// in arrival order in `output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub output: String,
    pub exit_code: u32,
    pub duration_ms: u64,
}

/// Transport settings shared by every connection of a run
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub port: u16,
    pub host_key_verification: HostKeyVerification,
    pub limits: LimitsConfig,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            port: 22,
            host_key_verification: HostKeyVerification::default(),
            limits: LimitsConfig::default(),
        }
    }
}

/// Error raised inside the russh handler
///
/// Keeps the host key verdict apart from transport errors so a rejected key
/// is not reported as a plain connection failure.
#[derive(Debug)]
enum HandlerError {
    Ssh(russh::Error),
    HostKey(OrchError),
}

impl From<russh::Error> for HandlerError {
    fn from(e: russh::Error) -> Self {
        Self::Ssh(e)
    }
}

/// SSH client handler for russh with host key verification
struct ClientHandler {
    hostname: String,
    port: u16,
    verification_mode: HostKeyVerification,
}

impl ClientHandler {
    const fn new(hostname: String, port: u16, verification_mode: HostKeyVerification) -> Self {
        Self {
            hostname,
            port,
            verification_mode,
        }
    }
}

impl Handler for ClientHandler {
    type Error = HandlerError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        known_hosts::verify_host_key(
            &self.hostname,
            self.port,
            server_public_key,
            self.verification_mode,
        )
        .map(|()| true)
        .map_err(|e| {
            tracing::error!(host = %self.hostname, error = %e, "Host key verification failed");
            HandlerError::HostKey(e)
        })
    }
}

/// An authenticated SSH connection to one `user@host`
pub struct SshClient {
    handle: Handle<ClientHandler>,
    host_name: String,
}

impl SshClient {
    /// Connect and authenticate with the identities held by the SSH agent
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The SSH connection cannot be established (`SshConnection`)
    /// - Host key verification fails (`SshHostKeyMismatch`, `SshHostKeyUnknown`)
    /// - The agent is unreachable or holds no identity (`SshAgent`)
    /// - No agent identity is accepted (`SshAuth`)
    #[must_use = "the SSH client must be used or closed"]
    pub async fn connect_with_agent(target: &UserHost, options: &ConnectOptions) -> Result<Self> {
        let handle = Self::establish_connection(target, options).await?;
        Self::auth_with_agent(handle, target).await
    }

    /// Connect and authenticate with a password
    ///
    /// # Errors
    ///
    /// Same as [`Self::connect_with_agent`], except that agent errors cannot
    /// occur and a rejected password is reported as `SshAuth`.
    #[must_use = "the SSH client must be used or closed"]
    pub async fn connect_with_password(
        target: &UserHost,
        options: &ConnectOptions,
        password: &str,
    ) -> Result<Self> {
        let handle = Self::establish_connection(target, options).await?;
        Self::auth_with_password(handle, target, password).await
    }

    /// Establish the TCP/SSH connection
    async fn establish_connection(
        target: &UserHost,
        options: &ConnectOptions,
    ) -> Result<Handle<ClientHandler>> {
        let limits = &options.limits;
        let config = Arc::new(Config {
            inactivity_timeout: Some(Duration::from_secs(limits.keepalive_interval_seconds)),
            keepalive_interval: Some(Duration::from_secs(limits.keepalive_interval_seconds)),
            keepalive_max: 3,
            ..Default::default()
        });

        let handler = ClientHandler::new(
            target.host.clone(),
            options.port,
            options.host_key_verification,
        );
        let addr = format!("{}:{}", target.host, options.port);
        let timeout_secs = limits.connection_timeout_seconds;

        tracing::debug!(login = %target, addr = %addr, "Connecting");

        timeout(
            Duration::from_secs(timeout_secs),
            client::connect(config, addr.as_str(), handler),
        )
        .await
        .map_err(|_| {
            tracing::error!(host = %target.host, addr = %addr, timeout_secs, "SSH connection timeout");
            OrchError::SshConnection {
                host: target.host.clone(),
                reason: format!("Connection timeout after {timeout_secs}s"),
            }
        })?
        .map_err(|e| match e {
            HandlerError::HostKey(e) => e,
            HandlerError::Ssh(e) => {
                tracing::error!(host = %target.host, addr = %addr, error = %e, "SSH connection failed");
                OrchError::SshConnection {
                    host: target.host.clone(),
                    reason: sanitize_ssh_error(&e),
                }
            }
        })
    }

    /// Authenticate using a password
    async fn auth_with_password(
        mut handle: Handle<ClientHandler>,
        target: &UserHost,
        password: &str,
    ) -> Result<Self> {
        let auth_failed = || OrchError::SshAuth {
            user: target.user.clone(),
            host: target.host.clone(),
        };

        let auth_result = handle
            .authenticate_password(&target.user, password)
            .await
            .map_err(|e| {
                tracing::error!(login = %target, error = %sanitize_ssh_error(&e), method = "password", "SSH password authentication error");
                auth_failed()
            })?;

        if !auth_result.success() {
            tracing::error!(login = %target, method = "password", "SSH password authentication failed");
            return Err(auth_failed());
        }

        Ok(Self {
            handle,
            host_name: target.canonical(),
        })
    }

    /// Authenticate using an SSH agent
    #[cfg(unix)]
    async fn auth_with_agent(mut handle: Handle<ClientHandler>, target: &UserHost) -> Result<Self> {
        use russh::keys::agent::client::AgentClient;

        let mut agent = AgentClient::connect_env().await.map_err(|e| {
            tracing::error!(login = %target, error = %e, "SSH agent connection failed");
            OrchError::SshAgent {
                reason: sanitize_ssh_error(&e),
            }
        })?;

        let identities = agent.request_identities().await.map_err(|e| {
            tracing::error!(login = %target, error = %e, "Failed to get agent identities");
            OrchError::SshAgent {
                reason: format!("Failed to get agent identities: {}", sanitize_ssh_error(&e)),
            }
        })?;

        if identities.is_empty() {
            return Err(OrchError::SshAgent {
                reason: "No identities available in SSH agent".to_string(),
            });
        }

        let mut last_error: Option<String> = None;
        for public_key in &identities {
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .ok()
                .flatten()
                .flatten();

            match handle
                .authenticate_publickey_with(&target.user, public_key.clone(), hash_alg, &mut agent)
                .await
            {
                Ok(result) if result.success() => {
                    return Ok(Self {
                        handle,
                        host_name: target.canonical(),
                    });
                }
                Ok(_) => {
                    last_error = Some("Key rejected by server".to_string());
                }
                Err(e) => {
                    last_error = Some(sanitize_ssh_error(&e));
                }
            }
        }

        tracing::warn!(
            login = %target,
            identity_count = identities.len(),
            last_error = %last_error.unwrap_or_else(|| "unknown".to_string()),
            method = "agent",
            "No agent identity accepted"
        );
        Err(OrchError::SshAuth {
            user: target.user.clone(),
            host: target.host.clone(),
        })
    }

    #[cfg(not(unix))]
    async fn auth_with_agent(_handle: Handle<ClientHandler>, _target: &UserHost) -> Result<Self> {
        Err(OrchError::SshAgent {
            reason: "SSH agent not supported on this platform".to_string(),
        })
    }

    /// Execute a command on the remote host in a fresh session channel
    ///
    /// The channel is dropped when this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The SSH channel cannot be opened
    /// - The command cannot be started
    /// - The command times out
    /// - The output exceeds the maximum allowed size
    pub async fn exec(&self, command: &str, limits: &LimitsConfig) -> Result<CommandOutput> {
        let start = std::time::Instant::now();

        let mut channel =
            self.handle
                .channel_open_session()
                .await
                .map_err(|e| OrchError::SshExec {
                    reason: format!("Failed to open channel on {}: {e}", self.host_name),
                })?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| OrchError::SshExec {
                reason: format!("Failed to execute command on {}: {e}", self.host_name),
            })?;

        let (output, status) = Self::read_command_output(&mut channel, limits).await?;
        let exit_code = exit_code_from(&status, &self.host_name, command)?;

        #[expect(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;

        Ok(CommandOutput {
            output: String::from_utf8_lossy(&output).into_owned(),
            exit_code,
            duration_ms,
        })
    }

    /// Read combined command output from channel with timeout
    async fn read_command_output(
        channel: &mut russh::Channel<russh::client::Msg>,
        limits: &LimitsConfig,
    ) -> Result<(Vec<u8>, ExitReport)> {
        let mut output = Vec::new();
        let mut status = ExitReport::Missing;
        let command_timeout = Duration::from_secs(limits.command_timeout_seconds);

        let result = timeout(command_timeout, async {
            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => {
                        append_limited(&mut output, &data, limits.max_output_bytes)?;
                    }
                    Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                        append_limited(&mut output, &data, limits.max_output_bytes)?;
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        status = ExitReport::Status(exit_status);
                    }
                    Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                        status = ExitReport::Signal(format!("{signal_name:?}"));
                    }
                    None => break,
                    // ExitStatus may arrive after Eof; keep reading until the
                    // channel is closed.
                    _ => {}
                }
            }
            Ok((output, status))
        })
        .await;

        match result {
            Ok(output) => output,
            Err(_) => {
                let _ = channel.close().await;
                Err(OrchError::SshTimeout {
                    seconds: limits.command_timeout_seconds,
                })
            }
        }
    }

    /// Get the `user@host` of this connection
    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// Close the connection (with 5s timeout to avoid blocking)
    ///
    /// # Errors
    ///
    /// Returns an error if the disconnect message cannot be sent to the server.
    pub async fn close(self) -> Result<()> {
        match timeout(
            Duration::from_secs(5),
            self.handle
                .disconnect(russh::Disconnect::ByApplication, "", "en"),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(OrchError::SshConnection {
                host: self.host_name,
                reason: e.to_string(),
            }),
            Err(_) => {
                tracing::warn!(host = %self.host_name, "Timeout closing SSH connection, forcing drop");
                Ok(())
            }
        }
    }
}

/// How the remote side reported the end of a command
#[derive(Debug, Clone, PartialEq, Eq)]
enum ExitReport {
    Status(u32),
    Signal(String),
    Missing,
}

/// Turn the channel's exit report into an exit code. A command killed by a
/// signal or closed without a status is an execution error.
fn exit_code_from(report: &ExitReport, host: &str, command: &str) -> Result<u32> {
    match report {
        ExitReport::Status(code) => Ok(*code),
        ExitReport::Signal(signal) => Err(OrchError::SshExec {
            reason: format!("Command on {host} killed by signal {signal}: {command}"),
        }),
        ExitReport::Missing => Err(OrchError::SshExec {
            reason: format!("Command on {host} exited without a status: {command}"),
        }),
    }
}

fn append_limited(buffer: &mut Vec<u8>, data: &[u8], limit: usize) -> Result<()> {
    if buffer.len() + data.len() > limit {
        return Err(OrchError::SshOutputTooLarge { limit_bytes: limit });
    }
    buffer.extend_from_slice(data);
    Ok(())
}
