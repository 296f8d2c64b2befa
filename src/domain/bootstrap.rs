//! Key bootstrap
//!
//! Connects with agent keys and, when a host refuses them, installs the local
//! public key through a one-time password session before trying again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{LimitsConfig, Settings};
use crate::domain::UserHost;
use crate::error::{OrchError, Result};
use crate::ports::{CredentialProvider, SshClientTrait, SshConnector};
use crate::ssh::{RetryPolicy, triggers_bootstrap};

/// POSIX single-quote escaping
fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Build the remote command that installs `public_key` for the login user.
///
/// Creates `~/.ssh` and `authorized_keys` when missing, keeps a copy of the
/// previous file as `authorized_keys.bak`, drops every line containing
/// `marker` and appends the key. grep exiting 1 (no line kept) is fine, a
/// read error (exit 2) stops the pipeline before the key is appended.
#[must_use]
pub fn authorized_keys_command(marker: &str, public_key: &str) -> String {
    let marker = shell_escape(marker);
    let public_key = shell_escape(public_key.trim());
    format!(
        "mkdir -p ~/.ssh && chmod 700 ~/.ssh && touch ~/.ssh/authorized_keys && \
         cp ~/.ssh/authorized_keys ~/.ssh/authorized_keys.bak && \
         {{ grep -vF -- {marker} ~/.ssh/authorized_keys.bak; [ $? -le 1 ]; }} > ~/.ssh/authorized_keys && \
         printf '%s\\n' {public_key} >> ~/.ssh/authorized_keys && \
         chmod 600 ~/.ssh/authorized_keys"
    )
}

/// Where the connect loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    /// Trying agent authentication; `round` bootstraps done so far
    Connecting { round: u32 },
    /// Installing the public key, `round` is 1-indexed
    Bootstrapping { round: u32 },
}

/// Runs the connect-or-bootstrap loop for one host at a time
pub struct Bootstrapper {
    credentials: Arc<dyn CredentialProvider>,
    public_key_path: PathBuf,
    policy: RetryPolicy,
    limits: LimitsConfig,
}

impl Bootstrapper {
    #[must_use]
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        public_key_path: impl Into<PathBuf>,
        policy: RetryPolicy,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            credentials,
            public_key_path: public_key_path.into(),
            policy,
            limits,
        }
    }

    /// Build from document settings, expanding `~` in the public key path
    #[must_use]
    pub fn from_settings(credentials: Arc<dyn CredentialProvider>, settings: &Settings) -> Self {
        let expanded = shellexpand::tilde(&settings.public_key).into_owned();
        Self::new(
            credentials,
            expanded,
            settings.retry.clone(),
            settings.limits.clone(),
        )
    }

    #[must_use]
    pub fn public_key_path(&self) -> &Path {
        &self.public_key_path
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Connect to `target`, bootstrapping key access as often as the policy
    /// allows.
    ///
    /// # Errors
    ///
    /// - Agent and host key errors are returned as-is without bootstrapping
    /// - `Bootstrap` when a bootstrap round itself fails
    /// - `BootstrapExhausted` when key authentication still fails after the
    ///   last allowed round
    pub async fn connect_or_bootstrap<C: SshConnector>(
        &self,
        connector: &C,
        target: &UserHost,
    ) -> Result<C::Client> {
        let mut state = ConnectState::Connecting { round: 0 };

        loop {
            state = match state {
                ConnectState::Connecting { round } => match connector.connect(target).await {
                    Ok(client) => {
                        if round > 0 {
                            info!(login = %target, rounds = round, "Key access established");
                        }
                        return Ok(client);
                    }
                    Err(e) if triggers_bootstrap(&e) => {
                        let next = round + 1;
                        if !self.policy.allows_round(next) {
                            warn!(login = %target, rounds = round, error = %e, "Giving up on key authentication");
                            return Err(OrchError::BootstrapExhausted {
                                target: target.canonical(),
                                rounds: round,
                            });
                        }
                        info!(login = %target, round = next, error = %e, "Key authentication failed, bootstrapping");
                        ConnectState::Bootstrapping { round: next }
                    }
                    Err(e) => return Err(e),
                },
                ConnectState::Bootstrapping { round } => {
                    self.bootstrap(connector, target)
                        .await
                        .map_err(|e| OrchError::Bootstrap {
                            target: target.canonical(),
                            reason: e.to_string(),
                        })?;

                    let delay = self.policy.delay_for_attempt(round);
                    if !delay.is_zero() {
                        debug!(login = %target, delay_ms = delay.as_millis(), "Waiting before reconnect");
                        sleep(delay).await;
                    }
                    ConnectState::Connecting { round }
                }
            };
        }
    }

    /// One bootstrap round: password session, then key installation
    async fn bootstrap<C: SshConnector>(&self, connector: &C, target: &UserHost) -> Result<()> {
        if !self.public_key_path.exists() {
            warn!(path = %self.public_key_path.display(), "Public key file does not exist");
        }

        let password = self.credentials.password_for(target)?;
        let client = connector.connect_with_password(target, &password).await?;
        drop(password);

        let result = self.install_key(&client, target).await;

        if let Err(e) = client.close().await {
            debug!(login = %target, error = %e, "Closing setup session failed");
        }
        result
    }

    async fn install_key<T: SshClientTrait>(&self, client: &T, target: &UserHost) -> Result<()> {
        let public_key = std::fs::read_to_string(&self.public_key_path).map_err(|e| {
            OrchError::Config(format!(
                "Failed to read {} for {target}: {e}",
                self.public_key_path.display()
            ))
        })?;

        let command = authorized_keys_command(&target.canonical(), &public_key);
        let output = client.exec(&command, &self.limits).await?;
        if output.exit_code != 0 {
            return Err(OrchError::SshExec {
                reason: format!(
                    "authorized_keys update exited with status {}: {}",
                    output.exit_code,
                    output.output.trim()
                ),
            });
        }

        info!(login = %target, "Public key installed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{MockSshConnector, StaticPassword};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;
    use zeroize::Zeroizing;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIFakeKeyMaterial me@laptop";

    fn target() -> UserHost {
        UserHost::new("root", "blackhost.com")
    }

    fn key_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{KEY}").unwrap();
        file
    }

    fn bootstrapper(key: &Path, password: &str, policy: RetryPolicy) -> Bootstrapper {
        Bootstrapper::new(
            Arc::new(StaticPassword::new(password)),
            key,
            policy,
            LimitsConfig::default(),
        )
    }

    struct NoTerminal;

    impl CredentialProvider for NoTerminal {
        fn password_for(&self, _target: &UserHost) -> Result<Zeroizing<String>> {
            Err(OrchError::Credentials {
                reason: "not a terminal".to_string(),
            })
        }
    }

    #[test]
    fn test_authorized_keys_command() {
        let cmd = authorized_keys_command("root@blackhost.com", "ssh-rsa AAAA me@laptop\n");
        assert!(cmd.starts_with("mkdir -p ~/.ssh"));
        assert!(cmd.contains("grep -vF -- 'root@blackhost.com' ~/.ssh/authorized_keys.bak"));
        assert!(cmd.contains("printf '%s\\n' 'ssh-rsa AAAA me@laptop' >> ~/.ssh/authorized_keys"));
        assert!(cmd.ends_with("chmod 600 ~/.ssh/authorized_keys"));
    }

    #[test]
    fn test_authorized_keys_command_fails_on_grep_error() {
        let cmd = authorized_keys_command("root@blackhost.com", "ssh-rsa AAAA me@laptop");
        assert!(cmd.contains(
            "{ grep -vF -- 'root@blackhost.com' ~/.ssh/authorized_keys.bak; [ $? -le 1 ]; } > ~/.ssh/authorized_keys && "
        ));
        assert!(!cmd.contains("|| true"));
    }

    #[test]
    fn test_authorized_keys_command_quotes_values() {
        let cmd = authorized_keys_command("o'brien@host", "key; rm -rf ~");
        assert!(cmd.contains("'o'\\''brien@host'"));
        assert!(cmd.contains("'key; rm -rf ~'"));
    }

    #[test]
    fn test_from_settings_expands_home() {
        let bootstrapper =
            Bootstrapper::from_settings(Arc::new(StaticPassword::new("x")), &Settings::default());
        assert!(!bootstrapper.public_key_path().starts_with("~"));
        assert!(bootstrapper.public_key_path().ends_with(".ssh/id_rsa.pub"));
        assert_eq!(bootstrapper.policy().max_bootstrap_rounds, 3);
    }

    #[tokio::test]
    async fn test_accepted_key_skips_bootstrap() {
        let connector = MockSshConnector::new();
        connector.add_host("root@blackhost.com");
        let key = key_file();

        let client = bootstrapper(key.path(), "hunter2", RetryPolicy::with_max_rounds(1))
            .connect_or_bootstrap(&connector, &target())
            .await
            .unwrap();

        assert_eq!(client.host_name(), "root@blackhost.com");
        assert_eq!(connector.password_connect_count("root@blackhost.com"), 0);
        assert!(connector.exec_log().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_key_is_bootstrapped() {
        let connector = MockSshConnector::new();
        connector.add_host_needing_bootstrap("root@blackhost.com", "hunter2");
        let key = key_file();

        let result = bootstrapper(key.path(), "hunter2", RetryPolicy::with_max_rounds(1))
            .connect_or_bootstrap(&connector, &target())
            .await;

        assert!(result.is_ok());
        assert_eq!(connector.key_connect_count("root@blackhost.com"), 2);
        assert_eq!(connector.password_connect_count("root@blackhost.com"), 1);

        let log = connector.exec_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1, authorized_keys_command("root@blackhost.com", KEY));
    }

    #[tokio::test]
    async fn test_bootstrap_capped_at_one_round() {
        let connector = MockSshConnector::new();
        connector.add_host_rejecting_keys("root@blackhost.com", "hunter2");
        let key = key_file();

        let result = bootstrapper(key.path(), "hunter2", RetryPolicy::with_max_rounds(1))
            .connect_or_bootstrap(&connector, &target())
            .await;

        assert!(matches!(
            result,
            Err(OrchError::BootstrapExhausted { ref target, rounds: 1 }) if target == "root@blackhost.com"
        ));
        assert_eq!(connector.key_connect_count("root@blackhost.com"), 2);
        assert_eq!(connector.password_connect_count("root@blackhost.com"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_waits_for_backoff_delay() {
        let connector = MockSshConnector::new();
        connector.add_host_needing_bootstrap("root@blackhost.com", "hunter2");
        let key = key_file();
        let policy = RetryPolicy {
            max_bootstrap_rounds: 1,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            jitter: 0.0,
        };
        let start = tokio::time::Instant::now();

        let result = bootstrapper(key.path(), "hunter2", policy)
            .connect_or_bootstrap(&connector, &target())
            .await;

        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert!(start.elapsed() < Duration::from_millis(2000));
        assert_eq!(connector.key_connect_count("root@blackhost.com"), 2);
    }

    #[tokio::test]
    async fn test_bootstrap_rounds_follow_policy() {
        let connector = MockSshConnector::new();
        connector.add_host_rejecting_keys("root@blackhost.com", "hunter2");
        let key = key_file();

        let result = bootstrapper(key.path(), "hunter2", RetryPolicy::with_max_rounds(3))
            .connect_or_bootstrap(&connector, &target())
            .await;

        assert!(matches!(result, Err(OrchError::BootstrapExhausted { rounds: 3, .. })));
        assert_eq!(connector.password_connect_count("root@blackhost.com"), 3);
    }

    #[tokio::test]
    async fn test_wrong_password_is_fatal() {
        let connector = MockSshConnector::new();
        connector.add_host_needing_bootstrap("root@blackhost.com", "hunter2");
        let key = key_file();

        let result = bootstrapper(key.path(), "wrong", RetryPolicy::with_max_rounds(3))
            .connect_or_bootstrap(&connector, &target())
            .await;

        assert!(matches!(result, Err(OrchError::Bootstrap { .. })));
        assert_eq!(connector.key_connect_count("root@blackhost.com"), 1);
        assert_eq!(connector.password_connect_count("root@blackhost.com"), 1);
    }

    #[tokio::test]
    async fn test_failed_key_install_is_fatal() {
        let connector = MockSshConnector::new();
        connector.add_host_needing_bootstrap("root@blackhost.com", "hunter2");
        connector.set_response(
            "root@blackhost.com",
            &authorized_keys_command("root@blackhost.com", KEY),
            "Read-only file system\n",
            1,
        );
        let key = key_file();

        let result = bootstrapper(key.path(), "hunter2", RetryPolicy::with_max_rounds(3))
            .connect_or_bootstrap(&connector, &target())
            .await;

        match result {
            Err(OrchError::Bootstrap { reason, .. }) => {
                assert!(reason.contains("Read-only file system"));
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("bootstrap should fail"),
        }
    }

    #[tokio::test]
    async fn test_missing_public_key_fails_after_password_session() {
        let connector = MockSshConnector::new();
        connector.add_host_needing_bootstrap("root@blackhost.com", "hunter2");
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("id_rsa.pub");

        let result = bootstrapper(&missing, "hunter2", RetryPolicy::with_max_rounds(1))
            .connect_or_bootstrap(&connector, &target())
            .await;

        assert!(matches!(result, Err(OrchError::Bootstrap { .. })));
        assert_eq!(connector.password_connect_count("root@blackhost.com"), 1);
        assert!(connector.exec_log().is_empty());
    }

    #[tokio::test]
    async fn test_credentials_failure_is_fatal() {
        let connector = MockSshConnector::new();
        connector.add_host_needing_bootstrap("root@blackhost.com", "hunter2");
        let key = key_file();
        let bootstrapper = Bootstrapper::new(
            Arc::new(NoTerminal),
            key.path(),
            RetryPolicy::with_max_rounds(1),
            LimitsConfig::default(),
        );

        let result = bootstrapper.connect_or_bootstrap(&connector, &target()).await;

        assert!(
            matches!(result, Err(OrchError::Bootstrap { reason, .. }) if reason.contains("not a terminal"))
        );
        assert_eq!(connector.password_connect_count("root@blackhost.com"), 0);
    }

    #[tokio::test]
    async fn test_agent_error_does_not_bootstrap() {
        let connector = MockSshConnector::new();
        connector.add_host_error("root@blackhost.com", |_| OrchError::SshAgent {
            reason: "SSH_AUTH_SOCK not set".to_string(),
        });
        let key = key_file();

        let result = bootstrapper(key.path(), "hunter2", RetryPolicy::unbounded())
            .connect_or_bootstrap(&connector, &target())
            .await;

        assert!(matches!(result, Err(OrchError::SshAgent { .. })));
        assert_eq!(connector.password_connect_count("root@blackhost.com"), 0);
    }

    #[tokio::test]
    async fn test_host_key_mismatch_does_not_bootstrap() {
        let connector = MockSshConnector::new();
        connector.add_host_error("root@blackhost.com", |t| OrchError::SshHostKeyMismatch {
            host: t.host.clone(),
            expected: "key from known_hosts line 3".to_string(),
            actual: "SHA256:abc".to_string(),
        });
        let key = key_file();

        let result = bootstrapper(key.path(), "hunter2", RetryPolicy::unbounded())
            .connect_or_bootstrap(&connector, &target())
            .await;

        assert!(matches!(result, Err(OrchError::SshHostKeyMismatch { .. })));
        assert_eq!(connector.password_connect_count("root@blackhost.com"), 0);
    }

    #[tokio::test]
    async fn test_unbounded_policy_bootstraps_until_accepted() {
        let connector = MockSshConnector::new();
        connector.add_host_needing_bootstrap("root@blackhost.com", "hunter2");
        let key = key_file();
        let policy = RetryPolicy {
            initial_delay_ms: 0,
            ..RetryPolicy::unbounded()
        };

        let result = bootstrapper(key.path(), "hunter2", policy)
            .connect_or_bootstrap(&connector, &target())
            .await;

        assert!(result.is_ok());
    }
}
