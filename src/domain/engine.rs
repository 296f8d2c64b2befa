//! Execution engine
//!
//! Runs commands over registered connections, one at a time and in order.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ExecEntry, FailurePolicy, LimitsConfig, Settings};
use crate::domain::registry::ConnectionRegistry;
use crate::domain::validate_user_host;
use crate::error::{ErrorKind, OrchError, Result};
use crate::ports::{SshClientTrait, SshConnector};

/// Result of one successful command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub login: String,
    pub command: String,
    /// Standard output and standard error, interleaved
    pub output: String,
    pub exit_code: u32,
    pub duration_ms: u64,
}

/// A command that failed while the run continued
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandFailure {
    pub login: String,
    pub command: String,
    pub error: String,
}

/// Everything a run produced, in execution order
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<CommandOutcome>,
    pub failures: Vec<CommandFailure>,
}

impl RunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ExecutionEngine {
    limits: LimitsConfig,
    on_error: FailurePolicy,
}

impl ExecutionEngine {
    #[must_use]
    pub const fn new(limits: LimitsConfig, on_error: FailurePolicy) -> Self {
        Self { limits, on_error }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.limits.clone(), settings.on_error)
    }

    /// Run `command` over the connection registered as `identifier`
    ///
    /// # Errors
    ///
    /// - `UnknownLogin` if nothing is registered under `identifier`
    /// - `SshExec`, `SshTimeout` or `SshOutputTooLarge` from the session
    /// - `CommandFailed` if the command exits with a non-zero status
    pub async fn execute<C: SshConnector>(
        &self,
        registry: &ConnectionRegistry<C>,
        identifier: &str,
        command: &str,
    ) -> Result<CommandOutcome> {
        let handle = registry.require(identifier)?;

        debug!(login = %identifier, command = %command, "Executing command");
        let output = handle.exec(command, &self.limits).await?;

        if output.exit_code != 0 {
            warn!(login = %identifier, exit_code = output.exit_code, "Command failed");
            return Err(OrchError::CommandFailed {
                login: identifier.to_string(),
                command: command.to_string(),
                exit_code: output.exit_code,
                output: output.output,
            });
        }

        Ok(CommandOutcome {
            login: identifier.to_string(),
            command: command.to_string(),
            output: output.output,
            exit_code: output.exit_code,
            duration_ms: output.duration_ms,
        })
    }

    /// Make sure `login` is registered, connecting a literal `user@host` on
    /// first use
    ///
    /// # Errors
    ///
    /// `InvalidLogin` if `login` is neither registered nor a `user@host`, or
    /// any connection error.
    pub async fn resolve<C: SshConnector>(
        &self,
        registry: &mut ConnectionRegistry<C>,
        login: &str,
    ) -> Result<()> {
        if registry.exists(login) {
            return Ok(());
        }
        let target = validate_user_host(login).ok_or_else(|| OrchError::InvalidLogin {
            login: login.to_string(),
        })?;
        registry.register("", &target).await?;
        Ok(())
    }

    /// Run every entry in order
    ///
    /// # Errors
    ///
    /// With [`FailurePolicy::Abort`], the first failure. With
    /// [`FailurePolicy::Continue`] failures go to [`RunReport::failures`]
    /// instead.
    pub async fn run<C: SshConnector>(
        &self,
        registry: &mut ConnectionRegistry<C>,
        entries: &[ExecEntry],
    ) -> Result<RunReport> {
        self.run_with(registry, entries, |_| {}).await
    }

    /// Like [`Self::run`], calling `on_outcome` as soon as each command
    /// succeeds
    ///
    /// A `quiet-cmd` runs after its entry's `cmd` has been reported; only
    /// failures are recorded for it. Under [`FailurePolicy::Continue`] a
    /// literal `user@host` that could not be connected is skipped for the rest
    /// of the run.
    ///
    /// # Errors
    ///
    /// Same as [`Self::run`].
    pub async fn run_with<C, F>(
        &self,
        registry: &mut ConnectionRegistry<C>,
        entries: &[ExecEntry],
        mut on_outcome: F,
    ) -> Result<RunReport>
    where
        C: SshConnector,
        F: FnMut(&CommandOutcome),
    {
        let mut report = RunReport::default();
        let mut unreachable: HashMap<String, String> = HashMap::new();

        for entry in entries {
            if let Some(description) = &entry.description {
                info!(login = %entry.login, "{description}");
            }

            if let Some(reason) = unreachable.get(&entry.login) {
                let e = OrchError::Unreachable {
                    target: entry.login.clone(),
                    reason: reason.clone(),
                };
                self.record_failure(&mut report, &entry.login, &entry.cmd, e)?;
                continue;
            }

            if let Err(e) = self.resolve(registry, &entry.login).await {
                if e.kind() == ErrorKind::Connection {
                    unreachable.insert(entry.login.clone(), e.to_string());
                }
                self.record_failure(&mut report, &entry.login, &entry.cmd, e)?;
                continue;
            }

            match self.execute(registry, &entry.login, &entry.cmd).await {
                Ok(outcome) => {
                    check_expected_output(entry, &outcome);
                    on_outcome(&outcome);
                    report.outcomes.push(outcome);
                }
                Err(e) => {
                    self.record_failure(&mut report, &entry.login, &entry.cmd, e)?;
                    continue;
                }
            }

            if let Some(quiet) = &entry.quiet_cmd {
                if let Err(e) = self.execute(registry, &entry.login, quiet).await {
                    self.record_failure(&mut report, &entry.login, quiet, e)?;
                }
            }
        }

        Ok(report)
    }

    /// Abort with `error`, or note it in `report` and carry on
    fn record_failure(
        &self,
        report: &mut RunReport,
        login: &str,
        command: &str,
        error: OrchError,
    ) -> Result<()> {
        match self.on_error {
            FailurePolicy::Abort => Err(error),
            FailurePolicy::Continue => {
                warn!(login = %login, command = %command, error = %error, "Command failed, continuing");
                report.failures.push(CommandFailure {
                    login: login.to_string(),
                    command: command.to_string(),
                    error: error.to_string(),
                });
                Ok(())
            }
        }
    }
}

fn check_expected_output(entry: &ExecEntry, outcome: &CommandOutcome) {
    if let Some(expected) = &entry.out {
        let actual = outcome.output.trim();
        if actual != expected.trim() {
            warn!(
                login = %entry.login,
                command = %entry.cmd,
                expected = %expected.trim(),
                actual = %actual,
                "Unexpected output"
            );
        }
    }
}
