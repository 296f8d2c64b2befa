use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::OrchError;

/// How many times, and how patiently, a host that rejects key authentication
/// is bootstrapped before giving up
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryPolicy {
    /// Maximum number of bootstrap rounds per host; 0 means no limit
    #[serde(default = "default_max_bootstrap_rounds")]
    pub max_bootstrap_rounds: u32,
    /// Delay before the first reconnect after a bootstrap
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Maximum delay between reconnects
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Add random jitter to delays (0.0 to 1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

const fn default_max_bootstrap_rounds() -> u32 {
    3
}

const fn default_initial_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    5000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_jitter() -> f64 {
    0.1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_bootstrap_rounds: default_max_bootstrap_rounds(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Keep bootstrapping until key authentication succeeds
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            max_bootstrap_rounds: 0,
            ..Default::default()
        }
    }

    /// Create a policy with the given round ceiling and no delays
    #[must_use]
    pub fn with_max_rounds(max_bootstrap_rounds: u32) -> Self {
        Self {
            max_bootstrap_rounds,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            jitter: 0.0,
            ..Default::default()
        }
    }

    /// Whether bootstrap round `round` (1-indexed) may run
    #[must_use]
    pub const fn allows_round(&self, round: u32) -> bool {
        self.max_bootstrap_rounds == 0 || round <= self.max_bootstrap_rounds
    }

    /// Delay before the reconnect that follows bootstrap round `round`
    /// (0-indexed attempts, the first connect never waits)
    #[must_use]
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1);
        #[expect(clippy::cast_precision_loss)]
        let base_delay = (self.initial_delay_ms as f64)
            * self
                .backoff_multiplier
                .powi(i32::try_from(exponent).unwrap_or(i32::MAX));

        #[expect(clippy::cast_precision_loss)]
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let jitter_range = capped_delay * self.jitter;
        let jitter = if jitter_range > 0.0 {
            rand_simple().mul_add(2.0, -1.0) * jitter_range
        } else {
            0.0
        };

        #[expect(clippy::cast_precision_loss)]
        let final_delay = (capped_delay + jitter).clamp(0.0, self.max_delay_ms as f64);

        Duration::from_millis(final_delay as u64)
    }
}

/// Simple pseudo-random number generator (0.0 to 1.0)
/// Using a basic approach to avoid adding rand as a dependency
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (f64::from(nanos) / f64::from(u32::MAX)).fract()
}

/// Check if a failed key connect should be answered with a bootstrap round
///
/// Host key problems and a missing agent are not something a new
/// `authorized_keys` entry can fix.
#[must_use]
pub const fn triggers_bootstrap(error: &OrchError) -> bool {
    matches!(
        error,
        OrchError::SshAuth { .. } | OrchError::SshConnection { .. } | OrchError::SshTimeout { .. }
    )
}
