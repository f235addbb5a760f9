use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::errors::SecurityError;
use crate::monitoring::{SecurityEvent, SecurityEventType, SecurityMonitor};

/// Attempt budget for one action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    /// Attempts allowed inside one window
    pub max_attempts: u32,
    /// Sliding window length (milliseconds)
    pub window_ms: u64,
}

impl RateLimitPolicy {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_ms: 60_000,
        }
    }
}

/// Identity of a rate-limited bucket: the action plus who performs it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub action: String,
    pub user_id: Option<String>,
}

impl RateLimitKey {
    pub fn new(action: impl Into<String>, user_id: Option<&str>) -> Self {
        Self {
            action: action.into(),
            user_id: user_id.map(str::to_string),
        }
    }

    pub fn anonymous(action: impl Into<String>) -> Self {
        Self::new(action, None)
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user_id {
            Some(user_id) => write!(f, "{}:{}", self.action, user_id),
            None => write!(f, "{}", self.action),
        }
    }
}

/// Rate limiting result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the attempt was allowed and recorded
    pub allowed: bool,
    /// Attempts left in the current window
    pub remaining: u32,
    /// Wait until the oldest attempt leaves the window (zero when allowed)
    pub retry_after: Duration,
    /// Limit applied to this attempt
    pub limit: u32,
}

/// Per-key sliding-window attempt counter.
///
/// Each key keeps the instants of its accepted attempts. Instants older than
/// the window are pruned on every access; keys themselves are only removed by
/// `prune_idle`.
pub struct RateLimiter {
    default_policy: RateLimitPolicy,
    attempts: Mutex<HashMap<RateLimitKey, Vec<Instant>>>,
    monitor: Arc<SecurityMonitor>,
}

impl RateLimiter {
    pub fn new(default_policy: RateLimitPolicy, monitor: Arc<SecurityMonitor>) -> Self {
        Self {
            default_policy,
            attempts: Mutex::new(HashMap::new()),
            monitor,
        }
    }

    pub fn default_policy(&self) -> RateLimitPolicy {
        self.default_policy
    }

    /// Record an attempt if the window still has room
    pub fn can_attempt(&self, key: &RateLimitKey, max_attempts: u32, window: Duration) -> bool {
        self.record_attempt(key, max_attempts, window).allowed
    }

    /// `can_attempt` under the default policy
    pub fn can_attempt_default(&self, key: &RateLimitKey) -> bool {
        self.check(key, &self.default_policy).allowed
    }

    pub fn check(&self, key: &RateLimitKey, policy: &RateLimitPolicy) -> RateLimitResult {
        self.record_attempt(key, policy.max_attempts, policy.window())
    }

    /// Like `check`, but as an error the caller can propagate
    pub fn ensure_can_attempt(&self, key: &RateLimitKey, policy: &RateLimitPolicy) -> Result<(), SecurityError> {
        let result = self.check(key, policy);
        if result.allowed {
            Ok(())
        } else {
            Err(SecurityError::RateLimited {
                action: key.action.clone(),
                retry_after: result.retry_after,
            })
        }
    }

    fn record_attempt(&self, key: &RateLimitKey, max_attempts: u32, window: Duration) -> RateLimitResult {
        let now = Instant::now();

        let denied_retry_after = {
            let mut attempts = self.lock_attempts();
            let recent = attempts.entry(key.clone()).or_default();
            recent.retain(|attempt| now.duration_since(*attempt) < window);

            if recent.len() < max_attempts as usize {
                recent.push(now);
                let remaining = max_attempts - recent.len() as u32;
                debug!("Attempt recorded for {} ({} remaining)", key, remaining);

                return RateLimitResult {
                    allowed: true,
                    remaining,
                    retry_after: Duration::ZERO,
                    limit: max_attempts,
                };
            }

            recent
                .first()
                .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(Duration::ZERO)
        };

        warn!("Rate limit exceeded for {}", key);
        self.monitor.log_event(
            SecurityEvent::new(
                SecurityEventType::RateLimitExceeded,
                format!(
                    "Rate limit exceeded for action '{}' ({} attempts per {} ms)",
                    key.action,
                    max_attempts,
                    window.as_millis()
                ),
            )
            .with_user(key.user_id.as_deref()),
        );

        RateLimitResult {
            allowed: false,
            remaining: 0,
            retry_after: denied_retry_after,
            limit: max_attempts,
        }
    }

    /// Time until the oldest recorded attempt leaves the window
    pub fn remaining_time(&self, key: &RateLimitKey, window: Duration) -> Duration {
        let now = Instant::now();
        let attempts = self.lock_attempts();

        attempts
            .get(key)
            .and_then(|recent| recent.iter().min())
            .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(Duration::ZERO)
    }

    /// Drop keys with no attempts inside `window`; returns how many were removed
    pub fn prune_idle(&self, window: Duration) -> usize {
        let now = Instant::now();
        let mut attempts = self.lock_attempts();
        let before = attempts.len();

        attempts.retain(|_, recent| {
            recent.retain(|attempt| now.duration_since(*attempt) < window);
            !recent.is_empty()
        });

        let removed = before - attempts.len();
        debug!("Rate limiter cleanup: removed {} idle keys, {} active", removed, attempts.len());
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.lock_attempts().len()
    }

    // A poisoned map still holds valid instants, so keep using it
    fn lock_attempts(&self) -> MutexGuard<'_, HashMap<RateLimitKey, Vec<Instant>>> {
        self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
