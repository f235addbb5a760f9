use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::errors::SecurityError;

/// Security monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityMonitorConfig {
    /// Maximum events retained; oldest are dropped first
    pub max_events: usize,
    /// Default window for `recent_events` (milliseconds)
    pub recent_window_ms: u64,
    /// Trailing window for the suspicious-activity heuristic (milliseconds)
    pub suspicious_window_ms: u64,
    /// Validation failures tolerated inside the window before a user is flagged
    pub suspicious_threshold: usize,
    /// Overrides the user agent stamped on events
    pub user_agent: Option<String>,
}

/// Upper bound accepted for `SecurityMonitorConfig::max_events`
pub const MAX_EVENT_CAPACITY: usize = 10_000;

impl Default for SecurityMonitorConfig {
    fn default() -> Self {
        Self {
            max_events: 100,
            recent_window_ms: 300_000, // 5 minutes
            suspicious_window_ms: 60_000,
            suspicious_threshold: 10,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    ValidationFailure,
    RateLimitExceeded,
    SuspiciousActivity,
}

impl SecurityEventType {
    /// Human label, e.g. "validation failure"
    pub fn label(self) -> &'static str {
        match self {
            SecurityEventType::ValidationFailure => "validation failure",
            SecurityEventType::RateLimitExceeded => "rate limit exceeded",
            SecurityEventType::SuspiciousActivity => "suspicious activity",
        }
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityEventType::ValidationFailure => write!(f, "validation_failure"),
            SecurityEventType::RateLimitExceeded => write!(f, "rate_limit_exceeded"),
            SecurityEventType::SuspiciousActivity => write!(f, "suspicious_activity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: SecurityEventType,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, details: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            details: details.into(),
            timestamp: Utc::now(),
            user_id: None,
            user_agent: None,
        }
    }

    pub fn with_user(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self
    }
}

fn default_user_agent() -> String {
    format!(
        "{}/{} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        gethostname::gethostname().to_string_lossy()
    )
}

/// Earliest timestamp still inside a trailing window ending now
fn window_start(window: Duration) -> DateTime<Utc> {
    let millis = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    Utc::now()
        .checked_sub_signed(chrono::Duration::milliseconds(millis))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Bounded, in-memory security event log.
///
/// Advisory telemetry only: nothing here blocks a request, and failures to
/// record are reported through tracing instead of to the caller.
pub struct SecurityMonitor {
    config: SecurityMonitorConfig,
    user_agent: String,
    events: Mutex<VecDeque<SecurityEvent>>,
}

impl SecurityMonitor {
    pub fn new(config: SecurityMonitorConfig) -> Self {
        let user_agent = config.user_agent.clone().unwrap_or_else(default_user_agent);

        // Grows on demand; max_events comes from config
        Self {
            config,
            user_agent,
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &SecurityMonitorConfig {
        &self.config
    }

    /// Record an event, swallowing monitoring failures
    pub fn log_event(&self, event: SecurityEvent) {
        if let Err(e) = self.try_log_event(event) {
            error!("{}", e);
        }
    }

    /// Record an event, stamping the current time and user agent
    pub fn try_log_event(&self, mut event: SecurityEvent) -> Result<(), SecurityError> {
        event.timestamp = Utc::now();
        event.user_agent = Some(self.user_agent.clone());

        warn!(
            event_type = %event.event_type,
            user_id = event.user_id.as_deref().unwrap_or("-"),
            "Security event: {}",
            event.details
        );

        let mut events = self.lock_events()?;
        events.push_back(event);
        while events.len() > self.config.max_events {
            events.pop_front();
        }

        Ok(())
    }

    /// Events inside the configured default window, oldest first
    pub fn recent_events(&self) -> Vec<SecurityEvent> {
        self.recent_events_within(Duration::from_millis(self.config.recent_window_ms))
    }

    /// Events with `timestamp > now - window`, oldest first
    pub fn recent_events_within(&self, window: Duration) -> Vec<SecurityEvent> {
        let cutoff = window_start(window);

        match self.lock_events() {
            Ok(events) => events
                .iter()
                .filter(|event| event.timestamp > cutoff)
                .cloned()
                .collect(),
            Err(e) => {
                error!("{}", e);
                Vec::new()
            }
        }
    }

    /// True when the user has more validation failures in the trailing
    /// window than the configured threshold.
    pub fn detect_suspicious_activity(&self, user_id: &str) -> bool {
        let cutoff = window_start(Duration::from_millis(self.config.suspicious_window_ms));

        let failures = match self.lock_events() {
            Ok(events) => events
                .iter()
                .filter(|event| {
                    event.event_type == SecurityEventType::ValidationFailure
                        && event.user_id.as_deref() == Some(user_id)
                        && event.timestamp > cutoff
                })
                .count(),
            Err(e) => {
                error!("{}", e);
                return false;
            }
        };

        debug!("User {} has {} recent validation failures", user_id, failures);
        failures > self.config.suspicious_threshold
    }

    pub fn len(&self) -> usize {
        self.lock_events().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        match self.lock_events() {
            Ok(mut events) => events.clear(),
            Err(e) => error!("{}", e),
        }
    }

    /// Developer view: the latest 10 events, newest first
    pub fn debug_report(&self) -> String {
        let events = self.recent_events();
        let mut report = format!("Security Monitor ({} events)\n", events.len());

        if events.is_empty() {
            report.push_str("No security events recorded\n");
            return report;
        }

        for event in events.iter().rev().take(10) {
            report.push_str(&format!(
                "[{}] {}: {}",
                event.timestamp.with_timezone(&Local).format("%H:%M:%S"),
                event.event_type.label(),
                event.details
            ));
            if let Some(user_id) = &event.user_id {
                let short: String = user_id.chars().take(8).collect();
                report.push_str(&format!(" (user: {}...)", short));
            }
            report.push('\n');
        }

        report
    }

    fn lock_events(&self) -> Result<MutexGuard<'_, VecDeque<SecurityEvent>>, SecurityError> {
        self.events
            .lock()
            .map_err(|_| SecurityError::MonitoringDegraded("event log lock poisoned".to_string()))
    }
}

impl Default for SecurityMonitor {
    fn default() -> Self {
        Self::new(SecurityMonitorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn failure(user: &str) -> SecurityEvent {
        SecurityEvent::new(SecurityEventType::ValidationFailure, "Title validation failed")
            .with_user(Some(user))
    }

    #[test]
    fn test_log_event_stamps_user_agent() {
        let monitor = SecurityMonitor::new(SecurityMonitorConfig {
            user_agent: Some("test-agent/1.0".to_string()),
            ..Default::default()
        });
        monitor.log_event(failure("user-1"));

        let events = monitor.recent_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(events[0].user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn test_default_user_agent_names_crate() {
        let monitor = SecurityMonitor::default();
        monitor.log_event(SecurityEvent::new(SecurityEventType::RateLimitExceeded, "limit"));
        let agent = monitor.recent_events()[0].user_agent.clone().unwrap();
        assert!(agent.starts_with("flashcard-security/"));
    }

    #[test]
    fn test_log_is_bounded_fifo() {
        let monitor = SecurityMonitor::default();
        for i in 1..=101 {
            monitor.log_event(SecurityEvent::new(
                SecurityEventType::ValidationFailure,
                format!("event {}", i),
            ));
        }

        let events = monitor.recent_events();
        assert_eq!(monitor.len(), 100);
        assert_eq!(events.len(), 100);
        assert_eq!(events.first().unwrap().details, "event 2");
        assert_eq!(events.last().unwrap().details, "event 101");
        assert!(!events.iter().any(|e| e.details == "event 1"));
    }

    #[test]
    fn test_recent_events_respects_window() {
        let monitor = SecurityMonitor::default();
        monitor.log_event(SecurityEvent::new(SecurityEventType::ValidationFailure, "old"));
        std::thread::sleep(Duration::from_millis(120));
        monitor.log_event(SecurityEvent::new(SecurityEventType::ValidationFailure, "new"));

        let recent = monitor.recent_events_within(Duration::from_millis(60));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].details, "new");

        let all = monitor.recent_events();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].details, "old");
    }

    #[test]
    fn test_suspicious_activity_threshold() {
        let monitor = SecurityMonitor::default();
        for _ in 0..10 {
            monitor.log_event(failure("user-1"));
        }
        assert!(!monitor.detect_suspicious_activity("user-1"));

        monitor.log_event(failure("user-1"));
        assert!(monitor.detect_suspicious_activity("user-1"));
        assert!(!monitor.detect_suspicious_activity("user-2"));
    }

    #[test]
    fn test_suspicious_activity_ignores_other_event_types() {
        let monitor = SecurityMonitor::default();
        for _ in 0..20 {
            monitor.log_event(
                SecurityEvent::new(SecurityEventType::RateLimitExceeded, "limit")
                    .with_user(Some("user-1")),
            );
        }
        assert!(!monitor.detect_suspicious_activity("user-1"));
    }

    #[test]
    fn test_debug_report() {
        let monitor = SecurityMonitor::default();
        assert!(monitor.debug_report().contains("No security events recorded"));

        monitor.log_event(failure("0123456789abcdef"));
        monitor.log_event(SecurityEvent::new(SecurityEventType::SuspiciousActivity, "latest"));

        let report = monitor.debug_report();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "Security Monitor (2 events)");
        assert!(lines[1].contains("suspicious activity: latest"));
        assert!(lines[2].contains("validation failure"));
        assert!(lines[2].contains("(user: 01234567...)"));
    }

    #[test]
    fn test_event_serialization() {
        let event = failure("user-1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "validation_failure");
        assert_eq!(json["userId"], "user-1");
        assert!(json.get("userAgent").is_none());
    }

    #[test]
    fn test_large_capacity_does_not_preallocate() {
        let monitor = SecurityMonitor::new(SecurityMonitorConfig {
            max_events: usize::MAX,
            ..Default::default()
        });
        monitor.log_event(failure("user-1"));
        assert_eq!(monitor.len(), 1);
    }

    #[test]
    fn test_suspicious_activity_ages_out() {
        let monitor = SecurityMonitor::new(SecurityMonitorConfig {
            suspicious_window_ms: 50,
            ..Default::default()
        });
        for _ in 0..11 {
            monitor.log_event(failure("user-1"));
        }
        assert!(monitor.detect_suspicious_activity("user-1"));

        std::thread::sleep(Duration::from_millis(80));
        assert!(!monitor.detect_suspicious_activity("user-1"));
        // The events themselves are still retained
        assert_eq!(monitor.len(), 11);
    }

    fn poison(monitor: &Arc<SecurityMonitor>) {
        let holder = monitor.clone();
        let _ = std::thread::spawn(move || {
            let _events = holder.events.lock().unwrap();
            panic!("panic while holding the event log");
        })
        .join();
        assert!(monitor.events.is_poisoned());
    }

    #[test]
    fn test_poisoned_log_degrades_quietly() {
        let monitor = Arc::new(SecurityMonitor::default());
        for _ in 0..11 {
            monitor.log_event(failure("user-1"));
        }
        poison(&monitor);

        let err = monitor.try_log_event(failure("user-1")).unwrap_err();
        assert!(matches!(err, SecurityError::MonitoringDegraded(_)));

        monitor.log_event(failure("user-1"));
        assert!(monitor.recent_events().is_empty());
        assert!(monitor.recent_events_within(Duration::from_secs(60)).is_empty());
        assert!(!monitor.detect_suspicious_activity("user-1"));
        assert!(monitor.is_empty());
    }

    #[test]
    fn test_poisoned_log_does_not_block_validation() {
        use crate::security::ContentValidator;

        let monitor = Arc::new(SecurityMonitor::default());
        poison(&monitor);
        let validator = ContentValidator::new(monitor.clone());

        let rejected = validator.validate_title("<script>", Some("user-1"));
        assert!(!rejected.is_valid);
        assert_eq!(
            rejected.error.as_deref(),
            Some("Title contains potentially dangerous content")
        );

        let accepted = validator.validate_title("ok", Some("user-1"));
        assert_eq!(accepted.sanitized.as_deref(), Some("ok"));
    }

    #[test]
    fn test_concurrent_logging_keeps_bound() {
        let monitor = Arc::new(SecurityMonitor::default());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let monitor = monitor.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        monitor.log_event(SecurityEvent::new(
                            SecurityEventType::ValidationFailure,
                            format!("thread {} event {}", t, i),
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(monitor.len(), 100);
        monitor.clear();
        assert!(monitor.is_empty());
    }
}
