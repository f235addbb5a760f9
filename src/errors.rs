use std::time::Duration;
use thiserror::Error;

/// Failure classes of the validation pipeline.
///
/// None of these are fatal: rejections and rate limits are surfaced to the
/// caller as form errors, and monitoring problems are swallowed where the
/// primary outcome must not be blocked.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Input was empty, too long, or matched a threat pattern
    #[error("{field}: {reason}")]
    InputRejected { field: String, reason: String },

    /// Attempt budget exhausted for an action
    #[error("Too many attempts for '{action}'. Please wait {} seconds before trying again.", retry_after_secs(.retry_after))]
    RateLimited { action: String, retry_after: Duration },

    /// The event log could not be written or read
    #[error("Security monitoring degraded: {0}")]
    MonitoringDegraded(String),

    #[error("Invalid configuration: {0}\nCheck your environment variables or config file.")]
    InvalidConfiguration(String),

    /// The text-generation collaborator returned unusable content
    #[error("Card generation failed: {0}")]
    Generation(String),
}

fn retry_after_secs(retry_after: &Duration) -> u64 {
    // Round up so "0 seconds" is never shown while still limited
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Classify an error for structured responses
pub fn classify_error(error: &SecurityError) -> &'static str {
    match error {
        SecurityError::InputRejected { .. } => "input_rejected",
        SecurityError::RateLimited { .. } => "rate_limited",
        SecurityError::MonitoringDegraded(_) => "monitoring_degraded",
        SecurityError::InvalidConfiguration(_) => "configuration",
        SecurityError::Generation(_) => "generation",
    }
}

/// Determine if the caller can recover by editing input or retrying later
pub fn is_recoverable(error: &SecurityError) -> bool {
    !matches!(error, SecurityError::InvalidConfiguration(_))
}

/// Create a JSON error body suitable for rendering as a form error
pub fn create_error_response(error: &SecurityError) -> serde_json::Value {
    let mut body = serde_json::json!({
        "error": {
            "message": error.to_string(),
            "type": classify_error(error),
            "recoverable": is_recoverable(error)
        }
    });

    if let SecurityError::RateLimited { retry_after, .. } = error {
        body["error"]["retryAfterMs"] = serde_json::json!(retry_after.as_millis() as u64);
    }

    body
}
