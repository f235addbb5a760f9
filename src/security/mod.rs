pub mod threat_patterns;
pub mod input_validator;
pub mod rate_limiter;
pub mod content_validator;

// Re-export key types for convenience
pub use threat_patterns::{PatternSet, ThreatPattern};
pub use input_validator::{
    enhanced_validate, sanitize_for_display, validate_and_sanitize_text, validate_file_upload,
    SecurityLimits, ValidationResult, SECURITY_LIMITS,
};
pub use rate_limiter::{RateLimitKey, RateLimitPolicy, RateLimitResult, RateLimiter};
pub use content_validator::{CardRejection, ContentField, ContentValidator, SanitizedCard};
