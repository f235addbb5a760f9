use serde::{Deserialize, Serialize};
use tracing::debug;

use super::threat_patterns::{self, PatternSet};
use crate::errors::SecurityError;

/// Content length limits, mirroring the storage-layer constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SecurityLimits {
    pub title_max_length: usize,
    pub description_max_length: usize,
    pub question_max_length: usize,
    pub answer_max_length: usize,
    pub category_max_length: usize,
    pub display_name_max_length: usize,
}

pub const SECURITY_LIMITS: SecurityLimits = SecurityLimits {
    title_max_length: 255,
    description_max_length: 1000,
    question_max_length: 2000,
    answer_max_length: 2000,
    category_max_length: 100,
    display_name_max_length: 100,
};

/// Accepted image MIME types for uploads
pub const ALLOWED_UPLOAD_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Maximum upload size (5 MiB)
pub const MAX_UPLOAD_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Outcome of validating one value.
///
/// `is_valid` is true exactly when `error` is absent, and `sanitized` is only
/// ever present on a valid result. Use the constructors to keep it that way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanitized: Option<String>,
}

impl ValidationResult {
    pub fn valid(sanitized: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            error: None,
            sanitized: Some(sanitized.into()),
        }
    }

    /// Valid, with nothing to render (e.g. file uploads)
    pub fn valid_without_content() -> Self {
        Self {
            is_valid: true,
            error: None,
            sanitized: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
            sanitized: None,
        }
    }

    /// Convert into a `Result` for callers that propagate with `?`
    pub fn into_result(self, field: &str) -> Result<String, SecurityError> {
        match self.error {
            Some(reason) => Err(SecurityError::InputRejected {
                field: field.to_string(),
                reason,
            }),
            None => Ok(self.sanitized.unwrap_or_default()),
        }
    }
}

/// Validates and sanitizes text input for potential security threats
pub fn validate_and_sanitize_text(input: &str, max_length: usize, field_name: &str) -> ValidationResult {
    if input.trim().is_empty() {
        return ValidationResult::invalid(format!("{} cannot be empty", field_name));
    }

    // Counted in characters, not bytes
    if input.chars().count() > max_length {
        return ValidationResult::invalid(format!(
            "{} must be {} characters or less",
            field_name, max_length
        ));
    }

    if let Some(pattern) = threat_patterns::first_match(input, PatternSet::Xss) {
        debug!("{} matched XSS pattern {}", field_name, pattern.name);
        return ValidationResult::invalid(format!(
            "{} contains potentially dangerous content",
            field_name
        ));
    }

    if let Some(pattern) = threat_patterns::first_match(input, PatternSet::SqlInjection) {
        debug!("{} matched SQL injection pattern {}", field_name, pattern.name);
        return ValidationResult::invalid(format!("{} contains invalid characters", field_name));
    }

    ValidationResult::valid(encode_html_entities(input.trim()))
}

/// Second-pass check over the original, pre-encoding text
pub fn enhanced_validate(input: &str) -> ValidationResult {
    if let Some(pattern) = threat_patterns::first_match(input, PatternSet::Dangerous) {
        debug!("Content matched extended pattern {}", pattern.name);
        return ValidationResult::invalid("Content contains potentially dangerous elements");
    }

    ValidationResult::valid(encode_html_entities(input.trim()))
}

/// HTML-entity-encode `& < > " '`, ampersand first
pub fn encode_html_entities(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Reverse `encode_html_entities` for re-rendering stored content.
/// `&amp;` is decoded last so `&amp;lt;` yields `&lt;`, not `<`.
pub fn sanitize_for_display(content: &str) -> String {
    content
        .replace("&#x27;", "'")
        .replace("&quot;", "\"")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

pub fn validate_question(question: &str) -> ValidationResult {
    validate_and_sanitize_text(question, SECURITY_LIMITS.question_max_length, "Question")
}

pub fn validate_answer(answer: &str) -> ValidationResult {
    validate_and_sanitize_text(answer, SECURITY_LIMITS.answer_max_length, "Answer")
}

pub fn validate_title(title: &str) -> ValidationResult {
    validate_and_sanitize_text(title, SECURITY_LIMITS.title_max_length, "Title")
}

/// Descriptions are optional: empty input is valid and sanitizes to `""`
pub fn validate_description(description: &str) -> ValidationResult {
    if description.trim().is_empty() {
        return ValidationResult::valid("");
    }

    validate_and_sanitize_text(
        description,
        SECURITY_LIMITS.description_max_length,
        "Description",
    )
}

pub fn validate_category(category: &str) -> ValidationResult {
    validate_and_sanitize_text(category, SECURITY_LIMITS.category_max_length, "Category")
}

pub fn validate_display_name(display_name: &str) -> ValidationResult {
    validate_and_sanitize_text(
        display_name,
        SECURITY_LIMITS.display_name_max_length,
        "Display name",
    )
}

/// Validates an image upload by declared MIME type and size
pub fn validate_file_upload(mime_type: &str, size_bytes: u64) -> ValidationResult {
    if !ALLOWED_UPLOAD_TYPES.contains(&mime_type) {
        return ValidationResult::invalid("Only JPEG, PNG, GIF, and WebP images are allowed");
    }

    if size_bytes > MAX_UPLOAD_SIZE_BYTES {
        return ValidationResult::invalid("File size must be less than 5MB");
    }

    ValidationResult::valid_without_content()
}
