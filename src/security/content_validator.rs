use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use super::input_validator::{
    enhanced_validate, validate_and_sanitize_text, ValidationResult, SECURITY_LIMITS,
};
use crate::errors::SecurityError;
use crate::monitoring::{SecurityEvent, SecurityEventType, SecurityMonitor};

/// User-editable content fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentField {
    Question,
    Answer,
    Title,
    Description,
    Category,
    DisplayName,
}

impl ContentField {
    /// Name used in error messages
    pub fn label(self) -> &'static str {
        match self {
            ContentField::Question => "Question",
            ContentField::Answer => "Answer",
            ContentField::Title => "Title",
            ContentField::Description => "Description",
            ContentField::Category => "Category",
            ContentField::DisplayName => "Display name",
        }
    }

    pub fn max_length(self) -> usize {
        match self {
            ContentField::Question => SECURITY_LIMITS.question_max_length,
            ContentField::Answer => SECURITY_LIMITS.answer_max_length,
            ContentField::Title => SECURITY_LIMITS.title_max_length,
            ContentField::Description => SECURITY_LIMITS.description_max_length,
            ContentField::Category => SECURITY_LIMITS.category_max_length,
            ContentField::DisplayName => SECURITY_LIMITS.display_name_max_length,
        }
    }

    /// Whether empty input is acceptable
    pub fn is_optional(self) -> bool {
        matches!(self, ContentField::Description)
    }
}

impl fmt::Display for ContentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for ContentField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "question" => Ok(ContentField::Question),
            "answer" => Ok(ContentField::Answer),
            "title" => Ok(ContentField::Title),
            "description" => Ok(ContentField::Description),
            "category" => Ok(ContentField::Category),
            "display-name" => Ok(ContentField::DisplayName),
            other => Err(format!("Unknown content field '{}'", other)),
        }
    }
}

/// Sanitized question and answer of a card that passed every check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizedCard {
    pub question: String,
    pub answer: String,
}

/// The field of a card that failed, with its validation result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardRejection {
    pub field: ContentField,
    #[serde(flatten)]
    pub result: ValidationResult,
}

impl From<CardRejection> for SecurityError {
    fn from(rejection: CardRejection) -> Self {
        SecurityError::InputRejected {
            field: rejection.field.label().to_string(),
            reason: rejection.result.error.unwrap_or_default(),
        }
    }
}

/// Runs field validation and reports rejections to the security monitor
#[derive(Clone)]
pub struct ContentValidator {
    monitor: Arc<SecurityMonitor>,
}

impl ContentValidator {
    pub fn new(monitor: Arc<SecurityMonitor>) -> Self {
        Self { monitor }
    }

    pub fn monitor(&self) -> &Arc<SecurityMonitor> {
        &self.monitor
    }

    /// Validate one field: basic checks, then the extended pattern pass.
    /// The first failure is logged and returned.
    pub fn validate_field(&self, field: ContentField, input: &str, user_id: Option<&str>) -> ValidationResult {
        if field.is_optional() && input.trim().is_empty() {
            return ValidationResult::valid("");
        }

        let primary = validate_and_sanitize_text(input, field.max_length(), field.label());
        if !primary.is_valid {
            self.record_failure(field, &primary, user_id);
            return primary;
        }

        let extended = enhanced_validate(input);
        if !extended.is_valid {
            self.record_failure(field, &extended, user_id);
            return extended;
        }

        debug!("{} accepted", field);
        primary
    }

    pub fn validate_question(&self, question: &str, user_id: Option<&str>) -> ValidationResult {
        self.validate_field(ContentField::Question, question, user_id)
    }

    pub fn validate_answer(&self, answer: &str, user_id: Option<&str>) -> ValidationResult {
        self.validate_field(ContentField::Answer, answer, user_id)
    }

    pub fn validate_title(&self, title: &str, user_id: Option<&str>) -> ValidationResult {
        self.validate_field(ContentField::Title, title, user_id)
    }

    pub fn validate_description(&self, description: &str, user_id: Option<&str>) -> ValidationResult {
        self.validate_field(ContentField::Description, description, user_id)
    }

    /// Validate a card's question, then its answer
    pub fn validate_card(
        &self,
        question: &str,
        answer: &str,
        user_id: Option<&str>,
    ) -> Result<SanitizedCard, CardRejection> {
        let question = self.validate_question(question, user_id);
        if !question.is_valid {
            return Err(CardRejection {
                field: ContentField::Question,
                result: question,
            });
        }

        let answer = self.validate_answer(answer, user_id);
        if !answer.is_valid {
            return Err(CardRejection {
                field: ContentField::Answer,
                result: answer,
            });
        }

        Ok(SanitizedCard {
            question: question.sanitized.unwrap_or_default(),
            answer: answer.sanitized.unwrap_or_default(),
        })
    }

    fn record_failure(&self, field: ContentField, result: &ValidationResult, user_id: Option<&str>) {
        let error = result.error.as_deref().unwrap_or("rejected");

        self.monitor.log_event(
            SecurityEvent::new(
                SecurityEventType::ValidationFailure,
                format!("{} validation failed: {}", field, error),
            )
            .with_user(user_id),
        );

        // Anonymous failures are logged but cannot be attributed
        let Some(user_id) = user_id else {
            return;
        };

        if self.monitor.detect_suspicious_activity(user_id) {
            warn!("Suspicious activity detected for user {}", user_id);
            self.monitor.log_event(
                SecurityEvent::new(
                    SecurityEventType::SuspiciousActivity,
                    format!("Multiple validation failures detected (last field: {})", field),
                )
                .with_user(Some(user_id)),
            );
        }
    }
}
