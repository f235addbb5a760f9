//! Guard around the remote flashcard generator.
//!
//! Generated text is untrusted input: requests are rate limited, the prompt is
//! built from an already validated title, and the response is normalized and
//! pushed back through the same field validation as user-typed content.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::SecurityError;
use crate::security::{ContentField, ContentValidator, RateLimitKey, RateLimitPolicy, RateLimiter};

/// Rate-limit action name for generation requests
pub const GENERATION_ACTION: &str = "generate_flashcard";

const FALLBACK_QUESTION: &str = "What is the main topic of this deck?";
const DEFAULT_DIFFICULTY: u8 = 2;
const MIN_DIFFICULTY: i64 = 1;
const MAX_DIFFICULTY: i64 = 5;

/// Remote text-generation collaborator
pub trait CardGenerator {
    /// Return the raw model output for `prompt`
    fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

impl<F> CardGenerator for F
where
    F: Fn(&str) -> anyhow::Result<String>,
{
    fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self(prompt)
    }
}

/// Normalized, not yet validated generator output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCard {
    pub question: String,
    pub answer: String,
    pub difficulty: u8,
}

/// Generated card whose text passed validation and is entity-encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedCard {
    pub question: String,
    pub answer: String,
    pub difficulty: u8,
}

#[derive(Debug, Deserialize)]
struct RawCard {
    question: Option<String>,
    answer: Option<String>,
    difficulty: Option<Value>,
}

pub fn build_prompt(validated_title: &str) -> String {
    format!(
        "Create a flashcard for a deck titled \"{}\". \
         Make sure the question is clear and the answer is informative but concise. \
         The difficulty should be appropriate for the topic (1=very easy, 5=very hard). \
         Return JSON with \"question\", \"answer\", and \"difficulty\" (1-5) fields.",
        validated_title
    )
}

/// Parse generator output into a card.
///
/// Non-JSON output becomes the answer to a generic question. A missing
/// question or answer is an error; difficulty falls back to 2 and is clamped
/// to 1..=5.
pub fn parse_generated_card(content: &str) -> Result<GeneratedCard, SecurityError> {
    let raw = match serde_json::from_str::<RawCard>(content.trim()) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Generator output is not JSON ({}), using fallback card", e);
            RawCard {
                question: Some(FALLBACK_QUESTION.to_string()),
                answer: Some(content.to_string()),
                difficulty: None,
            }
        }
    };

    let question = raw.question.filter(|q| !q.trim().is_empty());
    let answer = raw.answer.filter(|a| !a.trim().is_empty());
    let (question, answer) = match (question, answer) {
        (Some(question), Some(answer)) => (question, answer),
        _ => {
            return Err(SecurityError::Generation(
                "Generated flashcard missing required fields".to_string(),
            ))
        }
    };

    Ok(GeneratedCard {
        question,
        answer,
        difficulty: parse_difficulty(raw.difficulty.as_ref()),
    })
}

fn parse_difficulty(value: Option<&Value>) -> u8 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => leading_integer(s),
        _ => None,
    };

    match parsed {
        // Zero is treated as "not provided"
        None | Some(0) => DEFAULT_DIFFICULTY,
        Some(n) => n.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY) as u8,
    }
}

/// Integer prefix of a string such as "3 (medium)"
fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    // All-digit prefixes only fail to parse on overflow; saturate
    let magnitude = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(sign * magnitude)
}

/// Rate-limits, prompts and re-validates card generation
pub struct GenerationGuard<G: CardGenerator> {
    generator: G,
    validator: ContentValidator,
    rate_limiter: Arc<RateLimiter>,
    policy: RateLimitPolicy,
}

impl<G: CardGenerator> GenerationGuard<G> {
    pub fn new(generator: G, validator: ContentValidator, rate_limiter: Arc<RateLimiter>) -> Self {
        let policy = rate_limiter.default_policy();
        Self {
            generator,
            validator,
            rate_limiter,
            policy,
        }
    }

    pub fn with_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn generate_card(&self, deck_title: &str, user_id: Option<&str>) -> Result<ValidatedCard, SecurityError> {
        let key = RateLimitKey::new(GENERATION_ACTION, user_id);
        self.rate_limiter.ensure_can_attempt(&key, &self.policy)?;

        let title = self
            .validator
            .validate_field(ContentField::Title, deck_title, user_id)
            .into_result(ContentField::Title.label())?;

        info!("Generating flashcard for deck: {}", title);
        let content = self
            .generator
            .generate(&build_prompt(&title))
            .map_err(|e| SecurityError::Generation(format!("{:#}", e)))?;

        let card = parse_generated_card(&content)?;

        let question = self
            .validator
            .validate_field(ContentField::Question, &card.question, user_id)
            .into_result(ContentField::Question.label())?;
        let answer = self
            .validator
            .validate_field(ContentField::Answer, &card.answer, user_id)
            .into_result(ContentField::Answer.label())?;

        Ok(ValidatedCard {
            question,
            answer,
            difficulty: card.difficulty,
        })
    }
}
