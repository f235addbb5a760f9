use flashcard_security::generation::GenerationGuard;
use flashcard_security::monitoring::{SecurityEventType, SecurityMonitor, SecurityMonitorConfig};
use flashcard_security::security::{
    sanitize_for_display, validate_and_sanitize_text, ContentField, ContentValidator,
    RateLimitKey, RateLimitPolicy, RateLimiter, SECURITY_LIMITS,
};
use flashcard_security::{SecurityConfig, SecurityError};
use std::sync::Arc;
use std::time::Duration;

struct Pipeline {
    monitor: Arc<SecurityMonitor>,
    limiter: Arc<RateLimiter>,
    validator: ContentValidator,
}

fn pipeline(config: &SecurityConfig) -> Pipeline {
    let monitor = Arc::new(SecurityMonitor::new(config.monitor.clone()));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit, monitor.clone()));
    let validator = ContentValidator::new(monitor.clone());
    Pipeline {
        monitor,
        limiter,
        validator,
    }
}

#[test]
fn test_over_length_rejected_regardless_of_content() {
    let p = pipeline(&SecurityConfig::default());
    let fields = [
        ContentField::Question,
        ContentField::Answer,
        ContentField::Title,
        ContentField::Description,
    ];

    for field in fields {
        for filler in ["a", "<script>", "'; DROP TABLE cards;--", "@import "] {
            let input = filler.repeat(field.max_length() / filler.len() + 2);
            let result = p.validator.validate_field(field, &input, Some("user-1"));
            assert_eq!(
                result.error,
                Some(format!("{} must be {} characters or less", field.label(), field.max_length())),
                "field {:?} with filler {:?}",
                field,
                filler
            );
        }
    }
}

#[test]
fn test_script_tag_always_dangerous() {
    let p = pipeline(&SecurityConfig::default());
    for input in [
        "<script>",
        "Before <script>alert(1)</script> after",
        "<ScRiPt src=//evil.example>",
    ] {
        let result = p.validator.validate_question(input, None);
        assert_eq!(
            result.error.as_deref(),
            Some("Question contains potentially dangerous content")
        );
    }
}

#[test]
fn test_sanitized_text_round_trips_for_display() {
    let p = pipeline(&SecurityConfig::default());
    let original = "Is <b> bold & \"quoted\"?";
    let result = p.validator.validate_question(original, None);
    let sanitized = result.sanitized.unwrap();

    assert!(!sanitized.contains('<'));
    assert_eq!(sanitize_for_display(&sanitized), original);
}

#[test]
fn test_minimal_title_and_empty_description() {
    let p = pipeline(&SecurityConfig::default());

    let title = p.validator.validate_title("A", None);
    assert!(title.is_valid);
    assert_eq!(title.sanitized.as_deref(), Some("A"));

    let description = p.validator.validate_description("", None);
    assert!(description.is_valid);
    assert_eq!(description.sanitized.as_deref(), Some(""));
    assert!(p.monitor.is_empty());
}

#[test]
fn test_rate_limiter_window_recovers() {
    let p = pipeline(&SecurityConfig::default());
    let key = RateLimitKey::new("generate_flashcard", Some("user-1"));
    let window = Duration::from_millis(100);

    let attempts: Vec<bool> = (0..4).map(|_| p.limiter.can_attempt(&key, 3, window)).collect();
    assert_eq!(attempts, vec![true, true, true, false]);

    std::thread::sleep(Duration::from_millis(150));
    assert!(p.limiter.can_attempt(&key, 3, window));
}

#[test]
fn test_repeated_failures_escalate_to_suspicious_activity() {
    let p = pipeline(&SecurityConfig::default());

    for i in 0..11 {
        let result = p.validator.validate_answer("x; DROP TABLE decks", Some("user-7"));
        assert!(!result.is_valid);
        assert_eq!(p.monitor.detect_suspicious_activity("user-7"), i >= 10);
    }

    let suspicious: Vec<_> = p
        .monitor
        .recent_events()
        .into_iter()
        .filter(|e| e.event_type == SecurityEventType::SuspiciousActivity)
        .collect();
    assert_eq!(suspicious.len(), 1);
    assert_eq!(suspicious[0].user_id.as_deref(), Some("user-7"));
}

#[test]
fn test_monitor_capacity_from_config() {
    let config = SecurityConfig {
        monitor: SecurityMonitorConfig {
            max_events: 5,
            ..Default::default()
        },
        ..Default::default()
    };
    let p = pipeline(&config);

    for _ in 0..8 {
        p.validator.validate_title("", None);
    }
    assert_eq!(p.monitor.len(), 5);
}

#[test]
fn test_generation_round_trip_through_pipeline() {
    let config = SecurityConfig {
        rate_limit: RateLimitPolicy::new(1, Duration::from_secs(60)),
        ..Default::default()
    };
    let p = pipeline(&config);
    let guard = GenerationGuard::new(
        |_: &str| -> anyhow::Result<String> {
            Ok(r#"{"question": "What does DNA stand for?", "answer": "Deoxyribonucleic acid", "difficulty": "2"}"#.to_string())
        },
        p.validator.clone(),
        p.limiter.clone(),
    );

    let card = guard.generate_card("Genetics", Some("user-3")).unwrap();
    assert_eq!(card.question, "What does DNA stand for?");
    assert_eq!(card.difficulty, 2);

    let err = guard.generate_card("Genetics", Some("user-3")).unwrap_err();
    match err {
        SecurityError::RateLimited { action, retry_after } => {
            assert_eq!(action, "generate_flashcard");
            assert!(retry_after <= Duration::from_secs(60));
        }
        other => panic!("expected rate limit, got {:?}", other),
    }
}

#[test]
fn test_limits_match_storage_constraints() {
    assert_eq!(SECURITY_LIMITS.title_max_length, 255);
    assert_eq!(SECURITY_LIMITS.description_max_length, 1000);
    assert_eq!(SECURITY_LIMITS.question_max_length, 2000);
    assert_eq!(SECURITY_LIMITS.answer_max_length, 2000);
    assert_eq!(SECURITY_LIMITS.category_max_length, 100);
    assert_eq!(SECURITY_LIMITS.display_name_max_length, 100);

    let result = validate_and_sanitize_text(&"x".repeat(101), SECURITY_LIMITS.category_max_length, "Category");
    assert_eq!(result.error.as_deref(), Some("Category must be 100 characters or less"));
}
