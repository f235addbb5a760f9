use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use flashcard_security::config::SecurityConfig;
use flashcard_security::errors::{create_error_response, SecurityError};
use flashcard_security::monitoring::SecurityMonitor;
use flashcard_security::security::{
    sanitize_for_display, validate_file_upload, ContentField, ContentValidator, ValidationResult,
};

#[derive(Parser)]
#[command(name = "flashcard-security", version, about = "Validate and sanitize flashcard content")]
struct Cli {
    /// User the input is attributed to
    #[arg(long, global = true)]
    user: Option<String>,

    /// Print the security event report afterwards
    #[arg(long, global = true)]
    events: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate one field value
    Check {
        #[arg(long, value_enum)]
        field: FieldArg,
        text: String,
    },
    /// Validate a question/answer pair
    Card {
        #[arg(long)]
        question: String,
        #[arg(long)]
        answer: String,
    },
    /// Validate an image upload by MIME type and size
    File {
        #[arg(long)]
        mime: String,
        #[arg(long)]
        size: u64,
    },
    /// Decode previously sanitized text for display
    Display { text: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum FieldArg {
    Question,
    Answer,
    Title,
    Description,
    Category,
    DisplayName,
}

impl From<FieldArg> for ContentField {
    fn from(arg: FieldArg) -> Self {
        match arg {
            FieldArg::Question => ContentField::Question,
            FieldArg::Answer => ContentField::Answer,
            FieldArg::Title => ContentField::Title,
            FieldArg::Description => ContentField::Description,
            FieldArg::Category => ContentField::Category,
            FieldArg::DisplayName => ContentField::DisplayName,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        format!("flashcard_security={}", level)
    });

    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match SecurityConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(2);
        }
    };

    let monitor = Arc::new(SecurityMonitor::new(config.monitor.clone()));
    let validator = ContentValidator::new(monitor.clone());
    let user = cli.user.as_deref();

    let accepted = match cli.command {
        Command::Check { field, text } => {
            let result = validator.validate_field(field.into(), &text, user);
            print_json(&result)?;
            result.is_valid
        }
        Command::Card { question, answer } => match validator.validate_card(&question, &answer, user) {
            Ok(card) => {
                print_json(&card)?;
                true
            }
            Err(rejection) => {
                print_json(&create_error_response(&SecurityError::from(rejection)))?;
                false
            }
        },
        Command::File { mime, size } => {
            let result = validate_file_upload(&mime, size);
            print_json(&result)?;
            result.is_valid
        }
        Command::Display { text } => {
            print_json(&ValidationResult::valid(sanitize_for_display(&text)))?;
            true
        }
    };

    if cli.events {
        eprint!("{}", monitor.debug_report());
    }

    info!("Validation {}", if accepted { "passed" } else { "rejected" });
    if !accepted {
        std::process::exit(1);
    }

    Ok(())
}
