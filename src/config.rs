use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::{debug, info};

use crate::errors::SecurityError;
use crate::monitoring::{SecurityMonitorConfig, MAX_EVENT_CAPACITY};
use crate::security::RateLimitPolicy;

/// Pipeline configuration with environment variable support.
///
/// Field length limits are not configurable; they mirror the storage layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub rate_limit: RateLimitPolicy,
    pub monitor: SecurityMonitorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SecurityConfig {
    /// Load configuration from environment variables with fallback to config file
    pub fn load() -> Result<Self> {
        if Path::new(".env").exists() {
            dotenv::dotenv().ok();
            debug!("Loaded .env file");
        }

        let config_path = env::var("FLASHCARD_SECURITY_CONFIG")
            .unwrap_or_else(|_| "config/security.toml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };

        config.override_from_env();
        config.validate()?;

        info!("Configuration loaded: {}", config.summary());
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {}", path))
    }

    fn override_from_env(&mut self) {
        if let Ok(val) = env::var("RATE_LIMIT_MAX_ATTEMPTS") {
            if let Ok(num) = val.parse() {
                self.rate_limit.max_attempts = num;
            }
        }
        if let Ok(val) = env::var("RATE_LIMIT_WINDOW_MS") {
            if let Ok(num) = val.parse() {
                self.rate_limit.window_ms = num;
            }
        }

        if let Ok(val) = env::var("SECURITY_EVENT_CAPACITY") {
            if let Ok(num) = val.parse() {
                self.monitor.max_events = num;
            }
        }
        if let Ok(val) = env::var("SUSPICIOUS_ACTIVITY_THRESHOLD") {
            if let Ok(num) = val.parse() {
                self.monitor.suspicious_threshold = num;
            }
        }
        if let Ok(val) = env::var("SECURITY_USER_AGENT") {
            self.monitor.user_agent = Some(val);
        }

        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), SecurityError> {
        if self.rate_limit.max_attempts == 0 {
            return Err(SecurityError::InvalidConfiguration(
                "rate_limit.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.window_ms == 0 {
            return Err(SecurityError::InvalidConfiguration(
                "rate_limit.window_ms must be greater than 0".to_string(),
            ));
        }

        if self.monitor.max_events == 0 {
            return Err(SecurityError::InvalidConfiguration(
                "monitor.max_events must be greater than 0".to_string(),
            ));
        }

        if self.monitor.max_events > MAX_EVENT_CAPACITY {
            return Err(SecurityError::InvalidConfiguration(format!(
                "monitor.max_events must be at most {}",
                MAX_EVENT_CAPACITY
            )));
        }

        if self.monitor.suspicious_window_ms == 0 {
            return Err(SecurityError::InvalidConfiguration(
                "monitor.suspicious_window_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get a summary of the configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "RateLimit={}/{}ms, EventCapacity={}, SuspiciousThreshold={}, LogLevel={}",
            self.rate_limit.max_attempts,
            self.rate_limit.window_ms,
            self.monitor.max_events,
            self.monitor.suspicious_threshold,
            self.logging.level
        )
    }
}
