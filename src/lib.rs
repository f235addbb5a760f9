//! Client-side input validation, rate limiting and security event monitoring
//! for flashcard content.

pub mod config;
pub mod errors;
pub mod generation;
pub mod monitoring;
pub mod security;

pub use config::SecurityConfig;
pub use errors::SecurityError;
