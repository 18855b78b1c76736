//! PayGuard Configuration Management Library
//!
//! This library provides configuration management for all PayGuard services.
//! It supports YAML files layered with environment variables and validates
//! every setting at load time.

pub mod scoring;
pub mod settings;

// Re-export commonly used types
pub use scoring::*;
pub use settings::*;

// Re-export external dependencies
pub use config::{Config, ConfigError, Environment, File, FileFormat};
pub use dotenvy::dotenv;
