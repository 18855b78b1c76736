//! Main application settings and configuration management

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use validator::Validate;

use crate::FraudScoringConfig;

/// Main application settings structure
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppSettings {
    /// Application metadata
    pub application: ApplicationConfig,

    /// Server configuration
    pub server: ServerConfig,

    /// Fraud scoring configuration
    pub scoring: FraudScoringConfig,
}

/// Application metadata configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApplicationConfig {
    #[validate(length(min = 1))]
    pub name: String,

    #[validate(length(min = 1))]
    pub version: String,

    #[validate(length(min = 1))]
    pub environment: String,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
}

impl AppSettings {
    /// Load configuration from layered sources: built-in defaults,
    /// default.yaml, the `RUST_ENV`-specific file, local.yaml, then
    /// `PAYGUARD__`-prefixed environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::builder().add_source(Config::try_from(&AppSettings::default())?);

        if Path::new("config/default.yaml").exists() {
            config = config.add_source(File::with_name("config/default").format(FileFormat::Yaml));
        }

        let env = env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string());
        let env_config_path = format!("config/{}.yaml", env);
        if Path::new(&env_config_path).exists() {
            config = config
                .add_source(File::with_name(&format!("config/{}", env)).format(FileFormat::Yaml));
        }

        if Path::new("config/local.yaml").exists() {
            config = config.add_source(File::with_name("config/local").format(FileFormat::Yaml));
        }

        config = config.add_source(
            Environment::with_prefix("PAYGUARD")
                .separator("__")
                .try_parsing(true),
        );

        let settings: AppSettings = config.build()?.try_deserialize()?;

        settings.validate().map_err(|e| {
            ConfigError::Message(format!("Configuration validation failed: {:?}", e))
        })?;

        Ok(settings)
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.application.environment
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.application.environment == "development"
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.application.environment == "production"
    }

    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            application: ApplicationConfig {
                name: "PayGuard".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                environment: "development".to_string(),
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            scoring: FraudScoringConfig::default(),
        }
    }
}
