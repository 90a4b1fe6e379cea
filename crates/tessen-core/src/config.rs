use anyhow::Result;
use config::Config;
use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub expansion: ExpansionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpansionConfig {
    /// Upper bound on occurrences generated for a single recurring series.
    pub max_instances: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    /// ## Summary
    /// Loads configuration from `.env` file and environment variables into a `Settings`.
    /// Environment variables take precedence over `.env` file values.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it fails.
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .set_default("expansion.max_instances", 10_000)?
            .set_default("logging.level", "debug")?
            // Env file
            .add_source(
                config::Environment::default()
                    .convert_case(config::Case::Snake)
                    .separator("_")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            // TOML file
            .add_source(config::File::with_name("config.toml").required(false))
            .build()?
            .try_deserialize::<Settings>()?;
        settings.validate()?;
        Ok(settings)
    }

    /// ## Summary
    /// Checks cross-field constraints that serde cannot express.
    ///
    /// ## Errors
    /// Returns [`CoreError::InvalidConfiguration`] for out-of-range values.
    pub fn validate(&self) -> CoreResult<()> {
        if self.expansion.max_instances == 0 {
            return Err(CoreError::InvalidConfiguration(
                "expansion.max_instances must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config() -> Result<Settings> {
    dotenvy::dotenv().ok();

    Settings::load()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_instances: u16) -> Settings {
        Settings {
            expansion: ExpansionConfig { max_instances },
            logging: LoggingConfig {
                level: "debug".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_positive_cap() {
        assert!(settings(1).validate().is_ok());
        assert!(settings(10_000).validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_cap() {
        assert!(matches!(
            settings(0).validate(),
            Err(CoreError::InvalidConfiguration(_))
        ));
    }
}
