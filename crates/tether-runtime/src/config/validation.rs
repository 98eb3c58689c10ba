//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, TetherConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &TetherConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;

    if config.bot.application_id.trim().is_empty() {
        return Err(ConfigError::missing_field("bot.application_id"));
    }

    if let Some(owner) = &config.bot.owner_id
        && (owner.is_empty() || !owner.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(ConfigError::validation(format!(
            "bot.owner_id must be a numeric user ID, got '{owner}'"
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid log filter target: '{target}'"
        )));
    }

    Ok(())
}
