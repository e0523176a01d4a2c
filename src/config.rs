use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub ai: AiConfig,
    pub funnel: FunnelConfig,
    pub sms: SmsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

/// Chat-completions backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub extraction_max_tokens: u32,
    pub reply_max_tokens: u32,
    pub timeout_secs: u64,
}

/// Knobs of the conversation funnel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelConfig {
    /// Debounce window before a message is processed
    pub cooldown_secs: u64,
    /// Messages closer than this share a session
    pub session_window_secs: u64,
    /// Messages of history handed to the reply prompt
    pub history_limit: usize,
    /// Minimum similarity for a fuzzy address match, in (0, 1]
    pub fuzzy_match_threshold: f64,
    /// Used when the interested property has no scheduling link
    pub default_scheduling_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    pub provider: String, // "twilio" or "log"
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/leasebot.db".to_string(),
                max_connections: 10,
                connection_timeout_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            ai: AiConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                extraction_max_tokens: 200,
                reply_max_tokens: 120,
                timeout_secs: 30,
            },
            funnel: FunnelConfig {
                cooldown_secs: 5,
                session_window_secs: 10,
                history_limit: 10,
                fuzzy_match_threshold: 0.8,
                default_scheduling_link: "https://calendly.com/leasing-office/30min".to_string(),
            },
            sms: SmsConfig {
                provider: "log".to_string(),
                account_sid: None,
                auth_token: None,
                from_number: None,
                base_url: "https://api.twilio.com/2010-04-01".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .add_source(
                Config::try_from(&Self::default())
                    .map_err(|e| anyhow::anyhow!("Failed to serialize default configuration: {}", e))?,
            )
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("leasebot").required(false))
            // Add environment variables with prefix, e.g. LEASEBOT_FUNNEL__COOLDOWN_SECS
            .add_source(Environment::with_prefix("LEASEBOT").prefix_separator("_").separator("__"))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let mut app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        app_config.apply_env_overrides();

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Honour the conventional variables other tools already set
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if self.ai.api_key.is_none() {
            self.ai.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        crate::validation::InputValidator::validate_database_url(&self.database.url)?;
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(anyhow::anyhow!("connection_timeout_secs must be greater than 0"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate AI config
        if self.ai.api_key.as_deref().map_or(true, |key| key.trim().is_empty()) {
            return Err(anyhow::anyhow!(
                "ai.api_key is required (set LEASEBOT_AI__API_KEY or OPENAI_API_KEY)"
            ));
        }
        if self.ai.model.trim().is_empty() {
            return Err(anyhow::anyhow!("ai.model cannot be empty"));
        }
        if self.ai.extraction_max_tokens == 0 || self.ai.reply_max_tokens == 0 {
            return Err(anyhow::anyhow!("AI token budgets must be greater than 0"));
        }
        if self.ai.timeout_secs == 0 {
            return Err(anyhow::anyhow!("ai.timeout_secs must be greater than 0"));
        }

        // Validate funnel config
        if self.funnel.history_limit == 0 {
            return Err(anyhow::anyhow!("history_limit must be greater than 0"));
        }
        if !(self.funnel.fuzzy_match_threshold > 0.0 && self.funnel.fuzzy_match_threshold <= 1.0) {
            return Err(anyhow::anyhow!(
                "fuzzy_match_threshold must be in (0, 1], got {}",
                self.funnel.fuzzy_match_threshold
            ));
        }
        if self.funnel.default_scheduling_link.trim().is_empty() {
            return Err(anyhow::anyhow!("default_scheduling_link cannot be empty"));
        }

        // Validate SMS config
        match self.sms.provider.as_str() {
            "log" => {}
            "twilio" => {
                let missing = [
                    ("account_sid", &self.sms.account_sid),
                    ("auth_token", &self.sms.auth_token),
                    ("from_number", &self.sms.from_number),
                ]
                .into_iter()
                .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
                .map(|(name, _)| name)
                .collect::<Vec<_>>();

                if !missing.is_empty() {
                    return Err(anyhow::anyhow!("Twilio provider needs sms.{}", missing.join(", sms.")));
                }
            }
            other => {
                return Err(anyhow::anyhow!(
                    "Invalid SMS provider: {}. Must be one of: [\"twilio\", \"log\"]",
                    other
                ));
            }
        }

        Ok(())
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> AppConfig {
        let mut config = AppConfig::default();
        config.ai.api_key = Some("sk-test".to_string());
        config
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database.url, "sqlite:data/leasebot.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.funnel.cooldown_secs, 5);
    }

    #[test]
    fn test_config_validation() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        assert!(AppConfig::default().validate().is_err());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = configured();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
