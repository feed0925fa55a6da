use anyhow::{anyhow, Result};
use std::env;
use tracing::{info, warn};

use crate::llm_providers::LLMProviderType;
use crate::models::GradingModel;
use crate::session_store::{DEFAULT_IDLE_TTL_MINUTES, DEFAULT_MAX_SESSIONS};
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LLMConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub quiz: QuizConfig,
    pub logging: LoggingConfig,
}

/// Grading/summary collaborator configuration
#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub provider: LLMProviderType,
    pub model_override: Option<String>,
    pub default_model: GradingModel,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Memory,
    Sqlite { url: String },
}

#[derive(Debug, Clone)]
pub struct QuizConfig {
    pub question_bank_path: Option<String>,
    pub max_sessions: usize,
    pub session_idle_ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            llm: LLMConfig::from_env()?,
            server: ServerConfig::from_env()?,
            storage: StorageConfig::from_env(),
            quiz: QuizConfig::from_env()?,
            logging: LoggingConfig::from_env(),
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            llm_provider = ?self.llm.provider,
            llm_key = %self.llm.api_key.as_deref().map(mask_sensitive_data).unwrap_or_else(|| "<unset>".to_string()),
            default_model = %self.llm.default_model,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            storage = ?self.storage,
            question_bank = ?self.quiz.question_bank_path,
            max_sessions = self.quiz.max_sessions,
            session_idle_ttl_minutes = self.quiz.session_idle_ttl_minutes,
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if let StorageConfig::Sqlite { url } = &self.storage {
            if !url.starts_with("sqlite:") {
                return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
            }
        }

        if self.quiz.max_sessions == 0 {
            return Err(anyhow!("MAX_SESSIONS must be greater than 0"));
        }

        if self.quiz.session_idle_ttl_minutes <= 0 {
            return Err(anyhow!("SESSION_IDLE_TTL_MINUTES must be greater than 0"));
        }

        if self.llm.api_key.is_none() {
            warn!("LLM API key not set - answers will be graded by exact match only");
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl LLMConfig {
    fn from_env() -> Result<Self> {
        let api_key = env::var("LLM_API_KEY")
            .or_else(|_| env::var("MISTRAL_API_KEY"))
            .or_else(|_| env::var("MistralAPIKey"))
            .ok()
            .filter(|key| !key.trim().is_empty());

        let base_url = env::var("LLM_BASE_URL").ok();
        let provider = LLMProviderType::parse(&env::var("LLM_PROVIDER").unwrap_or_else(|_| "mistral".to_string()));
        let model_override = env::var("LLM_MODEL").ok().filter(|m| !m.trim().is_empty());

        let default_model = match env::var("LLM_DEFAULT_MODEL") {
            Ok(value) => value
                .parse::<GradingModel>()
                .map_err(|e| anyhow!("Invalid LLM_DEFAULT_MODEL: {}", e))?,
            Err(_) => GradingModel::default(),
        };

        Ok(LLMConfig {
            api_key,
            base_url,
            provider,
            model_override,
            default_model,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());

        let port = port_str
            .parse::<u16>()
            .map_err(|_| anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str))?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl StorageConfig {
    fn from_env() -> Self {
        match env::var("FLAG_STORE") {
            Ok(kind) if kind.eq_ignore_ascii_case("memory") => StorageConfig::Memory,
            _ => StorageConfig::Sqlite {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:anatomy_quiz.db?mode=rwc".to_string()),
            },
        }
    }
}

impl QuizConfig {
    fn from_env() -> Result<Self> {
        let max_sessions = match env::var("MAX_SESSIONS") {
            Ok(value) => value
                .parse::<usize>()
                .map_err(|_| anyhow!("Invalid MAX_SESSIONS value: '{}'", value))?,
            Err(_) => DEFAULT_MAX_SESSIONS,
        };

        let session_idle_ttl_minutes = match env::var("SESSION_IDLE_TTL_MINUTES") {
            Ok(value) => value
                .parse::<i64>()
                .map_err(|_| anyhow!("Invalid SESSION_IDLE_TTL_MINUTES value: '{}'", value))?,
            Err(_) => DEFAULT_IDLE_TTL_MINUTES,
        };

        Ok(QuizConfig {
            question_bank_path: env::var("QUESTION_BANK_PATH").ok(),
            max_sessions,
            session_idle_ttl_minutes,
        })
    }
}

impl LoggingConfig {
    fn from_env() -> Self {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,anatomy_quiz=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        }
    }
}

/// Mask sensitive data in configuration for safe logging
pub fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            llm: LLMConfig {
                api_key: Some("sk-valid-key".to_string()),
                base_url: None,
                provider: LLMProviderType::Mistral,
                model_override: None,
                default_model: GradingModel::default(),
            },
            server: ServerConfig {
                port: 3000,
                host: "0.0.0.0".to_string(),
            },
            storage: StorageConfig::Sqlite {
                url: "sqlite::memory:".to_string(),
            },
            quiz: QuizConfig {
                question_bank_path: None,
                max_sessions: 100,
                session_idle_ttl_minutes: 60,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: false,
                console_enabled: true,
                log_directory: "logs".to_string(),
            },
        }
    }

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sk-1234567890abcdef"), "sk-1***cdef");
    }

    #[test]
    fn test_config_validation() {
        let config = sample_config();
        assert!(config.validate().is_ok());

        let mut no_key = config.clone();
        no_key.llm.api_key = None;
        assert!(no_key.validate().is_ok());

        let mut bad_port = config.clone();
        bad_port.server.port = 0;
        assert!(bad_port.validate().is_err());

        let mut no_sessions = config.clone();
        no_sessions.quiz.max_sessions = 0;
        assert!(no_sessions.validate().is_err());

        let mut no_ttl = config.clone();
        no_ttl.quiz.session_idle_ttl_minutes = 0;
        assert!(no_ttl.validate().is_err());

        let mut bad_db = config;
        bad_db.storage = StorageConfig::Sqlite {
            url: "postgres://localhost/quiz".to_string(),
        };
        assert!(bad_db.validate().is_err());
    }
}
