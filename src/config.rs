use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::queue::Stage;
use crate::types::LLMProvider;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub database: DatabaseConfig,
    pub llm: LLMConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// JSON seed of websites and keywords, only read by the memory backend
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub model: String,
    pub openai_api_key: String,
    pub openrouter_api_key: String,
    pub groq_api_key: String,
    pub anthropic_api_key: String,
    pub requests_per_minute: u32,
    pub image_model: String,
}

impl LLMConfig {
    /// API key for the configured text provider, if one is set
    pub fn active_api_key(&self) -> Option<String> {
        let key = match self.provider {
            LLMProvider::OpenAI => &self.openai_api_key,
            LLMProvider::OpenRouter => &self.openrouter_api_key,
            LLMProvider::Groq => &self.groq_api_key,
            LLMProvider::Anthropic => &self.anthropic_api_key,
        };
        if key.is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub stage_timeout_secs: u64,
    pub long_stage_timeout_secs: u64,
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Drafting and image generation get the longer budget.
    pub fn stage_timeout(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Draft | Stage::Image => Duration::from_secs(self.long_stage_timeout_secs),
            _ => Duration::from_secs(self.stage_timeout_secs),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 5,
            stage_timeout_secs: 120,
            long_stage_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
    pub json: bool,
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .with_context(|| format!("{} has an invalid value: {:?}", name, raw))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => anyhow::bail!("STORE_BACKEND must be 'postgres' or 'memory', got {:?}", other),
        };

        let database_url = match (backend, env::var("DATABASE_URL")) {
            (_, Ok(url)) => url,
            (StoreBackend::Memory, Err(_)) => String::new(),
            (StoreBackend::Postgres, Err(_)) => {
                anyhow::bail!("DATABASE_URL must be set for the postgres store backend")
            }
        };

        let provider_name = env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = LLMProvider::parse(&provider_name)
            .with_context(|| format!("Unsupported LLM_PROVIDER: {}", provider_name))?;

        Ok(Self {
            server: ServerConfig {
                port: parse_var("PORT", "3000")?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            store: StoreConfig {
                backend,
                seed_file: env::var("SEED_FILE").ok().map(PathBuf::from),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_var("DB_MAX_CONNECTIONS", "10")?,
                min_connections: parse_var("DB_MIN_CONNECTIONS", "1")?,
            },
            llm: LLMConfig {
                provider,
                model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                openrouter_api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
                groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
                anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
                requests_per_minute: parse_var("LLM_REQUESTS_PER_MINUTE", "20")?,
                image_model: env::var("IMAGE_MODEL").unwrap_or_else(|_| "dall-e-3".to_string()),
            },
            worker: WorkerConfig {
                enabled: parse_var("WORKER_ENABLED", "true")?,
                poll_interval_secs: parse_var("WORKER_POLL_INTERVAL_SECS", "5")?,
                stage_timeout_secs: parse_var("STAGE_TIMEOUT_SECS", "120")?,
                long_stage_timeout_secs: parse_var("LONG_STAGE_TIMEOUT_SECS", "300")?,
            },
            logging: LoggingConfig {
                log_dir: env::var("LOG_DIR").ok().map(PathBuf::from),
                json: parse_var("LOG_JSON", "false")?,
            },
        })
    }

    /// Memory backend, no provider keys, nothing read from the environment.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            server: ServerConfig {
                port: 3000,
                host: "127.0.0.1".to_string(),
                cors_allowed_origins: vec!["http://localhost:5173".to_string()],
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                seed_file: None,
            },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 1,
                min_connections: 1,
            },
            llm: LLMConfig {
                provider: LLMProvider::OpenAI,
                model: "gpt-4o-mini".to_string(),
                openai_api_key: String::new(),
                openrouter_api_key: String::new(),
                groq_api_key: String::new(),
                anthropic_api_key: String::new(),
                requests_per_minute: 20,
                image_model: "dall-e-3".to_string(),
            },
            worker: WorkerConfig::default(),
            logging: LoggingConfig {
                log_dir: None,
                json: false,
            },
        }
    }
}
