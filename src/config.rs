use serde::Deserialize;
use std::env;

use crate::constants::{DEFAULT_XAI_BASE_URL, DEFAULT_XAI_VISION_MODEL};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Transcription (xAI vision)
    pub xai_api_key: Option<String>,
    pub xai_base_url: String,
    pub xai_vision_model: String,

    // CORS
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,

            xai_api_key: env::var("XAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            xai_base_url: env::var("XAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_XAI_BASE_URL.to_string()),
            xai_vision_model: env::var("XAI_VISION_MODEL")
                .unwrap_or_else(|_| DEFAULT_XAI_VISION_MODEL.to_string()),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if !self.database_url.starts_with("sqlite:") {
            anyhow::bail!("DATABASE_URL must be a sqlite: URL");
        }
        if self.database_max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be > 0");
        }
        if self.xai_vision_model.trim().is_empty() {
            anyhow::bail!("XAI_VISION_MODEL is empty");
        }

        if self.xai_api_key.is_none() {
            tracing::warn!("XAI_API_KEY not set; image transcription is disabled");
        }
        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        environment: "test".to_string(),
        database_url: "sqlite::memory:".to_string(),
        database_max_connections: 1,
        xai_api_key: None,
        xai_base_url: DEFAULT_XAI_BASE_URL.to_string(),
        xai_vision_model: DEFAULT_XAI_VISION_MODEL.to_string(),
        cors_allowed_origins: "*".to_string(),
    }
}
