pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;

/// Coarse classification of a failed oracle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleErrorKind {
    Connection,
    RateLimited,
    Unavailable,
    InvalidResponse,
    Configuration,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
    #[error("LLM rate limit reached: {0}")]
    RateLimited(String),
    #[error("LLM service unavailable: {0}")]
    Unavailable(String),
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

impl LlmError {
    pub fn kind(&self) -> OracleErrorKind {
        match self {
            LlmError::ConnectionError(_) => OracleErrorKind::Connection,
            LlmError::ResponseError(_) | LlmError::EmptyResponse => OracleErrorKind::InvalidResponse,
            LlmError::ConfigError(_) => OracleErrorKind::Configuration,
            LlmError::RateLimited(_) => OracleErrorKind::RateLimited,
            LlmError::Unavailable(_) => OracleErrorKind::Unavailable,
        }
    }

    /// Maps a non-success HTTP status onto the matching error.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        let message = format!("API responded with status code: {}{}", status, body);
        match status {
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited(message),
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                LlmError::Unavailable(message)
            }
            _ => LlmError::ResponseError(message),
        }
    }
}

/// The AI text oracle: prompt in, text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

pub struct LlmManager {
    generator: Arc<dyn TextGenerator>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let generator: Arc<dyn TextGenerator> = match config.backend.as_str() {
            "remote" => Arc::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Arc::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self { generator })
    }

    pub fn with_generator(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl TextGenerator for LlmManager {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let text = self.generator.generate(prompt).await?;
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}
