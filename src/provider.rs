//! External Capability Providers
//!
//! The pipeline talks to two external capabilities: a research capability that turns a
//! company query into grounded text with citations, and a generation capability that turns
//! a prompt into raw JSON question text. Both are traits so the orchestrator can be driven
//! by HTTP clients in production and scripted doubles in tests.

use crate::error::{CapabilityError, PipelineError};
use crate::model::{Citation, SectionAllocation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod gemini;
pub mod http;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiCompatibleClient;

/// Input to the research capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchQuery {
    /// Company plus known exam names, e.g. "TCS (TCS NQT)"
    pub company_query: String,
    pub year: u16,
    /// Fully rendered research instructions
    pub prompt: String,
}

/// Raw research capability output
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResearchResponse {
    pub content: String,
    pub citations: Vec<Citation>,
}

/// Input to the generation capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPrompt {
    pub research_content: String,
    pub question_count: u32,
    pub section_distribution: Vec<SectionAllocation>,
    /// Rendered user prompt
    pub prompt: String,
    /// System instructions
    pub system: String,
}

#[async_trait]
pub trait ResearchCapability: Send + Sync {
    async fn research(&self, query: &ResearchQuery) -> Result<ResearchResponse, CapabilityError>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

#[async_trait]
pub trait GenerationCapability: Send + Sync {
    /// Returns the raw model text, expected to be JSON
    async fn generate(&self, prompt: &GenerationPrompt) -> Result<String, CapabilityError>;

    fn name(&self) -> &str;
}

/// Which HTTP API a provider speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Gemini,
    OpenaiCompatible,
}

/// Provider connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,

    /// API base URL; provider default when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Inline API key (prefer `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_output_tokens: Option<u32>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    90
}

impl ProviderConfig {
    pub fn gemini(model: &str) -> Self {
        Self {
            kind: ProviderKind::Gemini,
            model: model.to_string(),
            endpoint: None,
            api_key: None,
            api_key_env: Some("GEMINI_API_KEY".to_string()),
            temperature: Some(0.3),
            max_output_tokens: Some(8192),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("Request timeout must be greater than zero".to_string());
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(format!(
                    "Temperature must be between 0.0 and 2.0, got {}",
                    temperature
                ));
            }
        }
        if self.kind == ProviderKind::OpenaiCompatible && self.endpoint.is_none() {
            return Err("OpenAI-compatible providers require an endpoint".to_string());
        }
        Ok(())
    }

    /// Inline key first, then the named environment variable
    pub fn resolve_api_key(&self) -> Result<String, PipelineError> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        let var = self.api_key_env.as_deref().ok_or_else(|| {
            PipelineError::Config(format!("No API key configured for model {}", self.model))
        })?;
        std::env::var(var)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                PipelineError::Config(format!("API key environment variable {} is not set", var))
            })
    }
}

/// Builds capability clients from configuration
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn research_client(
        config: &ProviderConfig,
    ) -> Result<Arc<dyn ResearchCapability>, PipelineError> {
        config.validate().map_err(PipelineError::Config)?;
        let api_key = config.resolve_api_key()?;
        Ok(match config.kind {
            ProviderKind::Gemini => Arc::new(GeminiClient::new(config, api_key)?),
            ProviderKind::OpenaiCompatible => {
                Arc::new(OpenAiCompatibleClient::new(config, api_key)?)
            }
        })
    }

    pub fn generation_client(
        config: &ProviderConfig,
    ) -> Result<Arc<dyn GenerationCapability>, PipelineError> {
        config.validate().map_err(PipelineError::Config)?;
        let api_key = config.resolve_api_key()?;
        Ok(match config.kind {
            ProviderKind::Gemini => Arc::new(GeminiClient::new(config, api_key)?),
            ProviderKind::OpenaiCompatible => {
                Arc::new(OpenAiCompatibleClient::new(config, api_key)?)
            }
        })
    }
}
