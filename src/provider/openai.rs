//! OpenAI-compatible chat completions client
//!
//! Works against any `/chat/completions` endpoint. Citations are read from the Perplexity
//! style `search_results` array, falling back to the bare `citations` URL list.

use super::http::{build_http_client, check_response, map_transport_error};
use super::{
    GenerationCapability, GenerationPrompt, ProviderConfig, ResearchCapability, ResearchQuery,
    ResearchResponse,
};
use crate::error::{CapabilityError, PipelineError};
use crate::model::Citation;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

const RESEARCH_SYSTEM_PROMPT: &str = "You are a placement exam research assistant. \
Report accurate, recent and specific information about exam structure, sections, \
question types and difficulty. Cite your sources.";

pub struct OpenAiCompatibleClient {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    citations: Vec<String>,
    #[serde(default)]
    search_results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl ChatCompletionResponse {
    fn content(&self) -> Result<String, CapabilityError> {
        self.choices
            .first()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| CapabilityError::MalformedOutput("No choices in response".to_string()))
    }

    fn collect_citations(&self) -> Vec<Citation> {
        if !self.search_results.is_empty() {
            return self
                .search_results
                .iter()
                .map(|r| Citation {
                    title: r.title.clone().unwrap_or_else(|| "Unknown".to_string()),
                    uri: r.url.clone().unwrap_or_default(),
                })
                .collect();
        }
        self.citations
            .iter()
            .map(|uri| Citation {
                title: uri.clone(),
                uri: uri.clone(),
            })
            .collect()
    }
}

impl OpenAiCompatibleClient {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self, PipelineError> {
        let client = build_http_client(Duration::from_secs(config.request_timeout_secs))?;
        let base_url = config.endpoint.clone().ok_or_else(|| {
            PipelineError::Config("OpenAI-compatible provider requires an endpoint".to_string())
        })?;
        Ok(Self {
            client,
            model: config.model.clone(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
        })
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        response_format: Option<Value>,
    ) -> Result<ChatCompletionResponse, CapabilityError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = check_response(response).await?;

        response.json().await.map_err(|e| {
            CapabilityError::MalformedOutput(format!("Failed to parse response: {}", e))
        })
    }
}

#[async_trait]
impl ResearchCapability for OpenAiCompatibleClient {
    async fn research(&self, query: &ResearchQuery) -> Result<ResearchResponse, CapabilityError> {
        info!(
            model = %self.model,
            company = %query.company_query,
            year = query.year,
            "Research request sent"
        );
        let completion = self
            .complete(RESEARCH_SYSTEM_PROMPT, &query.prompt, None)
            .await?;
        Ok(ResearchResponse {
            content: completion.content()?,
            citations: completion.collect_citations(),
        })
    }

    fn name(&self) -> &str {
        "openai_compatible"
    }
}

#[async_trait]
impl GenerationCapability for OpenAiCompatibleClient {
    async fn generate(&self, prompt: &GenerationPrompt) -> Result<String, CapabilityError> {
        info!(
            model = %self.model,
            question_count = prompt.question_count,
            "Generation request sent"
        );
        let completion = self
            .complete(
                &prompt.system,
                &prompt.prompt,
                Some(json!({ "type": "json_object" })),
            )
            .await?;
        completion.content()
    }

    fn name(&self) -> &str {
        "openai_compatible"
    }
}
