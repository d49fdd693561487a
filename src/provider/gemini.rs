//! Gemini `generateContent` client
//!
//! Research requests enable the Google Search tool and read citations from the grounding
//! metadata; generation requests ask for a JSON response body.

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
use std::time::{Duration, Instant};
use tracing::{debug, info};

const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    client: Client,
    model: String,
    api_key: String,
    endpoint: String,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    candidate_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Deserialize)]
struct WebSource {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uri: Option<String>,
}

fn text_content(text: &str) -> Content {
    Content {
        parts: vec![Part {
            text: Some(text.to_string()),
        }],
    }
}

impl GeminiClient {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self, PipelineError> {
        let client = build_http_client(Duration::from_secs(config.request_timeout_secs))?;
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_GEMINI_ENDPOINT.to_string());
        Ok(Self {
            client,
            model: config.model.clone(),
            api_key,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<Candidate, CapabilityError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = check_response(response).await?;

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            CapabilityError::MalformedOutput(format!("Failed to parse Gemini response: {}", e))
        })?;
        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "Gemini request completed"
        );

        body.candidates
            .into_iter()
            .next()
            .ok_or_else(|| CapabilityError::MalformedOutput("No candidates in response".to_string()))
    }

    fn generation_config(&self, json_output: bool) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            candidate_count: 1,
            response_mime_type: json_output.then(|| "application/json".to_string()),
        }
    }
}

fn candidate_text(candidate: &Candidate) -> String {
    candidate
        .content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string()
}

fn candidate_citations(candidate: &Candidate) -> Vec<Citation> {
    candidate
        .grounding_metadata
        .as_ref()
        .map(|meta| {
            meta.grounding_chunks
                .iter()
                .filter_map(|chunk| chunk.web.as_ref())
                .map(|web| Citation {
                    title: web.title.clone().unwrap_or_else(|| "Unknown".to_string()),
                    uri: web.uri.clone().unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ResearchCapability for GeminiClient {
    async fn research(&self, query: &ResearchQuery) -> Result<ResearchResponse, CapabilityError> {
        let request = GenerateContentRequest {
            contents: vec![text_content(&query.prompt)],
            system_instruction: None,
            tools: vec![json!({ "google_search": {} })],
            generation_config: self.generation_config(false),
        };
        info!(
            model = %self.model,
            company = %query.company_query,
            year = query.year,
            "Gemini research request sent"
        );
        let candidate = self.generate_content(&request).await?;
        Ok(ResearchResponse {
            content: candidate_text(&candidate),
            citations: candidate_citations(&candidate),
        })
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[async_trait]
impl GenerationCapability for GeminiClient {
    async fn generate(&self, prompt: &GenerationPrompt) -> Result<String, CapabilityError> {
        let request = GenerateContentRequest {
            contents: vec![text_content(&prompt.prompt)],
            system_instruction: Some(text_content(&prompt.system)),
            tools: Vec::new(),
            generation_config: self.generation_config(true),
        };
        info!(
            model = %self.model,
            question_count = prompt.question_count,
            "Gemini generation request sent"
        );
        let candidate = self.generate_content(&request).await?;
        Ok(candidate_text(&candidate))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
