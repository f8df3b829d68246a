//! Google Gemini `generateContent` backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    ChatflowError, OracleConfig, Result,
    model::Role,
    oracle::{Oracle, OracleRequest},
};

const API_KEY_ENV: &str = "GEMINI_API_KEY";

pub struct GeminiOracle {
    http: Client,
    model: String,
    endpoint: String,
    api_key: String,
}

impl GeminiOracle {
    pub fn new(
        model: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            model: model.into(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// Build from config, reading the api key from `GEMINI_API_KEY` when not configured.
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let api_key = match &config.api_key {
            Some(key) if !key.is_empty() => key.clone(),
            _ => std::env::var(API_KEY_ENV).map_err(|_| ChatflowError::Config(format!("oracle api key is not configured and {} is not set", API_KEY_ENV)))?,
        };
        Ok(Self::new(config.model.clone(), config.endpoint.clone(), api_key))
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint.trim_end_matches('/'), self.model)
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

fn to_gemini_request(request: OracleRequest) -> GeminiRequest {
    let contents = request
        .contents
        .into_iter()
        .map(|turn| GeminiContent {
            role: Some(match turn.role {
                Role::Model => "model".to_string(),
                Role::User | Role::System => "user".to_string(),
            }),
            parts: vec![GeminiPart {
                text: turn.text,
            }],
        })
        .collect();

    GeminiRequest {
        contents,
        system_instruction: request.system_instruction.map(|text| GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text,
            }],
        }),
        generation_config: request.json_response.then(|| GenerationConfig {
            response_mime_type: "application/json".to_string(),
        }),
    }
}

fn response_text(response: GeminiResponse) -> Result<String> {
    let Some(content) = response.candidates.into_iter().next().and_then(|c| c.content) else {
        return Err(ChatflowError::Oracle(format!(
            "empty response from gemini, feedback: {}",
            response.prompt_feedback.map(|f| f.to_string()).unwrap_or_default()
        )));
    };
    Ok(content.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().concat())
}

#[async_trait]
impl Oracle for GeminiOracle {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        request: OracleRequest,
    ) -> Result<String> {
        let body = to_gemini_request(request);
        debug!(model = %self.model, turns = body.contents.len(), "gemini generateContent");

        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatflowError::Oracle(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(ChatflowError::Oracle(format!("HTTP {}: {}", status, body)));
        }

        let response = response.json::<GeminiResponse>().await.map_err(|e| ChatflowError::Oracle(format!("invalid gemini response: {}", e)))?;
        response_text(response)
    }
}
