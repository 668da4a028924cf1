use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl GeminiConfig {
    /// API key comes from the environment only; model and base URL are
    /// caller-supplied so binaries can expose them as flags.
    pub fn from_env(model: &str, base_url: &str) -> anyhow::Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY is not set"))?;
        Ok(Self {
            api_key,
            base_url: base_url.to_owned(),
            model: model.to_owned(),
        })
    }

    pub fn endpoint(&self) -> String {
        generate_endpoint(&self.base_url, &self.model)
    }
}

pub fn generate_endpoint(base_url: &str, model: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/models/{model}:generateContent")
}

pub fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("build http client")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
}

impl GenerateContentRequest {
    pub fn from_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_owned(),
                }],
            }],
            generation_config: None,
            tools: None,
        }
    }

    /// Constrain the reply to JSON matching `schema`.
    pub fn with_json_schema(mut self, schema: serde_json::Value) -> Self {
        self.generation_config = Some(GenerationConfig {
            response_mime_type: Some("application/json".to_owned()),
            response_schema: Some(schema),
        });
        self
    }

    /// Enable the built-in Google Search grounding tool.
    pub fn with_google_search(mut self) -> Self {
        self.tools = Some(vec![Tool {
            google_search: GoogleSearch {},
        }]);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub google_search: GoogleSearch,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleSearch {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidatePart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroundingChunk {
    #[serde(default)]
    pub web: Option<WebSource>,
}

/// A cited web source from grounding metadata. Either field may be absent
/// or empty; callers filter before use.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebSource {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

pub async fn generate_content(
    client: &reqwest::Client,
    config: &GeminiConfig,
    request: &GenerateContentRequest,
) -> anyhow::Result<GenerateContentResponse> {
    let endpoint = config.endpoint();

    let response = client
        .post(endpoint.as_str())
        .header("x-goog-api-key", &config.api_key)
        .json(request)
        .send()
        .await
        .with_context(|| format!("POST {endpoint}"))?;

    let status = response.status();
    let raw = response.text().await.context("read Gemini response body")?;
    if !status.is_success() {
        let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
        anyhow::bail!("Gemini API error ({status}): {message}");
    }

    serde_json::from_str(&raw).context("parse Gemini response")
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

/// Concatenated text of the first candidate's parts. Empty when the model
/// returned no text (e.g. search-grounded replies with no findings).
pub fn response_text(response: &GenerateContentResponse) -> String {
    let mut text = String::new();
    let Some(candidate) = response.candidates.first() else {
        return text;
    };
    let Some(content) = &candidate.content else {
        return text;
    };
    for part in &content.parts {
        if let Some(part_text) = &part.text {
            text.push_str(part_text);
        }
    }
    text
}

/// Cited web sources of the first candidate, in response order, unfiltered.
pub fn grounding_sources(response: &GenerateContentResponse) -> Vec<WebSource> {
    let Some(candidate) = response.candidates.first() else {
        return Vec::new();
    };
    let Some(metadata) = &candidate.grounding_metadata else {
        return Vec::new();
    };
    metadata
        .grounding_chunks
        .iter()
        .filter_map(|chunk| chunk.web.clone())
        .collect()
}
