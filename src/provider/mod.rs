use futures_util::StreamExt;
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::AppConfig;
use crate::web::models::{ChatRequest, Role};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to provider failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("provider stream error: {0}")]
    Stream(String),
}

// --- Gemini REST payload types ---

#[derive(Debug, Clone, Serialize)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
pub enum Part {
    #[serde(rename = "text")]
    Text(String),
    #[serde(rename = "inlineData")]
    InlineData(InlineData),
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub role: &'static str,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    pub thinking_budget: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafetySetting {
    pub category: &'static str,
    pub threshold: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub system_instruction: SystemInstruction,
    pub generation_config: GenerationConfig,
    /// Omitted entirely when no capability is enabled; the API treats an
    /// empty tools array differently from an absent one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    pub safety_settings: Vec<SafetySetting>,
}

const BLOCKED_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

fn provider_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        Role::User => "user",
    }
}

/// Translate a chat turn into the provider-native payload. History is cut
/// to the most recent window; within each history entry text precedes
/// images, while the current turn lists images first.
pub fn build_request(chat: &ChatRequest) -> GenerateRequest {
    let mut contents = Vec::new();

    for entry in chat.recent_history() {
        let mut parts = Vec::new();
        if !entry.content.is_empty() {
            parts.push(Part::Text(entry.content.clone()));
        }
        for image in &entry.images {
            parts.push(Part::InlineData(InlineData {
                mime_type: image.mime_type.clone(),
                data: image.data.clone(),
            }));
        }
        contents.push(Content {
            role: provider_role(entry.role),
            parts,
        });
    }

    let mut current = Vec::new();
    for image in &chat.images {
        current.push(Part::InlineData(InlineData {
            mime_type: image.mime_type.clone(),
            data: image.data.clone(),
        }));
    }
    if let Some(message) = chat.message.as_deref() {
        if !message.is_empty() {
            current.push(Part::Text(message.to_string()));
        }
    }
    contents.push(Content {
        role: "user",
        parts: current,
    });

    let tools = if chat.settings.enable_google_search {
        Some(vec![serde_json::json!({ "googleSearch": {} })])
    } else {
        None
    };

    GenerateRequest {
        contents,
        system_instruction: SystemInstruction {
            parts: vec![Part::Text(chat.settings.system_instruction().to_string())],
        },
        generation_config: GenerationConfig {
            temperature: chat.settings.clamped_temperature(),
            max_output_tokens: chat.settings.clamped_max_output_tokens(),
            thinking_config: chat
                .settings
                .clamped_thinking_budget()
                .map(|thinking_budget| ThinkingConfig { thinking_budget }),
        },
        tools,
        safety_settings: BLOCKED_CATEGORIES
            .iter()
            .map(|category| SafetySetting {
                category,
                threshold: "BLOCK_MEDIUM_AND_ABOVE",
            })
            .collect(),
    }
}

// --- streaming response types ---

#[derive(Debug, Deserialize)]
pub struct GenerateContentChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentChunk {
    /// The usable text fragments of this chunk, in order. A chunk may carry
    /// none at all (metadata-only chunks are normal).
    pub fn text_parts(&self) -> impl Iterator<Item = &str> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
    }
}

/// Client for the hosted Gemini API. Constructed once at startup from the
/// resolved config and injected into the handlers; the base URL is
/// overridable so tests can point it at a local fake.
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.gemini_api_key.clone(), config.gemini_base_url.clone())
    }

    /// Open one streaming generation call and return the sequence of text
    /// fragments as the provider produces them.
    ///
    /// A non-2xx response fails here, before any stream is handed out. A
    /// failure after streaming has begun surfaces as an `Err` item on the
    /// returned stream.
    pub async fn stream_generate(
        &self,
        chat: &ChatRequest,
    ) -> Result<ReceiverStream<Result<String, ProviderError>>, ProviderError> {
        let model = chat.settings.model().to_string();
        let payload = build_request(chat);
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        );

        info!("Opening provider stream for model {}", model);
        if let Ok(body) = serde_json::to_string(&payload) {
            debug!("Provider payload: {}", body);
        }

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::Stream(e.to_string()))).await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // Process complete SSE events; a partial event stays
                // buffered until its blank-line terminator arrives.
                while let Some(pos) = buffer.find("\n\n") {
                    let event = buffer[..pos].to_string();
                    buffer.drain(..pos + 2);

                    for line in event.lines() {
                        let Some(data) = line.strip_prefix("data: ") else {
                            continue;
                        };
                        if data.trim().is_empty() {
                            continue;
                        }
                        let parsed: GenerateContentChunk = match serde_json::from_str(data) {
                            Ok(c) => c,
                            Err(_) => continue,
                        };
                        for text in parsed.text_parts() {
                            if text.is_empty() {
                                continue;
                            }
                            if tx.send(Ok(text.to_string())).await.is_err() {
                                // Receiver dropped; the caller went away.
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }
}
