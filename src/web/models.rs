use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// How many history entries are forwarded to the provider. Older entries
/// are dropped silently, not summarized.
pub const HISTORY_WINDOW: usize = 10;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful assistant.";
pub const DEFAULT_TEMPERATURE: f32 = 1.0;
pub const DEFAULT_MAX_OUTPUT_TOKENS: i64 = 30000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
}

/// A base64-encoded image payload attached to a turn. Never mutated after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAttachment {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

/// One prior exchange in the conversation, as re-sent by the client on
/// every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
    #[serde(default, rename = "isComplete")]
    pub is_complete: bool,
}

/// Generation settings as sent by the client. Every numeric field is
/// re-clamped server-side; client-supplied bounds are never trusted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<i64>,
    #[serde(default)]
    pub enable_thinking: bool,
    #[serde(default)]
    pub thinking_budget: Option<i64>,
    #[serde(default)]
    pub enable_google_search: bool,
}

impl GenerationSettings {
    pub fn model(&self) -> &str {
        match self.model.as_deref() {
            Some(m) if !m.is_empty() => m,
            _ => DEFAULT_MODEL,
        }
    }

    pub fn system_instruction(&self) -> &str {
        match self.system_instruction.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => DEFAULT_SYSTEM_INSTRUCTION,
        }
    }

    pub fn clamped_temperature(&self) -> f32 {
        let t = self.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if t.is_nan() {
            DEFAULT_TEMPERATURE
        } else {
            t.clamp(0.0, 2.0)
        }
    }

    pub fn clamped_max_output_tokens(&self) -> i64 {
        self.max_output_tokens
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS)
            .clamp(1000, 40000)
    }

    /// The thinking budget to forward, or `None` when thinking is disabled
    /// or the budget is not positive.
    pub fn clamped_thinking_budget(&self) -> Option<i64> {
        if !self.enable_thinking {
            return None;
        }
        match self.thinking_budget {
            Some(b) if b > 0 => Some(b.clamp(0, 10000)),
            _ => None,
        }
    }
}

/// One chat turn submitted to the relay: current message and/or images,
/// prior history, and a settings snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub settings: GenerationSettings,
}

impl ChatRequest {
    /// A turn with neither text nor images is rejected before any provider
    /// call.
    pub fn is_empty_turn(&self) -> bool {
        self.message.as_deref().unwrap_or("").is_empty() && self.images.is_empty()
    }

    /// The most recent slice of history forwarded to the provider,
    /// chronological order preserved.
    pub fn recent_history(&self) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(HISTORY_WINDOW);
        &self.history[start..]
    }
}

/// One unit of the relay's wire protocol. On the wire each event is a
/// single line `data: <json>` followed by a blank line; the end of a
/// successful stream is the literal `data: [DONE]` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Text { content: String },
    Error { message: String },
}

pub const FRAME_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

impl StreamEvent {
    pub fn text(content: impl Into<String>) -> Self {
        StreamEvent::Text {
            content: content.into(),
        }
    }

    /// Encode as one wire frame (`data: <json>\n\n`).
    pub fn to_frame(&self) -> Bytes {
        // StreamEvent serialization cannot fail: strings only.
        let json = serde_json::to_string(self).unwrap_or_default();
        Bytes::from(format!("{}{}\n\n", FRAME_PREFIX, json))
    }
}

/// The terminal sentinel frame closing a successful stream.
pub fn done_frame() -> Bytes {
    Bytes::from(format!("{}{}\n\n", FRAME_PREFIX, DONE_SENTINEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(json: serde_json::Value) -> GenerationSettings {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn temperature_clamped_and_total() {
        assert_eq!(settings(serde_json::json!({})).clamped_temperature(), 1.0);
        assert_eq!(
            settings(serde_json::json!({"temperature": -3.5})).clamped_temperature(),
            0.0
        );
        assert_eq!(
            settings(serde_json::json!({"temperature": 99.0})).clamped_temperature(),
            2.0
        );
        assert_eq!(
            settings(serde_json::json!({"temperature": 0.7})).clamped_temperature(),
            0.7
        );
        // NaN cannot arrive via JSON, but the clamp must still be total.
        let s = GenerationSettings {
            temperature: Some(f32::NAN),
            ..Default::default()
        };
        assert_eq!(s.clamped_temperature(), 1.0);
    }

    #[test]
    fn clamping_is_idempotent() {
        let s = settings(serde_json::json!({"temperature": 99.0, "maxOutputTokens": 5}));
        let once = GenerationSettings {
            temperature: Some(s.clamped_temperature()),
            max_output_tokens: Some(s.clamped_max_output_tokens()),
            ..s.clone()
        };
        assert_eq!(once.clamped_temperature(), s.clamped_temperature());
        assert_eq!(
            once.clamped_max_output_tokens(),
            s.clamped_max_output_tokens()
        );
    }

    #[test]
    fn max_output_tokens_clamped() {
        assert_eq!(
            settings(serde_json::json!({})).clamped_max_output_tokens(),
            30000
        );
        assert_eq!(
            settings(serde_json::json!({"maxOutputTokens": 1})).clamped_max_output_tokens(),
            1000
        );
        assert_eq!(
            settings(serde_json::json!({"maxOutputTokens": -50})).clamped_max_output_tokens(),
            1000
        );
        assert_eq!(
            settings(serde_json::json!({"maxOutputTokens": 1000000})).clamped_max_output_tokens(),
            40000
        );
    }

    #[test]
    fn thinking_budget_requires_toggle_and_positive_value() {
        assert_eq!(
            settings(serde_json::json!({"thinkingBudget": 500})).clamped_thinking_budget(),
            None
        );
        assert_eq!(
            settings(serde_json::json!({"enableThinking": true})).clamped_thinking_budget(),
            None
        );
        assert_eq!(
            settings(serde_json::json!({"enableThinking": true, "thinkingBudget": 0}))
                .clamped_thinking_budget(),
            None
        );
        assert_eq!(
            settings(serde_json::json!({"enableThinking": true, "thinkingBudget": 500}))
                .clamped_thinking_budget(),
            Some(500)
        );
        assert_eq!(
            settings(serde_json::json!({"enableThinking": true, "thinkingBudget": 999999}))
                .clamped_thinking_budget(),
            Some(10000)
        );
    }

    #[test]
    fn empty_turn_detection() {
        let req: ChatRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(req.is_empty_turn());

        let req: ChatRequest = serde_json::from_value(serde_json::json!({"message": ""})).unwrap();
        assert!(req.is_empty_turn());

        let req: ChatRequest =
            serde_json::from_value(serde_json::json!({"message": "hi"})).unwrap();
        assert!(!req.is_empty_turn());

        let req: ChatRequest = serde_json::from_value(serde_json::json!({
            "images": [{"mimeType": "image/png", "data": "aGVsbG8="}]
        }))
        .unwrap();
        assert!(!req.is_empty_turn());
    }

    #[test]
    fn history_window_keeps_most_recent_ten_in_order() {
        let history: Vec<HistoryEntry> = (0..15)
            .map(|i| HistoryEntry {
                role: if i % 2 == 0 { Role::User } else { Role::Assistant },
                content: format!("m{}", i),
                images: Vec::new(),
                is_complete: true,
            })
            .collect();
        let req = ChatRequest {
            message: Some("hi".into()),
            images: Vec::new(),
            history,
            settings: GenerationSettings::default(),
        };
        let recent = req.recent_history();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "m5");
        assert_eq!(recent[9].content, "m14");
    }

    #[test]
    fn frame_encoding_matches_wire_protocol() {
        let frame = StreamEvent::text("Hello").to_frame();
        assert_eq!(
            &frame[..],
            b"data: {\"type\":\"text\",\"content\":\"Hello\"}\n\n"
        );
        assert_eq!(&done_frame()[..], b"data: [DONE]\n\n");
    }
}
