//! Chat session state: the message list a rendering layer observes, plus
//! the single "run turn" operation that both send and regenerate drive.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use log::{error, info};
use thiserror::Error;
use uuid::Uuid;

use crate::client::{consume, AssembledMessage, ConsumeError};
use crate::web::models::{
    ChatRequest, GenerationSettings, HistoryEntry, ImageAttachment, Role,
};

/// Caption substituted when a turn carries images but no text.
pub const IMAGE_ONLY_CAPTION: &str = "Please analyze these images.";

/// One entry of the session's message list.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub images: Vec<ImageAttachment>,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn user(content: String, images: Vec<ImageAttachment>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content,
            images,
            is_complete: true,
            created_at: Utc::now(),
        }
    }

    fn from_assembled(assembled: AssembledMessage) -> Self {
        Self {
            id: assembled.id,
            role: assembled.role,
            content: assembled.content,
            images: Vec::new(),
            is_complete: assembled.complete,
            created_at: assembled.created_at,
        }
    }

    fn error_fallback(details: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: format!(
                "Sorry, I encountered an error while processing your request: {}\n\nPlease try again.",
                details
            ),
            images: Vec::new(),
            is_complete: true,
            created_at: Utc::now(),
        }
    }

    fn to_history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            role: self.role,
            content: self.content.clone(),
            images: self.images.clone(),
            is_complete: self.is_complete,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a request is already in flight")]
    Busy,
    #[error("message or images are required")]
    EmptyTurn,
    #[error("no assistant message with that id")]
    UnknownMessage,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("relay returned HTTP {status}: {body}")]
    Relay { status: u16, body: String },
    #[error(transparent)]
    Stream(#[from] ConsumeError),
}

/// Thin HTTP client for the relay endpoint.
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// POST one turn and hand back the response byte stream. A non-2xx
    /// status is read fully and surfaced as a relay error.
    async fn open_turn(
        &self,
        request: &ChatRequest,
    ) -> Result<impl Stream<Item = Result<Bytes, reqwest::Error>> + Unpin, SessionError> {
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::Relay {
                status: status.as_u16(),
                body,
            });
        }
        Ok(Box::pin(response.bytes_stream()))
    }
}

/// One chat conversation. A single request is in flight at a time; a
/// send or regenerate while busy is rejected, not queued.
pub struct ChatSession {
    client: ChatClient,
    settings: GenerationSettings,
    messages: Vec<ChatMessage>,
    busy: bool,
}

impl ChatSession {
    pub fn new(client: ChatClient, settings: GenerationSettings) -> Self {
        Self {
            client,
            settings,
            messages: Vec::new(),
            busy: false,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn set_settings(&mut self, settings: GenerationSettings) {
        self.settings = settings;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Submit a new user turn and stream the assistant's reply into the
    /// message list.
    pub async fn send(
        &mut self,
        message: &str,
        images: Vec<ImageAttachment>,
    ) -> Result<(), SessionError> {
        if self.busy {
            return Err(SessionError::Busy);
        }
        if message.is_empty() && images.is_empty() {
            return Err(SessionError::EmptyTurn);
        }

        let content = if message.is_empty() {
            IMAGE_ONLY_CAPTION.to_string()
        } else {
            message.to_string()
        };

        let history: Vec<HistoryEntry> =
            self.messages.iter().map(ChatMessage::to_history_entry).collect();
        self.messages.push(ChatMessage::user(content.clone(), images.clone()));

        self.run_turn(content, images, history).await
    }

    /// Re-run the turn that produced the given assistant message: that
    /// message and everything after it are dropped, and the preceding user
    /// turn's content and images become the new current turn.
    pub async fn regenerate(&mut self, message_id: Uuid) -> Result<(), SessionError> {
        if self.busy {
            return Err(SessionError::Busy);
        }
        let idx = self
            .messages
            .iter()
            .position(|m| m.id == message_id && m.role == Role::Assistant)
            .ok_or(SessionError::UnknownMessage)?;
        if idx == 0 || self.messages[idx - 1].role != Role::User {
            return Err(SessionError::UnknownMessage);
        }

        info!("Regenerating response for message {}", message_id);
        // The prompting user turn stays in the list; the old assistant
        // message and everything after it are discarded entirely.
        self.messages.truncate(idx);
        let user = self.messages[idx - 1].clone();
        let history: Vec<HistoryEntry> = self.messages[..idx - 1]
            .iter()
            .map(ChatMessage::to_history_entry)
            .collect();

        self.run_turn(user.content, user.images, history).await
    }

    async fn run_turn(
        &mut self,
        message: String,
        images: Vec<ImageAttachment>,
        history: Vec<HistoryEntry>,
    ) -> Result<(), SessionError> {
        self.busy = true;
        let result = self.drive_turn(message, images, history).await;
        // The flag resets on every path; a failure must never leave the
        // session stuck "loading".
        self.busy = false;

        match result {
            Ok(assembled) => {
                self.messages.push(ChatMessage::from_assembled(assembled));
                Ok(())
            }
            Err(e) => {
                error!("Turn failed: {}", e);
                self.messages.push(ChatMessage::error_fallback(&e.to_string()));
                Err(e)
            }
        }
    }

    async fn drive_turn(
        &self,
        message: String,
        images: Vec<ImageAttachment>,
        history: Vec<HistoryEntry>,
    ) -> Result<AssembledMessage, SessionError> {
        let request = ChatRequest {
            message: Some(message),
            images,
            history,
            settings: self.settings.clone(),
        };
        let stream = self.client.open_turn(&request).await?;
        let mut assembled = AssembledMessage::new(Role::Assistant);
        consume(stream, &mut assembled).await?;
        Ok(assembled)
    }
}
