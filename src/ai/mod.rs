//! AI chat side-channel
//!
//! Each session carries one chat history, loaded once at session-open and
//! persisted in full on every mutation. The provider call itself lives
//! behind [`ChatProvider`]; failures surface inline and never remove the
//! user message that triggered them.

pub mod store;

pub use store::{ChatStore, ChatStoreError};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum messages kept per session (oldest dropped first)
pub const MAX_CHAT_MESSAGES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Unix timestamp (ms)
    pub created_at: i64,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now().timestamp_millis(),
        }
    }
}

/// Provider configuration used for one chat call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    pub provider: String,
    pub model: String,
    /// Override endpoint (self-hosted / proxy deployments)
    #[serde(default)]
    pub api_base: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_base: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Storage(#[from] ChatStoreError),
}

/// The external chat integration. Given provider config and an ordered
/// message list, returns the assistant reply text.
#[async_trait]
pub trait ChatProvider: Send + Sync + 'static {
    async fn send_chat(
        &self,
        settings: &ProviderSettings,
        messages: &[ChatMessage],
    ) -> Result<String, ChatError>;
}

/// Per-session chat state.
pub struct ChatSession {
    session_id: String,
    store: Arc<ChatStore>,
    provider: Arc<dyn ChatProvider>,
    system_prompt: String,
    messages: RwLock<Vec<ChatMessage>>,
    settings: RwLock<ProviderSettings>,
    /// Set once the user picks a model by hand; settings changes then stop
    /// clobbering the choice for the rest of the session.
    model_touched: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl ChatSession {
    /// Open the chat for a session, loading persisted history exactly once.
    pub fn open(
        session_id: impl Into<String>,
        store: Arc<ChatStore>,
        provider: Arc<dyn ChatProvider>,
        defaults: ProviderSettings,
        system_prompt: impl Into<String>,
    ) -> Result<Self, ChatError> {
        let session_id = session_id.into();
        let messages = store.load_history(&session_id)?;
        debug!(
            "Chat for session {} opened with {} persisted messages",
            session_id,
            messages.len()
        );

        Ok(Self {
            session_id,
            store,
            provider,
            system_prompt: system_prompt.into(),
            messages: RwLock::new(messages),
            settings: RwLock::new(defaults),
            model_touched: AtomicBool::new(false),
            last_error: RwLock::new(None),
        })
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().clone()
    }

    pub fn settings(&self) -> ProviderSettings {
        self.settings.read().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    /// User picked a model by hand; sticky for this session.
    pub fn set_model(&self, model: impl Into<String>) {
        self.settings.write().model = model.into();
        self.model_touched.store(true, Ordering::Release);
    }

    pub fn set_provider(&self, provider: impl Into<String>) {
        self.settings.write().provider = provider.into();
    }

    /// Apply defaults from the settings store. The model is only replaced
    /// when the user has not overridden it in this session.
    pub fn apply_default_settings(&self, defaults: ProviderSettings) {
        let mut settings = self.settings.write();
        settings.provider = defaults.provider;
        settings.api_base = defaults.api_base;
        if !self.model_touched.load(Ordering::Acquire) {
            settings.model = defaults.model;
        }
    }

    /// Send one user message.
    ///
    /// The user message is appended (and persisted) immediately; on provider
    /// success exactly one assistant message is appended; on failure the
    /// user message stays visible for retry and the error surfaces inline.
    pub async fn send_message(&self, content: &str) -> Result<(), ChatError> {
        self.append(ChatMessage::new(ChatRole::User, content))?;

        let prompt = self.build_prompt();
        let settings = self.settings();

        match self.provider.send_chat(&settings, &prompt).await {
            Ok(reply) => {
                self.append(ChatMessage::new(ChatRole::Assistant, reply))?;
                *self.last_error.write() = None;
                Ok(())
            }
            Err(e) => {
                warn!("Chat call for session {} failed: {}", self.session_id, e);
                *self.last_error.write() = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Drop the in-memory and persisted history.
    pub fn clear_history(&self) -> Result<(), ChatError> {
        self.messages.write().clear();
        self.store.delete_history(&self.session_id)?;
        Ok(())
    }

    /// Append one message, enforce the history bound, persist the full list.
    fn append(&self, message: ChatMessage) -> Result<(), ChatError> {
        let snapshot = {
            let mut messages = self.messages.write();
            messages.push(message);
            let excess = messages.len().saturating_sub(MAX_CHAT_MESSAGES);
            if excess > 0 {
                messages.drain(..excess);
            }
            messages.clone()
        };
        self.store.save_history(&self.session_id, &snapshot)?;
        Ok(())
    }

    /// System prompt followed by the conversation so far.
    fn build_prompt(&self) -> Vec<ChatMessage> {
        let messages = self.messages.read();
        let mut prompt = Vec::with_capacity(messages.len() + 1);
        prompt.push(ChatMessage::new(ChatRole::System, self.system_prompt.clone()));
        prompt.extend(messages.iter().cloned());
        prompt
    }
}
