//! Conversation session: agent session continuity plus message history.
//!
//! All operations take `&self`; state sits behind a short-lived lock that is never
//! held across an await point.

use crate::agent::AgentResult;
use crate::markup;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: Sender,
    pub content: String,
    /// Assistant replies only: content with links rendered as anchors.
    pub rendered_html: Option<String>,
    pub is_typing: bool,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            sender: Sender::User,
            content: content.into(),
            rendered_html: None,
            is_typing: false,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        let content = content.into();
        let rendered_html = Some(markup::render_links(&content));
        Self {
            id: Uuid::now_v7(),
            sender: Sender::Assistant,
            content,
            rendered_html,
            is_typing: false,
            timestamp: Utc::now(),
        }
    }

    /// Empty assistant message shown while a reply is being composed.
    pub fn typing() -> Self {
        Self {
            id: Uuid::now_v7(),
            sender: Sender::Assistant,
            content: String::new(),
            rendered_html: None,
            is_typing: true,
            timestamp: Utc::now(),
        }
    }
}

/// Identifiers sent with the next agent request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub sequence_id: u64,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            session_id: None,
            sequence_id: 1,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    ids: SessionSnapshot,
    messages: Vec<Message>,
}

/// Session identifiers and history for one conversation.
#[derive(Debug, Default)]
pub struct ConversationSession {
    inner: Mutex<Inner>,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// New session whose history opens with an assistant greeting.
    pub fn with_welcome(welcome: &str) -> Self {
        let session = Self::new();
        if !welcome.trim().is_empty() {
            session.append_message(Message::assistant(welcome));
        }
        session
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().ids.clone()
    }

    /// Success adopts the provider's identifiers; anything else resets.
    pub fn apply_result(&self, result: &AgentResult) {
        let mut inner = self.lock();
        if result.success {
            inner.ids = SessionSnapshot {
                session_id: result.session_id.clone().filter(|s| !s.is_empty()),
                sequence_id: result.sequence_id.unwrap_or(1).max(1),
            };
            debug!(
                "Session updated: {:?} / {}",
                inner.ids.session_id, inner.ids.sequence_id
            );
        } else {
            inner.ids = SessionSnapshot::default();
            debug!("Session reset after unsuccessful result");
        }
    }

    pub fn reset(&self) {
        self.lock().ids = SessionSnapshot::default();
    }

    pub fn append_message(&self, message: Message) -> Uuid {
        let id = message.id;
        self.lock().messages.push(message);
        id
    }

    pub fn append_assistant_message(&self, text: &str) -> Uuid {
        self.append_message(Message::assistant(text))
    }

    /// Rewrite the most recent user message, or append one if there is none.
    pub fn replace_last_user_message(&self, text: &str) {
        let mut inner = self.lock();
        match inner.messages.iter().rposition(|m| m.sender == Sender::User) {
            Some(index) => inner.messages[index].content = text.to_string(),
            None => inner.messages.push(Message::user(text)),
        }
    }

    /// Insert the typing indicator. An existing one is removed first.
    pub fn insert_typing_placeholder(&self) -> Uuid {
        let placeholder = Message::typing();
        let id = placeholder.id;
        let mut inner = self.lock();
        inner.messages.retain(|m| !m.is_typing);
        inner.messages.push(placeholder);
        id
    }

    /// Returns whether a placeholder with `id` was present.
    pub fn remove_typing_placeholder(&self, id: Uuid) -> bool {
        let mut inner = self.lock();
        let before = inner.messages.len();
        inner.messages.retain(|m| !(m.is_typing && m.id == id));
        inner.messages.len() != before
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn last_user_message(&self) -> Option<Message> {
        self.lock()
            .messages
            .iter()
            .rev()
            .find(|m| m.sender == Sender::User)
            .cloned()
    }
}
