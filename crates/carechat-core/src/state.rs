//! UI-agnostic conversation state
//!
//! The message log is append-only. Sending is split into two explicit
//! transitions, [`Conversation::begin_send`] and [`Conversation::finish_send`],
//! so a front end can run the request wherever it likes while the
//! single-flight rule stays enforced here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::ChatTransport;
use crate::composer::{Behavior, Draft};
use crate::error::{ChatError, SendRejected};

/// Opening assistant message for a fresh conversation.
pub const GREETING: &str =
    "こんにちは。下の入力欄から送信してください。選んだ『問題行動』の文脈で返答します。";

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            sent_at: Utc::now(),
        }
    }
}

/// Handed out by [`Conversation::begin_send`]; carries what must be posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub payload: String,
    pub user_message_id: Uuid,
}

#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    pub draft: Draft,
    behavior: Option<Behavior>,
    in_flight: bool,
    error: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_greeting() -> Self {
        let mut conversation = Self::new();
        conversation
            .messages
            .push(ChatMessage::new(ChatRole::Assistant, GREETING));
        conversation
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn behavior(&self) -> Option<&Behavior> {
        self.behavior.as_ref()
    }

    pub fn set_behavior(&mut self, behavior: Option<Behavior>) {
        self.behavior = behavior;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether a send right now would actually go out.
    pub fn can_send(&self) -> bool {
        !self.in_flight && self.draft.compose(self.behavior.as_ref()).is_ok()
    }

    /// Most recent assistant message, if any.
    pub fn last_reply(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::Assistant)
    }

    /// Starts a send: clears the last error, appends the user message, empties
    /// the draft and marks a request as in flight.
    ///
    /// Nothing changes when a request is already in flight. An empty draft
    /// only clears the last error.
    pub fn begin_send(&mut self) -> Result<PendingSend, SendRejected> {
        if self.in_flight {
            return Err(SendRejected::InFlight);
        }
        self.error = None;

        let composed = self.draft.compose(self.behavior.as_ref())?;

        let message = ChatMessage::new(ChatRole::User, composed.display);
        let user_message_id = message.id;
        self.messages.push(message);
        self.draft.clear();
        self.in_flight = true;

        info!(message_id = %user_message_id, "sending message");

        Ok(PendingSend {
            payload: composed.payload,
            user_message_id,
        })
    }

    /// Ends the in-flight request. A reply is appended as an assistant
    /// message; a failure only sets the error notice.
    pub fn finish_send(&mut self, result: Result<String, ChatError>) {
        if !self.in_flight {
            warn!("reply arrived with no request in flight, ignoring");
            return;
        }
        self.in_flight = false;

        match result {
            Ok(reply) => {
                self.messages.push(ChatMessage::new(ChatRole::Assistant, reply));
            }
            Err(err) => {
                warn!(error = %err, "chat request failed");
                self.error = Some(err.notice().to_string());
            }
        }
    }

    /// Runs a whole send against `transport`.
    pub async fn send<T>(&mut self, transport: &T) -> Result<(), SendRejected>
    where
        T: ChatTransport + ?Sized,
    {
        let pending = self.begin_send()?;
        let result = transport.send_message(&pending.payload).await;
        self.finish_send(result);
        Ok(())
    }
}
