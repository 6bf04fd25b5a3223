use thiserror::Error;

/// Shown inline whenever the chat endpoint could not be reached or answered
/// with a non-success status.
pub const FAILURE_NOTICE: &str =
    "サーバー呼び出しに失敗しました。URLとCORS設定を確認してください。";

/// Failure of a single call to the chat endpoint.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request to chat endpoint failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status} {reason} - {body}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },
    #[error("request task ended unexpectedly: {0}")]
    Interrupted(String),
}

impl ChatError {
    /// The text surfaced to the user for this failure.
    pub fn notice(&self) -> &'static str {
        FAILURE_NOTICE
    }
}

/// Why a draft could not be turned into an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error("message is empty")]
    EmptyText,
    #[error("both a question and an answer are required")]
    IncompleteQa,
}

/// Why a send attempt was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendRejected {
    #[error("a request is already in flight")]
    InFlight,
    #[error("nothing to send: {0}")]
    Empty(#[from] ComposeError),
}
