//! Turns what the user typed into the text that goes over the wire.
//!
//! Free mode sends the trimmed text as-is. Q&A mode wraps the question and
//! answer in a fixed three-line template. When a behavior is selected the
//! wire payload also carries a bracketed context annotation; the message
//! shown in the log never does.

use serde::{Deserialize, Serialize};

use crate::error::ComposeError;

/// Behavior categories offered on the setup screen.
pub const DEFAULT_BEHAVIORS: [&str; 8] = [
    "アルコール依存",
    "喫煙",
    "夜間徘徊",
    "ギャンブル",
    "暴力",
    "浪費",
    "引きこもり",
    OTHER_BEHAVIOR,
];

/// The catch-all category; it may carry a user-supplied name.
pub const OTHER_BEHAVIOR: &str = "その他";

/// A selected behavior category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Behavior {
    label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    custom_name: String,
}

impl Behavior {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            custom_name: String::new(),
        }
    }

    /// A category with a custom name. The name only matters for [`OTHER_BEHAVIOR`].
    pub fn with_custom(label: impl Into<String>, custom_name: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            custom_name: custom_name.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn custom_name(&self) -> &str {
        &self.custom_name
    }

    pub fn is_other(&self) -> bool {
        self.label == OTHER_BEHAVIOR
    }

    /// The name used in outgoing messages.
    ///
    /// For [`OTHER_BEHAVIOR`] this is the trimmed custom name, falling back
    /// to the label itself when the name is blank.
    pub fn effective(&self) -> String {
        if self.is_other() {
            let custom = self.custom_name.trim();
            if custom.is_empty() {
                OTHER_BEHAVIOR.to_string()
            } else {
                custom.to_string()
            }
        } else {
            self.label.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComposeMode {
    #[default]
    Free,
    Qa,
}

impl ComposeMode {
    pub fn toggled(self) -> Self {
        match self {
            ComposeMode::Free => ComposeMode::Qa,
            ComposeMode::Qa => ComposeMode::Free,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ComposeMode::Free => "通常メッセージ",
            ComposeMode::Qa => "Q&Aセット入力",
        }
    }
}

/// Unsent input. Both modes keep their own fields so switching back and
/// forth does not lose text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub mode: ComposeMode,
    pub text: String,
    pub question: String,
    pub answer: String,
}

/// A composed message: `display` goes into the log, `payload` goes to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composed {
    pub display: String,
    pub payload: String,
}

impl Draft {
    pub fn free(text: impl Into<String>) -> Self {
        Self {
            mode: ComposeMode::Free,
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn qa(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            mode: ComposeMode::Qa,
            question: question.into(),
            answer: answer.into(),
            ..Self::default()
        }
    }

    /// Clears every field but keeps the current mode.
    pub fn clear(&mut self) {
        self.text.clear();
        self.question.clear();
        self.answer.clear();
    }

    pub fn compose(&self, behavior: Option<&Behavior>) -> Result<Composed, ComposeError> {
        let effective = behavior.map(Behavior::effective).unwrap_or_default();

        let display = match self.mode {
            ComposeMode::Free => {
                let text = self.text.trim();
                if text.is_empty() {
                    return Err(ComposeError::EmptyText);
                }
                text.to_string()
            }
            ComposeMode::Qa => {
                let question = self.question.trim();
                let answer = self.answer.trim();
                if question.is_empty() || answer.is_empty() {
                    return Err(ComposeError::IncompleteQa);
                }
                qa_template(&effective, question, answer)
            }
        };

        let payload = if effective.is_empty() {
            display.clone()
        } else {
            format!("{}\n{}", context_prefix(&effective), display)
        };

        Ok(Composed { display, payload })
    }
}

fn qa_template(behavior: &str, question: &str, answer: &str) -> String {
    format!("問題行動: {}\n支援者の問い: {}\n当人の回答: {}", behavior, question, answer)
}

/// The bracketed annotation put in front of payloads sent with a behavior selected.
pub fn context_prefix(behavior: &str) -> String {
    format!("[コンテキスト:問題行動={}]", behavior)
}
