use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One model answer from `chat_completion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPrediction {
    pub generation: Message,
}

/// Completed `(prompt, response)` exchanges, oldest first.
pub type History = Vec<(String, String)>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dialog {
    messages: Vec<Message>,
}

impl Dialog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the alternating user/assistant turns of `history`.
    pub fn from_history(history: &[(String, String)]) -> Self {
        let mut dialog = Self::new();
        for (prompt, answer) in history {
            dialog.push(Message::user(prompt.clone()));
            dialog.push(Message::assistant(answer.clone()));
        }
        dialog
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Drops the oldest user/assistant pairs until `measure` reports at most
    /// `budget`. A leading system message and the final turn are always kept.
    /// Returns how many messages were removed.
    pub fn fit_window<F>(&mut self, budget: usize, mut measure: F) -> crate::error::Result<usize>
    where
        F: FnMut(&Dialog) -> crate::error::Result<usize>,
    {
        let first = match self.messages.first() {
            Some(m) if m.role == Role::System => 1,
            _ => 0,
        };
        let mut removed = 0;
        while measure(self)? > budget && self.messages.len() >= first + 3 {
            self.messages.drain(first..first + 2);
            removed += 2;
        }
        if removed > 0 {
            tracing::debug!(removed, remaining = self.messages.len(), budget, "trimmed dialog window");
        }
        Ok(removed)
    }
}

impl From<Vec<Message>> for Dialog {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}
