//! Bounded conversation history for one practice session.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Topic/language framing plus a sliding window of the most recent turns.
#[derive(Debug)]
pub struct ConversationContext {
    pub topic: String,
    pub language: String,
    turns: VecDeque<Turn>,
    max_turns: usize,
    last_active: Instant,
}

impl ConversationContext {
    pub fn new(topic: impl Into<String>, language: impl Into<String>, max_turns: usize) -> Self {
        Self {
            topic: topic.into(),
            language: language.into(),
            turns: VecDeque::with_capacity(max_turns + 1),
            max_turns,
            last_active: Instant::now(),
        }
    }

    /// Append a turn, dropping the oldest ones past the window.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push_back(Turn { role, content: content.into() });
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
        self.last_active = Instant::now();
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    /// `Role: content` lines, oldest first.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
