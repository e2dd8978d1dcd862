// Conversation memory module
// Bounded sliding window of question/answer exchanges


use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::provider::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message of the conversation, never mutated after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl From<&ConversationTurn> for ChatMessage {
    #[inline]
    fn from(turn: &ConversationTurn) -> Self {
        match turn.role {
            Role::User => Self::User(turn.text.clone()),
            Role::Assistant => Self::Assistant(turn.text.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct Exchange {
    question: String,
    answer: String,
}

/// Keeps the most recent `capacity` exchanges; a capacity of 10 holds up to 20 messages.
///
/// Not synchronized. Callers sharing one memory between requests must serialize access.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    exchanges: VecDeque<Exchange>,
    capacity: usize,
}

impl ConversationMemory {
    #[inline]
    pub fn new(capacity: usize) -> Self {
        Self {
            exchanges: VecDeque::with_capacity(capacity.saturating_add(1)),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored exchanges
    #[inline]
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Append one exchange, evicting the oldest once over capacity
    #[inline]
    pub fn record(&mut self, question: &str, answer: &str) {
        self.exchanges.push_back(Exchange {
            question: question.to_string(),
            answer: answer.to_string(),
        });

        while self.exchanges.len() > self.capacity {
            self.exchanges.pop_front();
            debug!("Evicted oldest exchange from conversation memory");
        }
    }

    /// Turns in chronological order, user before assistant within each exchange
    #[inline]
    pub fn window(&self) -> Vec<ConversationTurn> {
        self.exchanges
            .iter()
            .flat_map(|exchange| {
                [
                    ConversationTurn {
                        role: Role::User,
                        text: exchange.question.clone(),
                    },
                    ConversationTurn {
                        role: Role::Assistant,
                        text: exchange.answer.clone(),
                    },
                ]
            })
            .collect()
    }

    /// The window as model messages
    #[inline]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.window().iter().map(ChatMessage::from).collect()
    }

    #[inline]
    pub fn reset(&mut self) {
        self.exchanges.clear();
    }

    /// Plain-text transcript with `Human:` and `AI:` prefixes
    #[inline]
    pub fn history_text(&self) -> String {
        self.window()
            .iter()
            .map(|turn| match turn.role {
                Role::User => format!("Human: {}", turn.text),
                Role::Assistant => format!("AI: {}", turn.text),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ConversationMemory {
    #[inline]
    fn default() -> Self {
        Self::new(crate::config::MemoryConfig::default().window_size)
    }
}
