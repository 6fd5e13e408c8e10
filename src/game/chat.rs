//! Room chat: bounded, append-only log

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: u64,
    pub player_id: Uuid,
    pub sender: String,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Message cannot be empty.")]
    Empty,

    #[error("Message must be at most {0} characters long.")]
    TooLong(usize),
}

/// Most recent messages, oldest evicted first
#[derive(Debug, Clone)]
pub struct ChatLog {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
    max_len: usize,
    next_id: u64,
}

impl ChatLog {
    pub fn new(capacity: usize, max_len: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            max_len,
            next_id: 1,
        }
    }

    /// Validate and append. Returns the stored message.
    pub fn post(&mut self, player_id: Uuid, sender: &str, text: &str) -> Result<ChatMessage, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Empty);
        }
        if text.chars().count() > self.max_len {
            return Err(ChatError::TooLong(self.max_len));
        }

        let message = ChatMessage {
            id: self.next_id,
            player_id,
            sender: sender.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        };
        self.next_id += 1;

        if self.messages.len() == self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message.clone());
        Ok(message)
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
