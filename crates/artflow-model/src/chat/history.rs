//! Chat history with an optional length limit.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::ChatMessage;
use crate::error::{Error, Result};

/// An ordered sequence of chat messages.
///
/// When a maximum length is set, adding a message beyond it evicts the
/// oldest message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistory {
    messages: VecDeque<ChatMessage>,
    max_length: Option<usize>,
}

impl ChatHistory {
    /// Creates an empty history without a length limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty history keeping at most `max_length` messages.
    ///
    /// Fails if `max_length` is zero.
    pub fn with_max_length(max_length: usize) -> Result<Self> {
        if max_length == 0 {
            return Err(Error::invalid_argument(
                "max_length must be positive, but got 0",
            ));
        }
        Ok(Self {
            messages: VecDeque::with_capacity(max_length),
            max_length: Some(max_length),
        })
    }

    /// Creates a history from existing messages, without a length limit.
    pub fn from_messages(messages: impl IntoIterator<Item = ChatMessage>) -> Self {
        Self {
            messages: messages.into_iter().collect(),
            max_length: None,
        }
    }

    /// Returns the length limit, if any.
    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    /// Adds a message, evicting the oldest one if the limit is exceeded.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        if self.max_length.is_some_and(|max| self.messages.len() > max) {
            self.messages.pop_front();
        }
    }

    /// Adds several messages in order.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        for message in messages {
            self.push(message);
        }
    }

    /// Returns the last `n` messages, or all of them if there are fewer.
    pub fn last(&self, n: usize) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().skip(self.messages.len().saturating_sub(n))
    }

    /// Returns an iterator over the messages, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    /// Returns the number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the history is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Removes every message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl<'a> IntoIterator for &'a ChatHistory {
    type IntoIter = std::collections::vec_deque::Iter<'a, ChatMessage>;
    type Item = &'a ChatMessage;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

impl IntoIterator for ChatHistory {
    type IntoIter = std::collections::vec_deque::IntoIter<ChatMessage>;
    type Item = ChatMessage;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}
