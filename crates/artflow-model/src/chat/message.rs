//! Chat message types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of the speaker of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
    /// Any other role.
    Custom(String),
}

impl Role {
    /// Returns the role name as sent to providers.
    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Custom(role) => role,
        }
    }
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        match role.as_str() {
            "system" => Self::System,
            "user" => Self::User,
            "assistant" => Self::Assistant,
            _ => Self::Custom(role),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Custom(role) => role,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message that is part of a [`ChatHistory`](super::ChatHistory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    role: Role,
    text: String,
}

impl ChatMessage {
    /// Creates a message with the given role.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    /// Creates a system prompt.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// Creates a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Creates an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Creates a message with a custom role.
    pub fn custom(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Role::from(role.into()), text)
    }

    /// Returns the role of the speaker.
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Returns the content of the message.
    pub fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn roles_round_trip_through_strings() {
        assert_eq!(Role::from("assistant".to_owned()), Role::Assistant);
        assert_eq!(Role::from("judge".to_owned()), Role::Custom("judge".into()));
        assert_eq!(ChatMessage::custom("user", "hi").role(), &Role::User);
    }

    #[test]
    fn serializes_role_as_string() {
        let message = ChatMessage::custom("judge", "pass");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({ "role": "judge", "text": "pass" })
        );
    }
}
