//! Chat message model.

use serde::{Deserialize, Serialize};

use crate::Time;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The user
    Human,
    /// The model
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Human => write!(f, "human"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "user" => Ok(Role::Human),
            "assistant" | "ai" => Ok(Role::Assistant),
            other => Err(format!("unknown role `{}`", other)),
        }
    }
}

/// A single message in a session's chat log. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    content: String,
    role: Role,
    created_at: Time,
}

impl ChatMessage {
    /// Create a message stamped at `created_at`.
    pub fn new(content: impl Into<String>, role: Role, created_at: Time) -> Self {
        Self {
            content: content.into(),
            role,
            created_at,
        }
    }

    /// Message text
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Author
    pub fn role(&self) -> Role {
        self.role
    }

    /// Creation time (UTC)
    pub fn created_at(&self) -> Time {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("human".parse::<Role>().unwrap(), Role::Human);
        assert_eq!("Assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!("ai".parse::<Role>().unwrap(), Role::Assistant);
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn test_message_wire_shape() {
        let at = chrono::Utc::now();
        let msg = ChatMessage::new("Tell me a joke", Role::Human, at);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "human");
        assert_eq!(json["content"], "Tell me a joke");

        let back: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back.created_at(), at);
    }
}
