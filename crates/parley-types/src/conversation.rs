//! Conversation identity and creation handle.
//!
//! A `ConversationId` is the key that partitions stateful processing: every
//! update carrying the same identity is served by the same chat session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::fmt;

/// Opaque, comparable key of a conversation (usually the platform chat id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversationId {
    /// Numeric identity (Telegram-style chat ids).
    Int(i64),
    /// Free-form identity chosen by the application classifier.
    Str(String),
}

impl ConversationId {
    /// Build an identity from a JSON scalar (number or string).
    ///
    /// Returns `None` for any other JSON shape.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationId::Int(id) => write!(f, "{id}"),
            ConversationId::Str(id) => write!(f, "{id}"),
        }
    }
}

impl From<i64> for ConversationId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::Str(id.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(id: String) -> Self {
        Self::Str(id)
    }
}

/// Identity plus the metadata captured when a conversation was first routed.
///
/// Passed once to the session initializer (or resume callback); never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationHandle {
    pub id: ConversationId,
    /// Arbitrary classifier-supplied metadata (e.g. the "chat" object).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ConversationHandle {
    pub fn new(id: impl Into<ConversationId>) -> Self {
        Self {
            id: id.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(id: impl Into<ConversationId>, metadata: Value) -> Self {
        Self {
            id: id.into(),
            metadata: Some(metadata),
        }
    }
}
