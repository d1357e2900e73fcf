//! Identifiers for ragkit entities.
//!
//! Ids are caller-supplied strings. When a caller has none, `generate()`
//! produces a kind-prefixed ULID.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a MessageSession
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an existing id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id
    pub fn generate() -> Self {
        Self(format!("msg_sess_{}", Ulid::new()))
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for a KnowledgeBaseSession
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeBaseId(String);

impl KnowledgeBaseId {
    /// Wrap an existing id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id
    pub fn generate() -> Self {
        Self(format!("kb_sess_{}", Ulid::new()))
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for KnowledgeBaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for KnowledgeBaseId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for a KnowledgeBaseCollection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(String);

impl CollectionId {
    /// Wrap an existing id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id
    pub fn generate() -> Self {
        Self(format!("kb_coll_{}", Ulid::new()))
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CollectionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_prefixed_and_distinct() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert!(a.as_str().starts_with("msg_sess_"));
        assert_ne!(a, b);
        assert!(KnowledgeBaseId::generate().as_str().starts_with("kb_sess_"));
        assert!(CollectionId::generate().as_str().starts_with("kb_coll_"));
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = SessionId::new("s1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"s1\"");
    }
}
