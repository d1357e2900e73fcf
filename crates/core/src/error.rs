//! Error kinds for entity construction and mutation.

/// Result alias for entity-model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Entity kinds, used to name the namespace an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// MessageSession
    MessageSession,
    /// KnowledgeBaseSession
    KnowledgeBaseSession,
    /// KnowledgeBaseCollection
    Collection,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::MessageSession => write!(f, "message session"),
            EntityKind::KnowledgeBaseSession => write!(f, "knowledge base session"),
            EntityKind::Collection => write!(f, "knowledge base collection"),
        }
    }
}

/// Errors raised by the entity model. All are local and recoverable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Malformed or missing required field
    #[error("validation failed on `{field}`: {reason}")]
    Validation {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Id collision within a namespace
    #[error("{kind} with id `{id}` already exists")]
    DuplicateId {
        /// Namespace of the collision
        kind: EntityKind,
        /// The colliding id
        id: String,
    },

    /// Mutation would break an entity invariant
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Lookup by id found nothing
    #[error("{kind} `{id}` not found")]
    NotFound {
        /// Namespace searched
        kind: EntityKind,
        /// The missing id
        id: String,
    },
}

impl ModelError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn invariant(reason: impl Into<String>) -> Self {
        Self::InvariantViolation(reason.into())
    }

    /// True for `Validation` errors.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// True for `DuplicateId` errors.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateId { .. })
    }

    /// True for `InvariantViolation` errors.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}
