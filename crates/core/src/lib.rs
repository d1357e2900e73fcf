//! ragkit core data model.
//!
//! Chat sessions, the knowledge bases that ground them, and the
//! collections that group knowledge bases, together with the rules that
//! keep them consistent. Nothing here performs I/O.

#![warn(missing_docs)]

// Identities and errors
mod id;
mod error;
pub mod validation;

// Entities
mod message;
mod knowledge_base;
mod session;

// Coordination
mod clock;
mod registry;

// Re-exports
pub use id::{SessionId, KnowledgeBaseId, CollectionId};
pub use error::{ModelError, EntityKind, Result};

pub use message::{ChatMessage, Role};
pub use knowledge_base::{KnowledgeBaseSession, KnowledgeBaseCollection, add_session_to_collection};
pub use session::MessageSession;

pub use clock::{Clock, SystemClock, ManualClock};
pub use registry::{Registry, Snapshot};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
