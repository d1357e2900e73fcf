//! Storage abstraction and implementations for ragkit.
//!
//! This crate provides a trait-based storage interface with a JSON-file
//! reference implementation. The registry in `ragkit-core` stays the
//! source of truth; storage only saves and reloads whole entities.

#![warn(missing_docs)]

pub mod trait_;
pub mod json_storage;

pub use trait_::{Storage, StorageError, Result};
pub use json_storage::JsonStorage;
