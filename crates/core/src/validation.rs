//! Field validators run at construction time.
//!
//! Each returns `Ok(())` or a `ModelError::Validation` naming the field.

use crate::error::{ModelError, Result};

/// Reject empty or whitespace-only strings.
pub fn require_non_empty(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ModelError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Embeddings must be non-empty, finite, and match the expected
/// dimension when one is configured.
pub fn validate_embedding(embedding: &[f32], expected_dimension: Option<usize>) -> Result<()> {
    if embedding.is_empty() {
        return Err(ModelError::validation("embedding", "must not be empty"));
    }
    if let Some(dim) = expected_dimension {
        if embedding.len() != dim {
            return Err(ModelError::validation(
                "embedding",
                format!("expected dimension {}, got {}", dim, embedding.len()),
            ));
        }
    }
    if let Some(pos) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(ModelError::validation(
            "embedding",
            format!("non-finite value at index {}", pos),
        ));
    }
    Ok(())
}

/// File entries attached to a session must be non-empty paths/ids.
pub fn validate_files(files: &[String]) -> Result<()> {
    if let Some(pos) = files.iter().position(|f| f.trim().is_empty()) {
        return Err(ModelError::validation(
            "files",
            format!("entry {} is empty", pos),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("title", "Session 1").is_ok());
        let err = require_non_empty("title", "   ").unwrap_err();
        assert_eq!(
            err,
            ModelError::Validation {
                field: "title",
                reason: "must not be empty".to_string()
            }
        );
    }

    #[test]
    fn test_embedding_rules() {
        assert!(validate_embedding(&[0.1, 0.2, 0.3], None).is_ok());
        assert!(validate_embedding(&[0.1, 0.2, 0.3], Some(3)).is_ok());
        assert!(validate_embedding(&[], None).unwrap_err().is_validation());
        assert!(validate_embedding(&[0.1, 0.2], Some(3)).unwrap_err().is_validation());
        assert!(validate_embedding(&[0.1, f32::NAN], None).unwrap_err().is_validation());
    }

    #[test]
    fn test_files_rule() {
        assert!(validate_files(&["a.pdf".to_string()]).is_ok());
        assert!(validate_files(&["a.pdf".to_string(), "".to_string()]).is_err());
    }
}
