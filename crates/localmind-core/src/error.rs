//! ============================================================================
//! Memory Errors
//! ============================================================================
//! Only `init` and `clear_memory` surface these to callers. Writes and
//! recalls log them and degrade to "no memory".
//! ============================================================================

/// Error types for the memory subsystem
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MemoryError {
    /// Store or embedding provider failed to initialize
    #[error("Memory initialization failed: {0}")]
    Init(String),

    /// A read, write or clear against the durable store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// The embedding provider could not compute a vector
    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl MemoryError {
    /// Wrap any displayable backend error as a storage failure with context
    pub(crate) fn storage<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> Self {
        move |e| MemoryError::Storage(format!("{}: {}", context, e))
    }

    /// Wrap any displayable backend error as an init failure with context
    pub(crate) fn init<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> Self {
        move |e| MemoryError::Init(format!("{}: {}", context, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_context() {
        let err = MemoryError::storage("Failed to commit")("disk full");
        assert_eq!(err, MemoryError::Storage("Failed to commit: disk full".to_string()));
        assert_eq!(err.to_string(), "Storage error: Failed to commit: disk full");
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = MemoryError::DimensionMismatch {
            expected: 384,
            actual: 2,
        };
        assert!(err.to_string().contains("expected 384, got 2"));
    }
}
