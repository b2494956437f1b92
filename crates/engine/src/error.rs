//! Error types for the decision engine.

use crate::store::StorageError;

/// Errors that can occur inside the decision engine.
///
/// None of these escape `check_limit`: every failure on the decision path is
/// recovered into a fail-open decision. They do surface from engine
/// construction, where an unreachable store is worth failing loudly for.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Shared store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
