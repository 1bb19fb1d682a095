//! Error types for LADLE operations

use crate::{EntityType, RecipeId, UserId};
use thiserror::Error;
use uuid::Uuid;

/// Sharing and authorization errors. Surfaced synchronously to the caller
/// on the write path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShareError {
    #[error("Permission denied for user {user_id}: {action} on {resource}")]
    PermissionDenied {
        user_id: UserId,
        action: String,
        resource: String,
    },

    #[error("Duplicate grant for recipe {recipe_id}: {grantee}")]
    DuplicateGrant { recipe_id: RecipeId, grantee: String },

    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },
}

/// Cache refresh errors.
///
/// `PreconditionFailed` is the only variant that routes the coordinator to
/// the exclusive fallback; everything else is surfaced as a warning and
/// leaves the cache stale until the next qualifying write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Refresh precondition failed: {reason}")]
    PreconditionFailed { reason: String },

    #[error("Refresh failed: {reason}")]
    Failed { reason: String },
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed {
        entity_type: EntityType,
        reason: String,
    },

    #[error("Update failed for {entity_type:?} with id {id}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        id: Uuid,
        reason: String,
    },
}

/// Master error type for all LADLE operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LadleError {
    #[error("Share error: {0}")]
    Share(#[from] ShareError),

    #[error("Refresh error: {0}")]
    Refresh(#[from] RefreshError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for LADLE operations.
pub type LadleResult<T> = Result<T, LadleError>;

// =============================================================================
// TESTS
// =============================================================================
