//! LADLE Core - Entity Types and Access Policy
//!
//! Pure data structures plus the visibility predicate. All other crates
//! depend on this. No storage or I/O concerns live here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod entities;
pub mod error;
pub mod policy;

pub use entities::{
    CachedRecipeView, GrantScope, Profile, Recipe, RecipeTagLink, Requester, ShareGrant, Tag,
};
pub use error::{LadleError, LadleResult, RefreshError, ShareError, StorageError};
pub use policy::can_view;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Recipe identifier using UUIDv7 for timestamp-sortable IDs.
pub type RecipeId = Uuid;

/// Tag identifier.
pub type TagId = Uuid;

/// Share grant identifier.
pub type GrantId = Uuid;

/// User (profile) identifier.
pub type UserId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 entity id (timestamp-sortable).
pub fn new_entity_id() -> Uuid {
    Uuid::now_v7()
}

/// Normalize an email address for comparison and storage.
///
/// All email comparisons in the system are case-insensitive; normalizing at
/// the boundary keeps the rest of the code free of ad-hoc lowercasing.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============================================================================
// ENTITY DISCRIMINATOR
// ============================================================================

/// Entity type discriminator for error payloads and refresh signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Recipe,
    Profile,
    Tag,
    TagLink,
    Grant,
    CachedView,
}
