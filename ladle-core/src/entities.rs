//! Core entity structures

use crate::{normalize_email, GrantId, RecipeId, TagId, Timestamp, UserId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recipe - the central user-owned entity.
/// Mutated only by its owner; surfaced to others through share grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub recipe_id: RecipeId,
    pub owner_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    /// Owner's personal flag. Sorts the owner's own list only - it is never
    /// part of the shared cache rows.
    pub is_favorite: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Recipe {
    /// Create a new recipe owned by the given user.
    pub fn new(owner_id: UserId, title: &str) -> Self {
        let now = Utc::now();
        Self {
            recipe_id: Uuid::now_v7(),
            owner_id,
            title: title.to_string(),
            description: None,
            instructions: None,
            is_favorite: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Set the instructions.
    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.instructions = Some(instructions.to_string());
        self
    }

    /// Mark as a favorite of the owner.
    pub fn with_favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }
}

/// Profile - display identity for a user.
/// Denormalized into cache rows as owner display fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    /// Stored lowercased; all email comparisons are case-insensitive.
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Profile {
    /// Create a new profile. The email is normalized on construction.
    pub fn new(user_id: UserId, email: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            email: normalize_email(email),
            display_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the display name.
    pub fn with_display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }
}

/// Tag - global, de-duplicated namespace entry.
/// Not owned by any single user; created lazily on first use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub tag_id: TagId,
    /// Unique case-insensitively; stored lowercased.
    pub name: String,
    pub created_at: Timestamp,
}

impl Tag {
    /// Create a new tag with a normalized name.
    pub fn new(name: &str) -> Self {
        Self {
            tag_id: Uuid::now_v7(),
            name: name.trim().to_lowercase(),
            created_at: Utc::now(),
        }
    }
}

/// Link between a recipe and a tag. No payload beyond the timestamp.
/// Both referents must exist; deleting either cascades the link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeTagLink {
    pub recipe_id: RecipeId,
    pub tag_id: TagId,
    pub created_at: Timestamp,
}

impl RecipeTagLink {
    pub fn new(recipe_id: RecipeId, tag_id: TagId) -> Self {
        Self {
            recipe_id,
            tag_id,
            created_at: Utc::now(),
        }
    }
}

/// Caller-facing description of which kind of grant to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantScope {
    /// Grant visibility to one email address.
    Email(String),
    /// Grant visibility to everyone.
    Public,
}

/// Share grant - authoritative record of who may see a recipe beyond its
/// owner. `granted_by` is always set server-side from the authenticated
/// owner, never trusted from caller input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareGrant {
    pub grant_id: GrantId,
    pub recipe_id: RecipeId,
    pub granted_by: UserId,
    /// Normalized email of the grantee; None for public grants.
    pub grantee_email: Option<String>,
    pub is_public: bool,
    pub created_at: Timestamp,
}

impl ShareGrant {
    /// Create a grant for a specific email address.
    pub fn for_email(recipe_id: RecipeId, granted_by: UserId, email: &str) -> Self {
        Self {
            grant_id: Uuid::now_v7(),
            recipe_id,
            granted_by,
            grantee_email: Some(normalize_email(email)),
            is_public: false,
            created_at: Utc::now(),
        }
    }

    /// Create a public grant.
    pub fn public(recipe_id: RecipeId, granted_by: UserId) -> Self {
        Self {
            grant_id: Uuid::now_v7(),
            recipe_id,
            granted_by,
            grantee_email: None,
            is_public: true,
            created_at: Utc::now(),
        }
    }

    /// Check whether this grant covers the given (normalized) email.
    pub fn covers_email(&self, email: &str) -> bool {
        self.grantee_email
            .as_deref()
            .is_some_and(|g| g == normalize_email(email))
    }
}

/// Per-request identity presented on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: UserId,
    pub email: String,
}

impl Requester {
    pub fn new(user_id: UserId, email: &str) -> Self {
        Self {
            user_id,
            email: normalize_email(email),
        }
    }
}

/// Denormalized read row: one per (recipe, grant context).
///
/// Derived, disposable artifact. The refresh coordinator is the only writer;
/// user-facing mutations never touch these rows directly, and the whole set
/// may be destroyed and rebuilt on any refresh cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecipeView {
    pub recipe_id: RecipeId,
    pub owner_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub recipe_created_at: Timestamp,
    pub recipe_updated_at: Timestamp,
    /// Owner display fields denormalized from the profile. Empty when the
    /// owner has no profile row yet.
    pub owner_display_name: Option<String>,
    pub owner_email: Option<String>,
    /// Distinct tag ids for the recipe. Empty, never absent.
    pub tag_ids: Vec<TagId>,
    /// Tag names aligned with `tag_ids`, sorted by name.
    pub tag_names: Vec<String>,
    /// The grant context distinguishing this row.
    pub grant_id: GrantId,
    pub is_public: bool,
    pub grantee_email: Option<String>,
}
