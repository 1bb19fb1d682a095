//! LADLE Store - Source-of-Truth Stores and Read Cache
//!
//! Defines the storage abstraction for LADLE source entities (recipes,
//! profiles, tags, tag links, share grants), the in-memory implementation,
//! the denormalized projection builder, and the refresh coordinator that
//! keeps the read cache consistent with writes.

pub mod grants;
pub mod projection;
pub mod refresh;
pub mod tags;

pub use grants::GrantStore;
pub use projection::{build_projection, build_projection_dedup, ProjectionSnapshot};
pub use refresh::{RefreshCoordinator, RefreshState, Watermark, WriteBatch};
pub use tags::TagCatalog;

use ladle_core::{
    EntityType, GrantId, LadleError, LadleResult, Profile, Recipe, RecipeId, RecipeTagLink,
    ShareGrant, StorageError, Tag, TagId, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

// ============================================================================
// UPDATE TYPES
// ============================================================================

/// Update payload for recipes. Absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RecipeUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub is_favorite: Option<bool>,
}

// ============================================================================
// SOURCE STATE SNAPSHOT
// ============================================================================

/// A coherent clone of all source entities, handed to the projection
/// builder. The refresh coordinator re-reads current state through this
/// rather than trusting deltas from write signals.
#[derive(Debug, Clone, Default)]
pub struct SourceState {
    pub recipes: HashMap<RecipeId, Recipe>,
    pub profiles: HashMap<UserId, Profile>,
    pub tags: HashMap<TagId, Tag>,
    pub links: Vec<RecipeTagLink>,
    pub grants: Vec<ShareGrant>,
}

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Storage trait for LADLE source entities.
///
/// All operations are synchronous: writes complete before their refresh
/// notification fires, which is what gives the bounded-staleness guarantee
/// its "within one refresh cycle" bound.
pub trait SourceStore: Send + Sync {
    // === Recipe Operations ===

    /// Insert a new recipe.
    fn recipe_insert(&self, r: &Recipe) -> LadleResult<()>;

    /// Get a recipe by ID.
    fn recipe_get(&self, id: RecipeId) -> LadleResult<Option<Recipe>>;

    /// Update a recipe.
    fn recipe_update(&self, id: RecipeId, update: RecipeUpdate) -> LadleResult<()>;

    /// Delete a recipe, cascading its tag links and grants.
    fn recipe_delete(&self, id: RecipeId) -> LadleResult<()>;

    /// List recipes owned by a user.
    fn recipe_list_by_owner(&self, owner_id: UserId) -> LadleResult<Vec<Recipe>>;

    // === Profile Operations ===

    /// Insert or replace a profile.
    fn profile_upsert(&self, p: &Profile) -> LadleResult<()>;

    /// Get a profile by user ID.
    fn profile_get(&self, id: UserId) -> LadleResult<Option<Profile>>;

    /// Get a profile by email (case-insensitive).
    fn profile_get_by_email(&self, email: &str) -> LadleResult<Option<Profile>>;

    // === Tag Operations ===

    /// Insert-or-fetch a tag by name under a single write lock. Two
    /// concurrent calls with the same name end with exactly one row.
    fn tag_get_or_create(&self, name: &str) -> LadleResult<Tag>;

    /// Get a tag by ID.
    fn tag_get(&self, id: TagId) -> LadleResult<Option<Tag>>;

    /// Get a tag by name (case-insensitive).
    fn tag_get_by_name(&self, name: &str) -> LadleResult<Option<Tag>>;

    // === Tag Link Operations ===

    /// Attach a tag to a recipe. Idempotent per pair; returns true if the
    /// link was newly created.
    fn link_attach(&self, recipe_id: RecipeId, tag_id: TagId) -> LadleResult<bool>;

    /// Detach a tag from a recipe.
    fn link_detach(&self, recipe_id: RecipeId, tag_id: TagId) -> LadleResult<()>;

    /// List tag links for a recipe.
    fn link_list_by_recipe(&self, recipe_id: RecipeId) -> LadleResult<Vec<RecipeTagLink>>;

    // === Grant Operations ===

    /// Insert a new share grant.
    fn grant_insert(&self, g: &ShareGrant) -> LadleResult<()>;

    /// Get a grant by ID.
    fn grant_get(&self, id: GrantId) -> LadleResult<Option<ShareGrant>>;

    /// Remove a grant by ID.
    fn grant_remove(&self, id: GrantId) -> LadleResult<()>;

    /// List grants for a recipe.
    fn grant_list_by_recipe(&self, recipe_id: RecipeId) -> LadleResult<Vec<ShareGrant>>;

    // === State Snapshot ===

    /// Clone the full current state for a projection rebuild.
    fn snapshot_state(&self) -> LadleResult<SourceState>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory source store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    recipes: Arc<RwLock<HashMap<RecipeId, Recipe>>>,
    profiles: Arc<RwLock<HashMap<UserId, Profile>>>,
    tags: Arc<RwLock<HashMap<TagId, Tag>>>,
    /// Unique index on lowercased tag name. Guarded by the same write path
    /// as `tags`, giving insert-or-fetch semantics without a
    /// check-then-insert race.
    tag_names: Arc<RwLock<HashMap<String, TagId>>>,
    links: Arc<RwLock<HashMap<(RecipeId, TagId), RecipeTagLink>>>,
    grants: Arc<RwLock<HashMap<GrantId, ShareGrant>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.recipes.write().unwrap().clear();
        self.profiles.write().unwrap().clear();
        self.tags.write().unwrap().clear();
        self.tag_names.write().unwrap().clear();
        self.links.write().unwrap().clear();
        self.grants.write().unwrap().clear();
    }

    /// Count of stored recipes.
    pub fn recipe_count(&self) -> usize {
        self.recipes.read().unwrap().len()
    }

    /// Count of stored tags.
    pub fn tag_count(&self) -> usize {
        self.tags.read().unwrap().len()
    }

    /// Count of stored grants.
    pub fn grant_count(&self) -> usize {
        self.grants.read().unwrap().len()
    }
}

impl SourceStore for MemoryStore {
    // === Recipe Operations ===

    fn recipe_insert(&self, r: &Recipe) -> LadleResult<()> {
        let mut recipes = self.recipes.write().unwrap();
        if recipes.contains_key(&r.recipe_id) {
            return Err(LadleError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Recipe,
                reason: "already exists".to_string(),
            }));
        }
        recipes.insert(r.recipe_id, r.clone());
        Ok(())
    }

    fn recipe_get(&self, id: RecipeId) -> LadleResult<Option<Recipe>> {
        let recipes = self.recipes.read().unwrap();
        Ok(recipes.get(&id).cloned())
    }

    fn recipe_update(&self, id: RecipeId, update: RecipeUpdate) -> LadleResult<()> {
        let mut recipes = self.recipes.write().unwrap();
        let recipe = recipes
            .get_mut(&id)
            .ok_or(LadleError::Storage(StorageError::NotFound {
                entity_type: EntityType::Recipe,
                id,
            }))?;

        if let Some(title) = update.title {
            recipe.title = title;
        }
        if let Some(description) = update.description {
            recipe.description = Some(description);
        }
        if let Some(instructions) = update.instructions {
            recipe.instructions = Some(instructions);
        }
        if let Some(is_favorite) = update.is_favorite {
            recipe.is_favorite = is_favorite;
        }
        recipe.updated_at = chrono::Utc::now();

        Ok(())
    }

    fn recipe_delete(&self, id: RecipeId) -> LadleResult<()> {
        let mut recipes = self.recipes.write().unwrap();
        if recipes.remove(&id).is_none() {
            return Err(LadleError::Storage(StorageError::NotFound {
                entity_type: EntityType::Recipe,
                id,
            }));
        }
        // Referential invariant: links and grants never outlive the recipe.
        self.links.write().unwrap().retain(|(rid, _), _| *rid != id);
        self.grants.write().unwrap().retain(|_, g| g.recipe_id != id);
        Ok(())
    }

    fn recipe_list_by_owner(&self, owner_id: UserId) -> LadleResult<Vec<Recipe>> {
        let recipes = self.recipes.read().unwrap();
        Ok(recipes
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect())
    }

    // === Profile Operations ===

    fn profile_upsert(&self, p: &Profile) -> LadleResult<()> {
        let mut profiles = self.profiles.write().unwrap();
        profiles.insert(p.user_id, p.clone());
        Ok(())
    }

    fn profile_get(&self, id: UserId) -> LadleResult<Option<Profile>> {
        let profiles = self.profiles.read().unwrap();
        Ok(profiles.get(&id).cloned())
    }

    fn profile_get_by_email(&self, email: &str) -> LadleResult<Option<Profile>> {
        let wanted = ladle_core::normalize_email(email);
        let profiles = self.profiles.read().unwrap();
        Ok(profiles.values().find(|p| p.email == wanted).cloned())
    }

    // === Tag Operations ===

    fn tag_get_or_create(&self, name: &str) -> LadleResult<Tag> {
        // The name index is only ever touched while holding the tags write
        // lock, so insert-or-fetch is atomic with respect to concurrent
        // callers.
        let mut tags = self.tags.write().unwrap();
        let mut names = self.tag_names.write().unwrap();

        let normalized = name.trim().to_lowercase();
        if let Some(existing_id) = names.get(&normalized) {
            let tag = tags
                .get(existing_id)
                .cloned()
                .ok_or(LadleError::Storage(StorageError::NotFound {
                    entity_type: EntityType::Tag,
                    id: *existing_id,
                }))?;
            return Ok(tag);
        }

        let tag = Tag::new(&normalized);
        names.insert(normalized, tag.tag_id);
        tags.insert(tag.tag_id, tag.clone());
        Ok(tag)
    }

    fn tag_get(&self, id: TagId) -> LadleResult<Option<Tag>> {
        let tags = self.tags.read().unwrap();
        Ok(tags.get(&id).cloned())
    }

    fn tag_get_by_name(&self, name: &str) -> LadleResult<Option<Tag>> {
        let normalized = name.trim().to_lowercase();
        // Lock order matches tag_get_or_create: tags before tag_names.
        let tags = self.tags.read().unwrap();
        let names = self.tag_names.read().unwrap();
        Ok(names.get(&normalized).and_then(|id| tags.get(id)).cloned())
    }

    // === Tag Link Operations ===

    fn link_attach(&self, recipe_id: RecipeId, tag_id: TagId) -> LadleResult<bool> {
        if !self.recipes.read().unwrap().contains_key(&recipe_id) {
            return Err(LadleError::Storage(StorageError::NotFound {
                entity_type: EntityType::Recipe,
                id: recipe_id,
            }));
        }
        if !self.tags.read().unwrap().contains_key(&tag_id) {
            return Err(LadleError::Storage(StorageError::NotFound {
                entity_type: EntityType::Tag,
                id: tag_id,
            }));
        }
        let mut links = self.links.write().unwrap();
        if links.contains_key(&(recipe_id, tag_id)) {
            return Ok(false);
        }
        links.insert((recipe_id, tag_id), RecipeTagLink::new(recipe_id, tag_id));
        Ok(true)
    }

    fn link_detach(&self, recipe_id: RecipeId, tag_id: TagId) -> LadleResult<()> {
        let mut links = self.links.write().unwrap();
        if links.remove(&(recipe_id, tag_id)).is_none() {
            return Err(LadleError::Storage(StorageError::NotFound {
                entity_type: EntityType::TagLink,
                id: recipe_id,
            }));
        }
        Ok(())
    }

    fn link_list_by_recipe(&self, recipe_id: RecipeId) -> LadleResult<Vec<RecipeTagLink>> {
        let links = self.links.read().unwrap();
        Ok(links
            .values()
            .filter(|l| l.recipe_id == recipe_id)
            .cloned()
            .collect())
    }

    // === Grant Operations ===

    fn grant_insert(&self, g: &ShareGrant) -> LadleResult<()> {
        let mut grants = self.grants.write().unwrap();
        if grants.contains_key(&g.grant_id) {
            return Err(LadleError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Grant,
                reason: "already exists".to_string(),
            }));
        }
        grants.insert(g.grant_id, g.clone());
        Ok(())
    }

    fn grant_get(&self, id: GrantId) -> LadleResult<Option<ShareGrant>> {
        let grants = self.grants.read().unwrap();
        Ok(grants.get(&id).cloned())
    }

    fn grant_remove(&self, id: GrantId) -> LadleResult<()> {
        let mut grants = self.grants.write().unwrap();
        if grants.remove(&id).is_none() {
            return Err(LadleError::Storage(StorageError::NotFound {
                entity_type: EntityType::Grant,
                id,
            }));
        }
        Ok(())
    }

    fn grant_list_by_recipe(&self, recipe_id: RecipeId) -> LadleResult<Vec<ShareGrant>> {
        let grants = self.grants.read().unwrap();
        Ok(grants
            .values()
            .filter(|g| g.recipe_id == recipe_id)
            .cloned()
            .collect())
    }

    // === State Snapshot ===

    fn snapshot_state(&self) -> LadleResult<SourceState> {
        Ok(SourceState {
            recipes: self.recipes.read().unwrap().clone(),
            profiles: self.profiles.read().unwrap().clone(),
            tags: self.tags.read().unwrap().clone(),
            links: self.links.read().unwrap().values().cloned().collect(),
            grants: self.grants.read().unwrap().values().cloned().collect(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
