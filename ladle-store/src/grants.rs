//! Share grant store
//!
//! Authoritative record of who may see a recipe beyond its owner. All
//! mutations validate ownership before touching storage, and `granted_by`
//! is always derived from the recipe's owner rather than caller input, so
//! a grant can never be forged under a different identity.

use crate::{RefreshCoordinator, SourceStore};
use ladle_core::{
    EntityType, GrantId, GrantScope, LadleResult, RecipeId, ShareError, ShareGrant, UserId,
};
use std::sync::Arc;
use tracing::debug;

/// Write-side API over share grants. Every successful mutation notifies the
/// refresh coordinator exactly once.
pub struct GrantStore {
    store: Arc<dyn SourceStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl GrantStore {
    pub fn new(store: Arc<dyn SourceStore>, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { store, coordinator }
    }

    /// Create a grant for a recipe.
    ///
    /// Fails with `NotFound` if the recipe is missing, `PermissionDenied`
    /// if `owner_id` does not own the recipe, and `DuplicateGrant` if an
    /// identical (recipe, grantee) pair or a second public grant exists.
    pub fn create_grant(
        &self,
        recipe_id: RecipeId,
        owner_id: UserId,
        scope: GrantScope,
    ) -> LadleResult<GrantId> {
        let recipe = self
            .store
            .recipe_get(recipe_id)?
            .ok_or(ShareError::NotFound {
                entity_type: EntityType::Recipe,
                id: recipe_id,
            })?;

        if owner_id != recipe.owner_id {
            return Err(ShareError::PermissionDenied {
                user_id: owner_id,
                action: "create_grant".to_string(),
                resource: format!("recipe {recipe_id}"),
            }
            .into());
        }

        let existing = self.store.grant_list_by_recipe(recipe_id)?;
        let grant = match &scope {
            GrantScope::Email(email) => {
                if existing.iter().any(|g| g.covers_email(email)) {
                    return Err(ShareError::DuplicateGrant {
                        recipe_id,
                        grantee: ladle_core::normalize_email(email),
                    }
                    .into());
                }
                // granted_by comes from the recipe row, never the caller.
                ShareGrant::for_email(recipe_id, recipe.owner_id, email)
            }
            GrantScope::Public => {
                if existing.iter().any(|g| g.is_public) {
                    return Err(ShareError::DuplicateGrant {
                        recipe_id,
                        grantee: "public".to_string(),
                    }
                    .into());
                }
                ShareGrant::public(recipe_id, recipe.owner_id)
            }
        };

        let grant_id = grant.grant_id;
        self.store.grant_insert(&grant)?;
        debug!(%recipe_id, %grant_id, public = grant.is_public, "grant created");
        self.coordinator.notify(EntityType::Grant, grant_id);
        Ok(grant_id)
    }

    /// Revoke a grant. Only the user who granted it may revoke it.
    pub fn revoke_grant(&self, grant_id: GrantId, requester_id: UserId) -> LadleResult<()> {
        let grant = self
            .store
            .grant_get(grant_id)?
            .ok_or(ShareError::NotFound {
                entity_type: EntityType::Grant,
                id: grant_id,
            })?;

        if requester_id != grant.granted_by {
            return Err(ShareError::PermissionDenied {
                user_id: requester_id,
                action: "revoke_grant".to_string(),
                resource: format!("grant {grant_id}"),
            }
            .into());
        }

        self.store.grant_remove(grant_id)?;
        debug!(%grant_id, recipe_id = %grant.recipe_id, "grant revoked");
        self.coordinator.notify(EntityType::Grant, grant_id);
        Ok(())
    }

    /// Current grants for a recipe.
    pub fn grants_for_recipe(&self, recipe_id: RecipeId) -> LadleResult<Vec<ShareGrant>> {
        self.store.grant_list_by_recipe(recipe_id)
    }
}
