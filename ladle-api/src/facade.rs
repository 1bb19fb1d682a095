//! Query facade and write entry points
//!
//! Reads are served from the published projection snapshot and re-filtered
//! through the live access predicate, so even a cache row that should not
//! exist yet (or should no longer exist) is never returned to a requester
//! it does not belong to.

use crate::types::{ListOwnRequest, ListPage, ListSharedRequest};
use ladle_core::{
    can_view, normalize_email, CachedRecipeView, EntityType, GrantId, GrantScope, LadleResult,
    Profile, Recipe, RecipeId, Requester, ShareError, Tag, TagId, UserId,
};
use ladle_store::{
    GrantStore, MemoryStore, ProjectionSnapshot, RecipeUpdate, RefreshCoordinator, RefreshState,
    SourceStore, TagCatalog,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// The facade consumed by client collaborators.
///
/// Owns the stores and the refresh coordinator; every write path funnels
/// its notification through the coordinator so the cache lags committed
/// writes by at most one refresh cycle.
pub struct RecipeFacade {
    store: Arc<dyn SourceStore>,
    coordinator: Arc<RefreshCoordinator>,
    grants: GrantStore,
    tags: TagCatalog,
}

impl RecipeFacade {
    /// Facade over a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// Facade over an existing store.
    pub fn with_store(store: Arc<dyn SourceStore>) -> Self {
        let coordinator = Arc::new(RefreshCoordinator::new(store.clone()));
        let grants = GrantStore::new(store.clone(), coordinator.clone());
        let tags = TagCatalog::new(store.clone(), coordinator.clone());
        Self {
            store,
            coordinator,
            grants,
            tags,
        }
    }

    /// The current published cache snapshot.
    pub fn cache_snapshot(&self) -> Arc<ProjectionSnapshot> {
        self.coordinator.snapshot()
    }

    /// Current refresh coordinator state.
    pub fn refresh_state(&self) -> RefreshState {
        self.coordinator.state()
    }

    // ========================================================================
    // Read path
    // ========================================================================

    /// List recipes shared with the requester, paginated and filterable.
    ///
    /// The projection is already pre-filtered per grant context; the grant
    /// predicate is evaluated again here, against live grants, as
    /// defense-in-depth.
    pub fn list_shared(&self, req: &ListSharedRequest) -> LadleResult<ListPage<CachedRecipeView>> {
        let email = normalize_email(&req.requester_email);
        // Resolve the requester's user id when a profile exists so the
        // owner clause of the predicate can fire; unknown emails get a nil
        // id, which owns nothing.
        let requester_id = self
            .store
            .profile_get_by_email(&email)?
            .map(|p| p.user_id)
            .unwrap_or_else(Uuid::nil);
        let requester = Requester::new(requester_id, &email);

        let snapshot = self.coordinator.snapshot();
        let search = req.search_term.as_ref().map(|s| s.to_lowercase());

        let mut seen: HashSet<RecipeId> = HashSet::new();
        let mut matched: Vec<CachedRecipeView> = Vec::new();
        for row in &snapshot.rows {
            if !(row.is_public || row.grantee_email.as_deref() == Some(email.as_str())) {
                continue;
            }
            // One row per recipe: a recipe reachable through both a public
            // and an email grant still lists once.
            if !seen.insert(row.recipe_id) {
                continue;
            }
            if let Some(filter) = &req.tag_filter {
                // ANY-of-set semantics.
                if !row.tag_ids.iter().any(|t| filter.contains(t)) {
                    continue;
                }
            }
            if let Some(term) = &search {
                let in_title = row.title.to_lowercase().contains(term);
                let in_description = row
                    .description
                    .as_ref()
                    .is_some_and(|d| d.to_lowercase().contains(term));
                if !in_title && !in_description {
                    continue;
                }
            }

            let Some(recipe) = self.store.recipe_get(row.recipe_id)? else {
                continue;
            };
            let grants = self.store.grant_list_by_recipe(row.recipe_id)?;
            if !can_view(&recipe, &grants, &requester) {
                continue;
            }

            matched.push(row.clone());
        }

        matched.sort_by(|a, b| {
            b.recipe_created_at
                .cmp(&a.recipe_created_at)
                .then(a.recipe_id.cmp(&b.recipe_id))
        });

        Ok(paginate(matched, req.limit, req.offset))
    }

    /// The owner's personal list: favorites first, then newest.
    pub fn list_own(&self, req: &ListOwnRequest) -> LadleResult<ListPage<Recipe>> {
        let mut recipes = self.store.recipe_list_by_owner(req.owner_id)?;
        recipes.sort_by(|a, b| {
            b.is_favorite
                .cmp(&a.is_favorite)
                .then(b.created_at.cmp(&a.created_at))
                .then(a.recipe_id.cmp(&b.recipe_id))
        });
        Ok(paginate(recipes, req.limit, req.offset))
    }

    /// Evaluate the visibility predicate against live source entities.
    pub fn can_view(&self, recipe_id: RecipeId, requester: &Requester) -> LadleResult<bool> {
        let recipe = self
            .store
            .recipe_get(recipe_id)?
            .ok_or(ShareError::NotFound {
                entity_type: EntityType::Recipe,
                id: recipe_id,
            })?;
        let grants = self.store.grant_list_by_recipe(recipe_id)?;
        Ok(can_view(&recipe, &grants, requester))
    }

    // ========================================================================
    // Write path
    // ========================================================================

    /// Create a recipe.
    pub fn create_recipe(&self, recipe: &Recipe) -> LadleResult<RecipeId> {
        self.store.recipe_insert(recipe)?;
        debug!(recipe_id = %recipe.recipe_id, "recipe created");
        self.coordinator.notify(EntityType::Recipe, recipe.recipe_id);
        Ok(recipe.recipe_id)
    }

    /// Update a recipe. Only the owner may mutate it.
    pub fn update_recipe(
        &self,
        recipe_id: RecipeId,
        requester_id: UserId,
        update: RecipeUpdate,
    ) -> LadleResult<()> {
        self.require_owner(recipe_id, requester_id, "update_recipe")?;
        self.store.recipe_update(recipe_id, update)?;
        debug!(%recipe_id, "recipe updated");
        self.coordinator.notify(EntityType::Recipe, recipe_id);
        Ok(())
    }

    /// Delete a recipe, cascading tag links and grants. The cascade is one
    /// transaction: however many rows it touches, one refresh runs.
    pub fn delete_recipe(&self, recipe_id: RecipeId, requester_id: UserId) -> LadleResult<()> {
        self.require_owner(recipe_id, requester_id, "delete_recipe")?;
        let links = self.store.link_list_by_recipe(recipe_id)?;
        let grants = self.store.grant_list_by_recipe(recipe_id)?;

        self.store.recipe_delete(recipe_id)?;
        debug!(%recipe_id, "recipe deleted");

        let mut batch = self.coordinator.begin_batch();
        batch.touch(EntityType::Recipe, recipe_id);
        for link in &links {
            batch.touch(EntityType::TagLink, link.tag_id);
        }
        for grant in &grants {
            batch.touch(EntityType::Grant, grant.grant_id);
        }
        batch.commit();
        Ok(())
    }

    /// Insert or replace a profile.
    pub fn upsert_profile(&self, profile: &Profile) -> LadleResult<()> {
        self.store.profile_upsert(profile)?;
        self.coordinator.notify(EntityType::Profile, profile.user_id);
        Ok(())
    }

    /// Tag a recipe, creating the tag lazily on first use.
    pub fn tag_recipe(
        &self,
        recipe_id: RecipeId,
        requester_id: UserId,
        name: &str,
    ) -> LadleResult<Tag> {
        self.require_owner(recipe_id, requester_id, "tag_recipe")?;
        let tag = self.tags.get_or_create(name)?;
        self.tags.attach(recipe_id, tag.tag_id)?;
        Ok(tag)
    }

    /// Remove a tag from a recipe.
    pub fn untag_recipe(
        &self,
        recipe_id: RecipeId,
        requester_id: UserId,
        tag_id: TagId,
    ) -> LadleResult<()> {
        self.require_owner(recipe_id, requester_id, "untag_recipe")?;
        self.tags.detach(recipe_id, tag_id)
    }

    /// Grant visibility on a recipe by email or publicly.
    pub fn create_grant(
        &self,
        recipe_id: RecipeId,
        owner_id: UserId,
        scope: GrantScope,
    ) -> LadleResult<GrantId> {
        self.grants.create_grant(recipe_id, owner_id, scope)
    }

    /// Revoke a previously created grant.
    pub fn revoke_grant(&self, grant_id: GrantId, requester_id: UserId) -> LadleResult<()> {
        self.grants.revoke_grant(grant_id, requester_id)
    }

    // ========================================================================
    // Write signals (external collaborators)
    // ========================================================================
    //
    // Each is a signal, not a payload: the coordinator re-reads current
    // state rather than trusting deltas.

    pub fn on_recipe_write(&self, recipe_id: RecipeId) {
        self.coordinator.notify(EntityType::Recipe, recipe_id);
    }

    pub fn on_grant_write(&self, recipe_id: RecipeId) {
        self.coordinator.notify(EntityType::Grant, recipe_id);
    }

    pub fn on_tag_link_write(&self, recipe_id: RecipeId) {
        self.coordinator.notify(EntityType::TagLink, recipe_id);
    }

    pub fn on_profile_write(&self, user_id: UserId) {
        self.coordinator.notify(EntityType::Profile, user_id);
    }

    fn require_owner(
        &self,
        recipe_id: RecipeId,
        user_id: UserId,
        action: &str,
    ) -> LadleResult<Recipe> {
        let recipe = self
            .store
            .recipe_get(recipe_id)?
            .ok_or(ShareError::NotFound {
                entity_type: EntityType::Recipe,
                id: recipe_id,
            })?;
        if recipe.owner_id != user_id {
            return Err(ShareError::PermissionDenied {
                user_id,
                action: action.to_string(),
                resource: format!("recipe {recipe_id}"),
            }
            .into());
        }
        Ok(recipe)
    }
}

impl Default for RecipeFacade {
    fn default() -> Self {
        Self::new()
    }
}

fn paginate<T>(rows: Vec<T>, limit: usize, offset: usize) -> ListPage<T> {
    let total_count = rows.len();
    let rows: Vec<T> = rows.into_iter().skip(offset).take(limit).collect();
    let has_more = offset + rows.len() < total_count;
    ListPage {
        rows,
        has_more,
        total_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ladle_core::LadleError;

    fn owner_with_recipe(facade: &RecipeFacade, title: &str) -> Recipe {
        let recipe = Recipe::new(Uuid::now_v7(), title);
        facade.create_recipe(&recipe).unwrap();
        recipe
    }

    #[test]
    fn test_paginate_math() {
        let page = paginate(vec![1, 2, 3, 4, 5], 2, 0);
        assert_eq!(page.rows, vec![1, 2]);
        assert!(page.has_more);
        assert_eq!(page.total_count, 5);

        let last = paginate(vec![1, 2, 3, 4, 5], 2, 4);
        assert_eq!(last.rows, vec![5]);
        assert!(!last.has_more);

        let past_end = paginate(vec![1, 2, 3], 2, 10);
        assert!(past_end.rows.is_empty());
        assert!(!past_end.has_more);
        assert_eq!(past_end.total_count, 3);
    }

    #[test]
    fn test_update_requires_owner() {
        let facade = RecipeFacade::new();
        let recipe = owner_with_recipe(&facade, "Soup");

        let result = facade.update_recipe(
            recipe.recipe_id,
            Uuid::now_v7(),
            RecipeUpdate {
                title: Some("Hijacked".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(
            result,
            Err(LadleError::Share(ShareError::PermissionDenied { .. }))
        ));
    }

    #[test]
    fn test_delete_cascades_and_refreshes_once() {
        let facade = RecipeFacade::new();
        let recipe = owner_with_recipe(&facade, "Soup");
        facade
            .create_grant(recipe.recipe_id, recipe.owner_id, GrantScope::Public)
            .unwrap();
        facade
            .tag_recipe(recipe.recipe_id, recipe.owner_id, "vegan")
            .unwrap();
        assert_eq!(facade.cache_snapshot().len(), 1);

        facade
            .delete_recipe(recipe.recipe_id, recipe.owner_id)
            .unwrap();

        assert!(facade.cache_snapshot().is_empty());
        assert_eq!(facade.refresh_state(), RefreshState::Idle);
    }

    #[test]
    fn test_can_view_missing_recipe() {
        let facade = RecipeFacade::new();
        let requester = Requester::new(Uuid::now_v7(), "x@x.com");
        let result = facade.can_view(Uuid::now_v7(), &requester);
        assert!(matches!(
            result,
            Err(LadleError::Share(ShareError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_list_own_favorites_first() {
        let facade = RecipeFacade::new();
        let owner = Uuid::now_v7();

        let plain = Recipe::new(owner, "Plain");
        facade.create_recipe(&plain).unwrap();
        let favorite = Recipe::new(owner, "Favorite").with_favorite(true);
        facade.create_recipe(&favorite).unwrap();

        let page = facade.list_own(&ListOwnRequest::for_owner(owner)).unwrap();
        assert_eq!(page.rows[0].recipe_id, favorite.recipe_id);
        assert_eq!(page.rows[1].recipe_id, plain.recipe_id);
        assert_eq!(page.total_count, 2);
    }

    #[test]
    fn test_write_signals_refresh() {
        let facade = RecipeFacade::new();
        let recipe = owner_with_recipe(&facade, "Soup");
        facade
            .create_grant(recipe.recipe_id, recipe.owner_id, GrantScope::Public)
            .unwrap();

        let before = facade.cache_snapshot().watermark;
        facade.on_recipe_write(recipe.recipe_id);
        facade.on_grant_write(recipe.recipe_id);
        facade.on_tag_link_write(recipe.recipe_id);
        facade.on_profile_write(recipe.owner_id);

        let after = facade.cache_snapshot().watermark;
        assert!(after.is_newer_than(&before));
    }
}
