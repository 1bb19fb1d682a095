//! Tag catalog
//!
//! Global, de-duplicated tag namespace plus the recipe-tag link operations.
//! Tags are created lazily on first use with insert-or-fetch semantics;
//! creating a tag touches no recipe, so only link mutations schedule a
//! cache refresh.

use crate::{RefreshCoordinator, SourceStore};
use ladle_core::{EntityType, LadleResult, RecipeId, Tag, TagId};
use std::sync::Arc;
use tracing::debug;

pub struct TagCatalog {
    store: Arc<dyn SourceStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl TagCatalog {
    pub fn new(store: Arc<dyn SourceStore>, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { store, coordinator }
    }

    /// Fetch the tag with this name, creating it on first use. Names are
    /// unique case-insensitively; concurrent calls with the same name end
    /// with exactly one row.
    pub fn get_or_create(&self, name: &str) -> LadleResult<Tag> {
        self.store.tag_get_or_create(name)
    }

    /// Look up a tag by name without creating it.
    pub fn find(&self, name: &str) -> LadleResult<Option<Tag>> {
        self.store.tag_get_by_name(name)
    }

    /// Attach a tag to a recipe. Idempotent per (recipe, tag) pair; only an
    /// actual insert schedules a refresh.
    pub fn attach(&self, recipe_id: RecipeId, tag_id: TagId) -> LadleResult<()> {
        if self.store.link_attach(recipe_id, tag_id)? {
            debug!(%recipe_id, %tag_id, "tag attached");
            self.coordinator.notify(EntityType::TagLink, recipe_id);
        }
        Ok(())
    }

    /// Detach a tag from a recipe.
    pub fn detach(&self, recipe_id: RecipeId, tag_id: TagId) -> LadleResult<()> {
        self.store.link_detach(recipe_id, tag_id)?;
        debug!(%recipe_id, %tag_id, "tag detached");
        self.coordinator.notify(EntityType::TagLink, recipe_id);
        Ok(())
    }

    /// Tags for a recipe, sorted by name.
    pub fn tags_for_recipe(&self, recipe_id: RecipeId) -> LadleResult<Vec<Tag>> {
        let links = self.store.link_list_by_recipe(recipe_id)?;
        let mut tags = Vec::with_capacity(links.len());
        for link in links {
            if let Some(tag) = self.store.tag_get(link.tag_id)? {
                tags.push(tag);
            }
        }
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use ladle_core::{Recipe, ShareGrant};
    use uuid::Uuid;

    fn setup() -> (Arc<MemoryStore>, TagCatalog, Arc<RefreshCoordinator>) {
        let store = Arc::new(MemoryStore::new());
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone() as Arc<dyn SourceStore>
        ));
        let catalog = TagCatalog::new(store.clone(), coordinator.clone());
        (store, catalog, coordinator)
    }

    fn insert_shared_recipe(store: &MemoryStore) -> Recipe {
        let recipe = Recipe::new(Uuid::now_v7(), "Soup");
        store.recipe_insert(&recipe).unwrap();
        store
            .grant_insert(&ShareGrant::public(recipe.recipe_id, recipe.owner_id))
            .unwrap();
        recipe
    }

    #[test]
    fn test_get_or_create_deduplicates() {
        let (store, catalog, _) = setup();
        let a = catalog.get_or_create("Vegan").unwrap();
        let b = catalog.get_or_create("vegan").unwrap();

        assert_eq!(a.tag_id, b.tag_id);
        assert_eq!(store.tag_count(), 1);
    }

    #[test]
    fn test_find_does_not_create() {
        let (store, catalog, _) = setup();
        assert!(catalog.find("vegan").unwrap().is_none());
        assert_eq!(store.tag_count(), 0);

        catalog.get_or_create("vegan").unwrap();
        assert!(catalog.find("VEGAN").unwrap().is_some());
    }

    #[test]
    fn test_attach_refreshes_cache_with_tags() {
        let (store, catalog, coordinator) = setup();
        let recipe = insert_shared_recipe(&store);
        let tag = catalog.get_or_create("vegan").unwrap();

        catalog.attach(recipe.recipe_id, tag.tag_id).unwrap();

        let snap = coordinator.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.rows[0].tag_names, vec!["vegan"]);
    }

    #[test]
    fn test_attach_idempotent_notifies_once() {
        let (store, catalog, coordinator) = setup();
        let recipe = insert_shared_recipe(&store);
        let tag = catalog.get_or_create("vegan").unwrap();

        catalog.attach(recipe.recipe_id, tag.tag_id).unwrap();
        let after_first = coordinator.last_watermark();

        catalog.attach(recipe.recipe_id, tag.tag_id).unwrap();
        // The no-op attach did not tick the journal.
        assert_eq!(coordinator.last_watermark(), after_first);
    }

    #[test]
    fn test_detach_updates_cache() {
        let (store, catalog, coordinator) = setup();
        let recipe = insert_shared_recipe(&store);
        let tag = catalog.get_or_create("vegan").unwrap();
        catalog.attach(recipe.recipe_id, tag.tag_id).unwrap();

        catalog.detach(recipe.recipe_id, tag.tag_id).unwrap();

        let snap = coordinator.snapshot();
        assert_eq!(snap.len(), 1);
        assert!(snap.rows[0].tag_names.is_empty());
    }

    #[test]
    fn test_tags_for_recipe_sorted() {
        let (store, catalog, _) = setup();
        let recipe = insert_shared_recipe(&store);
        let vegan = catalog.get_or_create("vegan").unwrap();
        let soup = catalog.get_or_create("soup").unwrap();
        catalog.attach(recipe.recipe_id, vegan.tag_id).unwrap();
        catalog.attach(recipe.recipe_id, soup.tag_id).unwrap();

        let tags = catalog.tags_for_recipe(recipe.recipe_id).unwrap();
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["soup", "vegan"]);
    }

    #[test]
    fn test_tag_creation_does_not_refresh() {
        let (_store, catalog, coordinator) = setup();
        catalog.get_or_create("vegan").unwrap();
        // Tag rows alone are invisible to the cache until linked.
        assert_eq!(coordinator.last_watermark().sequence, 0);
    }
}
