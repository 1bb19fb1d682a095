//! Cache projection builder
//!
//! Rebuilds the full set of denormalized [`CachedRecipeView`] rows from the
//! source entities. This is a full rebuild, not an incremental patch:
//! incremental maintenance of a five-way join is not worth the complexity at
//! the data volumes in scope (thousands of recipes, not millions).

use crate::refresh::Watermark;
use crate::SourceState;
use ladle_core::{CachedRecipeView, RecipeId, RefreshError, TagId, Timestamp};
use std::collections::{HashMap, HashSet};

/// An immutable, wholesale-rebuilt projection of the shared read cache.
///
/// Published by the refresh coordinator via a single atomic reference swap,
/// so readers never observe a half-built version.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionSnapshot {
    /// One row per (recipe, grant context), sorted by (recipe_id, grant
    /// key) so two builds over identical state compare byte-identical.
    pub rows: Vec<CachedRecipeView>,
    pub built_at: Timestamp,
    pub watermark: Watermark,
}

impl ProjectionSnapshot {
    /// The empty projection published before the first refresh.
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            built_at: chrono::Utc::now(),
            watermark: Watermark::zero(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows for one recipe (one per grant context).
    pub fn rows_for_recipe(&self, recipe_id: RecipeId) -> Vec<&CachedRecipeView> {
        self.rows
            .iter()
            .filter(|r| r.recipe_id == recipe_id)
            .collect()
    }
}

/// Uniqueness key for a projection row: recipe plus grant discriminator.
/// None means the public grant; Some(email) an email grant.
type GrantKey = (RecipeId, Option<String>);

fn grant_key(grant: &ladle_core::ShareGrant) -> GrantKey {
    (grant.recipe_id, grant.grantee_email.clone())
}

/// Sort key for deterministic output: public rows first, then emails
/// ascending.
fn grant_order(key: &GrantKey) -> (RecipeId, bool, String) {
    (
        key.0,
        key.1.is_some(),
        key.1.clone().unwrap_or_default(),
    )
}

/// Aggregate distinct (tag_id, name) pairs per recipe, sorted by name.
fn collect_tags(state: &SourceState) -> HashMap<RecipeId, Vec<(TagId, String)>> {
    let mut by_recipe: HashMap<RecipeId, Vec<(TagId, String)>> = HashMap::new();
    let mut seen: HashSet<(RecipeId, TagId)> = HashSet::new();

    for link in &state.links {
        if !seen.insert((link.recipe_id, link.tag_id)) {
            continue;
        }
        if let Some(tag) = state.tags.get(&link.tag_id) {
            by_recipe
                .entry(link.recipe_id)
                .or_default()
                .push((tag.tag_id, tag.name.clone()));
        }
    }
    for tags in by_recipe.values_mut() {
        tags.sort_by(|a, b| a.1.cmp(&b.1));
    }
    by_recipe
}

fn make_row(
    state: &SourceState,
    tags: &HashMap<RecipeId, Vec<(TagId, String)>>,
    grant: &ladle_core::ShareGrant,
) -> Option<CachedRecipeView> {
    // A grant whose recipe vanished mid-cascade produces no row.
    let recipe = state.recipes.get(&grant.recipe_id)?;
    let profile = state.profiles.get(&recipe.owner_id);
    let recipe_tags = tags.get(&recipe.recipe_id);

    Some(CachedRecipeView {
        recipe_id: recipe.recipe_id,
        owner_id: recipe.owner_id,
        title: recipe.title.clone(),
        description: recipe.description.clone(),
        instructions: recipe.instructions.clone(),
        recipe_created_at: recipe.created_at,
        recipe_updated_at: recipe.updated_at,
        owner_display_name: profile.and_then(|p| p.display_name.clone()),
        owner_email: profile.map(|p| p.email.clone()),
        tag_ids: recipe_tags
            .map(|t| t.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default(),
        tag_names: recipe_tags
            .map(|t| t.iter().map(|(_, n)| n.clone()).collect())
            .unwrap_or_default(),
        grant_id: grant.grant_id,
        is_public: grant.is_public,
        grantee_email: grant.grantee_email.clone(),
    })
}

/// Build the complete projection from source state.
///
/// Precondition: (recipe_id, grant discriminator) pairs are unique across
/// grants. A violation returns [`RefreshError::PreconditionFailed`], which
/// the coordinator answers with the exclusive fallback path rather than
/// publishing an ambiguous projection.
pub fn build_projection(
    state: &SourceState,
    watermark: Watermark,
) -> Result<ProjectionSnapshot, RefreshError> {
    let tags = collect_tags(state);

    let mut seen: HashSet<GrantKey> = HashSet::new();
    let mut keyed: Vec<(GrantKey, &ladle_core::ShareGrant)> = Vec::with_capacity(state.grants.len());
    for grant in &state.grants {
        let key = grant_key(grant);
        if !seen.insert(key.clone()) {
            return Err(RefreshError::PreconditionFailed {
                reason: format!(
                    "duplicate grant key for recipe {} ({})",
                    grant.recipe_id,
                    key.1.as_deref().unwrap_or("public")
                ),
            });
        }
        keyed.push((key, grant));
    }

    keyed.sort_by_key(|(key, _)| grant_order(key));

    let rows = keyed
        .iter()
        .filter_map(|(_, grant)| make_row(state, &tags, grant))
        .collect();

    Ok(ProjectionSnapshot {
        rows,
        built_at: chrono::Utc::now(),
        watermark,
    })
}

/// Exclusive-path build: tolerates duplicate grant keys by keeping the most
/// recently created grant per key. Only ever run while the coordinator holds
/// the publication write lock, so readers are blocked for the duration.
pub fn build_projection_dedup(state: &SourceState, watermark: Watermark) -> ProjectionSnapshot {
    let tags = collect_tags(state);

    let mut winners: HashMap<GrantKey, &ladle_core::ShareGrant> = HashMap::new();
    for grant in &state.grants {
        let key = grant_key(grant);
        match winners.get(&key) {
            Some(existing)
                if (existing.created_at, existing.grant_id)
                    >= (grant.created_at, grant.grant_id) => {}
            _ => {
                winners.insert(key, grant);
            }
        }
    }

    let mut keyed: Vec<(GrantKey, &ladle_core::ShareGrant)> = winners.into_iter().collect();
    keyed.sort_by_key(|(key, _)| grant_order(key));

    let rows = keyed
        .iter()
        .filter_map(|(_, grant)| make_row(state, &tags, grant))
        .collect();

    ProjectionSnapshot {
        rows,
        built_at: chrono::Utc::now(),
        watermark,
    }
}
