//! Refresh coordination for the read cache.
//!
//! The coordinator is the only writer of the projection. Writes to the
//! source entities call [`RefreshCoordinator::notify`] (or batch their
//! touches through a [`WriteBatch`]), which records the change in the
//! journal and runs one synchronous rebuild. The rebuilt snapshot is
//! published through a single reference swap, so readers on the concurrent
//! path never block and never see a half-built projection.
//!
//! Failure policy: only a precondition violation (duplicate grant key)
//! routes to the exclusive fallback, which blocks readers for the rebuild.
//! Any other build failure is logged as a warning and leaves the cache
//! stale; the next qualifying write retries, which avoids refresh storms
//! under sustained failure.

use crate::projection::{build_projection, build_projection_dedup, ProjectionSnapshot};
use crate::SourceStore;
use chrono::{DateTime, Utc};
use ladle_core::{EntityType, RefreshError, Timestamp};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// A watermark representing a point in the mutation history.
///
/// Monotonically increasing; one tick per committed write batch. The
/// published snapshot carries the watermark of the write that produced it,
/// which is what makes the bounded-staleness guarantee checkable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    pub sequence: i64,
    pub observed_at: DateTime<Utc>,
}

impl Watermark {
    pub fn new(sequence: i64) -> Self {
        Self {
            sequence,
            observed_at: Utc::now(),
        }
    }

    /// The zero watermark (beginning of time).
    pub fn zero() -> Self {
        Self {
            sequence: 0,
            observed_at: DateTime::UNIX_EPOCH,
        }
    }

    pub fn is_newer_than(&self, other: &Watermark) -> bool {
        self.sequence > other.sequence
    }

    pub fn is_at_least(&self, other: &Watermark) -> bool {
        self.sequence >= other.sequence
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::zero()
    }
}

/// Refresh coordinator state, observable for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    /// Building a shadow snapshot; readers keep serving the old one.
    RefreshingConcurrent,
    /// Degraded path: rebuild under the publication write lock, reads block.
    RefreshingExclusive,
}

#[derive(Debug, Clone)]
struct ChangeEntry {
    sequence: i64,
    timestamp: Timestamp,
    entity_type: EntityType,
    entity_id: Uuid,
}

#[derive(Debug, Default)]
struct ChangeJournal {
    sequence: i64,
    /// Watermark minted by the most recent `record` call. Kept so readers
    /// get the recorded watermark back, not a re-minted one with a fresh
    /// `observed_at`.
    last: Watermark,
    log: Vec<ChangeEntry>,
}

impl ChangeJournal {
    fn record(&mut self, entity_type: EntityType, entity_id: Uuid) -> Watermark {
        self.sequence += 1;
        let watermark = Watermark::new(self.sequence);
        self.log.push(ChangeEntry {
            sequence: self.sequence,
            timestamp: watermark.observed_at,
            entity_type,
            entity_id,
        });
        self.last = watermark;
        watermark
    }

    fn changes_since(&self, watermark: &Watermark, entity_types: &[EntityType]) -> bool {
        self.log.iter().any(|e| {
            e.sequence > watermark.sequence
                && (entity_types.is_empty() || entity_types.contains(&e.entity_type))
        })
    }

    fn changes_since_for_entity(&self, watermark: &Watermark, entity_id: Uuid) -> bool {
        self.log
            .iter()
            .any(|e| e.sequence > watermark.sequence && e.entity_id == entity_id)
    }

    fn prune(&mut self, before: Timestamp) -> usize {
        let before_len = self.log.len();
        self.log.retain(|e| e.timestamp >= before);
        before_len - self.log.len()
    }
}

/// Coordinates projection rebuilds and owns the published snapshot.
///
/// Only this type ever writes the projection; no other component holds a
/// reference to its writable form.
pub struct RefreshCoordinator {
    store: Arc<dyn SourceStore>,
    published: RwLock<Arc<ProjectionSnapshot>>,
    journal: Mutex<ChangeJournal>,
    state: Mutex<RefreshState>,
    /// Serializes refresh runs; notifications arriving mid-refresh wait
    /// here rather than racing on the publication lock.
    refresh_gate: Mutex<()>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<dyn SourceStore>) -> Self {
        Self {
            store,
            published: RwLock::new(Arc::new(ProjectionSnapshot::empty())),
            journal: Mutex::new(ChangeJournal::default()),
            state: Mutex::new(RefreshState::Idle),
            refresh_gate: Mutex::new(()),
        }
    }

    /// The current published snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<ProjectionSnapshot> {
        self.published.read().unwrap().clone()
    }

    /// Watermark of the latest recorded change, exactly as minted when the
    /// change was journaled. Zero before the first write.
    pub fn last_watermark(&self) -> Watermark {
        self.journal.lock().unwrap().last
    }

    /// Whether any change of the given entity types landed after the
    /// watermark. Empty slice means any entity type.
    pub fn changes_since(&self, watermark: &Watermark, entity_types: &[EntityType]) -> bool {
        self.journal
            .lock()
            .unwrap()
            .changes_since(watermark, entity_types)
    }

    /// Whether the specific entity had a recorded change after the
    /// watermark.
    pub fn changes_since_for_entity(&self, watermark: &Watermark, entity_id: Uuid) -> bool {
        self.journal
            .lock()
            .unwrap()
            .changes_since_for_entity(watermark, entity_id)
    }

    /// Drop journal entries older than `before`; returns how many.
    pub fn prune_journal(&self, before: Timestamp) -> usize {
        self.journal.lock().unwrap().prune(before)
    }

    /// Current coordinator state.
    pub fn state(&self) -> RefreshState {
        *self.state.lock().unwrap()
    }

    /// Record one committed write and run one refresh cycle.
    ///
    /// This is the explicit event interface: callers pass a signal, not a
    /// payload; the coordinator re-reads current state from the store.
    pub fn notify(&self, entity_type: EntityType, entity_id: Uuid) -> Watermark {
        let watermark = self.journal.lock().unwrap().record(entity_type, entity_id);
        self.refresh(watermark);
        watermark
    }

    /// Start a coalesced write batch. Every row a transaction touches is
    /// recorded, but commit runs a single refresh.
    pub fn begin_batch(&self) -> WriteBatch<'_> {
        WriteBatch {
            coordinator: self,
            touched: Vec::new(),
        }
    }

    fn set_state(&self, next: RefreshState) {
        *self.state.lock().unwrap() = next;
    }

    /// One refresh cycle. Runs to completion or fails; there is no
    /// cancellation once started.
    fn refresh(&self, watermark: Watermark) {
        let _gate = self.refresh_gate.lock().unwrap();

        self.set_state(RefreshState::RefreshingConcurrent);
        let outcome = self
            .store
            .snapshot_state()
            .map_err(|e| RefreshError::Failed {
                reason: e.to_string(),
            })
            .and_then(|state| build_projection(&state, watermark));

        match outcome {
            Ok(snapshot) => {
                let rows = snapshot.len();
                // Atomic publish: the swap is the only moment readers can
                // observe, and it is all-or-nothing.
                *self.published.write().unwrap() = Arc::new(snapshot);
                debug!(sequence = watermark.sequence, rows, "projection refreshed");
            }
            Err(RefreshError::PreconditionFailed { reason }) => {
                warn!(
                    sequence = watermark.sequence,
                    %reason,
                    "concurrent refresh precondition unmet, falling back to exclusive rebuild"
                );
                self.set_state(RefreshState::RefreshingExclusive);
                // Readers block on this lock for the whole rebuild. The
                // state is re-read under the lock so the exclusive build
                // cannot publish a snapshot older than the one it replaces.
                let mut published = self.published.write().unwrap();
                match self.store.snapshot_state() {
                    Ok(state) => {
                        *published = Arc::new(build_projection_dedup(&state, watermark));
                        debug!(sequence = watermark.sequence, "exclusive refresh complete");
                    }
                    Err(e) => {
                        warn!(
                            sequence = watermark.sequence,
                            error = %e,
                            "exclusive refresh failed, cache left stale until next write"
                        );
                    }
                }
            }
            Err(e) => {
                // Not a concurrency-precondition problem: do not retry under
                // the blocking path; surface and leave the cache stale.
                warn!(
                    sequence = watermark.sequence,
                    error = %e,
                    "refresh failed, cache left stale until next write"
                );
            }
        }

        self.set_state(RefreshState::Idle);
    }
}

/// Guard for a multi-row write transaction.
///
/// Touches are journaled on commit, and the batch triggers exactly one
/// refresh regardless of how many rows the transaction touched. Dropping
/// the batch without committing refreshes nothing (the write is considered
/// aborted).
pub struct WriteBatch<'a> {
    coordinator: &'a RefreshCoordinator,
    touched: Vec<(EntityType, Uuid)>,
}

impl WriteBatch<'_> {
    /// Record one touched row.
    pub fn touch(&mut self, entity_type: EntityType, entity_id: Uuid) {
        self.touched.push((entity_type, entity_id));
    }

    /// Commit the batch: journal every touch, then run one refresh.
    /// Returns None if nothing was touched.
    pub fn commit(self) -> Option<Watermark> {
        if self.touched.is_empty() {
            return None;
        }
        let watermark = {
            let mut journal = self.coordinator.journal.lock().unwrap();
            let mut last = Watermark::zero();
            for (entity_type, entity_id) in &self.touched {
                last = journal.record(*entity_type, *entity_id);
            }
            last
        };
        self.coordinator.refresh(watermark);
        Some(watermark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, SourceStore};
    use ladle_core::{Recipe, ShareGrant};
    use uuid::Uuid;

    fn setup() -> (Arc<MemoryStore>, RefreshCoordinator) {
        let store = Arc::new(MemoryStore::new());
        let coordinator = RefreshCoordinator::new(store.clone() as Arc<dyn SourceStore>);
        (store, coordinator)
    }

    fn shared_recipe(store: &MemoryStore) -> Recipe {
        let recipe = Recipe::new(Uuid::now_v7(), "Shared Soup");
        store.recipe_insert(&recipe).unwrap();
        store
            .grant_insert(&ShareGrant::public(recipe.recipe_id, recipe.owner_id))
            .unwrap();
        recipe
    }

    #[test]
    fn test_watermark_ordering() {
        let w1 = Watermark::new(1);
        let w2 = Watermark::new(2);

        assert!(w2.is_newer_than(&w1));
        assert!(!w1.is_newer_than(&w2));
        assert!(w2.is_at_least(&w1));
        assert!(w2.is_at_least(&w2));
        assert_eq!(Watermark::zero().sequence, 0);
    }

    #[test]
    fn test_initial_snapshot_is_empty() {
        let (_store, coordinator) = setup();
        assert!(coordinator.snapshot().is_empty());
        assert_eq!(coordinator.state(), RefreshState::Idle);
        assert_eq!(coordinator.last_watermark(), Watermark::zero());
    }

    #[test]
    fn test_notify_rebuilds_projection() {
        let (store, coordinator) = setup();
        let recipe = shared_recipe(&store);

        let watermark = coordinator.notify(EntityType::Grant, recipe.recipe_id);

        let snap = coordinator.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.watermark, watermark);
        assert_eq!(coordinator.state(), RefreshState::Idle);
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let (store, coordinator) = setup();
        shared_recipe(&store);

        coordinator.notify(EntityType::Grant, Uuid::now_v7());
        let first = coordinator.snapshot();

        // No intervening writes: re-running the refresh produces
        // byte-identical projection content.
        coordinator.refresh(first.watermark);
        let second = coordinator.snapshot();

        let a = serde_json::to_vec(&first.rows).unwrap();
        let b = serde_json::to_vec(&second.rows).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_revoke_then_refresh_removes_rows() {
        let (store, coordinator) = setup();
        let recipe = shared_recipe(&store);
        coordinator.notify(EntityType::Grant, recipe.recipe_id);
        assert_eq!(coordinator.snapshot().len(), 1);

        let grants = store.grant_list_by_recipe(recipe.recipe_id).unwrap();
        store.grant_remove(grants[0].grant_id).unwrap();
        coordinator.notify(EntityType::Grant, grants[0].grant_id);

        // No-leak invariant: the only grant is gone, so no row survives.
        assert!(coordinator.snapshot().is_empty());
    }

    #[test]
    fn test_duplicate_grant_keys_take_exclusive_path() {
        let (store, coordinator) = setup();
        let recipe = Recipe::new(Uuid::now_v7(), "Dup");
        store.recipe_insert(&recipe).unwrap();
        // Two public grants for the same recipe violate the concurrent
        // path's uniqueness precondition. Insert directly, bypassing the
        // grant store's duplicate check.
        store
            .grant_insert(&ShareGrant::public(recipe.recipe_id, recipe.owner_id))
            .unwrap();
        store
            .grant_insert(&ShareGrant::public(recipe.recipe_id, recipe.owner_id))
            .unwrap();

        coordinator.notify(EntityType::Grant, recipe.recipe_id);

        // The exclusive fallback deduped and still published one row.
        let snap = coordinator.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(coordinator.state(), RefreshState::Idle);
    }

    #[test]
    fn test_batch_coalesces_to_one_refresh() {
        let (store, coordinator) = setup();
        let recipe = shared_recipe(&store);

        let before = coordinator.snapshot().watermark;

        let mut batch = coordinator.begin_batch();
        batch.touch(EntityType::Recipe, recipe.recipe_id);
        batch.touch(EntityType::TagLink, recipe.recipe_id);
        batch.touch(EntityType::Grant, recipe.recipe_id);
        let watermark = batch.commit().unwrap();

        // Three touches journaled, one refresh, snapshot at the batch's
        // final watermark.
        assert_eq!(watermark.sequence, 3);
        let snap = coordinator.snapshot();
        assert!(snap.watermark.is_newer_than(&before));
        assert_eq!(snap.watermark, watermark);
    }

    #[test]
    fn test_empty_batch_commits_nothing() {
        let (_store, coordinator) = setup();
        let batch = coordinator.begin_batch();
        assert!(batch.commit().is_none());
        assert_eq!(coordinator.last_watermark(), Watermark::zero());
    }

    #[test]
    fn test_dropped_batch_refreshes_nothing() {
        let (store, coordinator) = setup();
        let recipe = shared_recipe(&store);

        {
            let mut batch = coordinator.begin_batch();
            batch.touch(EntityType::Grant, recipe.recipe_id);
            // Dropped without commit: aborted write.
        }

        assert!(coordinator.snapshot().is_empty());
        assert_eq!(coordinator.last_watermark(), Watermark::zero());
    }

    #[test]
    fn test_last_watermark_returns_recorded_value() {
        let (_store, coordinator) = setup();
        let minted = coordinator.notify(EntityType::Recipe, Uuid::now_v7());

        // The journal hands back the watermark it minted, observed_at
        // included, so repeated reads compare equal.
        assert_eq!(coordinator.last_watermark(), minted);
        assert_eq!(coordinator.last_watermark(), coordinator.last_watermark());
    }

    #[test]
    fn test_changes_since_filters_by_entity_id() {
        let (_store, coordinator) = setup();
        let w0 = coordinator.last_watermark();
        let touched = Uuid::now_v7();

        coordinator.notify(EntityType::Recipe, touched);

        assert!(coordinator.changes_since_for_entity(&w0, touched));
        assert!(!coordinator.changes_since_for_entity(&w0, Uuid::now_v7()));

        let w1 = coordinator.last_watermark();
        assert!(!coordinator.changes_since_for_entity(&w1, touched));
    }

    #[test]
    fn test_changes_since_filters_by_entity_type() {
        let (_store, coordinator) = setup();
        let w0 = coordinator.last_watermark();

        coordinator.notify(EntityType::Recipe, Uuid::now_v7());

        assert!(coordinator.changes_since(&w0, &[]));
        assert!(coordinator.changes_since(&w0, &[EntityType::Recipe]));
        assert!(!coordinator.changes_since(&w0, &[EntityType::Profile]));

        let w1 = coordinator.last_watermark();
        assert!(!coordinator.changes_since(&w1, &[]));
    }

    #[test]
    fn test_prune_journal() {
        let (_store, coordinator) = setup();
        coordinator.notify(EntityType::Recipe, Uuid::now_v7());
        coordinator.notify(EntityType::Grant, Uuid::now_v7());

        let pruned = coordinator.prune_journal(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(pruned, 2);

        // Watermark stays monotonic after pruning.
        let w = coordinator.notify(EntityType::Recipe, Uuid::now_v7());
        assert_eq!(w.sequence, 3);
    }

    #[test]
    fn test_bounded_staleness_after_each_write() {
        let (store, coordinator) = setup();
        let recipe = Recipe::new(Uuid::now_v7(), "Iterative");
        store.recipe_insert(&recipe).unwrap();
        coordinator.notify(EntityType::Recipe, recipe.recipe_id);

        for i in 0..5 {
            let grant =
                ShareGrant::for_email(recipe.recipe_id, recipe.owner_id, &format!("u{i}@x.com"));
            store.grant_insert(&grant).unwrap();
            let watermark = coordinator.notify(EntityType::Grant, grant.grant_id);

            // After the Nth write the snapshot reflects it within one cycle.
            let snap = coordinator.snapshot();
            assert!(snap.watermark.is_at_least(&watermark));
            assert_eq!(snap.len(), i + 1);
        }
    }
}
