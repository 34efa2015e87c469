//! The "RECONCILER" - keeps rendered markers in line with live snapshots.
//!
//! Every poll cycle delivers a complete snapshot of tracked objects. Rather
//! than clearing and redrawing the map (flicker), the reconciler computes a
//! keyed diff against what is currently drawn:
//! 1. De-duplicate the snapshot by id (last occurrence wins)
//! 2. Drop objects without a usable position
//! 3. Split into add / update / remove against the rendered set
//!
//! The reconciler is pure. Applying the diff to a surface is the engine's job.

use crate::model::{ObjectId, TrackedObject};
use crate::surface::MarkerHandle;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::trace;

// ============================================================================
// RENDERED MARKER SET
// ============================================================================

/// The engine's memory of which live markers are drawn.
///
/// Keys must equal the ids of the renderable objects of the last applied
/// snapshot. [`RenderedMarkerSet::check_consistency`] verifies this.
#[derive(Debug, Clone, Default)]
pub struct RenderedMarkerSet {
    markers: HashMap<ObjectId, MarkerHandle>,
}

impl RenderedMarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.markers.contains_key(id)
    }

    pub fn get(&self, id: &ObjectId) -> Option<MarkerHandle> {
        self.markers.get(id).copied()
    }

    /// All keys in sorted order.
    pub fn ids(&self) -> BTreeSet<ObjectId> {
        self.markers.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &MarkerHandle)> {
        self.markers.iter()
    }

    pub(crate) fn insert(&mut self, id: ObjectId, handle: MarkerHandle) -> Option<MarkerHandle> {
        self.markers.insert(id, handle)
    }

    pub(crate) fn remove(&mut self, id: &ObjectId) -> Option<MarkerHandle> {
        self.markers.remove(id)
    }

    /// Remove every entry, returning them sorted by id.
    pub(crate) fn drain_sorted(&mut self) -> Vec<(ObjectId, MarkerHandle)> {
        let mut all: Vec<(ObjectId, MarkerHandle)> = self.markers.drain().collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Verify the key set equals `expected`.
    pub fn check_consistency(&self, expected: &BTreeSet<ObjectId>) -> Result<(), ReconcileError> {
        let actual = self.ids();
        let orphaned: Vec<ObjectId> = actual.difference(expected).cloned().collect();
        let missing: Vec<ObjectId> = expected.difference(&actual).cloned().collect();

        if orphaned.is_empty() && missing.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::Inconsistent { orphaned, missing })
        }
    }
}

// ============================================================================
// DIFF
// ============================================================================

/// Move/restyle an existing marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerUpdate {
    pub handle: MarkerHandle,
    pub object: TrackedObject,
}

/// Remove a marker that is no longer in the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerRemoval {
    pub id: ObjectId,
    pub handle: MarkerHandle,
}

/// Result of one reconciliation. All lists are sorted by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerDiff {
    pub to_add: Vec<TrackedObject>,
    pub to_update: Vec<MarkerUpdate>,
    pub to_remove: Vec<MarkerRemoval>,

    /// Objects dropped for lack of a usable position
    pub skipped_invalid: usize,

    /// Snapshot entries superseded by a later entry with the same id
    pub duplicates: usize,
}

impl MarkerDiff {
    /// True when nothing is added or removed (updates may still be present).
    pub fn is_structurally_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn added_ids(&self) -> Vec<ObjectId> {
        self.to_add.iter().map(|o| o.id.clone()).collect()
    }

    pub fn updated_ids(&self) -> Vec<ObjectId> {
        self.to_update.iter().map(|u| u.object.id.clone()).collect()
    }

    pub fn removed_ids(&self) -> Vec<ObjectId> {
        self.to_remove.iter().map(|r| r.id.clone()).collect()
    }

    pub fn removes(&self, id: &ObjectId) -> bool {
        self.to_remove.iter().any(|r| &r.id == id)
    }

    /// Ids that should be rendered once this diff is applied.
    pub fn renderable_ids(&self) -> BTreeSet<ObjectId> {
        self.to_add
            .iter()
            .map(|o| o.id.clone())
            .chain(self.to_update.iter().map(|u| u.object.id.clone()))
            .collect()
    }
}

/// Compute the add/update/remove diff of `incoming` against `previous`.
///
/// An empty snapshot yields a diff that removes everything.
pub fn reconcile(previous: &RenderedMarkerSet, incoming: Vec<TrackedObject>) -> MarkerDiff {
    let mut diff = MarkerDiff::default();

    // Stage 1: de-duplicate, last occurrence wins
    let mut latest: BTreeMap<ObjectId, TrackedObject> = BTreeMap::new();
    for object in incoming {
        if latest.insert(object.id.clone(), object).is_some() {
            diff.duplicates += 1;
        }
    }

    // Stage 2: drop objects that cannot be drawn
    let mut renderable: BTreeMap<ObjectId, TrackedObject> = BTreeMap::new();
    for (id, object) in latest {
        if object.is_renderable() {
            renderable.insert(id, object);
        } else {
            trace!(id = %id, "skipping object without position");
            diff.skipped_invalid += 1;
        }
    }

    // Stage 3: split against the rendered set
    let mut to_remove: Vec<MarkerRemoval> = previous
        .iter()
        .filter(|(id, _)| !renderable.contains_key(*id))
        .map(|(id, handle)| MarkerRemoval { id: id.clone(), handle: *handle })
        .collect();
    to_remove.sort_by(|a, b| a.id.cmp(&b.id));
    diff.to_remove = to_remove;

    for (id, object) in renderable {
        match previous.get(&id) {
            Some(handle) => diff.to_update.push(MarkerUpdate { handle, object }),
            None => diff.to_add.push(object),
        }
    }

    diff
}

// ============================================================================
// ERRORS
// ============================================================================

/// Rendered state drifted from the expected id set.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconcileError {
    #[error("Rendered markers inconsistent: {} orphaned, {} missing", .orphaned.len(), .missing.len())]
    Inconsistent {
        orphaned: Vec<ObjectId>,
        missing: Vec<ObjectId>,
    },
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use proptest::prelude::*;

    fn obj(id: &str, lat: f64, lon: f64) -> TrackedObject {
        TrackedObject::at(id, GeoPoint::new(lat, lon).unwrap())
    }

    fn unpositioned(id: &str) -> TrackedObject {
        TrackedObject {
            position: None,
            ..obj(id, 0.0, 0.0)
        }
    }

    /// Apply a diff to a marker set the way the engine does, with fake handles.
    fn apply(set: &mut RenderedMarkerSet, diff: &MarkerDiff, next_handle: &mut u64) {
        for removal in &diff.to_remove {
            set.remove(&removal.id);
        }
        for object in &diff.to_add {
            set.insert(object.id.clone(), MarkerHandle(*next_handle));
            *next_handle += 1;
        }
    }

    #[test]
    fn test_empty_previous_adds_everything() {
        let diff = reconcile(&RenderedMarkerSet::new(), vec![obj("a", 1.0, 1.0), obj("b", 2.0, 2.0)]);
        assert_eq!(diff.added_ids(), vec![ObjectId::new("a"), ObjectId::new("b")]);
        assert!(diff.to_update.is_empty());
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn test_empty_snapshot_removes_everything() {
        let mut set = RenderedMarkerSet::new();
        set.insert(ObjectId::new("a"), MarkerHandle(1));
        set.insert(ObjectId::new("b"), MarkerHandle(2));

        let diff = reconcile(&set, Vec::new());
        assert_eq!(diff.removed_ids(), vec![ObjectId::new("a"), ObjectId::new("b")]);
        assert!(diff.to_add.is_empty());
    }

    #[test]
    fn test_two_tick_scenario() {
        let mut set = RenderedMarkerSet::new();
        let mut next = 1;

        let tick1 = reconcile(&set, vec![obj("A", 10.0, 10.0)]);
        apply(&mut set, &tick1, &mut next);

        let tick2 = reconcile(&set, vec![obj("B", 20.0, 20.0)]);
        assert_eq!(tick2.added_ids(), vec![ObjectId::new("B")]);
        assert_eq!(tick2.removed_ids(), vec![ObjectId::new("A")]);
        assert!(tick2.to_update.is_empty());
    }

    #[test]
    fn test_update_carries_new_position() {
        let mut set = RenderedMarkerSet::new();
        set.insert(ObjectId::new("a"), MarkerHandle(7));

        let diff = reconcile(&set, vec![obj("a", 5.0, 6.0)]);
        assert_eq!(diff.to_update.len(), 1);
        assert_eq!(diff.to_update[0].handle, MarkerHandle(7));
        assert_eq!(diff.to_update[0].object.position, Some(GeoPoint::new(5.0, 6.0).unwrap()));
    }

    #[test]
    fn test_duplicates_keep_last_occurrence() {
        let diff = reconcile(
            &RenderedMarkerSet::new(),
            vec![obj("a", 1.0, 1.0), obj("b", 2.0, 2.0), obj("a", 3.0, 3.0)],
        );
        assert_eq!(diff.duplicates, 1);
        assert_eq!(diff.to_add.len(), 2);
        let a = diff.to_add.iter().find(|o| o.id == ObjectId::new("a")).unwrap();
        assert_eq!(a.position, Some(GeoPoint::new(3.0, 3.0).unwrap()));
    }

    #[test]
    fn test_position_lost_removes_marker() {
        let mut set = RenderedMarkerSet::new();
        set.insert(ObjectId::new("a"), MarkerHandle(1));

        let diff = reconcile(&set, vec![unpositioned("a")]);
        assert_eq!(diff.removed_ids(), vec![ObjectId::new("a")]);
        assert_eq!(diff.skipped_invalid, 1);
    }

    #[test]
    fn test_unpositioned_never_added() {
        let diff = reconcile(&RenderedMarkerSet::new(), vec![unpositioned("x")]);
        assert!(diff.to_add.is_empty());
        assert_eq!(diff.skipped_invalid, 1);
    }

    #[test]
    fn test_idempotent_second_pass() {
        let snapshot = vec![obj("a", 1.0, 1.0), obj("b", 2.0, 2.0), unpositioned("c")];
        let mut set = RenderedMarkerSet::new();
        let mut next = 1;

        let first = reconcile(&set, snapshot.clone());
        apply(&mut set, &first, &mut next);

        let second = reconcile(&set, snapshot);
        assert!(second.is_structurally_empty());
        assert_eq!(second.to_update.len(), 2);
    }

    #[test]
    fn test_consistency_check() {
        let mut set = RenderedMarkerSet::new();
        set.insert(ObjectId::new("a"), MarkerHandle(1));
        set.insert(ObjectId::new("z"), MarkerHandle(2));

        let expected: BTreeSet<ObjectId> = [ObjectId::new("a"), ObjectId::new("b")].into_iter().collect();
        match set.check_consistency(&expected) {
            Err(ReconcileError::Inconsistent { orphaned, missing }) => {
                assert_eq!(orphaned, vec![ObjectId::new("z")]);
                assert_eq!(missing, vec![ObjectId::new("b")]);
            }
            Ok(()) => panic!("expected inconsistency"),
        }
    }

    fn snapshot_strategy() -> impl Strategy<Value = Vec<TrackedObject>> {
        prop::collection::vec(
            (0u8..16, prop::option::weighted(0.8, (-80.0f64..80.0, -170.0f64..170.0))),
            0..40,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .map(|(id, pos)| TrackedObject {
                    position: pos.map(|(lat, lon)| GeoPoint::new(lat, lon).unwrap()),
                    ..TrackedObject::at(format!("id{}", id), GeoPoint::new(0.0, 0.0).unwrap())
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_completeness(
            previous_ids in prop::collection::btree_set(0u8..16, 0..16),
            incoming in snapshot_strategy(),
        ) {
            let mut set = RenderedMarkerSet::new();
            for (i, id) in previous_ids.iter().enumerate() {
                set.insert(ObjectId::new(format!("id{}", id)), MarkerHandle(i as u64));
            }

            // Expected: ids whose last occurrence has a position
            let mut last: BTreeMap<ObjectId, bool> = BTreeMap::new();
            for o in &incoming {
                last.insert(o.id.clone(), o.position.is_some());
            }
            let expected: BTreeSet<ObjectId> = last
                .into_iter()
                .filter(|(_, ok)| *ok)
                .map(|(id, _)| id)
                .collect();

            let diff = reconcile(&set, incoming);

            let removed: BTreeSet<ObjectId> = diff.removed_ids().into_iter().collect();
            let mut result: BTreeSet<ObjectId> = set.ids().difference(&removed).cloned().collect();
            result.extend(diff.added_ids());

            prop_assert_eq!(&result, &expected);
            prop_assert_eq!(diff.renderable_ids(), expected);
        }

        #[test]
        fn prop_reconcile_twice_is_stable(incoming in snapshot_strategy()) {
            let mut set = RenderedMarkerSet::new();
            let mut next = 1;
            let first = reconcile(&set, incoming.clone());
            apply(&mut set, &first, &mut next);

            let second = reconcile(&set, incoming);
            prop_assert!(second.is_structurally_empty());
            prop_assert_eq!(second.to_update.len(), set.len());
        }
    }
}
