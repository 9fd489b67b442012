//! Overlay-to-entity reconciliation
//!
//! The render layer keeps one entity per overlay. Once per render pass the
//! current overlay snapshot is diffed against the entity map:
//! - overlay without entity: **create**
//! - overlay whose entity was rendered from a different state: **update** in place
//! - entity without overlay: **remove**
//!
//! Entities are never rebuilt for overlays that still exist, and a pass over
//! an unchanged snapshot performs no operations at all.

use crate::overlay::OverlayState;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Render-layer side of reconciliation
pub trait RenderTarget {
    /// Handle to one renderable entity
    type Handle;

    fn create_entity(&mut self, overlay: &OverlayState) -> Self::Handle;

    /// Refresh pose and visual parameters of an existing entity
    fn update_entity(&mut self, handle: &mut Self::Handle, overlay: &OverlayState);

    fn remove_entity(&mut self, handle: Self::Handle);
}

#[derive(Debug)]
struct RenderedEntity<H> {
    handle: H,
    /// Overlay state the entity currently shows
    rendered: OverlayState,
}

/// Overlay id → entity handle mapping maintained across passes
#[derive(Debug)]
pub struct EntityMap<H> {
    entities: HashMap<Uuid, RenderedEntity<H>>,
}

impl<H> EntityMap<H> {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entities.contains_key(id)
    }

    pub fn handle(&self, id: &Uuid) -> Option<&H> {
        self.entities.get(id).map(|entity| &entity.handle)
    }

    /// Overlay state an entity was last rendered from
    pub fn rendered(&self, id: &Uuid) -> Option<&OverlayState> {
        self.entities.get(id).map(|entity| &entity.rendered)
    }

    /// Entity ids, sorted
    pub fn ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.entities.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl<H> Default for EntityMap<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Operations performed by one reconciliation pass (ids sorted)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<Uuid>,
    pub updated: Vec<Uuid>,
    pub removed: Vec<Uuid>,
}

impl ReconcileReport {
    /// True when the pass changed nothing
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Bring `entities` in line with `overlays`, driving `target`
pub fn reconcile<T: RenderTarget>(
    overlays: &HashMap<Uuid, OverlayState>,
    entities: &mut EntityMap<T::Handle>,
    target: &mut T,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let stale: Vec<Uuid> = entities
        .entities
        .keys()
        .filter(|id| !overlays.contains_key(id))
        .copied()
        .collect();
    for id in stale {
        if let Some(entity) = entities.entities.remove(&id) {
            target.remove_entity(entity.handle);
            report.removed.push(id);
        }
    }

    for (id, overlay) in overlays {
        match entities.entities.get_mut(id) {
            Some(entity) => {
                if !renders_identically(&entity.rendered, overlay) {
                    target.update_entity(&mut entity.handle, overlay);
                    entity.rendered = overlay.clone();
                    report.updated.push(*id);
                }
            }
            None => {
                let handle = target.create_entity(overlay);
                entities.entities.insert(
                    *id,
                    RenderedEntity {
                        handle,
                        rendered: overlay.clone(),
                    },
                );
                report.created.push(*id);
            }
        }
    }

    report.created.sort();
    report.updated.sort();
    report.removed.sort();

    if !report.is_noop() {
        debug!(
            created = report.created.len(),
            updated = report.updated.len(),
            removed = report.removed.len(),
            entities = entities.len(),
            "Entities reconciled"
        );
    }
    report
}

/// Whether two overlay states would render the same
///
/// Floats compare by bit pattern, so a NaN in a pose or scale still equals
/// itself and a stable overlay is never reported as updated.
fn renders_identically(a: &OverlayState, b: &OverlayState) -> bool {
    let same_pose = a
        .pose
        .matrix()
        .iter()
        .zip(b.pose.matrix().iter())
        .all(|(x, y)| x.to_bits() == y.to_bits());

    a.id == b.id
        && a.reference_name == b.reference_name
        && a.info == b.info
        && a.is_tracked == b.is_tracked
        && a.last_observation_date == b.last_observation_date
        && a.estimated_scale_factor.to_bits() == b.estimated_scale_factor.to_bits()
        && a.reference_size.width.to_bits() == b.reference_size.width.to_bits()
        && a.reference_size.height.to_bits() == b.reference_size.height.to_bits()
        && same_pose
}

/// Render target bundled with its entity map
pub struct EntityReconciler<T: RenderTarget> {
    target: T,
    entities: EntityMap<T::Handle>,
}

impl<T: RenderTarget> EntityReconciler<T> {
    pub fn new(target: T) -> Self {
        Self {
            target,
            entities: EntityMap::new(),
        }
    }

    /// One render pass
    pub fn reconcile(&mut self, overlays: &HashMap<Uuid, OverlayState>) -> ReconcileReport {
        reconcile(overlays, &mut self.entities, &mut self.target)
    }

    /// Remove every entity (scene teardown)
    pub fn clear(&mut self) -> ReconcileReport {
        self.reconcile(&HashMap::new())
    }

    pub fn entities(&self) -> &EntityMap<T::Handle> {
        &self.entities
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::tests::overlay;
    use crate::overlay::Pose;

    /// Records every call; handles are sequential entity numbers
    #[derive(Default)]
    struct Recorder {
        next: u32,
        created: u32,
        updated: u32,
        removed: Vec<u32>,
    }

    impl RenderTarget for Recorder {
        type Handle = u32;

        fn create_entity(&mut self, _overlay: &OverlayState) -> u32 {
            self.next += 1;
            self.created += 1;
            self.next
        }

        fn update_entity(&mut self, _handle: &mut u32, _overlay: &OverlayState) {
            self.updated += 1;
        }

        fn remove_entity(&mut self, handle: u32) {
            self.removed.push(handle);
        }
    }

    fn store(overlays: &[OverlayState]) -> HashMap<Uuid, OverlayState> {
        overlays.iter().map(|o| (o.id, o.clone())).collect()
    }

    #[test]
    fn test_creates_missing_entities() {
        let a = overlay("espresso", true);
        let b = overlay("matcha", false);
        let mut reconciler = EntityReconciler::new(Recorder::default());

        let report = reconciler.reconcile(&store(&[a.clone(), b.clone()]));

        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(report.created, expected);
        assert!(report.updated.is_empty());
        assert_eq!(reconciler.entities().len(), 2);
        assert_eq!(reconciler.target().created, 2);
    }

    #[test]
    fn test_stable_state_is_noop() {
        let overlays = store(&[overlay("espresso", true), overlay("market", true)]);
        let mut reconciler = EntityReconciler::new(Recorder::default());
        reconciler.reconcile(&overlays);

        let second = reconciler.reconcile(&overlays);
        let third = reconciler.reconcile(&overlays);

        assert!(second.is_noop());
        assert!(third.is_noop());
        assert_eq!(reconciler.target().created, 2);
        assert_eq!(reconciler.target().updated, 0);
    }

    #[test]
    fn test_changed_overlay_updates_in_place() {
        let mut a = overlay("espresso", true);
        let mut reconciler = EntityReconciler::new(Recorder::default());
        reconciler.reconcile(&store(&[a.clone()]));
        let handle = *reconciler.entities().handle(&a.id).unwrap();

        a.is_tracked = false;
        a.pose = Pose::from_translation(0.0, 0.5, -1.0);
        let report = reconciler.reconcile(&store(&[a.clone()]));

        assert_eq!(report.updated, vec![a.id]);
        assert!(report.created.is_empty());
        assert_eq!(reconciler.entities().handle(&a.id), Some(&handle), "entity kept");
        assert_eq!(reconciler.entities().rendered(&a.id), Some(&a));
    }

    #[test]
    fn test_removes_vanished_overlays() {
        let a = overlay("espresso", true);
        let b = overlay("matcha", true);
        let mut reconciler = EntityReconciler::new(Recorder::default());
        reconciler.reconcile(&store(&[a.clone(), b.clone()]));
        let b_handle = *reconciler.entities().handle(&b.id).unwrap();

        let report = reconciler.reconcile(&store(&[a.clone()]));

        assert_eq!(report.removed, vec![b.id]);
        assert!(!reconciler.entities().contains(&b.id));
        assert_eq!(reconciler.target().removed, vec![b_handle]);
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut reconciler = EntityReconciler::new(Recorder::default());
        reconciler.reconcile(&store(&[overlay("espresso", true), overlay("matcha", true)]));

        let report = reconciler.clear();

        assert_eq!(report.removed.len(), 2);
        assert!(reconciler.entities().is_empty());
    }

    #[test]
    fn test_free_function_with_external_map() {
        let a = overlay("market", true);
        let mut entities = EntityMap::new();
        let mut target = Recorder::default();

        let first = reconcile(&store(&[a.clone()]), &mut entities, &mut target);
        let second = reconcile(&store(&[a.clone()]), &mut entities, &mut target);

        assert_eq!(first.created, vec![a.id]);
        assert!(second.is_noop());
        assert_eq!(entities.ids(), vec![a.id]);
    }

    #[test]
    fn test_non_finite_values_stay_stable() {
        let mut a = overlay("espresso", true);
        a.estimated_scale_factor = f32::NAN;
        a.pose = Pose::from_translation(f32::NAN, 0.0, f32::INFINITY);
        let overlays = store(&[a]);
        let mut reconciler = EntityReconciler::new(Recorder::default());
        reconciler.reconcile(&overlays);

        let again = reconciler.reconcile(&overlays);

        assert!(again.is_noop(), "unexpected operations: {:?}", again);
        assert_eq!(reconciler.target().updated, 0);
    }

    #[test]
    fn test_scale_change_detected() {
        let mut a = overlay("matcha", true);
        let mut reconciler = EntityReconciler::new(Recorder::default());
        reconciler.reconcile(&store(&[a.clone()]));

        a.estimated_scale_factor = 1.25;
        let report = reconciler.reconcile(&store(&[a.clone()]));

        assert_eq!(report.updated, vec![a.id]);
    }
}
