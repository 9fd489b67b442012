//! Overlay state and the overlay store
//!
//! One `OverlayState` per live anchor, keyed by the anchor id the tracking
//! subsystem assigned. The store is only mutated by the anchor event
//! processor and by `stop()`; everything else reads snapshots.

use crate::catalog::ReferenceInfo;
use chrono::{DateTime, Utc};
use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Anchor pose in world space (4x4 homogeneous transform)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose(Matrix4<f32>);

impl Pose {
    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    pub fn from_matrix(matrix: Matrix4<f32>) -> Self {
        Self(matrix)
    }

    pub fn from_translation(x: f32, y: f32, z: f32) -> Self {
        Self(Matrix4::new_translation(&Vector3::new(x, y, z)))
    }

    pub fn matrix(&self) -> &Matrix4<f32> {
        &self.0
    }

    /// Translation column of the transform
    pub fn translation(&self) -> Vector3<f32> {
        Vector3::new(self.0[(0, 3)], self.0[(1, 3)], self.0[(2, 3)])
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Physical size of a reference pattern in meters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSize {
    pub width: f64,
    pub height: f64,
}

impl ReferenceSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Renderable state for one tracked anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayState {
    /// Anchor id, stable for the anchor's lifetime
    pub id: Uuid,
    pub reference_name: String,
    pub info: ReferenceInfo,
    pub pose: Pose,
    pub is_tracked: bool,
    pub estimated_scale_factor: f32,
    pub last_observation_date: DateTime<Utc>,
    pub reference_size: ReferenceSize,
}

impl OverlayState {
    /// Short label for status rows
    pub fn tracking_label(&self) -> &'static str {
        if self.is_tracked {
            "Tracked"
        } else {
            "Paused"
        }
    }
}

/// Anchor id → overlay state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayStore {
    overlays: HashMap<Uuid, OverlayState>,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the overlay for `state.id`
    ///
    /// Returns true when the id was not present before.
    pub fn upsert(&mut self, state: OverlayState) -> bool {
        self.overlays.insert(state.id, state).is_none()
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<OverlayState> {
        self.overlays.remove(id)
    }

    /// Drop every overlay, returning how many were present
    pub fn clear(&mut self) -> usize {
        let count = self.overlays.len();
        self.overlays.clear();
        count
    }

    pub fn get(&self, id: &Uuid) -> Option<&OverlayState> {
        self.overlays.get(id)
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &OverlayState> {
        self.overlays.values()
    }

    /// Number of overlays currently flagged as tracked
    pub fn tracked_count(&self) -> usize {
        self.overlays.values().filter(|o| o.is_tracked).count()
    }

    /// Sorted distinct reference names among tracked overlays
    pub fn tracked_reference_names(&self) -> Vec<String> {
        self.overlays
            .values()
            .filter(|o| o.is_tracked)
            .map(|o| o.reference_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Owned copy of the map for readers outside the owner context
    pub fn snapshot(&self) -> HashMap<Uuid, OverlayState> {
        self.overlays.clone()
    }
}
