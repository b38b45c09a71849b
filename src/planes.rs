//! Registry of planar surfaces accumulated across keyframes.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::{Point3, Unit, Vector3};

use crate::types::{LandmarkId, PlaneId};

/// Plane `n · x = d` in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub id: PlaneId,
    pub normal: Unit<Vector3<f64>>,
    pub distance: f64,
    /// Landmarks constrained to lie on this plane.
    pub landmarks: BTreeSet<LandmarkId>,
}

impl Plane {
    pub fn new(id: PlaneId, normal: Unit<Vector3<f64>>, distance: f64) -> Self {
        Self {
            id,
            normal,
            distance,
            landmarks: BTreeSet::new(),
        }
    }

    /// Signed distance of `p` to the plane.
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) - self.distance
    }
}

/// Map of plane id → plane model.
///
/// Owned and mutated only by the orchestrator; workers receive it behind an
/// `Arc` as a read-only snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaneRegistry {
    planes: BTreeMap<PlaneId, Plane>,
}

impl PlaneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn get(&self, id: PlaneId) -> Option<&Plane> {
        self.planes.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plane> {
        self.planes.values()
    }

    /// Insert or replace a plane. Returns the previous model, if any.
    pub fn upsert(&mut self, plane: Plane) -> Option<Plane> {
        self.planes.insert(plane.id, plane)
    }

    /// Merge updated plane models. Returns how many planes were new.
    pub fn merge(&mut self, planes: impl IntoIterator<Item = Plane>) -> usize {
        let mut added = 0;
        for plane in planes {
            if self.upsert(plane).is_none() {
                added += 1;
            }
        }
        added
    }
}
