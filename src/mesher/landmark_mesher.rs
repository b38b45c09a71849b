//! Reference mesher built on the landmarks of the backend time horizon.

use anyhow::Result;
use nalgebra::{Point2, Point3};
use tracing::debug;

use super::{triangulate_fan, Mesh2D, Mesh3D, Mesher};
use crate::system::messages::{MesherInput, MesherOutput};

#[derive(Debug, Clone, Copy)]
pub struct LandmarkMesherConfig {
    /// Longest 3D edge (m) kept when obstacle filtering is requested.
    pub max_edge_length: f64,
}

impl Default for LandmarkMesherConfig {
    fn default() -> Self {
        Self { max_edge_length: 1.5 }
    }
}

/// Triangulates the right-valid keypoints of the keyframe whose landmark has
/// a 3D estimate, then lifts every 2D triangle onto those landmarks.
#[derive(Debug, Default)]
pub struct LandmarkMesher {
    config: LandmarkMesherConfig,
}

impl LandmarkMesher {
    pub fn new(config: LandmarkMesherConfig) -> Self {
        Self { config }
    }
}

impl Mesher for LandmarkMesher {
    fn spin_once(&mut self, input: MesherInput) -> Result<MesherOutput> {
        let mut pixels: Vec<Point2<f64>> = Vec::new();
        let mut vertices: Vec<Point3<f64>> = Vec::new();
        for kp in input.keyframe.right_valid_keypoints() {
            if let Some(p) = input.points_with_id.get(&kp.landmark_id) {
                pixels.push(kp.pixel);
                vertices.push(*p);
            }
        }

        let max_edge = self.config.max_edge_length;
        let polygons: Vec<[usize; 3]> = triangulate_fan(&pixels)
            .into_iter()
            .filter(|tri| !input.filter_obstacles || max_edge_of(&vertices, tri) <= max_edge)
            .collect();

        let mesh_2d = Mesh2D {
            triangles: polygons
                .iter()
                .map(|&[a, b, c]| [pixels[a], pixels[b], pixels[c]])
                .collect(),
        };

        debug!(
            "Mesher at {}: {} vertices, {} polygons (obstacle filter: {})",
            input.timestamp_ns,
            vertices.len(),
            polygons.len(),
            input.filter_obstacles
        );

        Ok(MesherOutput {
            timestamp_ns: input.timestamp_ns,
            mesh_2d,
            mesh_3d: Mesh3D { vertices, polygons },
        })
    }
}

fn max_edge_of(vertices: &[Point3<f64>], tri: &[usize; 3]) -> f64 {
    (0..3)
        .map(|i| (vertices[tri[i]] - vertices[tri[(i + 1) % 3]]).norm())
        .fold(0.0, f64::max)
}
