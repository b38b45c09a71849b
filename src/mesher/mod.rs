//! Mesh types and the mesher worker interface.

pub mod landmark_mesher;

use anyhow::Result;
use nalgebra::{Point2, Point3};

use crate::system::messages::{MesherInput, MesherOutput};

pub use landmark_mesher::{LandmarkMesher, LandmarkMesherConfig};

/// Triangle in pixel coordinates.
pub type Triangle2D = [Point2<f64>; 3];

/// 2D triangulation over image keypoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh2D {
    pub triangles: Vec<Triangle2D>,
}

impl Mesh2D {
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

/// 3D triangle mesh (indexed).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh3D {
    pub vertices: Vec<Point3<f64>>,
    pub polygons: Vec<[usize; 3]>,
}

impl Mesh3D {
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }
}

/// Per-vertex RGB colors of a 3D mesh.
pub type Mesh3DColors = Vec<[u8; 3]>;

/// Which keypoints a 2D mesh is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mesh2DKind {
    /// Every tracked keypoint of the left image.
    Dense,
    /// Only keypoints with a valid right-image match.
    Sparse,
}

/// Mesher worker. Runs on its own thread.
pub trait Mesher: Send {
    fn spin_once(&mut self, input: MesherInput) -> Result<MesherOutput>;
}

/// Fan triangulation of a point set.
///
/// Points are ordered by angle around their centroid and triangles are fanned
/// out of the first one. Degenerate triangles are skipped. Returns index
/// triples into `points`.
pub fn triangulate_fan(points: &[Point2<f64>]) -> Vec<[usize; 3]> {
    if points.len() < 3 {
        return Vec::new();
    }
    let n = points.len() as f64;
    let centroid = points.iter().fold(Point2::origin(), |acc, p| acc + p.coords / n);

    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| {
        let da = points[a] - centroid;
        let db = points[b] - centroid;
        da.y.atan2(da.x).total_cmp(&db.y.atan2(db.x))
    });

    let apex = order[0];
    order[1..]
        .windows(2)
        .filter_map(|w| {
            let (b, c) = (w[0], w[1]);
            let ab = points[b] - points[apex];
            let ac = points[c] - points[apex];
            let twice_area = ab.x * ac.y - ab.y * ac.x;
            (twice_area.abs() > 1e-9).then_some([apex, b, c])
        })
        .collect()
}

/// Fan triangulation returned as pixel triangles.
pub fn mesh_2d_from_points(points: &[Point2<f64>]) -> Mesh2D {
    Mesh2D {
        triangles: triangulate_fan(points)
            .into_iter()
            .map(|[a, b, c]| [points[a], points[b], points[c]])
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_triangulation_square() {
        let pts = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        let tris = triangulate_fan(&pts);
        assert_eq!(tris.len(), 2);
        for t in &tris {
            let mut sorted = *t;
            sorted.sort_unstable();
            sorted.windows(2).for_each(|w| assert_ne!(w[0], w[1]));
        }
    }

    #[test]
    fn test_fan_triangulation_degenerate_inputs() {
        assert!(triangulate_fan(&[]).is_empty());
        assert!(triangulate_fan(&[Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)]).is_empty());
        // Collinear points produce no triangles.
        let line: Vec<_> = (0..5).map(|i| Point2::new(i as f64, 0.0)).collect();
        assert!(triangulate_fan(&line).is_empty());
    }

    #[test]
    fn test_mesh_2d_from_points() {
        let pts = [Point2::new(0.0, 0.0), Point2::new(4.0, 0.0), Point2::new(0.0, 3.0)];
        let mesh = mesh_2d_from_points(&pts);
        assert_eq!(mesh.len(), 1);
        assert!(mesh.triangles[0].contains(&Point2::new(4.0, 0.0)));
    }
}
