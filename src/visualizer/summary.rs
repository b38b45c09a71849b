//! Reference visualizer producing display-ready summaries.
//!
//! Draws the 2D mesh over the left keyframe image and assembles the 3D scene
//! (trajectory, landmark cloud, mesh) for the display sink. It keeps the
//! trajectory across keyframes, so it must live on a single worker thread.

use anyhow::Result;
use nalgebra::{Point2, Point3};
use tracing::debug;

use super::{VisualizationType, Visualizer};
use crate::frontend::Image;
use crate::mesher::Mesh2D;
use crate::system::messages::{ImageToDisplay, Scene3D, VisualizerInput, VisualizerOutput};

const EDGE_INTENSITY: u8 = 255;

#[derive(Debug, Default)]
pub struct SummaryVisualizer {
    trajectory: Vec<Point3<f64>>,
}

impl SummaryVisualizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trajectory(&self) -> &[Point3<f64>] {
        &self.trajectory
    }
}

impl Visualizer for SummaryVisualizer {
    fn spin_once(&mut self, input: VisualizerInput) -> Result<Option<VisualizerOutput>> {
        self.trajectory.push(Point3::from(input.pose.translation.vector));

        let mut scene = Scene3D {
            trajectory: self.trajectory.clone(),
            ..Default::default()
        };
        let mut images_to_display = Vec::new();

        match input.visualization_type {
            VisualizationType::PointCloud => {
                scene.points = input.points_with_id.values().copied().collect();
            }
            VisualizationType::PointCloudRepeated => {
                scene.points = input.points_3d.clone();
            }
            VisualizationType::Mesh2D | VisualizationType::Mesh2DSparse => {
                if let Some(kf) = &input.keyframe {
                    images_to_display.push(ImageToDisplay {
                        name: "Mesh 2D".to_string(),
                        image: draw_mesh_2d(&kf.frame.left, &input.mesh_2d),
                    });
                }
            }
            VisualizationType::Mesh2DTo3D | VisualizationType::Mesh2DTo3DSparse => {
                if let Some(kf) = &input.keyframe {
                    images_to_display.push(ImageToDisplay {
                        name: "Mesh 2D".to_string(),
                        image: draw_mesh_2d(&kf.frame.left, &input.mesher_output.mesh_2d),
                    });
                }
                scene.points = input.points_with_id.values().copied().collect();
                scene.mesh = input.mesher_output.mesh_3d.clone();
            }
            VisualizationType::None => {}
        }

        debug!(
            "Visualized {:?} at {} ({} backend factors, {} planes)",
            input.visualization_type,
            input.timestamp_ns,
            input.backend.factors.len(),
            input.planes.len()
        );

        Ok(Some(VisualizerOutput {
            visualization_type: input.visualization_type,
            timestamp_ns: input.timestamp_ns,
            images_to_display,
            scene,
        }))
    }
}

/// Copy of `image` with the triangle edges of `mesh` drawn on it.
pub fn draw_mesh_2d(image: &Image, mesh: &Mesh2D) -> Image {
    let mut data = image.to_vec();
    for tri in &mesh.triangles {
        for i in 0..3 {
            draw_line(&mut data, image.width, image.height, &tri[i], &tri[(i + 1) % 3]);
        }
    }
    Image {
        width: image.width,
        height: image.height,
        data: data.into(),
    }
}

/// Bresenham line, clipped to the image.
fn draw_line(data: &mut [u8], width: usize, height: usize, a: &Point2<f64>, b: &Point2<f64>) {
    let (mut x0, mut y0) = (a.x.round() as i64, a.y.round() as i64);
    let (x1, y1) = (b.x.round() as i64, b.y.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if x0 >= 0 && y0 >= 0 && (x0 as usize) < width && (y0 as usize) < height {
            data[y0 as usize * width + x0 as usize] = EDGE_INTENSITY;
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
