//! Visualization modes, the visualizer worker interface and display sinks.

pub mod summary;

use anyhow::Result;
use tracing::{info, warn};

use crate::system::messages::{VisualizerInput, VisualizerOutput};

pub use summary::SummaryVisualizer;

/// What the visualizer shows for every keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisualizationType {
    /// Landmarks in the time horizon, no repeated points.
    #[default]
    PointCloud,
    /// Raw backend points, re-plotted at every keyframe.
    PointCloudRepeated,
    /// 2D mesh over the keypoints of the last keyframe.
    Mesh2D,
    /// 3D mesh lifted from a 2D triangulation of right-valid keypoints.
    Mesh2DTo3D,
    /// 2D mesh over right-valid keypoints only.
    Mesh2DSparse,
    /// Like `Mesh2DTo3D`, without triangles over non-planar obstacles.
    Mesh2DTo3DSparse,
    /// No map visualization.
    None,
}

impl VisualizationType {
    /// Decode the integer `viz_type` flag.
    ///
    /// Unknown codes (including 6, the CGAL 3D mesh) fail closed to `None`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::PointCloud,
            1 => Self::PointCloudRepeated,
            2 => Self::Mesh2D,
            3 => Self::Mesh2DTo3D,
            4 => Self::Mesh2DSparse,
            5 => Self::Mesh2DTo3DSparse,
            7 => Self::None,
            other => {
                warn!("Unrecognized visualization type {}, disabling map visualization.", other);
                Self::None
            }
        }
    }

    /// Whether this mode needs a round-trip through the mesher.
    pub fn requires_mesher(self) -> bool {
        matches!(self, Self::Mesh2DTo3D | Self::Mesh2DTo3DSparse)
    }

    /// Whether this mode displays a mesh.
    pub fn is_mesh(self) -> bool {
        matches!(
            self,
            Self::Mesh2D | Self::Mesh2DSparse | Self::Mesh2DTo3D | Self::Mesh2DTo3DSparse
        )
    }
}

/// Visualizer worker. Runs on its own thread.
pub trait Visualizer: Send {
    /// Render one keyframe. `None` when it cannot keep pace.
    fn spin_once(&mut self, input: VisualizerInput) -> Result<Option<VisualizerOutput>>;
}

/// Consumes visualizer outputs in the orchestrator thread.
pub trait DisplaySink {
    fn spin_once(&mut self, output: VisualizerOutput);
}

/// Display sink that only logs what would be shown.
#[derive(Debug, Default)]
pub struct LogDisplay {
    pub displayed: usize,
}

impl DisplaySink for LogDisplay {
    fn spin_once(&mut self, output: VisualizerOutput) {
        self.displayed += 1;
        if output.visualization_type != VisualizationType::None {
            info!(
                "Display {:?} at {}: {} trajectory poses, {} points, {} mesh polygons",
                output.visualization_type,
                output.timestamp_ns,
                output.scene.trajectory.len(),
                output.scene.points.len(),
                output.scene.mesh.polygons.len()
            );
        }
        for img in &output.images_to_display {
            info!("Display image '{}' ({}x{})", img.name, img.image.width, img.image.height);
        }
    }
}
