use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use rust_vio::backend::DeadReckoningFactory;
use rust_vio::frontend::{IntervalFrontend, IntervalFrontendConfig};
use rust_vio::io::{SyntheticConfig, SyntheticSequence};
use rust_vio::mesher::LandmarkMesher;
use rust_vio::visualizer::{LogDisplay, SummaryVisualizer};
use rust_vio::{Collaborators, Pipeline, PipelineConfig, SpinOutcome};

const DEFAULT_NUM_FRAMES: usize = 200;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => PipelineConfig::from_yaml_file(&path).with_context(|| format!("Failed to load config {}", path))?,
        None => PipelineConfig::default(),
    };
    let num_frames = match args.next() {
        Some(n) => n.parse::<usize>().with_context(|| format!("Invalid frame count {}", n))?,
        None => DEFAULT_NUM_FRAMES,
    };

    let sequence = SyntheticSequence::new(SyntheticConfig::default());
    println!(
        "Running {} synthetic frames ({} landmarks) with {:?}",
        num_frames,
        sequence.points().len(),
        config.visualization_type()
    );

    let collaborators = Collaborators {
        frontend: Box::new(IntervalFrontend::new(IntervalFrontendConfig::new(sequence.calibration()))),
        backend_factory: Box::new(DeadReckoningFactory::default()),
        mesher: Box::new(LandmarkMesher::default()),
        visualizer: Box::new(SummaryVisualizer::new()),
        display: Box::new(LogDisplay::default()),
        segmentation: None,
    };
    let mut pipeline = Pipeline::new(config, collaborators)?;

    let mut keyframes = 0;
    for packet in sequence.take(num_frames) {
        if pipeline.spin(packet)? == SpinOutcome::Keyframe {
            keyframes += 1;
        }
    }
    pipeline.shutdown();

    println!("Processed {} frames, {} keyframes", num_frames, keyframes);
    if let Some(out) = pipeline.latest_backend_output() {
        let t = out.state.pose.translation.vector;
        let (roll, pitch, yaw) = out.state.pose.rotation.euler_angles();
        println!(
            "Final pose: t = [{:.3}, {:.3}, {:.3}], rpy = [{:.3}, {:.3}, {:.3}], {} landmarks",
            t.x,
            t.y,
            t.z,
            roll,
            pitch,
            yaw,
            out.landmarks.len()
        );
    }
    Ok(())
}
