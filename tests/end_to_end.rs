//! Full pipeline on the synthetic sequence with the reference collaborators.

use std::fs;

use approx::assert_relative_eq;

use rust_vio::backend::{gravity_aligned_rotation, DeadReckoningFactory};
use rust_vio::frontend::{IntervalFrontend, IntervalFrontendConfig};
use rust_vio::io::results_logger::{BACKEND_CSV, FRONTEND_CSV, INITIAL_STATE_CSV};
use rust_vio::io::{SyntheticConfig, SyntheticSequence};
use rust_vio::mesher::LandmarkMesher;
use rust_vio::visualizer::{LogDisplay, SummaryVisualizer};
use rust_vio::{Collaborators, Pipeline, PipelineConfig, PipelineState, SpinOutcome};

const NUM_FRAMES: usize = 60;

fn collaborators(sequence: &SyntheticSequence) -> Collaborators {
    Collaborators {
        frontend: Box::new(IntervalFrontend::new(IntervalFrontendConfig::new(sequence.calibration()))),
        backend_factory: Box::new(DeadReckoningFactory::default()),
        mesher: Box::new(LandmarkMesher::default()),
        visualizer: Box::new(SummaryVisualizer::new()),
        display: Box::new(LogDisplay::default()),
        segmentation: None,
    }
}

#[test]
fn test_synthetic_run_with_results() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        log_output: true,
        output_dir: dir.path().join("results"),
        viz_type: 5,
        deterministic_random_number_generator: true,
        min_num_obs_for_mesher_points: 2,
        ..Default::default()
    };
    let mut sequence = SyntheticSequence::new(SyntheticConfig::default());
    let first = sequence.next().unwrap();
    let initial_rotation = gravity_aligned_rotation(&first.imu);
    let start_ns = first.timestamp_ns();

    let mut pipeline = Pipeline::new(config, collaborators(&sequence)).unwrap();
    assert_eq!(pipeline.spin(first).unwrap(), SpinOutcome::Bootstrapped);

    let mut keyframes = 0;
    for packet in sequence.by_ref().take(NUM_FRAMES - 1) {
        if pipeline.spin(packet).unwrap() == SpinOutcome::Keyframe {
            keyframes += 1;
        }
    }
    assert!(keyframes >= 5, "only {keyframes} keyframes");
    assert_eq!(pipeline.keyframes_processed(), keyframes as u64);

    let output = pipeline.latest_backend_output().unwrap().clone();
    assert_eq!(output.keyframe_index, keyframes as u64);
    assert_eq!(pipeline.timestamp_lkf(), output.timestamp_kf_ns);
    assert!(output.timestamp_kf_ns > start_ns);
    assert!(!output.landmarks.is_empty());

    // Every IMU interval was integrated exactly once.
    let traveled = initial_rotation.inverse() * output.state.pose.rotation;
    let expected = sequence.rotation_at(output.timestamp_kf_ns);
    assert_relative_eq!(traveled.angle_to(&expected), 0.0, epsilon = 1e-6);

    pipeline.shutdown();
    assert_eq!(pipeline.state(), PipelineState::ShuttingDown);
    assert!(pipeline.shared_state().failure().is_none());

    let results = dir.path().join("results");
    let rows = |name: &str| fs::read_to_string(results.join(name)).unwrap().lines().count() - 1;
    assert_eq!(rows(FRONTEND_CSV), NUM_FRAMES - 1);
    assert_eq!(rows(BACKEND_CSV), keyframes);
    assert_eq!(rows(INITIAL_STATE_CSV), 1);
}

#[test]
fn test_deterministic_runs_agree() {
    let run = || {
        let config = PipelineConfig {
            deterministic_random_number_generator: true,
            visualize: false,
            ..Default::default()
        };
        let mut sequence = SyntheticSequence::new(SyntheticConfig::default());
        let mut pipeline = Pipeline::new(config, collaborators(&sequence)).unwrap();
        let outcomes: Vec<_> = sequence
            .by_ref()
            .take(30)
            .map(|packet| pipeline.spin(packet).unwrap())
            .collect();
        let output = pipeline.latest_backend_output().unwrap().clone();
        pipeline.shutdown();
        (outcomes, output.landmarks.len(), output.state.pose)
    };

    let (outcomes_a, landmarks_a, pose_a) = run();
    let (outcomes_b, landmarks_b, pose_b) = run();
    assert_eq!(outcomes_a, outcomes_b);
    assert_eq!(landmarks_a, landmarks_b);
    assert_relative_eq!(pose_a.translation.vector, pose_b.translation.vector);
}
