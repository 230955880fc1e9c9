//! Evaluation of one trajectory against its ground truth.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::align::{align_trajectory, AlignmentError, AlignmentMode};
use crate::metrics::{compute_ate, compute_rpe, MetricError};
use crate::pose::{reconcile_lengths, LengthMismatch, PoseError, PoseSet};
use crate::segment::{
    aggregate_by_length, compute_sequence_errors, overall_error, SegmentAggregate, SegmentError,
    DEFAULT_LENGTHS, DEFAULT_STEP_SIZE,
};

/// Error types for the evaluation pipeline.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Pose parsing or lookup failed.
    #[error(transparent)]
    Pose(#[from] PoseError),

    /// Alignment failed.
    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    /// A trajectory metric could not be computed.
    #[error(transparent)]
    Metric(#[from] MetricError),

    /// The configuration is not usable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error reading or writing evaluation files.
    #[error("error reading or writing evaluation files")]
    Io(#[from] std::io::Error),
}

/// Parameters of an evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Segment lengths in meters.
    pub lengths: Vec<u32>,
    /// Alignment applied to the prediction before scoring.
    pub alignment: AlignmentMode,
    /// Stride between segment start frames.
    pub step_size: usize,
    /// Sequence ids to evaluate, `None` to discover them from the result directory.
    pub sequences: Option<Vec<String>>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            lengths: DEFAULT_LENGTHS.to_vec(),
            alignment: AlignmentMode::None,
            step_size: DEFAULT_STEP_SIZE,
            sequences: None,
        }
    }
}

impl EvalConfig {
    /// Check that the parameters can be used for an evaluation.
    pub fn validate(&self) -> Result<(), EvalError> {
        if self.step_size == 0 {
            return Err(EvalError::InvalidConfig("step_size must be at least 1".to_string()));
        }
        if self.lengths.contains(&0) {
            return Err(EvalError::InvalidConfig("segment lengths must be positive".to_string()));
        }
        Ok(())
    }
}

/// Scalar results of one trajectory.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SequenceSummary {
    /// Mean error over all segments, `None` if no segment could be evaluated.
    pub segments: Option<SegmentAggregate>,
    /// Absolute trajectory error (RMSE) in meters.
    pub ate: f64,
    /// Mean relative translation error in meters.
    pub rpe_translation: f64,
    /// Mean relative rotation error in radians.
    pub rpe_rotation: f64,
}

impl SequenceSummary {
    /// Number of segments behind the segment errors.
    pub fn num_segments(&self) -> usize {
        self.segments.map_or(0, |agg| agg.num_segments)
    }

    /// Segment translation error in percent, `None` without segments.
    pub fn translation_percent(&self) -> Option<f64> {
        self.segments.map(|agg| agg.translation_percent())
    }

    /// Segment rotation error in degrees per 100 m, `None` without segments.
    pub fn rotation_deg_per_100m(&self) -> Option<f64> {
        self.segments.map(|agg| agg.rotation_deg_per_100m())
    }

    /// Relative rotation error in degrees.
    pub fn rpe_rotation_deg(&self) -> f64 {
        self.rpe_rotation.to_degrees()
    }
}

/// Everything computed for one trajectory.
#[derive(Debug, Clone)]
pub struct SequenceEvaluation {
    /// Sequence id, e.g. `"07"`.
    pub sequence: String,
    /// Error of every evaluated segment.
    pub segment_errors: Vec<SegmentError>,
    /// Mean errors for every requested length.
    pub by_length: BTreeMap<u32, Option<SegmentAggregate>>,
    /// Scalar results.
    pub summary: SequenceSummary,
    /// Set when the two trajectories had to be cut to the same length.
    pub length_mismatch: Option<LengthMismatch>,
}

#[derive(Debug, Clone, Copy)]
enum EvalStage {
    Loaded,
    LengthReconciled,
    Normalized,
    Aligned,
    SegmentsComputed,
    GlobalComputed,
    Summarized,
}

fn enter_stage(sequence: &str, stage: EvalStage) {
    log::debug!("sequence {sequence}: {stage:?}");
}

/// Evaluate a predicted trajectory against its ground truth.
///
/// The longer trajectory is cut to the length of the shorter one, both are expressed
/// relative to the first predicted frame, the prediction is aligned according to
/// `config.alignment`, and then segment errors, ATE and RPE are computed.
///
/// # Arguments
///
/// * `sequence` - Id of the sequence, used for logging and reporting.
/// * `ground_truth` - Reference poses.
/// * `prediction` - Estimated poses.
/// * `config` - Evaluation parameters.
///
/// # Returns
///
/// The segment errors, per-length means and summary of the trajectory.
pub fn evaluate_sequence(
    sequence: &str,
    ground_truth: PoseSet,
    prediction: PoseSet,
    config: &EvalConfig,
) -> Result<SequenceEvaluation, EvalError> {
    config.validate()?;
    enter_stage(sequence, EvalStage::Loaded);

    let (ground_truth, prediction, length_mismatch) = reconcile_lengths(ground_truth, prediction);
    if let Some(mismatch) = &length_mismatch {
        log::warn!("sequence {sequence}: {mismatch}");
    }
    enter_stage(sequence, EvalStage::LengthReconciled);

    let Some(origin) = prediction.first_key() else {
        return Err(MetricError::Empty("an evaluation").into());
    };
    let ground_truth = ground_truth.normalize_to_origin(origin)?;
    let prediction = prediction.normalize_to_origin(origin)?;
    enter_stage(sequence, EvalStage::Normalized);

    let prediction = if config.alignment != AlignmentMode::None {
        let aligned = align_trajectory(&ground_truth, &prediction, config.alignment)?;
        enter_stage(sequence, EvalStage::Aligned);
        aligned
    } else {
        prediction
    };

    let segment_errors =
        compute_sequence_errors(&ground_truth, &prediction, &config.lengths, config.step_size);
    let by_length = aggregate_by_length(&segment_errors, &config.lengths);
    let segments = overall_error(&segment_errors);
    enter_stage(sequence, EvalStage::SegmentsComputed);

    let ate = compute_ate(&ground_truth, &prediction)?;
    let rpe = compute_rpe(&ground_truth, &prediction)?;
    enter_stage(sequence, EvalStage::GlobalComputed);

    let summary = SequenceSummary {
        segments,
        ate,
        rpe_translation: rpe.translation,
        rpe_rotation: rpe.rotation,
    };
    enter_stage(sequence, EvalStage::Summarized);

    Ok(SequenceEvaluation {
        sequence: sequence.to_string(),
        segment_errors,
        by_length,
        summary,
        length_mismatch,
    })
}
