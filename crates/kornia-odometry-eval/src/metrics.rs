//! Absolute trajectory error (ATE) and relative pose error (RPE).

use glam::DMat4;
use thiserror::Error;

use crate::pose::{translation, PoseError, PoseSet};
use crate::so3::{rotation_angle, rotation_block};

/// Error types for trajectory metrics.
#[derive(Debug, Error)]
pub enum MetricError {
    /// Ground truth lacks a predicted frame.
    #[error(transparent)]
    Pose(#[from] PoseError),

    /// Not enough poses to compute the metric.
    #[error("not enough poses to compute {0}")]
    Empty(&'static str),
}

/// Rotation angle (radians) of the rotation block of a pose error.
pub fn rotation_error(pose_error: &DMat4) -> f64 {
    rotation_angle(&rotation_block(pose_error))
}

/// Euclidean norm of the translation of a pose error.
pub fn translation_error(pose_error: &DMat4) -> f64 {
    translation(pose_error).length()
}

/// Mean frame-to-frame relative pose error.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RelativePoseError {
    /// Mean translation error in meters.
    pub translation: f64,
    /// Mean rotation error in radians.
    pub rotation: f64,
}

/// Absolute trajectory error: RMSE of the position difference at every predicted frame.
///
/// No alignment is performed here, the poses are compared as given.
pub fn compute_ate(ground_truth: &PoseSet, prediction: &PoseSet) -> Result<f64, MetricError> {
    if prediction.is_empty() {
        return Err(MetricError::Empty("ATE"));
    }

    let mut sum_sq = 0.0;
    for (frame, pose) in prediction.iter() {
        let gt_xyz = translation(ground_truth.pose(frame)?);
        sum_sq += (gt_xyz - translation(pose)).length_squared();
    }
    Ok((sum_sq / prediction.len() as f64).sqrt())
}

/// Relative pose error between consecutive predicted frames.
///
/// For every pair of consecutive frames `(i, j)` of the prediction the error is
/// `inv(inv(G_i) G_j) * inv(P_i) P_j`. The arithmetic mean of the translation and
/// rotation errors is returned (not the RMSE).
pub fn compute_rpe(
    ground_truth: &PoseSet,
    prediction: &PoseSet,
) -> Result<RelativePoseError, MetricError> {
    let frames = prediction.keys().collect::<Vec<_>>();
    if frames.len() < 2 {
        return Err(MetricError::Empty("RPE"));
    }

    let mut acc = RelativePoseError::default();
    for pair in frames.windows(2) {
        let (i, j) = (pair[0], pair[1]);
        let gt_rel = ground_truth.relative_pose(i, j)?;
        let pred_rel = prediction.relative_pose(i, j)?;
        let rel_err = gt_rel.inverse() * pred_rel;

        acc.translation += translation_error(&rel_err);
        acc.rotation += rotation_error(&rel_err);
    }

    let num_pairs = (frames.len() - 1) as f64;
    Ok(RelativePoseError {
        translation: acc.translation / num_pairs,
        rotation: acc.rotation / num_pairs,
    })
}
