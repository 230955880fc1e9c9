//! Trajectory alignment (scale-only least squares and Umeyama / Kabsch)

use std::str::FromStr;

use glam::{DMat3, DMat4, DVec3, DVec4};
use nalgebra::{Matrix3, SVD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pose::{rigid_transform, PoseError, PoseSet};
use crate::so3::{from_nalgebra, to_nalgebra};

/// Error type for trajectory alignment.
#[derive(Debug, Error)]
pub enum AlignmentError {
    /// Predicted and reference point sets must have the same shape
    #[error("Mismatched point sets: prediction ({pred}) != reference ({reference})")]
    DimensionMismatch {
        /// Number of predicted points.
        pred: usize,
        /// Number of reference points.
        reference: usize,
    },

    /// The input does not constrain the requested transform
    #[error("Degenerate alignment input: {0}")]
    DegenerateInput(&'static str),

    /// Failed to compute a factor of the SVD
    #[error("Failed to compute {0} in SVD")]
    SvdFailed(&'static str),

    /// Unknown alignment mode name
    #[error("Unknown alignment mode: {0}")]
    UnknownAlignment(String),

    /// Reference trajectory lacks a predicted frame
    #[error(transparent)]
    Pose(#[from] PoseError),
}

/// How the prediction is aligned to the ground truth before scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentMode {
    /// Evaluate the prediction as is.
    #[default]
    #[serde(rename = "none")]
    None,
    /// Least-squares scale of the translations only.
    #[serde(rename = "scale")]
    Scale,
    /// Same as [`AlignmentMode::Sim7Dof`].
    #[serde(rename = "scale_7dof")]
    Scale7Dof,
    /// Estimate and apply a similarity transform.
    #[serde(rename = "7dof")]
    Sim7Dof,
    /// Estimate and apply a rigid transform.
    #[serde(rename = "6dof")]
    Rigid6Dof,
}

impl AlignmentMode {
    /// Name of the mode as accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignmentMode::None => "none",
            AlignmentMode::Scale => "scale",
            AlignmentMode::Scale7Dof => "scale_7dof",
            AlignmentMode::Sim7Dof => "7dof",
            AlignmentMode::Rigid6Dof => "6dof",
        }
    }
}

impl FromStr for AlignmentMode {
    type Err = AlignmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(AlignmentMode::None),
            "scale" => Ok(AlignmentMode::Scale),
            "scale_7dof" => Ok(AlignmentMode::Scale7Dof),
            "7dof" => Ok(AlignmentMode::Sim7Dof),
            "6dof" => Ok(AlignmentMode::Rigid6Dof),
            _ => Err(AlignmentError::UnknownAlignment(s.to_string())),
        }
    }
}

impl std::fmt::Display for AlignmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Similarity transform `x -> scale * rotation * x + translation` estimated by [`umeyama`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    /// Rotation matrix (determinant +1).
    pub rotation: DMat3,
    /// Translation vector.
    pub translation: DVec3,
    /// Uniform scale, 1.0 for rigid alignment.
    pub scale: f64,
}

impl Similarity {
    /// Rigid part `[R | t]` as a 4x4 homogeneous matrix, without the scale.
    pub fn rigid_matrix(&self) -> DMat4 {
        rigid_transform(&self.rotation, self.translation)
    }

    /// Apply the transform to a point.
    pub fn transform_point(&self, p: DVec3) -> DVec3 {
        self.scale * (self.rotation * p) + self.translation
    }
}

fn check_shapes(pred: &[DVec3], reference: &[DVec3]) -> Result<(), AlignmentError> {
    if pred.len() != reference.len() {
        return Err(AlignmentError::DimensionMismatch {
            pred: pred.len(),
            reference: reference.len(),
        });
    }
    if pred.is_empty() {
        return Err(AlignmentError::DegenerateInput("empty point sets"));
    }
    Ok(())
}

/// Least-squares scale `s` minimizing `|s * pred - reference|^2`.
///
/// All coordinates of all points are treated as one flat vector:
/// `s = sum(pred . reference) / sum(pred . pred)`.
pub fn solve_scale(pred: &[DVec3], reference: &[DVec3]) -> Result<f64, AlignmentError> {
    check_shapes(pred, reference)?;

    let (num, den) = pred
        .iter()
        .zip(reference.iter())
        .fold((0.0, 0.0), |(num, den), (p, r)| {
            (num + p.dot(*r), den + p.length_squared())
        });

    if den == 0.0 {
        return Err(AlignmentError::DegenerateInput(
            "predicted points are all at the origin",
        ));
    }
    Ok(num / den)
}

/// Umeyama least-squares similarity (or rigid) transform mapping `pred` onto `reference`.
///
/// Umeyama, Shinji: Least-squares estimation of transformation parameters between
/// two point patterns. IEEE PAMI, 1991.
///
/// # Arguments
///
/// * `pred` - Points to be aligned.
/// * `reference` - Corresponding reference points.
/// * `with_scale` - Estimate a uniform scale as well; otherwise scale is 1.0.
///
/// # Returns
///
/// The transform with `reference_i ~ scale * rotation * pred_i + translation`.
pub fn umeyama(
    pred: &[DVec3],
    reference: &[DVec3],
    with_scale: bool,
) -> Result<Similarity, AlignmentError> {
    check_shapes(pred, reference)?;
    let n = pred.len() as f64;

    // centroids, eq. 34 and 35
    let mean_pred = pred.iter().copied().sum::<DVec3>() / n;
    let mean_ref = reference.iter().copied().sum::<DVec3>() / n;

    // variance of the predicted points, eq. 36
    let sigma_sq = pred
        .iter()
        .map(|p| (*p - mean_pred).length_squared())
        .sum::<f64>()
        / n;

    // covariance, eq. 38: (1/n) sum (ref_i - mean_ref) (pred_i - mean_pred)^T
    let mut cov = DMat3::ZERO;
    for (p, r) in pred.iter().zip(reference.iter()) {
        let pc = *p - mean_pred;
        let rc = *r - mean_ref;
        // column j of the outer product rc * pc^T is rc * pc[j]
        cov += DMat3::from_cols(rc * pc.x, rc * pc.y, rc * pc.z);
    }
    cov *= 1.0 / n;

    let svd = SVD::new(to_nalgebra(&cov), true, true);
    let Some(u) = svd.u else {
        return Err(AlignmentError::SvdFailed("U"));
    };
    let Some(v_t) = svd.v_t else {
        return Err(AlignmentError::SvdFailed("V^T"));
    };

    // eq. 43, keep a right handed coordinate system
    let mut s = Matrix3::<f64>::identity();
    if u.determinant() * v_t.determinant() < 0.0 {
        s[(2, 2)] = -1.0;
    }

    // rotation, eq. 40
    let rotation = from_nalgebra(&(u * s * v_t));

    // scale and translation, eq. 42 and 41
    let scale = if with_scale {
        if sigma_sq == 0.0 {
            return Err(AlignmentError::DegenerateInput(
                "predicted points have zero variance",
            ));
        }
        (Matrix3::from_diagonal(&svd.singular_values) * s).trace() / sigma_sq
    } else {
        1.0
    };
    let translation = mean_ref - scale * (rotation * mean_pred);

    Ok(Similarity {
        rotation,
        translation,
        scale,
    })
}

/// Scale every translation by `scale`, then left-multiply by `rigid` if given.
///
/// The scale is never folded into the rotation block.
pub fn apply_alignment(poses: &PoseSet, scale: f64, rigid: Option<&DMat4>) -> PoseSet {
    poses.map_poses(|pose| {
        let mut scaled = *pose;
        let t = scaled.w_axis.truncate() * scale;
        scaled.w_axis = DVec4::new(t.x, t.y, t.z, scaled.w_axis.w);
        match rigid {
            Some(transform) => *transform * scaled,
            None => scaled,
        }
    })
}

/// Align `prediction` to `ground_truth` with the requested mode.
///
/// Correspondences are the frames of `prediction`; the ground truth is never modified.
pub fn align_trajectory(
    ground_truth: &PoseSet,
    prediction: &PoseSet,
    mode: AlignmentMode,
) -> Result<PoseSet, AlignmentError> {
    if mode == AlignmentMode::None {
        return Ok(prediction.clone());
    }

    let (xyz_gt, xyz_pred) = ground_truth.matched_positions(prediction)?;

    let aligned = match mode {
        AlignmentMode::None => prediction.clone(),
        AlignmentMode::Scale => {
            let scale = solve_scale(&xyz_pred, &xyz_gt)?;
            log::debug!("scale alignment: s = {scale}");
            apply_alignment(prediction, scale, None)
        }
        AlignmentMode::Scale7Dof | AlignmentMode::Sim7Dof | AlignmentMode::Rigid6Dof => {
            let with_scale = mode != AlignmentMode::Rigid6Dof;
            let sim = umeyama(&xyz_pred, &xyz_gt, with_scale)?;
            log::debug!(
                "{mode} alignment: s = {}, t = {:?}",
                sim.scale,
                sim.translation
            );
            apply_alignment(prediction, sim.scale, Some(&sim.rigid_matrix()))
        }
    };
    Ok(aligned)
}
