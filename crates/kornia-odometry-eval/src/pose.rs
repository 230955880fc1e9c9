//! Frame-indexed pose sequences.
//!
//! A [`PoseSet`] maps integer frame ids to 4x4 homogeneous poses. Frame ids need not
//! be contiguous; every traversal is in sorted frame order.

use std::collections::BTreeMap;

use glam::{DMat4, DVec3, DVec4};
use thiserror::Error;

/// Error types for pose sequences.
#[derive(Debug, Error)]
pub enum PoseError {
    /// A pose line could not be parsed.
    #[error("malformed pose at line {line}: {reason}")]
    Format {
        /// 1-based line number in the source text.
        line: usize,
        /// Description of the problem.
        reason: String,
    },

    /// A required frame is not part of the sequence.
    #[error("frame {0} is missing from the pose sequence")]
    MissingFrame(i64),

    /// Error reading a pose file.
    #[error("error reading pose file")]
    Io(#[from] std::io::Error),
}

/// Build a 4x4 pose from the 12 values of a row-major 3x4 `[R | t]` block.
pub fn pose_from_row_major(values: &[f64; 12]) -> DMat4 {
    let rows = [
        [values[0], values[1], values[2], values[3]],
        [values[4], values[5], values[6], values[7]],
        [values[8], values[9], values[10], values[11]],
        [0.0, 0.0, 0.0, 1.0],
    ];
    // glam is column-major
    DMat4::from_cols_array_2d(&rows).transpose()
}

/// Translation column of a pose.
#[inline]
pub fn translation(pose: &DMat4) -> DVec3 {
    pose.w_axis.truncate()
}

/// Diagnostic emitted when ground truth and prediction differ in length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthMismatch {
    /// Number of ground-truth poses before reconciliation.
    pub ground_truth: usize,
    /// Number of predicted poses before reconciliation.
    pub prediction: usize,
}

impl LengthMismatch {
    /// Length both sequences were cut to.
    pub fn reconciled_len(&self) -> usize {
        self.ground_truth.min(self.prediction)
    }

    /// Whether the prediction was the one truncated.
    pub fn prediction_truncated(&self) -> bool {
        self.prediction > self.ground_truth
    }
}

impl std::fmt::Display for LengthMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = if self.prediction_truncated() {
            "prediction"
        } else {
            "ground truth"
        };
        write!(
            f,
            "prediction len {} != ground truth len {}, cut {} to len {}",
            self.prediction,
            self.ground_truth,
            side,
            self.reconciled_len()
        )
    }
}

/// A sequence of poses indexed by frame id, ordered by frame id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseSet {
    poses: BTreeMap<i64, DMat4>,
}

impl PoseSet {
    /// Create an empty pose set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pose, returning the previous pose stored for that frame.
    pub fn insert(&mut self, frame: i64, pose: DMat4) -> Option<DMat4> {
        self.poses.insert(frame, pose)
    }

    /// Number of poses.
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// Whether the set holds no poses.
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Pose of a frame, if present.
    pub fn get(&self, frame: i64) -> Option<&DMat4> {
        self.poses.get(&frame)
    }

    /// Pose of a frame, or [`PoseError::MissingFrame`].
    pub fn pose(&self, frame: i64) -> Result<&DMat4, PoseError> {
        self.get(frame).ok_or(PoseError::MissingFrame(frame))
    }

    /// Whether the frame is present.
    pub fn contains(&self, frame: i64) -> bool {
        self.poses.contains_key(&frame)
    }

    /// Lowest frame id.
    pub fn first_key(&self) -> Option<i64> {
        self.poses.keys().next().copied()
    }

    /// Frame ids in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = i64> + '_ {
        self.poses.keys().copied()
    }

    /// `(frame, pose)` pairs in ascending frame order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &DMat4)> + '_ {
        self.poses.iter().map(|(k, v)| (*k, v))
    }

    /// Translation of every pose, in ascending frame order.
    pub fn positions(&self) -> Vec<DVec3> {
        self.poses.values().map(translation).collect()
    }

    /// Cumulative path length at every pose, in ascending frame order.
    ///
    /// The first entry is 0 and the result has one entry per pose.
    pub fn distances_along_path(&self) -> Vec<f64> {
        let mut dist = Vec::with_capacity(self.len());
        let mut positions = self.poses.values().map(translation);

        let Some(mut previous) = positions.next() else {
            return dist;
        };
        dist.push(0.0);

        let mut acc = 0.0;
        for current in positions {
            acc += previous.distance(current);
            dist.push(acc);
            previous = current;
        }
        dist
    }

    /// Keep the `max_count` lowest frame ids.
    pub fn truncate(&self, max_count: usize) -> PoseSet {
        self.poses
            .iter()
            .take(max_count)
            .map(|(k, v)| (*k, *v))
            .collect()
    }

    /// Express every pose relative to the pose of `reference`, which becomes identity.
    pub fn normalize_to_origin(&self, reference: i64) -> Result<PoseSet, PoseError> {
        let origin_inv = self.pose(reference)?.inverse();
        Ok(self.map_poses(|pose| origin_inv * *pose))
    }

    /// Pose of frame `j` expressed in the frame of `i`: `inv(P_i) * P_j`.
    pub fn relative_pose(&self, i: i64, j: i64) -> Result<DMat4, PoseError> {
        Ok(self.pose(i)?.inverse() * *self.pose(j)?)
    }

    /// Apply `f` to every pose, keeping frame ids.
    pub fn map_poses(&self, f: impl Fn(&DMat4) -> DMat4) -> PoseSet {
        self.poses.iter().map(|(k, v)| (*k, f(v))).collect()
    }

    /// Corresponding positions `(self, other)` for every frame of `other`.
    ///
    /// Fails if `self` lacks any frame present in `other`.
    pub fn matched_positions(
        &self,
        other: &PoseSet,
    ) -> Result<(Vec<DVec3>, Vec<DVec3>), PoseError> {
        let mut ours = Vec::with_capacity(other.len());
        let mut theirs = Vec::with_capacity(other.len());
        for (frame, pose) in other.iter() {
            ours.push(translation(self.pose(frame)?));
            theirs.push(translation(pose));
        }
        Ok((ours, theirs))
    }
}

impl FromIterator<(i64, DMat4)> for PoseSet {
    fn from_iter<T: IntoIterator<Item = (i64, DMat4)>>(iter: T) -> Self {
        Self {
            poses: iter.into_iter().collect(),
        }
    }
}

/// Truncate the longer of two sequences so both have the same length.
///
/// The lowest frame ids are kept. A [`LengthMismatch`] is returned when a cut happened.
pub fn reconcile_lengths(
    ground_truth: PoseSet,
    prediction: PoseSet,
) -> (PoseSet, PoseSet, Option<LengthMismatch>) {
    let mismatch = LengthMismatch {
        ground_truth: ground_truth.len(),
        prediction: prediction.len(),
    };

    match mismatch.ground_truth.cmp(&mismatch.prediction) {
        std::cmp::Ordering::Equal => (ground_truth, prediction, None),
        std::cmp::Ordering::Greater => {
            let ground_truth = ground_truth.truncate(mismatch.prediction);
            (ground_truth, prediction, Some(mismatch))
        }
        std::cmp::Ordering::Less => {
            let prediction = prediction.truncate(mismatch.ground_truth);
            (ground_truth, prediction, Some(mismatch))
        }
    }
}

/// Homogeneous transform with rotation `r` and translation `t`.
pub fn rigid_transform(r: &glam::DMat3, t: DVec3) -> DMat4 {
    let mut m = DMat4::from_mat3(*r);
    m.w_axis = DVec4::new(t.x, t.y, t.z, 1.0);
    m
}
