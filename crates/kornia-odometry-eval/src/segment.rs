//! KITTI odometry segment errors.
//!
//! For many start frames and a list of path lengths, compare the relative motion of
//! the ground truth over a sub-trajectory of that length with the predicted relative
//! motion over the same frames. Errors are normalized by the requested length.

use std::collections::BTreeMap;

use glam::DVec3;

use crate::metrics::{rotation_error, translation_error};
use crate::pose::PoseSet;
use crate::so3::{project_to_rotation, rotation_block, rotation_log};

/// Default segment lengths in meters.
pub const DEFAULT_LENGTHS: [u32; 8] = [100, 200, 300, 400, 500, 600, 700, 800];

/// Default stride between start frames (one second of a 10 Hz sequence).
pub const DEFAULT_STEP_SIZE: usize = 10;

/// Sample period assumed when computing the segment speed.
const FRAME_PERIOD_SECS: f64 = 0.1;

/// Error of one sub-trajectory.
///
/// All error values are per meter of the requested segment length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentError {
    /// Frame id where the segment starts.
    pub start_frame: i64,
    /// Rotation error in radians per meter.
    pub rotation_error: f64,
    /// Translation error in meters per meter.
    pub translation_error: f64,
    /// Requested segment length in meters.
    pub length: u32,
    /// Speed implied by the segment length at 10 Hz, in m/s.
    pub speed: f64,
    /// Absolute difference of the rotation vectors, radians per meter.
    pub axis_error: DVec3,
}

/// Mean of a group of [`SegmentError`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SegmentAggregate {
    /// Mean translation error per meter.
    pub translation: f64,
    /// Mean rotation error in radians per meter.
    pub rotation: f64,
    /// Mean axis error in radians per meter.
    pub axis: DVec3,
    /// Number of segments averaged.
    pub num_segments: usize,
}

impl SegmentAggregate {
    /// Arithmetic mean of the errors, `None` if there are none.
    pub fn mean<'a>(errors: impl IntoIterator<Item = &'a SegmentError>) -> Option<Self> {
        let mut acc = SegmentAggregate::default();
        for err in errors {
            acc.translation += err.translation_error;
            acc.rotation += err.rotation_error;
            acc.axis += err.axis_error;
            acc.num_segments += 1;
        }

        if acc.num_segments == 0 {
            return None;
        }

        let n = acc.num_segments as f64;
        Some(SegmentAggregate {
            translation: acc.translation / n,
            rotation: acc.rotation / n,
            axis: acc.axis / n,
            num_segments: acc.num_segments,
        })
    }

    /// Translation error in percent.
    pub fn translation_percent(&self) -> f64 {
        to_percent(self.translation)
    }

    /// Rotation error in degrees per 100 m.
    pub fn rotation_deg_per_100m(&self) -> f64 {
        to_deg_per_100m(self.rotation)
    }

    /// Axis error in degrees per 100 m.
    pub fn axis_deg_per_100m(&self) -> DVec3 {
        DVec3::new(
            to_deg_per_100m(self.axis.x),
            to_deg_per_100m(self.axis.y),
            to_deg_per_100m(self.axis.z),
        )
    }
}

/// Meters per meter -> percent.
#[inline]
pub fn to_percent(per_meter: f64) -> f64 {
    per_meter * 100.0
}

/// Radians per meter -> degrees per 100 m.
#[inline]
pub fn to_deg_per_100m(rad_per_meter: f64) -> f64 {
    rad_per_meter.to_degrees() * 100.0
}

/// First index `k >= start` with `dist[k] > dist[start] + length`.
///
/// Returns `None` when the trajectory ends before covering `length`.
pub fn find_segment_end(dist: &[f64], start: usize, length: f64) -> Option<usize> {
    let target = dist.get(start)? + length;
    (start..dist.len()).find(|&k| dist[k] > target)
}

/// Segment errors of a prediction against its ground truth.
///
/// Start frames are taken every `step_size` poses of the ground truth, and segment
/// ends are located on the ground-truth path. Segments whose start or end frame is
/// missing from the prediction are skipped.
///
/// # Arguments
///
/// * `ground_truth` - Reference poses.
/// * `prediction` - Estimated poses, may have gaps.
/// * `lengths` - Segment lengths in meters.
/// * `step_size` - Stride between start frames, in poses.
pub fn compute_sequence_errors(
    ground_truth: &PoseSet,
    prediction: &PoseSet,
    lengths: &[u32],
    step_size: usize,
) -> Vec<SegmentError> {
    let dist = ground_truth.distances_along_path();
    let gt_poses = ground_truth.iter().collect::<Vec<_>>();

    let mut errors = Vec::new();
    for start in (0..gt_poses.len()).step_by(step_size.max(1)) {
        let (first_frame, gt_first) = gt_poses[start];

        for &len in lengths {
            let Some(end) = find_segment_end(&dist, start, len as f64) else {
                continue;
            };
            let (last_frame, gt_last) = gt_poses[end];

            let (Some(pred_first), Some(pred_last)) =
                (prediction.get(first_frame), prediction.get(last_frame))
            else {
                log::trace!("skipping segment {first_frame}-{last_frame}: frame not predicted");
                continue;
            };

            let pose_delta_gt = gt_first.inverse() * *gt_last;
            let pose_delta_pred = pred_first.inverse() * *pred_last;
            let pose_error = pose_delta_pred.inverse() * pose_delta_gt;

            let len_m = len as f64;
            let r_err = rotation_error(&pose_error);
            let t_err = translation_error(&pose_error);

            // component-wise difference of the two rotation vectors, not the log of the error
            let aa_gt = rotation_log(&project_to_rotation(&rotation_block(&pose_delta_gt)));
            let aa_pred = rotation_log(&project_to_rotation(&rotation_block(&pose_delta_pred)));
            let aa_err = (aa_gt - aa_pred).abs();

            let num_frames = (last_frame - first_frame + 1) as f64;

            errors.push(SegmentError {
                start_frame: first_frame,
                rotation_error: r_err / len_m,
                translation_error: t_err / len_m,
                length: len,
                speed: len_m / (FRAME_PERIOD_SECS * num_frames),
                axis_error: aa_err / len_m,
            });
        }
    }
    errors
}

/// Mean errors for every requested length.
///
/// Every entry of `lengths` is present in the output; `None` means no segment of
/// that length could be evaluated.
pub fn aggregate_by_length(
    errors: &[SegmentError],
    lengths: &[u32],
) -> BTreeMap<u32, Option<SegmentAggregate>> {
    lengths
        .iter()
        .map(|&len| {
            let aggregate = SegmentAggregate::mean(errors.iter().filter(|e| e.length == len));
            if aggregate.is_none() {
                log::debug!("no segments of length {len} m");
            }
            (len, aggregate)
        })
        .collect()
}

/// Mean errors over all segments regardless of length.
///
/// Returns `None` when there are no segments.
pub fn overall_error(errors: &[SegmentError]) -> Option<SegmentAggregate> {
    let overall = SegmentAggregate::mean(errors);
    if overall.is_none() {
        log::warn!("no segment could be evaluated");
    }
    overall
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{DMat3, DMat4};

    use crate::pose::rigid_transform;

    fn straight_line(n: i64, step: f64) -> PoseSet {
        (0..n)
            .map(|i| (i, DMat4::from_translation(DVec3::new(i as f64 * step, 0.0, 0.0))))
            .collect()
    }

    fn segment(start_frame: i64, length: u32, t: f64, r: f64) -> SegmentError {
        SegmentError {
            start_frame,
            rotation_error: r,
            translation_error: t,
            length,
            speed: 0.0,
            axis_error: DVec3::splat(r),
        }
    }

    #[test]
    fn test_find_segment_end() {
        let dist = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(find_segment_end(&dist, 0, 2.0), Some(3));
        assert_eq!(find_segment_end(&dist, 2, 0.5), Some(3));
        assert_eq!(find_segment_end(&dist, 0, 5.0), None);
        assert_eq!(find_segment_end(&dist, 10, 1.0), None);
    }

    #[test]
    fn test_find_segment_end_monotonic() {
        let dist = (0..50).map(|i| (i as f64).powf(1.3)).collect::<Vec<_>>();
        let remaining = dist[49] - dist[5];

        let mut previous = None;
        for len in [1.0, 3.0, 7.5, 20.0, 60.0] {
            let end = find_segment_end(&dist, 5, len);
            assert!(end.is_some());
            assert!(end > previous);
            previous = end;
        }
        assert_eq!(find_segment_end(&dist, 5, remaining + 0.1), None);
    }

    #[test]
    fn test_sequence_errors_identity() {
        let gt = straight_line(300, 1.0);
        let errors = compute_sequence_errors(&gt, &gt, &[100, 200], DEFAULT_STEP_SIZE);
        assert!(!errors.is_empty());
        for err in &errors {
            assert_relative_eq!(err.rotation_error, 0.0, epsilon = 1e-12);
            assert_relative_eq!(err.translation_error, 0.0, epsilon = 1e-12);
            assert!(err.axis_error.abs_diff_eq(DVec3::ZERO, 1e-12));
        }
    }

    #[test]
    fn test_sequence_errors_start_frames_and_speed() {
        // 1 m per frame: a 100 m segment starting at frame s ends at s + 101
        let gt = straight_line(150, 1.0);
        let errors = compute_sequence_errors(&gt, &gt, &[100], 10);
        let starts = errors.iter().map(|e| e.start_frame).collect::<Vec<_>>();
        assert_eq!(starts, vec![0, 10, 20, 30, 40]);
        assert_relative_eq!(errors[0].speed, 100.0 / (0.1 * 102.0), epsilon = 1e-12);
        assert!(errors.iter().all(|e| e.length == 100));
    }

    #[test]
    fn test_sequence_errors_skip_missing_prediction() {
        let gt = straight_line(150, 1.0);
        let mut pred = PoseSet::new();
        for (frame, pose) in gt.iter() {
            // drop the start frame 10 and the end frame of the segment starting at 20
            if frame != 10 && frame != 121 {
                pred.insert(frame, *pose);
            }
        }
        let errors = compute_sequence_errors(&gt, &pred, &[100], 10);
        let starts = errors.iter().map(|e| e.start_frame).collect::<Vec<_>>();
        assert_eq!(starts, vec![0, 30, 40]);
    }

    #[test]
    fn test_sequence_errors_rotation_drift() {
        // prediction yaws by a constant rate relative to the ground truth
        let gt = straight_line(120, 1.0);
        let pred = gt.map_poses(|pose| {
            let x = pose.w_axis.x;
            rigid_transform(&DMat3::from_rotation_z(1e-3 * x), pose.w_axis.truncate())
        });
        let errors = compute_sequence_errors(&gt, &pred, &[100], 10);
        assert_eq!(errors.len(), 2);

        let err = errors[0];
        // 101 frames of 1e-3 rad
        assert_relative_eq!(err.rotation_error, 0.101 / 100.0, epsilon = 1e-9);
        assert_relative_eq!(err.axis_error.z, 0.101 / 100.0, epsilon = 1e-9);
        assert_relative_eq!(err.axis_error.x, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_aggregate_by_length() {
        let errors = [
            segment(0, 100, 0.1, 0.01),
            segment(10, 100, 0.3, 0.03),
            segment(0, 200, 0.5, 0.05),
        ];
        let by_length = aggregate_by_length(&errors, &[100, 200, 300]);
        assert_eq!(by_length.len(), 3);

        let l100 = by_length[&100].expect("two segments");
        assert_relative_eq!(l100.translation, 0.2);
        assert_relative_eq!(l100.rotation, 0.02);
        assert_relative_eq!(l100.axis.y, 0.02);
        assert_eq!(l100.num_segments, 2);

        assert_eq!(by_length[&200].map(|a| a.num_segments), Some(1));
        assert!(by_length[&300].is_none());
    }

    #[test]
    fn test_overall_error() {
        let errors = [
            segment(0, 100, 0.1, 0.01),
            segment(10, 100, 0.3, 0.03),
            segment(0, 200, 0.5, 0.05),
        ];
        let overall = overall_error(&errors).expect("three segments");
        assert_relative_eq!(overall.translation, 0.3);
        assert_relative_eq!(overall.rotation, 0.03);
        assert_eq!(overall.num_segments, 3);

        assert!(overall_error(&[]).is_none());
    }

    #[test]
    fn test_unit_conversions() {
        let agg = SegmentAggregate {
            translation: 0.0123,
            rotation: std::f64::consts::PI / 18000.0,
            axis: DVec3::ZERO,
            num_segments: 1,
        };
        assert_relative_eq!(agg.translation_percent(), 1.23, epsilon = 1e-12);
        assert_relative_eq!(agg.rotation_deg_per_100m(), 1.0, epsilon = 1e-12);
    }
}
