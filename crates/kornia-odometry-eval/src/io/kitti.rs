use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::eval::SequenceSummary;
use crate::pose::{pose_from_row_major, PoseError, PoseSet};
use crate::segment::{to_deg_per_100m, to_percent, SegmentAggregate, SegmentError};

/// Header line of the summary file.
pub const SUMMARY_HEADER: &str = "Sequence: \t Trans. err. (%): \t Rot. err. (deg/100m): \t ATE (m): \t RPE (m): \t RPE (deg):";

/// Written in the summary file in place of the segment errors of a sequence
/// without any evaluated segment.
pub const NO_DATA: &str = "nan";

/// Suffixes of the five per-length files, in the order written by [`write_length_errors`].
pub const LENGTH_FILE_SUFFIXES: [&str; 5] = ["tl", "rl", "ax", "ay", "az"];

/// Parse a KITTI pose file.
///
/// Each line holds either the 12 values of a row-major 3x4 `[R | t]` block, or a
/// leading frame index followed by the 12 values. Without an explicit index the
/// frame id is the 0-based line number. Blank lines are skipped but still count
/// as a line.
///
/// # Arguments
///
/// * `text` - The content of the pose file.
///
/// # Returns
///
/// The poses indexed by frame id.
pub fn parse_poses(text: &str) -> Result<PoseSet, PoseError> {
    let mut poses = PoseSet::new();

    for (line_idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let values = line
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|_| PoseError::Format {
                    line: line_idx + 1,
                    reason: format!("invalid number '{token}'"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (frame, block) = match values.len() {
            12 => (line_idx as i64, &values[..]),
            // the explicit index is written as a float
            13 => (parse_frame_index(values[0], line_idx + 1)?, &values[1..]),
            n => {
                return Err(PoseError::Format {
                    line: line_idx + 1,
                    reason: format!("expected 12 or 13 values, found {n}"),
                })
            }
        };

        let mut row_major = [0.0; 12];
        row_major.copy_from_slice(block);
        if poses.insert(frame, pose_from_row_major(&row_major)).is_some() {
            return Err(PoseError::Format {
                line: line_idx + 1,
                reason: format!("duplicate frame {frame}"),
            });
        }
    }

    Ok(poses)
}

fn parse_frame_index(value: f64, line: usize) -> Result<i64, PoseError> {
    // i64::MAX as f64 rounds up to 2^63
    if !value.is_finite() || value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return Err(PoseError::Format {
            line,
            reason: format!("invalid frame index '{value}'"),
        });
    }
    Ok(value as i64)
}

/// Read a KITTI pose file from disk.
///
/// # Arguments
///
/// * `path` - The path to the `<sequence>.txt` file.
pub fn read_poses_txt(path: impl AsRef<Path>) -> Result<PoseSet, PoseError> {
    let text = std::fs::read_to_string(path)?;
    parse_poses(&text)
}

/// Write one line per segment error:
/// `start_frame rot_err trans_err length speed axis_x axis_y axis_z`.
pub fn write_sequence_errors(
    path: impl AsRef<Path>,
    errors: &[SegmentError],
) -> Result<(), std::io::Error> {
    let mut writer = BufWriter::new(File::create(path)?);
    for err in errors {
        writeln!(
            writer,
            "{} {} {} {} {} {} {} {}",
            err.start_frame,
            err.rotation_error,
            err.translation_error,
            err.length,
            err.speed,
            err.axis_error.x,
            err.axis_error.y,
            err.axis_error.z,
        )?;
    }
    writer.flush()
}

/// Write the per-length aggregates of a sequence to `<dir>/<sequence>_{tl,rl,ax,ay,az}.txt`.
///
/// Each line is `<length> <value>` with 4 decimals, translation in percent and
/// rotations in degrees per 100 m. Lengths without data are omitted.
pub fn write_length_errors(
    dir: impl AsRef<Path>,
    sequence: &str,
    by_length: &BTreeMap<u32, Option<SegmentAggregate>>,
) -> Result<(), std::io::Error> {
    let dir = dir.as_ref();
    for (idx, suffix) in LENGTH_FILE_SUFFIXES.iter().enumerate() {
        let path = dir.join(format!("{sequence}_{suffix}.txt"));
        let mut writer = BufWriter::new(File::create(path)?);

        for (len, aggregate) in by_length {
            let Some(agg) = aggregate else {
                continue;
            };
            let value = match idx {
                0 => to_percent(agg.translation),
                1 => to_deg_per_100m(agg.rotation),
                2 => to_deg_per_100m(agg.axis.x),
                3 => to_deg_per_100m(agg.axis.y),
                _ => to_deg_per_100m(agg.axis.z),
            };
            writeln!(writer, "{len} {value:.4}")?;
        }
        writer.flush()?;
    }
    Ok(())
}

/// Summary line of one sequence, without the trailing newline.
///
/// The segment errors are [`NO_DATA`] when no segment could be evaluated.
pub fn format_summary_line(sequence: &str, summary: &SequenceSummary) -> String {
    let or_no_data = |value: Option<f64>| match value {
        Some(value) => format!("{value:.5}"),
        None => NO_DATA.to_string(),
    };
    format!(
        "{} \t {} \t {} \t {:.5} \t {:.3} \t {:.3}",
        sequence,
        or_no_data(summary.translation_percent()),
        or_no_data(summary.rotation_deg_per_100m()),
        summary.ate,
        summary.rpe_translation,
        summary.rpe_rotation_deg(),
    )
}

/// Write the summary file: [`SUMMARY_HEADER`] then one line per sequence.
pub fn write_summary<'a>(
    path: impl AsRef<Path>,
    rows: impl IntoIterator<Item = (&'a str, &'a SequenceSummary)>,
) -> Result<(), std::io::Error> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{SUMMARY_HEADER}")?;
    for (sequence, summary) in rows {
        writeln!(writer, "{}", format_summary_line(sequence, summary))?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DMat4, DVec3};

    const IDENTITY_ROW: &str = "1 0 0 0 0 1 0 0 0 0 1 0";

    #[test]
    fn test_parse_poses_implicit_index() -> Result<(), PoseError> {
        let text = "1 0 0 1.5 0 1 0 -2 0 0 1 3\n\n0 -1 0 0 1 0 0 0 0 0 1 0.25\n";
        let poses = parse_poses(text)?;
        assert_eq!(poses.keys().collect::<Vec<_>>(), vec![0, 2]);

        let first = poses.pose(0)?;
        assert_eq!(first.w_axis, glam::DVec4::new(1.5, -2.0, 3.0, 1.0));
        // row-major: the first row is (0, -1, 0)
        let second = poses.pose(2)?;
        assert_eq!(second.x_axis.truncate(), DVec3::new(0.0, 1.0, 0.0));
        assert_eq!(second.y_axis.truncate(), DVec3::new(-1.0, 0.0, 0.0));
        assert_eq!(second.row(3), glam::DVec4::new(0.0, 0.0, 0.0, 1.0));
        Ok(())
    }

    #[test]
    fn test_parse_poses_explicit_index() -> Result<(), PoseError> {
        let text = format!("5.0 {IDENTITY_ROW}\n12.9 1 0 0 4 0 1 0 0 0 0 1 0\n");
        let poses = parse_poses(&text)?;
        assert_eq!(poses.keys().collect::<Vec<_>>(), vec![5, 12]);
        assert_eq!(poses.pose(5)?, &DMat4::IDENTITY);
        assert_eq!(poses.pose(12)?.w_axis.x, 4.0);
        Ok(())
    }

    #[test]
    fn test_parse_poses_format_errors() {
        let text = format!("{IDENTITY_ROW}\n1 0 0 0 0 1 0 0 0 0 1\n");
        match parse_poses(&text) {
            Err(PoseError::Format { line, reason }) => {
                assert_eq!(line, 2);
                assert!(reason.contains("11"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let text = "1 0 0 0 0 1 0 0 0 0 1 x\n";
        match parse_poses(text) {
            Err(PoseError::Format { line, reason }) => {
                assert_eq!(line, 1);
                assert!(reason.contains("'x'"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_parse_poses_invalid_frame_index() {
        for index in ["nan", "inf", "-inf", "1e300"] {
            let text = format!("0 {IDENTITY_ROW}\n{index} {IDENTITY_ROW}\n");
            match parse_poses(&text) {
                Err(PoseError::Format { line, reason }) => {
                    assert_eq!(line, 2);
                    assert!(reason.contains("frame index"), "{reason}");
                }
                other => panic!("unexpected result for {index}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_poses_duplicate_frame() {
        let text = format!("3 {IDENTITY_ROW}\n4 {IDENTITY_ROW}\n3.5 {IDENTITY_ROW}\n");
        match parse_poses(&text) {
            Err(PoseError::Format { line, reason }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("duplicate frame 3"), "{reason}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_read_poses_txt() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("00.txt");
        std::fs::write(&path, format!("{IDENTITY_ROW}\n{IDENTITY_ROW}\n"))?;

        let poses = read_poses_txt(&path)?;
        assert_eq!(poses.len(), 2);

        let missing = read_poses_txt(tmp_dir.path().join("01.txt"));
        assert!(matches!(missing, Err(PoseError::Io(_))));
        Ok(())
    }

    #[test]
    fn test_write_sequence_errors() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("00.txt");
        let errors = [SegmentError {
            start_frame: 10,
            rotation_error: 0.5,
            translation_error: 0.25,
            length: 100,
            speed: 4.0,
            axis_error: DVec3::new(0.125, 0.0, 1.0),
        }];
        write_sequence_errors(&path, &errors)?;

        let content = std::fs::read_to_string(&path)?;
        assert_eq!(content, "10 0.5 0.25 100 4 0.125 0 1\n");
        Ok(())
    }

    #[test]
    fn test_write_length_errors() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let mut by_length = BTreeMap::new();
        by_length.insert(
            100,
            Some(SegmentAggregate {
                translation: 0.0123,
                rotation: std::f64::consts::PI / 18000.0,
                axis: DVec3::new(0.0, std::f64::consts::PI / 9000.0, 0.0),
                num_segments: 3,
            }),
        );
        by_length.insert(200, None);
        write_length_errors(tmp_dir.path(), "07", &by_length)?;

        let read = |suffix: &str| {
            std::fs::read_to_string(tmp_dir.path().join(format!("07_{suffix}.txt")))
        };
        assert_eq!(read("tl")?, "100 1.2300\n");
        assert_eq!(read("rl")?, "100 1.0000\n");
        assert_eq!(read("ax")?, "100 0.0000\n");
        assert_eq!(read("ay")?, "100 2.0000\n");
        assert_eq!(read("az")?, "100 0.0000\n");
        Ok(())
    }

    #[test]
    fn test_write_summary() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("result.txt");
        let summary = SequenceSummary {
            segments: Some(SegmentAggregate {
                translation: 0.015,
                rotation: std::f64::consts::PI / 36000.0,
                axis: DVec3::ZERO,
                num_segments: 10,
            }),
            ate: 1.23456789,
            rpe_translation: 0.0456,
            rpe_rotation: std::f64::consts::PI / 180.0,
        };
        assert_eq!(
            format_summary_line("03", &summary),
            "03 \t 1.50000 \t 0.50000 \t 1.23457 \t 0.046 \t 1.000"
        );

        write_summary(&path, [("03", &summary), ("04", &summary)])?;
        let content = std::fs::read_to_string(&path)?;
        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], SUMMARY_HEADER);
        assert!(lines[2].starts_with("04 \t 1.50000"));
        Ok(())
    }

    #[test]
    fn test_summary_line_without_segments() {
        let summary = SequenceSummary {
            segments: None,
            ate: 2.5,
            rpe_translation: 0.1,
            rpe_rotation: 0.0,
        };
        assert_eq!(
            format_summary_line("01", &summary),
            "01 \t nan \t nan \t 2.50000 \t 0.100 \t 0.000"
        );
    }
}
