//! Evaluation of every sequence of a result directory.
//!
//! Layout: `<gt_dir>/<id>.txt` and `<result_dir>/<id>.txt` hold the poses. The
//! evaluation writes `<result_dir>/errors/<id>.txt`,
//! `<result_dir>/plot_error/<id>_{tl,rl,ax,ay,az}.txt` and `<result_dir>/result.txt`.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::eval::{evaluate_sequence, EvalConfig, EvalError, SequenceSummary};
use crate::io::kitti::{read_poses_txt, write_length_errors, write_sequence_errors, write_summary};

/// Sub-directory of the result directory holding the segment errors.
pub const ERRORS_DIR: &str = "errors";

/// Sub-directory of the result directory holding the per-length errors.
pub const PLOT_ERROR_DIR: &str = "plot_error";

/// Name of the summary file in the result directory.
pub const SUMMARY_FILE: &str = "result.txt";

/// Result of one sequence of a batch.
#[derive(Debug)]
pub struct SequenceOutcome {
    /// Sequence id.
    pub sequence: String,
    /// Summary, or the error that stopped the evaluation of this sequence.
    pub result: Result<SequenceSummary, EvalError>,
}

/// Means over the successfully evaluated sequences.
///
/// The segment errors only average the sequences with at least one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchAverages {
    /// Mean segment translation error in percent, `None` if no sequence has segments.
    pub translation_percent: Option<f64>,
    /// Mean segment rotation error in degrees per 100 m, `None` if no sequence has segments.
    pub rotation_deg_per_100m: Option<f64>,
    /// Mean ATE in meters.
    pub ate: f64,
}

/// Outcome of [`evaluate_directory`].
#[derive(Debug)]
pub struct BatchReport {
    /// One entry per requested sequence, in request order.
    pub outcomes: Vec<SequenceOutcome>,
    /// Averages over the successful sequences, `None` if none succeeded.
    pub averages: Option<BatchAverages>,
}

impl BatchReport {
    /// Successfully evaluated sequences.
    pub fn successes(&self) -> impl Iterator<Item = (&str, &SequenceSummary)> + '_ {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|s| (o.sequence.as_str(), s)))
    }

    /// Sequences whose evaluation failed.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &EvalError)> + '_ {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.sequence.as_str(), e)))
    }
}

/// Sequence ids of a result directory: stems of the `*.txt` files made of digits only, sorted.
pub fn discover_sequences(result_dir: impl AsRef<Path>) -> Result<Vec<String>, std::io::Error> {
    let mut sequences = Vec::new();
    for entry in std::fs::read_dir(result_dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("txt") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()) {
            sequences.push(stem.to_string());
        }
    }
    sequences.sort();
    Ok(sequences)
}

/// Means of the segment translation and rotation errors and of the ATE.
///
/// Sequences without segments count toward the ATE mean only.
pub fn batch_averages<'a>(
    summaries: impl IntoIterator<Item = &'a SequenceSummary>,
) -> Option<BatchAverages> {
    let (mut translation, mut rotation, mut ate) = (0.0, 0.0, 0.0);
    let (mut count, mut with_segments) = (0usize, 0usize);
    for summary in summaries {
        ate += summary.ate;
        count += 1;
        if let Some(segments) = &summary.segments {
            translation += segments.translation_percent();
            rotation += segments.rotation_deg_per_100m();
            with_segments += 1;
        }
    }

    if count == 0 {
        return None;
    }
    if with_segments < count {
        log::warn!(
            "{} of {count} sequences have no segment and are left out of the segment averages",
            count - with_segments
        );
    }
    let segment_mean = |sum: f64| (with_segments > 0).then(|| sum / with_segments as f64);
    Some(BatchAverages {
        translation_percent: segment_mean(translation),
        rotation_deg_per_100m: segment_mean(rotation),
        ate: ate / count as f64,
    })
}

struct OutputDirs {
    errors: PathBuf,
    plot_error: PathBuf,
}

fn evaluate_file(
    sequence: &str,
    gt_dir: &Path,
    result_dir: &Path,
    out: &OutputDirs,
    config: &EvalConfig,
) -> Result<SequenceSummary, EvalError> {
    let file_name = format!("{sequence}.txt");
    let ground_truth = read_poses_txt(gt_dir.join(&file_name))?;
    let prediction = read_poses_txt(result_dir.join(&file_name))?;

    let evaluation = evaluate_sequence(sequence, ground_truth, prediction, config)?;

    write_sequence_errors(out.errors.join(&file_name), &evaluation.segment_errors)?;
    write_length_errors(&out.plot_error, sequence, &evaluation.by_length)?;

    Ok(evaluation.summary)
}

/// Evaluate every sequence of a result directory against the ground-truth directory.
///
/// Sequences are evaluated in parallel. A sequence that fails is logged and reported
/// in [`BatchReport::outcomes`] without affecting the others.
///
/// # Arguments
///
/// * `gt_dir` - Directory with the ground-truth `<id>.txt` files.
/// * `result_dir` - Directory with the predicted `<id>.txt` files, also receives the outputs.
/// * `config` - Evaluation parameters. `config.sequences` selects the sequences.
///
/// # Returns
///
/// The outcome of every sequence and the averages over the successful ones.
pub fn evaluate_directory(
    gt_dir: impl AsRef<Path>,
    result_dir: impl AsRef<Path>,
    config: &EvalConfig,
) -> Result<BatchReport, EvalError> {
    config.validate()?;
    let gt_dir = gt_dir.as_ref();
    let result_dir = result_dir.as_ref();

    let sequences = match &config.sequences {
        Some(sequences) => sequences.clone(),
        None => discover_sequences(result_dir)?,
    };
    log::info!(
        "evaluating {} sequences in {} ({} alignment)",
        sequences.len(),
        result_dir.display(),
        config.alignment
    );

    let out = OutputDirs {
        errors: result_dir.join(ERRORS_DIR),
        plot_error: result_dir.join(PLOT_ERROR_DIR),
    };
    std::fs::create_dir_all(&out.errors)?;
    std::fs::create_dir_all(&out.plot_error)?;

    let outcomes = sequences
        .par_iter()
        .map(|sequence| {
            let result = evaluate_file(sequence, gt_dir, result_dir, &out, config);
            if let Err(err) = &result {
                log::error!("sequence {sequence}: {err}");
            }
            SequenceOutcome {
                sequence: sequence.clone(),
                result,
            }
        })
        .collect::<Vec<_>>();

    let report = BatchReport {
        averages: None,
        outcomes,
    };
    write_summary(result_dir.join(SUMMARY_FILE), report.successes())?;

    let averages = batch_averages(report.successes().map(|(_, summary)| summary));
    Ok(BatchReport { averages, ..report })
}
