use std::{fs::File, io::BufReader, path::PathBuf};

use argh::FromArgs;
use kornia_odometry_eval::{align::AlignmentMode, batch::evaluate_directory, eval::EvalConfig};

/// Evaluates KITTI-format odometry results against the ground truth
#[derive(Debug, FromArgs)]
struct Args {
    /// directory with the ground-truth <sequence>.txt pose files
    #[argh(option, short = 'g')]
    gt_dir: PathBuf,

    /// directory with the estimated <sequence>.txt pose files
    #[argh(option, short = 'r')]
    result_dir: PathBuf,

    /// alignment: none, scale, scale_7dof, 7dof or 6dof
    #[argh(option, short = 'a', from_str_fn(parse_alignment))]
    align: Option<AlignmentMode>,

    /// sequence to evaluate, repeatable (default: every sequence in the result directory)
    #[argh(option, short = 's')]
    seqs: Vec<u32>,

    /// segment length in meters, repeatable
    #[argh(option, short = 'l')]
    lengths: Vec<u32>,

    /// stride between segment start frames
    #[argh(option)]
    step_size: Option<usize>,

    /// json file with the evaluation configuration
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

fn parse_alignment(value: &str) -> Result<AlignmentMode, String> {
    value.parse().map_err(|e| format!("{e}"))
}

fn load_config(args: &Args) -> Result<EvalConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
        None => EvalConfig::default(),
    };

    if let Some(align) = args.align {
        config.alignment = align;
    }
    if !args.seqs.is_empty() {
        config.sequences = Some(args.seqs.iter().map(|s| format!("{s:02}")).collect());
    }
    if !args.lengths.is_empty() {
        config.lengths = args.lengths.clone();
    }
    if let Some(step_size) = args.step_size {
        config.step_size = step_size;
    }
    Ok(config)
}

fn or_dash(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.5}"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Args = argh::from_env();
    let config = load_config(&args)?;
    log::debug!("{config:?}");

    let report = evaluate_directory(&args.gt_dir, &args.result_dir, &config)?;

    println!("\nSeq\tTranslation(%)\tRot(deg/100m)\tATE(RMSE m)");
    for (sequence, summary) in report.successes() {
        println!(
            "{}\t{}\t\t{}\t\t{:.5}",
            sequence,
            or_dash(summary.translation_percent()),
            or_dash(summary.rotation_deg_per_100m()),
            summary.ate
        );
    }

    if let Some(avg) = report.averages {
        println!(
            "AVG\t{}\t\t{}\t\t{:.5}",
            or_dash(avg.translation_percent),
            or_dash(avg.rotation_deg_per_100m),
            avg.ate
        );
    }

    let num_failed = report.failures().count();
    if num_failed > 0 {
        println!("\n{num_failed} sequence(s) failed:");
        for (sequence, err) in report.failures() {
            println!("{sequence}\t{err}");
        }
    }

    Ok(())
}
