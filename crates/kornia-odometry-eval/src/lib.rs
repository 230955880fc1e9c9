#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Kornia Odometry Evaluation
//!
//! Scores an estimated trajectory against its ground truth. Both trajectories are
//! sequences of 4x4 homogeneous poses indexed by frame id ([`pose::PoseSet`]).
//!
//! ## Metrics
//!
//! - **Segment errors**: KITTI-style rotation/translation drift over sub-trajectories
//!   of fixed path length (100 m .. 800 m by default), normalized per meter.
//! - **ATE**: RMSE of the position difference after normalization to the first frame.
//! - **RPE**: mean frame-to-frame relative pose error.
//!
//! ## Example
//!
//! ```rust
//! use glam::{DMat4, DVec3};
//! use kornia_odometry_eval::{eval::{evaluate_sequence, EvalConfig}, pose::PoseSet};
//!
//! let gt = (0..200)
//!     .map(|i| (i, DMat4::from_translation(DVec3::new(i as f64, 0.0, 0.0))))
//!     .collect::<PoseSet>();
//! let pred = gt.clone();
//!
//! let evaluation = evaluate_sequence("00", gt, pred, &EvalConfig::default()).unwrap();
//! assert!(evaluation.summary.ate < 1e-9);
//! ```

/// Trajectory alignment (scale-only and Umeyama).
pub mod align;

/// Batch evaluation of result directories.
pub mod batch;

/// Per-trajectory evaluation pipeline.
pub mod eval;

/// Reading and writing KITTI odometry text files.
pub mod io;

/// Absolute and relative pose errors.
pub mod metrics;

/// Frame-indexed pose containers.
pub mod pose;

/// KITTI-style segment errors.
pub mod segment;

/// Rotation matrix utilities.
pub mod so3;
