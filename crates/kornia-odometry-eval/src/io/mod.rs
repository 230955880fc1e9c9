/// KITTI odometry pose, error and summary text files.
pub mod kitti;
