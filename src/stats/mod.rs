//! Statistics for the video path

pub mod metrics;

pub use metrics::{DistributionStats, ReceiverStats};
