//! Rating arithmetic and catalog browsing.

pub mod aggregator;
pub mod browse;

pub use aggregator::MetricInputs;
pub use browse::*;
