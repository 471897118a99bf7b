//! # Ranking
//!
//! Trust scoring and the result aggregator that turns settled agent
//! output into the final ranked list.

pub mod aggregator;
pub mod trust;

pub use aggregator::aggregate;
pub use trust::{score, TrustSignals};
