//! # Query Pipeline
//!
//! Intent classification, strategy derivation, the stage machine, and the
//! coordinator that drives a query through all of them.

pub mod coordinator;
pub mod intent;
pub mod stage;
pub mod strategy;

pub use coordinator::{QueryCoordinator, QueryOutcome};
pub use stage::{QueryPipeline, QueryStage};
pub use strategy::derive_strategy;
