//! # Pipeline Stages
//!
//! Defines the stages a query passes through on its way to ranked results.

use serde::{Deserialize, Serialize};

/// Stage of the query pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    /// Classifying intent and extracting entities
    Specification,
    /// Deriving the execution strategy (or reusing a cached one)
    Pseudocode,
    /// Running the strategy's agents
    Architecture,
    /// Aggregating, deduplicating and trust-scoring results
    Refinement,
    /// Persisting pattern and outcome, emitting final results
    Completion,
    /// Terminal success
    Complete,
    /// Terminal failure
    Failed,
}

/// The query state machine. Stages advance strictly forward; the only
/// backward edge is a strategy fallback, which returns to `Architecture`
/// exactly once and marks the run degraded.
#[derive(Debug, Clone)]
pub struct QueryPipeline {
    pub stage: QueryStage,
    /// Set when the fallback strategy had to run
    pub degraded: bool,
    fallback_taken: bool,
}

impl Default for QueryPipeline {
    fn default() -> Self {
        Self {
            stage: QueryStage::Specification,
            degraded: false,
            fallback_taken: false,
        }
    }
}

impl QueryPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to the next stage
    pub fn advance(&mut self) {
        self.stage = match self.stage {
            QueryStage::Specification => QueryStage::Pseudocode,
            QueryStage::Pseudocode => QueryStage::Architecture,
            QueryStage::Architecture => QueryStage::Refinement,
            QueryStage::Refinement => QueryStage::Completion,
            QueryStage::Completion => QueryStage::Complete,
            QueryStage::Complete => QueryStage::Complete,
            QueryStage::Failed => QueryStage::Failed,
        };
    }

    /// Strategy produced nothing usable: loop back to Architecture for the
    /// fallback. Returns false once the fallback has already been spent.
    pub fn degrade(&mut self) -> bool {
        if self.fallback_taken {
            self.stage = QueryStage::Failed;
            false
        } else {
            self.fallback_taken = true;
            self.degraded = true;
            self.stage = QueryStage::Architecture;
            true
        }
    }

    pub fn fail(&mut self) {
        self.stage = QueryStage::Failed;
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.stage, QueryStage::Complete | QueryStage::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_walks_every_stage() {
        let mut pipeline = QueryPipeline::new();
        let expected = [
            QueryStage::Pseudocode,
            QueryStage::Architecture,
            QueryStage::Refinement,
            QueryStage::Completion,
            QueryStage::Complete,
        ];
        for stage in expected {
            pipeline.advance();
            assert_eq!(pipeline.stage, stage);
        }
        assert!(pipeline.is_terminal());
        assert!(!pipeline.degraded);
        // Terminal is absorbing
        pipeline.advance();
        assert_eq!(pipeline.stage, QueryStage::Complete);
    }

    #[test]
    fn test_degrade_loops_back_exactly_once() {
        let mut pipeline = QueryPipeline::new();
        pipeline.advance();
        pipeline.advance();
        assert_eq!(pipeline.stage, QueryStage::Architecture);

        assert!(pipeline.degrade());
        assert_eq!(pipeline.stage, QueryStage::Architecture);
        assert!(pipeline.degraded);

        // Second fallback attempt is terminal
        assert!(!pipeline.degrade());
        assert_eq!(pipeline.stage, QueryStage::Failed);
    }
}
