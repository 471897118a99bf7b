//! # Strategy Derivation
//!
//! Pseudocode-stage planning: maps the classified intents onto an agent
//! set, an execution mode and a budget. Derivation is a pure function of
//! intents and config, so identical intent sets always plan identically.

use crate::config::OrchestratorConfig;
use crate::models::{AgentName, ExecutionMode, ExecutionStrategy, QueryIntent};

/// Derive the execution strategy for a classified query.
///
/// Every strategy carries a strictly smaller fallback where one exists;
/// plans that are already minimal carry none.
pub fn derive_strategy(intents: &[QueryIntent], config: &OrchestratorConfig) -> ExecutionStrategy {
    let timeout_ms = config.strategy_timeout_ms;

    // Device control dominates: the user wants playback, discovery is the
    // means. Sequential so the search result can pick the target.
    if intents.contains(&QueryIntent::DeviceControl) {
        return ExecutionStrategy {
            required_agents: vec![AgentName::ContentSearcher, AgentName::DeviceController],
            mode: ExecutionMode::Sequential,
            timeout_ms,
            fallback: None,
        };
    }

    if intents.contains(&QueryIntent::Recommend) {
        // Pure or combined recommendation: searcher grounds the candidates,
        // curator personalizes, all results merge in refinement.
        return ExecutionStrategy {
            required_agents: vec![
                AgentName::ContentSearcher,
                AgentName::RecommendationBuilder,
                AgentName::MemoryCurator,
            ],
            mode: ExecutionMode::Parallel,
            timeout_ms,
            fallback: Some(Box::new(search_only(config))),
        };
    }

    if intents.contains(&QueryIntent::Browse) {
        return ExecutionStrategy {
            required_agents: vec![AgentName::RecommendationBuilder, AgentName::MemoryCurator],
            mode: ExecutionMode::Parallel,
            timeout_ms,
            fallback: Some(Box::new(search_only(config))),
        };
    }

    // Plain search: discovery first, then availability for the hits
    ExecutionStrategy {
        required_agents: vec![AgentName::ContentSearcher, AgentName::AvailabilityChecker],
        mode: ExecutionMode::Sequential,
        timeout_ms,
        fallback: Some(Box::new(search_only(config))),
    }
}

/// The minimal plan every fallback bottoms out at
fn search_only(config: &OrchestratorConfig) -> ExecutionStrategy {
    ExecutionStrategy {
        required_agents: vec![AgentName::ContentSearcher],
        mode: ExecutionMode::Sequential,
        timeout_ms: config.strategy_timeout_ms / 2,
        fallback: None,
    }
}
