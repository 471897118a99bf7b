//! # Error Taxonomy
//!
//! Typed errors for the orchestration core. Transient capability errors are
//! retried inside the invoker and never bubble past it unless retries
//! exhaust; schema violations and fatal configuration errors are never
//! retried and always surface as an explicit error event.

use thiserror::Error;

use crate::models::AgentName;

/// Failure modes of a single capability invocation
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    /// Capability did not respond within its declared budget (retried)
    #[error("capability '{capability}' timed out after {budget_ms}ms")]
    Timeout { capability: String, budget_ms: u64 },

    /// Transport or connection failure (retried)
    #[error("capability '{capability}' unavailable: {reason}")]
    Unavailable { capability: String, reason: String },

    /// Payload does not match the declared schema (fatal, never retried)
    #[error("capability '{capability}' schema violation: {detail}")]
    SchemaViolation { capability: String, detail: String },

    /// Capability returned a domain error (never retried)
    #[error("capability '{capability}' remote error {code}: {message}")]
    Remote {
        capability: String,
        code: String,
        message: String,
    },
}

impl CapabilityError {
    /// Whether the retry helper may re-invoke after this failure
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CapabilityError::Timeout { .. } | CapabilityError::Unavailable { .. }
        )
    }

    /// Stable kind string used in error events and result variants
    pub fn kind(&self) -> &'static str {
        match self {
            CapabilityError::Timeout { .. } => "capability_timeout",
            CapabilityError::Unavailable { .. } => "capability_unavailable",
            CapabilityError::SchemaViolation { .. } => "schema_violation",
            CapabilityError::Remote { .. } => "remote_domain_error",
        }
    }
}

/// Errors raised inside one agent's boundary. The hook chain converts these
/// into a typed `AgentResult::Error`; they never abort sibling agents.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("agent '{agent}' logic error: {reason}")]
    Logic { agent: AgentName, reason: String },

    #[error("agent '{agent}' exceeded its {timeout_ms}ms task budget")]
    TaskTimeout { agent: AgentName, timeout_ms: u64 },
}

impl AgentError {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Capability(e) => e.kind(),
            AgentError::Logic { .. } => "agent_logic_error",
            AgentError::TaskTimeout { .. } => "agent_task_timeout",
        }
    }
}

/// Errors that terminate or degrade a pipeline run
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Unknown agent in a strategy, or similar contract breach at startup.
    /// Never retried; surfaces immediately with zero dispatches.
    #[error("fatal configuration error: {0}")]
    FatalConfiguration(String),

    /// Admission queue for an agent type saturated and the task was sheddable
    #[error("backpressure: admission queue for '{agent}' is saturated (depth {depth})")]
    Backpressure { agent: AgentName, depth: usize },

    /// A pipeline stage exceeded its stage-local budget
    #[error("pipeline stage '{stage}' timed out after {budget_ms}ms")]
    StageTimeout { stage: String, budget_ms: u64 },

    /// Primary strategy and its fallback both produced nothing usable
    #[error("strategy exhausted: {reason}")]
    StrategyExhausted { reason: String },

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// Stable kind string for the terminal `error` event
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::FatalConfiguration(_) => "fatal_configuration",
            OrchestratorError::Backpressure { .. } => "backpressure",
            OrchestratorError::StageTimeout { .. } => "pipeline_stage_timeout",
            OrchestratorError::StrategyExhausted { .. } => "strategy_exhausted",
            OrchestratorError::Capability(e) => e.kind(),
            OrchestratorError::Storage(_) => "storage",
        }
    }
}
