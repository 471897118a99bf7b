//! # Prism Models
//!
//! Centralized data model for the orchestration core.
//! These types were extracted into one module so that agents, the scheduler,
//! and the pipeline share a clean dependency instead of importing each other.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The closed set of agents the orchestrator can dispatch.
///
/// A strategy can only name one of these variants, so a typo'd agent name is
/// unrepresentable; "unregistered" can still happen when the registry was
/// bootstrapped without a given agent (e.g. device control disabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    ContentSearcher,
    RecommendationBuilder,
    AvailabilityChecker,
    DeviceController,
    MemoryCurator,
}

impl AgentName {
    /// Stable string id used in events, logs, and metric keys
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::ContentSearcher => "content_searcher",
            AgentName::RecommendationBuilder => "recommendation_builder",
            AgentName::AvailabilityChecker => "availability_checker",
            AgentName::DeviceController => "device_controller",
            AgentName::MemoryCurator => "memory_curator",
        }
    }

    /// All agents, in registry bootstrap order
    pub fn all() -> Vec<AgentName> {
        vec![
            AgentName::ContentSearcher,
            AgentName::RecommendationBuilder,
            AgentName::AvailabilityChecker,
            AgentName::DeviceController,
            AgentName::MemoryCurator,
        ]
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role an agent plays in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Drives sub-orchestration (the pipeline itself acts as coordinator)
    Coordinator,
    /// Wraps a domain capability (search, recommend, availability, device)
    Specialist,
    /// Wraps the memory capabilities (preferences, outcome history)
    Memory,
}

/// Priority attached to a task when it competes for an admission slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    /// Reserved for coordinator control tasks; never shed under backpressure
    Critical,
}

/// One unit of dispatched work. Immutable once handed to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub agent: AgentName,
    /// Named action the agent should perform (e.g. "search", "load_preferences")
    pub action: String,
    pub input: serde_json::Value,
    pub timeout_ms: u64,
    pub priority: TaskPriority,
}

/// A device the caller may target with a playback command
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeviceRef {
    pub device_id: String,
    pub device_type: String,
}

/// Query submission consumed by the orchestration core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub user_id: String,
    pub text: String,
    pub region: String,
    #[serde(default)]
    pub devices: Vec<DeviceRef>,
}

/// Intent classes the Specification stage can assign to a query.
/// A query may carry more than one (e.g. "find sci-fi shows like X" is
/// both a search and a recommendation request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Search,
    Recommend,
    Browse,
    DeviceControl,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Search => "search",
            QueryIntent::Recommend => "recommend",
            QueryIntent::Browse => "browse",
            QueryIntent::DeviceControl => "device_control",
        }
    }
}

/// Structured entities extracted from the raw query text
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedEntities {
    /// Reference titles ("shows like <title>"). Instance-specific: excluded
    /// from the pattern fingerprint so similar queries share a bucket.
    pub titles: Vec<String>,
    pub genres: Vec<String>,
    /// "movie" | "series" when the query names one
    pub media_type: Option<String>,
    pub platforms: Vec<String>,
    pub region: Option<String>,
}

/// Read-only view of a pipeline run shared with every agent it dispatches.
/// Mutated only by pipeline stages; agents receive it behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub query_id: String,
    pub user_id: String,
    /// Raw query text as submitted
    pub query: String,
    pub region: String,
    pub devices: Vec<DeviceRef>,
    pub intents: Vec<QueryIntent>,
    pub entities: ExtractedEntities,
    /// Preferences and history loaded by the memory curator, if any
    pub user_context: Option<serde_json::Value>,
    /// Fingerprint of the matched pattern when planning was cache-assisted
    pub pattern_fingerprint: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// How the required agents of a strategy are driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// True fan-out: all agents started before any is awaited
    Parallel,
    /// Strict declaration order; completed output may project into the next task
    Sequential,
}

/// The plan chosen (or retrieved from the pattern bank) for one query.
/// Immutable for the life of the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStrategy {
    pub required_agents: Vec<AgentName>,
    pub mode: ExecutionMode,
    pub timeout_ms: u64,
    /// Strictly smaller, cheaper agent set used when the primary plan fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Box<ExecutionStrategy>>,
}

/// One catalog item returned by a specialist agent.
/// `id` is the stable content identity the aggregator deduplicates on.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    /// Raw upstream relevance in [0,1]; tie-breaker after trust
    #[serde(default)]
    pub relevance: f64,
    /// Opaque source metadata consumed by the trust scorer
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Availability of one content id in one region
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AvailabilityRecord {
    pub content_id: String,
    pub available: bool,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub restrictions: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Output of exactly one agent execution, consumed by the aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentResult {
    SearchResult {
        items: Vec<ContentItem>,
        total: u64,
    },
    RecommendResult {
        items: Vec<ContentItem>,
    },
    AvailabilityResult {
        records: Vec<AvailabilityRecord>,
    },
    DeviceAck {
        device_id: String,
        success: bool,
        #[serde(default)]
        state: Option<serde_json::Value>,
    },
    Error {
        agent: AgentName,
        kind: String,
        message: String,
    },
}

impl AgentResult {
    /// Whether this result represents a contained failure
    pub fn is_error(&self) -> bool {
        matches!(self, AgentResult::Error { .. })
    }
}

/// Five named trust components in [0,1] plus the weighted composite.
/// Recomputed on every query, never persisted as ground truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustBreakdown {
    pub source_reliability: f64,
    pub metadata_accuracy: f64,
    pub availability_confidence: f64,
    pub recommendation_quality: f64,
    pub preference_confidence: f64,
    pub composite: f64,
}

/// A surviving result item after Refinement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: ContentItem,
    pub trust: TrustBreakdown,
    /// Agents that produced this item (both, for cross-source duplicates)
    pub sources: Vec<AgentName>,
    #[serde(default)]
    pub availability: Option<AvailabilityRecord>,
    /// Short natural-language explanation, filled for the top items
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Verbosity of the final payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// Ids, titles, and composite trust only
    Compact,
    #[default]
    Standard,
    /// Full trust breakdown and availability detail
    Detailed,
}

/// Per-capability call statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityStat {
    pub capability: String,
    pub calls: u64,
    pub failures: u64,
    pub avg_latency_ms: u64,
}

/// Metrics attached to the terminal `final_results` event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMetrics {
    pub duration_ms: u64,
    /// Wall time of each agent execution, keyed by agent id
    pub agent_durations_ms: HashMap<String, u64>,
    /// Required agents that failed or were cancelled; partial results still ship
    pub failed_agents: Vec<AgentName>,
    /// Whether planning was served from the pattern bank
    pub pattern_hit: bool,
    pub capabilities: Vec<CapabilityStat>,
}
