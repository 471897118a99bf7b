//! # Prism Agents
//!
//! Typed units of pipeline work, one file per agent. Each agent maps one
//! task to one or more capability invocations through the shared invoker.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler
//!   └── execute()  - hook chain composed around the core run
//!         ├── before hooks (pure task transforms)
//!         ├── Agent::run  (capability invocations)
//!         └── after hooks (pure result transforms)
//! ```
//!
//! An agent never raises beyond its own boundary: `execute` converts every
//! hook or run error into a typed `AgentResult::Error`, logged with timing
//! and the failing task id. Hook ordering is a static property of the chain,
//! not a runtime registration order.

pub mod availability_checker;
pub mod content_searcher;
pub mod device_controller;
pub mod memory_curator;
pub mod recommendation_builder;

pub use availability_checker::AvailabilityChecker;
pub use content_searcher::ContentSearcher;
pub use device_controller::DeviceController;
pub use memory_curator::MemoryCurator;
pub use recommendation_builder::RecommendationBuilder;

use async_trait::async_trait;
use std::time::Instant;

use crate::error::AgentError;
use crate::events::{EventSink, QueryEventKind};
use crate::models::{AgentName, AgentResult, AgentRole, ExecutionContext, Task};

/// Contract shared by all three agent roles
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> AgentName;
    fn role(&self) -> AgentRole;

    /// Core execution: map the task to capability invocations.
    /// Suspension happens only at invocation boundaries.
    async fn run(
        &self,
        task: &Task,
        ctx: &ExecutionContext,
        progress: &ProgressReporter,
    ) -> Result<AgentResult, AgentError>;
}

/// Handle an agent uses to stream partial output while running
pub struct ProgressReporter {
    sink: EventSink,
    agent: AgentName,
}

impl ProgressReporter {
    pub fn new(sink: EventSink, agent: AgentName) -> Self {
        Self { sink, agent }
    }

    /// A reporter with no subscriber (unit tests, warm-up calls)
    pub fn silent(agent: AgentName) -> Self {
        Self {
            sink: EventSink::disabled("silent"),
            agent,
        }
    }

    pub fn send(&self, partial: serde_json::Value) {
        self.sink.emit(QueryEventKind::AgentProgress {
            agent: self.agent,
            partial,
        });
    }
}

/// Pure task transform applied before execution
pub type BeforeHook = fn(Task, &ExecutionContext) -> Result<Task, AgentError>;
/// Pure result transform applied after execution
pub type AfterHook = fn(AgentResult, &ExecutionContext) -> Result<AgentResult, AgentError>;

/// Ordered composition of transforms around the core execution call
pub struct HookChain {
    pub before: Vec<BeforeHook>,
    pub after: Vec<AfterHook>,
}

impl Default for HookChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl HookChain {
    /// The chain every scheduled agent runs under
    pub fn standard() -> Self {
        Self {
            before: vec![ensure_input_object],
            after: vec![normalize_items],
        }
    }

    pub fn empty() -> Self {
        Self {
            before: Vec::new(),
            after: Vec::new(),
        }
    }
}

/// Task inputs must be JSON objects so downstream projections can extend them
fn ensure_input_object(mut task: Task, _ctx: &ExecutionContext) -> Result<Task, AgentError> {
    if task.input.is_null() {
        task.input = serde_json::json!({});
    }
    if !task.input.is_object() {
        return Err(AgentError::Logic {
            agent: task.agent,
            reason: "task input must be a JSON object".to_string(),
        });
    }
    Ok(task)
}

/// Trim titles and clamp relevance on every produced item
fn normalize_items(result: AgentResult, _ctx: &ExecutionContext) -> Result<AgentResult, AgentError> {
    let normalize = |items: &mut Vec<crate::models::ContentItem>| {
        for item in items.iter_mut() {
            item.title = item.title.trim().to_string();
            item.relevance = item.relevance.clamp(0.0, 1.0);
        }
    };
    Ok(match result {
        AgentResult::SearchResult { mut items, total } => {
            normalize(&mut items);
            AgentResult::SearchResult { items, total }
        }
        AgentResult::RecommendResult { mut items } => {
            normalize(&mut items);
            AgentResult::RecommendResult { items }
        }
        other => other,
    })
}

/// Run one agent under the hook chain, contained and timed.
///
/// Returns the result (error variant included) and the wall-time in ms.
/// Never panics or propagates: the conversion of every failure into a typed
/// error result is the `onError` step of the lifecycle.
pub async fn execute(
    agent: &dyn Agent,
    hooks: &HookChain,
    task: Task,
    ctx: &ExecutionContext,
    progress: &ProgressReporter,
) -> (AgentResult, u64) {
    let started = Instant::now();
    let name = agent.name();
    let task_id = task.id.clone();
    let timeout_ms = task.timeout_ms;

    let outcome = execute_inner(agent, hooks, task, ctx, progress).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(result) => {
            tracing::debug!(agent = %name, task_id = %task_id, duration_ms, "agent completed");
            (result, duration_ms)
        }
        Err(err) => {
            tracing::warn!(
                agent = %name,
                task_id = %task_id,
                duration_ms,
                timeout_ms,
                error = %err,
                "agent failed, converting to error result"
            );
            (
                AgentResult::Error {
                    agent: name,
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                },
                duration_ms,
            )
        }
    }
}

async fn execute_inner(
    agent: &dyn Agent,
    hooks: &HookChain,
    mut task: Task,
    ctx: &ExecutionContext,
    progress: &ProgressReporter,
) -> Result<AgentResult, AgentError> {
    for hook in &hooks.before {
        task = hook(task, ctx)?;
    }

    let budget = std::time::Duration::from_millis(task.timeout_ms);
    let mut result = match tokio::time::timeout(budget, agent.run(&task, ctx, progress)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(AgentError::TaskTimeout {
                agent: agent.name(),
                timeout_ms: task.timeout_ms,
            })
        }
    };

    for hook in &hooks.after {
        result = hook(result, ctx)?;
    }
    Ok(result)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::Utc;

    pub fn test_context() -> ExecutionContext {
        ExecutionContext {
            query_id: "q-test".to_string(),
            user_id: "u-test".to_string(),
            query: "find sci-fi shows like Stranger Things".to_string(),
            region: "US".to_string(),
            devices: Vec::new(),
            intents: vec![crate::models::QueryIntent::Search],
            entities: crate::models::ExtractedEntities {
                titles: vec!["Stranger Things".to_string()],
                genres: vec!["sci-fi".to_string()],
                media_type: Some("series".to_string()),
                platforms: Vec::new(),
                region: Some("US".to_string()),
            },
            user_context: None,
            pattern_fingerprint: None,
            timestamp: Utc::now(),
            metadata: Default::default(),
        }
    }

    pub fn test_task(agent: AgentName, input: serde_json::Value) -> Task {
        Task {
            id: "t-test".to_string(),
            agent,
            action: "test".to_string(),
            input,
            timeout_ms: 1_000,
            priority: crate::models::TaskPriority::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::models::TaskPriority;

    struct FailingAgent;

    #[async_trait]
    impl Agent for FailingAgent {
        fn name(&self) -> AgentName {
            AgentName::ContentSearcher
        }
        fn role(&self) -> AgentRole {
            AgentRole::Specialist
        }
        async fn run(
            &self,
            task: &Task,
            _ctx: &ExecutionContext,
            _progress: &ProgressReporter,
        ) -> Result<AgentResult, AgentError> {
            Err(AgentError::Logic {
                agent: task.agent,
                reason: "deliberate".to_string(),
            })
        }
    }

    struct SlowAgent;

    #[async_trait]
    impl Agent for SlowAgent {
        fn name(&self) -> AgentName {
            AgentName::RecommendationBuilder
        }
        fn role(&self) -> AgentRole {
            AgentRole::Specialist
        }
        async fn run(
            &self,
            _task: &Task,
            _ctx: &ExecutionContext,
            _progress: &ProgressReporter,
        ) -> Result<AgentResult, AgentError> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(AgentResult::RecommendResult { items: vec![] })
        }
    }

    #[tokio::test]
    async fn test_errors_become_typed_results() {
        let agent = FailingAgent;
        let ctx = test_context();
        let task = test_task(AgentName::ContentSearcher, serde_json::json!({}));
        let progress = ProgressReporter::silent(AgentName::ContentSearcher);

        let (result, _) = execute(&agent, &HookChain::standard(), task, &ctx, &progress).await;
        match result {
            AgentResult::Error { agent, kind, .. } => {
                assert_eq!(agent, AgentName::ContentSearcher);
                assert_eq!(kind, "agent_logic_error");
            }
            other => panic!("expected error result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_task_budget_enforced() {
        let agent = SlowAgent;
        let ctx = test_context();
        let task = Task {
            id: "t-slow".to_string(),
            agent: AgentName::RecommendationBuilder,
            action: "recommend".to_string(),
            input: serde_json::json!({}),
            timeout_ms: 50,
            priority: TaskPriority::Normal,
        };
        let progress = ProgressReporter::silent(AgentName::RecommendationBuilder);

        let (result, _) = execute(&agent, &HookChain::standard(), task, &ctx, &progress).await;
        match result {
            AgentResult::Error { kind, .. } => assert_eq!(kind, "agent_task_timeout"),
            other => panic!("expected timeout error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_before_hook_rejects_non_object_input() {
        let agent = FailingAgent;
        let ctx = test_context();
        let task = test_task(AgentName::ContentSearcher, serde_json::json!([1, 2]));
        let progress = ProgressReporter::silent(AgentName::ContentSearcher);

        let (result, _) = execute(&agent, &HookChain::standard(), task, &ctx, &progress).await;
        match result {
            AgentResult::Error { message, .. } => {
                assert!(message.contains("JSON object"));
            }
            other => panic!("expected hook rejection, got {:?}", other),
        }
    }
}
