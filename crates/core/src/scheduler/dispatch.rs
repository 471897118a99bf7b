//! # Agent Scheduler
//!
//! Turns an `ExecutionStrategy` into running agents. Parallel mode is true
//! fan-out/fan-in: every admitted agent is spawned before any is awaited,
//! and the strategy returns once all have settled or its timeout elapses.
//! Agents still running at the timeout are cancelled cooperatively and
//! contribute no result. Sequential mode runs one agent at a time, with a
//! completed agent's output projected into the next task through an
//! explicit, named mapping.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use crate::agents::{self, HookChain, ProgressReporter};
use crate::error::OrchestratorError;
use crate::events::{event_id, EventSink, QueryEventKind};
use crate::models::{
    AgentName, AgentResult, ExecutionContext, ExecutionMode, ExecutionStrategy, Task,
};

use super::registry::{AgentDescriptor, AgentRegistry};

/// Settled output of one strategy dispatch
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// One entry per settled agent, error variants included
    pub results: Vec<(AgentName, AgentResult)>,
    pub agent_durations_ms: HashMap<String, u64>,
    /// Agents that failed, were shed, or were cancelled at timeout
    pub failed: Vec<AgentName>,
}

impl DispatchOutcome {
    /// Count of agents that settled successfully
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|(_, r)| !r.is_error()).count()
    }
}

pub struct Scheduler {
    registry: Arc<AgentRegistry>,
    queue_depth_threshold: usize,
}

impl Scheduler {
    pub fn new(registry: Arc<AgentRegistry>, queue_depth_threshold: usize) -> Self {
        Self {
            registry,
            queue_depth_threshold,
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Run every required agent of the strategy.
    ///
    /// Resolution happens before any dispatch: a strategy naming an
    /// unregistered agent fails with `FatalConfiguration` and zero agents
    /// are started.
    pub async fn run_strategy(
        &self,
        strategy: &ExecutionStrategy,
        ctx: Arc<ExecutionContext>,
        sink: &EventSink,
    ) -> Result<DispatchOutcome, OrchestratorError> {
        if strategy.required_agents.is_empty() {
            return Err(OrchestratorError::FatalConfiguration(
                "strategy requires no agents".to_string(),
            ));
        }
        for &name in &strategy.required_agents {
            self.registry.descriptor(name)?;
        }

        match strategy.mode {
            ExecutionMode::Parallel => self.fan_out(strategy, ctx, sink).await,
            ExecutionMode::Sequential => self.chain(strategy, ctx, sink).await,
        }
    }

    /// Parallel mode: admit and spawn all agents, then await all of them
    async fn fan_out(
        &self,
        strategy: &ExecutionStrategy,
        ctx: Arc<ExecutionContext>,
        sink: &EventSink,
    ) -> Result<DispatchOutcome, OrchestratorError> {
        let deadline = Instant::now() + Duration::from_millis(strategy.timeout_ms);
        let mut outcome = DispatchOutcome::default();
        let mut join_set = JoinSet::new();
        let mut spawned: Vec<AgentName> = Vec::new();

        // SCATTER: admit everything first, spawn everything before awaiting
        for &name in &strategy.required_agents {
            let descriptor = self.registry.descriptor(name)?.clone();
            let admission = match self
                .registry
                .admit(name, descriptor.priority, self.queue_depth_threshold)
                .await
            {
                Ok(admission) => admission,
                Err(OrchestratorError::Backpressure { agent, depth }) => {
                    // The shed task fails alone; siblings proceed
                    tracing::warn!(agent = %agent, depth, "admission shed under backpressure");
                    sink.emit(QueryEventKind::AgentError {
                        agent,
                        error: format!("admission queue saturated (depth {})", depth),
                    });
                    outcome.failed.push(agent);
                    outcome.results.push((
                        agent,
                        AgentResult::Error {
                            agent,
                            kind: "backpressure".to_string(),
                            message: "admission queue saturated".to_string(),
                        },
                    ));
                    continue;
                }
                Err(other) => return Err(other),
            };

            let task = make_task(&descriptor, serde_json::json!({}));
            let sink = sink.clone();
            let ctx = Arc::clone(&ctx);
            spawned.push(name);

            join_set.spawn(async move {
                // Guard held for the whole execution, released on every exit path
                let _guard = admission.guard;
                sink.emit(QueryEventKind::AgentStart {
                    agent: name,
                    task_id: task.id.clone(),
                });
                let reporter = ProgressReporter::new(sink.clone(), name);
                let (result, duration_ms) = agents::execute(
                    admission.agent.as_ref(),
                    &HookChain::standard(),
                    task,
                    &ctx,
                    &reporter,
                )
                .await;
                (name, result, duration_ms)
            });
        }

        // GATHER: all settle, or the strategy deadline fires first
        let mut settled: Vec<AgentName> = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, join_set.join_next()).await {
                Ok(Some(Ok((name, result, duration_ms)))) => {
                    settled.push(name);
                    record(&mut outcome, sink, name, result, duration_ms);
                }
                Ok(Some(Err(join_err))) => {
                    tracing::warn!(error = %join_err, "agent task aborted or panicked");
                }
                Ok(None) => break,
                Err(_) => {
                    // Strategy timeout: cancel stragglers; their eventual
                    // late results are discarded with the aborted tasks.
                    join_set.abort_all();
                    while join_set.join_next().await.is_some() {}
                    for &name in &spawned {
                        if !settled.contains(&name) {
                            tracing::warn!(agent = %name, timeout_ms = strategy.timeout_ms, "agent cancelled at strategy timeout");
                            sink.emit(QueryEventKind::AgentError {
                                agent: name,
                                error: format!(
                                    "cancelled at strategy timeout ({}ms)",
                                    strategy.timeout_ms
                                ),
                            });
                            outcome.failed.push(name);
                        }
                    }
                    break;
                }
            }
        }

        Ok(outcome)
    }

    /// Sequential mode: strict declaration order, one at a time
    async fn chain(
        &self,
        strategy: &ExecutionStrategy,
        ctx: Arc<ExecutionContext>,
        sink: &EventSink,
    ) -> Result<DispatchOutcome, OrchestratorError> {
        let deadline = Instant::now() + Duration::from_millis(strategy.timeout_ms);
        let mut outcome = DispatchOutcome::default();
        let mut previous: Option<AgentResult> = None;

        for &name in &strategy.required_agents {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!(agent = %name, "sequential step skipped at strategy timeout");
                sink.emit(QueryEventKind::AgentError {
                    agent: name,
                    error: "skipped at strategy timeout".to_string(),
                });
                outcome.failed.push(name);
                continue;
            }

            let descriptor = self.registry.descriptor(name)?.clone();
            let admission = match self
                .registry
                .admit(name, descriptor.priority, self.queue_depth_threshold)
                .await
            {
                Ok(admission) => admission,
                Err(OrchestratorError::Backpressure { agent, depth }) => {
                    sink.emit(QueryEventKind::AgentError {
                        agent,
                        error: format!("admission queue saturated (depth {})", depth),
                    });
                    outcome.failed.push(agent);
                    outcome.results.push((
                        agent,
                        AgentResult::Error {
                            agent,
                            kind: "backpressure".to_string(),
                            message: "admission queue saturated".to_string(),
                        },
                    ));
                    continue;
                }
                Err(other) => return Err(other),
            };
            let _guard = admission.guard;

            let mut task = make_task(&descriptor, serde_json::json!({}));
            // The remaining strategy budget caps the step budget
            task.timeout_ms = task.timeout_ms.min(remaining.as_millis() as u64);
            if let Some(prev) = &previous {
                carry_forward(prev, name, &mut task.input);
            }

            sink.emit(QueryEventKind::AgentStart {
                agent: name,
                task_id: task.id.clone(),
            });
            let reporter = ProgressReporter::new(sink.clone(), name);
            let (result, duration_ms) = agents::execute(
                admission.agent.as_ref(),
                &HookChain::standard(),
                task,
                &ctx,
                &reporter,
            )
            .await;

            if !result.is_error() {
                previous = Some(result.clone());
            }
            record(&mut outcome, sink, name, result, duration_ms);
        }

        Ok(outcome)
    }
}

fn record(
    outcome: &mut DispatchOutcome,
    sink: &EventSink,
    name: AgentName,
    result: AgentResult,
    duration_ms: u64,
) {
    outcome
        .agent_durations_ms
        .insert(name.as_str().to_string(), duration_ms);
    match &result {
        AgentResult::Error { message, .. } => {
            sink.emit(QueryEventKind::AgentError {
                agent: name,
                error: message.clone(),
            });
            outcome.failed.push(name);
        }
        _ => {
            sink.emit(QueryEventKind::AgentComplete {
                agent: name,
                result: result.clone(),
                duration_ms,
            });
        }
    }
    outcome.results.push((name, result));
}

fn make_task(descriptor: &AgentDescriptor, input: serde_json::Value) -> Task {
    Task {
        id: event_id(),
        agent: descriptor.name,
        action: descriptor.default_action.to_string(),
        input,
        timeout_ms: descriptor.timeout_ms,
        priority: descriptor.priority,
    }
}

/// Explicit, named projection of a completed agent's output into the next
/// sequential task. This is the only way data moves between agents.
pub fn carry_forward(prev: &AgentResult, next: AgentName, input: &mut serde_json::Value) {
    let ids_of = |items: &[crate::models::ContentItem]| -> serde_json::Value {
        items
            .iter()
            .map(|item| serde_json::Value::String(item.id.clone()))
            .collect()
    };

    match (prev, next) {
        // Discovered identities become the availability filter
        (AgentResult::SearchResult { items, .. }, AgentName::AvailabilityChecker)
        | (AgentResult::RecommendResult { items }, AgentName::AvailabilityChecker) => {
            input["content_ids"] = ids_of(items);
        }
        // Search hits seed the recommender
        (AgentResult::SearchResult { items, .. }, AgentName::RecommendationBuilder) => {
            input["seed_ids"] = ids_of(items);
        }
        // The top hit becomes the playback target
        (AgentResult::SearchResult { items, .. }, AgentName::DeviceController)
        | (AgentResult::RecommendResult { items }, AgentName::DeviceController) => {
            if let Some(first) = items.first() {
                input["command"] = serde_json::json!({
                    "action": "play",
                    "content_id": first.id,
                });
            }
        }
        // A confirmed availability record picks the playback target
        (AgentResult::AvailabilityResult { records }, AgentName::DeviceController) => {
            if let Some(record) = records.iter().find(|r| r.available) {
                input["command"] = serde_json::json!({
                    "action": "play",
                    "content_id": record.content_id,
                });
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::test_context;
    use crate::capability::{Capability, Invoker, ScriptedClient};
    use crate::config::RetryConfig;
    use crate::error::CapabilityError;
    use serde_json::json;

    fn scheduler_with(client: ScriptedClient) -> (Scheduler, Arc<ScriptedClient>) {
        let client = Arc::new(client);
        let invoker = Arc::new(Invoker::new(client.clone(), RetryConfig::default()));
        let registry = Arc::new(AgentRegistry::bootstrap(&invoker));
        (Scheduler::new(registry, 8), client)
    }

    fn search_body(ids: &[&str]) -> serde_json::Value {
        json!({
            "results": ids
                .iter()
                .map(|id| json!({"id": id, "title": id, "relevance": 0.5}))
                .collect::<Vec<_>>(),
            "total": ids.len(),
        })
    }

    #[tokio::test]
    async fn test_parallel_fan_out_overlaps_agents() {
        let latency = Duration::from_millis(80);
        let client = ScriptedClient::new()
            .with_latency(latency)
            .respond(Capability::Search, search_body(&["tt-1"]))
            .respond(Capability::Recommend, json!({"recommendations": []}));
        let (scheduler, _) = scheduler_with(client);

        let strategy = ExecutionStrategy {
            required_agents: vec![AgentName::ContentSearcher, AgentName::RecommendationBuilder],
            mode: ExecutionMode::Parallel,
            timeout_ms: 5_000,
            fallback: None,
        };
        let ctx = Arc::new(test_context());
        let sink = EventSink::disabled("q-fanout");

        let started = Instant::now();
        let outcome = scheduler
            .run_strategy(&strategy, ctx, &sink)
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(outcome.succeeded(), 2);
        assert!(outcome.failed.is_empty());
        // Both 80ms calls overlapped; sequential would be >= 160ms
        assert!(
            elapsed < latency * 2,
            "fan-out took {:?}, agents did not overlap",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_siblings() {
        let client = ScriptedClient::new()
            .respond(Capability::Search, search_body(&["tt-1", "tt-2"]))
            .fail(
                Capability::Recommend,
                CapabilityError::Remote {
                    capability: "recommend".to_string(),
                    code: "down".to_string(),
                    message: "model offline".to_string(),
                },
            );
        let (scheduler, _) = scheduler_with(client);

        let strategy = ExecutionStrategy {
            required_agents: vec![AgentName::ContentSearcher, AgentName::RecommendationBuilder],
            mode: ExecutionMode::Parallel,
            timeout_ms: 5_000,
            fallback: None,
        };
        let outcome = scheduler
            .run_strategy(&strategy, Arc::new(test_context()), &EventSink::disabled("q"))
            .await
            .unwrap();

        assert_eq!(outcome.succeeded(), 1);
        assert_eq!(outcome.failed, vec![AgentName::RecommendationBuilder]);
    }

    #[tokio::test]
    async fn test_strategy_timeout_cancels_stragglers() {
        let client = ScriptedClient::new()
            .with_latency(Duration::from_secs(5))
            .respond(Capability::Search, search_body(&["tt-1"]));
        let (scheduler, _) = scheduler_with(client);

        let strategy = ExecutionStrategy {
            required_agents: vec![AgentName::ContentSearcher],
            mode: ExecutionMode::Parallel,
            timeout_ms: 100,
            fallback: None,
        };
        let started = Instant::now();
        let outcome = scheduler
            .run_strategy(&strategy, Arc::new(test_context()), &EventSink::disabled("q"))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.succeeded(), 0);
        assert_eq!(outcome.failed, vec![AgentName::ContentSearcher]);
    }

    #[tokio::test]
    async fn test_sequential_projects_search_ids_into_availability() {
        let client = ScriptedClient::new()
            .respond(Capability::Search, search_body(&["tt-1", "tt-2"]))
            .respond(
                Capability::CheckAvailability,
                json!({"available": true, "platforms": ["netflix"]}),
            );
        let (scheduler, client) = scheduler_with(client);

        let strategy = ExecutionStrategy {
            required_agents: vec![AgentName::ContentSearcher, AgentName::AvailabilityChecker],
            mode: ExecutionMode::Sequential,
            timeout_ms: 5_000,
            fallback: None,
        };
        let outcome = scheduler
            .run_strategy(&strategy, Arc::new(test_context()), &EventSink::disabled("q"))
            .await
            .unwrap();

        assert_eq!(outcome.succeeded(), 2);
        // 1 search + one availability call per projected id
        assert_eq!(client.call_count(), 3);
        let records = outcome
            .results
            .iter()
            .find_map(|(_, r)| match r {
                AgentResult::AvailabilityResult { records } => Some(records),
                _ => None,
            })
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_unregistered_agent_dispatches_nothing() {
        let client = Arc::new(ScriptedClient::new());
        let invoker = Arc::new(Invoker::new(client.clone(), RetryConfig::default()));
        let registry = Arc::new(AgentRegistry::with_agents(
            &invoker,
            &[AgentName::ContentSearcher],
        ));
        let scheduler = Scheduler::new(registry, 8);

        let strategy = ExecutionStrategy {
            required_agents: vec![AgentName::ContentSearcher, AgentName::DeviceController],
            mode: ExecutionMode::Parallel,
            timeout_ms: 5_000,
            fallback: None,
        };
        let err = scheduler
            .run_strategy(&strategy, Arc::new(test_context()), &EventSink::disabled("q"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "fatal_configuration");
        assert_eq!(client.call_count(), 0, "zero dispatches on config breach");
    }

    #[test]
    fn test_carry_forward_mappings_are_explicit() {
        let search = AgentResult::SearchResult {
            items: vec![crate::models::ContentItem {
                id: "tt-9".to_string(),
                title: "Nine".to_string(),
                media_type: None,
                genres: vec![],
                platform: None,
                year: None,
                relevance: 0.5,
                metadata: serde_json::Value::Null,
            }],
            total: 1,
        };

        let mut input = json!({});
        carry_forward(&search, AgentName::AvailabilityChecker, &mut input);
        assert_eq!(input["content_ids"], json!(["tt-9"]));

        let mut input = json!({});
        carry_forward(&search, AgentName::DeviceController, &mut input);
        assert_eq!(input["command"]["content_id"], "tt-9");

        // No mapping defined: input untouched
        let mut input = json!({});
        carry_forward(&search, AgentName::MemoryCurator, &mut input);
        assert_eq!(input, json!({}));
    }
}
