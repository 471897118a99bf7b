//! # Memory Curator
//!
//! Memory-role agent wrapping the `memory_retrieve` and `memory_store`
//! capabilities. In a strategy it surfaces previously-liked content as
//! recommendation seeds; the pipeline also calls it directly to load user
//! context in Specification and to record the outcome in Completion.

use async_trait::async_trait;
use std::sync::Arc;

use crate::capability::{
    Capability, Invoker, MemoryRetrieveInput, MemoryRetrieveOutput, MemoryStoreInput,
    MemoryStoreOutput,
};
use crate::error::AgentError;
use crate::models::{AgentName, AgentResult, AgentRole, ContentItem, ExecutionContext, Task};

use super::{Agent, ProgressReporter};

const DATABASE: &str = "prism";
const PREFERENCES: &str = "preferences";
const OUTCOMES: &str = "outcomes";

/// Seven days, matching the pattern bank TTL
const OUTCOME_TTL_SECS: u64 = 7 * 24 * 3_600;

pub struct MemoryCurator {
    invoker: Arc<Invoker>,
}

impl MemoryCurator {
    pub fn new(invoker: Arc<Invoker>) -> Self {
        Self { invoker }
    }

    /// Load the user's stored preferences/history, if any.
    /// Failures are reported as `None`; missing memory never blocks a query.
    pub async fn load_user_context(&self, user_id: &str) -> Option<serde_json::Value> {
        let input = MemoryRetrieveInput {
            database: DATABASE.to_string(),
            collection: PREFERENCES.to_string(),
            key: user_id.to_string(),
        };
        match self
            .invoker
            .invoke_typed::<_, MemoryRetrieveOutput>(Capability::MemoryRetrieve, &input)
            .await
        {
            Ok(output) if output.found => output.value,
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(user_id, error = %e, "user context unavailable");
                None
            }
        }
    }

    /// Persist how a query turned out, for future preference signals
    pub async fn record_outcome(
        &self,
        ctx: &ExecutionContext,
        quality: f64,
        result_count: usize,
    ) -> Result<(), AgentError> {
        let input = MemoryStoreInput {
            database: DATABASE.to_string(),
            collection: OUTCOMES.to_string(),
            key: ctx.query_id.clone(),
            value: serde_json::json!({
                "user_id": ctx.user_id,
                "intents": ctx.intents,
                "quality": quality,
                "result_count": result_count,
                "timestamp": ctx.timestamp,
            }),
            ttl_secs: Some(OUTCOME_TTL_SECS),
            merge: false,
        };
        let output: MemoryStoreOutput = self
            .invoker
            .invoke_typed(Capability::MemoryStore, &input)
            .await?;
        if !output.success {
            tracing::warn!(query_id = %ctx.query_id, "memory store reported failure");
        }
        Ok(())
    }
}

#[async_trait]
impl Agent for MemoryCurator {
    fn name(&self) -> AgentName {
        AgentName::MemoryCurator
    }

    fn role(&self) -> AgentRole {
        AgentRole::Memory
    }

    /// When dispatched in a strategy, the curator contributes the user's
    /// previously-liked items as high-preference recommendation candidates.
    async fn run(
        &self,
        task: &Task,
        ctx: &ExecutionContext,
        progress: &ProgressReporter,
    ) -> Result<AgentResult, AgentError> {
        match task.action.as_str() {
            "load_preferences" => {
                // Unlike the Specification-stage helper, a dispatched run
                // surfaces capability failures instead of mapping them to
                // an empty memory.
                let input = MemoryRetrieveInput {
                    database: DATABASE.to_string(),
                    collection: PREFERENCES.to_string(),
                    key: ctx.user_id.clone(),
                };
                let output: MemoryRetrieveOutput = self
                    .invoker
                    .invoke_typed(Capability::MemoryRetrieve, &input)
                    .await?;
                let items: Vec<ContentItem> = output
                    .value
                    .as_ref()
                    .and_then(|v| v.get("liked"))
                    .and_then(|liked| serde_json::from_value(liked.clone()).ok())
                    .unwrap_or_default();

                progress.send(serde_json::json!({"remembered": items.len()}));
                Ok(AgentResult::RecommendResult { items })
            }
            other => Err(AgentError::Logic {
                agent: AgentName::MemoryCurator,
                reason: format!("unknown action '{}'", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::{test_context, test_task};
    use crate::capability::ScriptedClient;
    use crate::config::RetryConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_liked_items_surface_as_recommendations() {
        let client = ScriptedClient::new().respond(
            Capability::MemoryRetrieve,
            json!({
                "found": true,
                "value": {
                    "liked": [{"id": "tt-dark", "title": "Dark", "relevance": 0.7}]
                }
            }),
        );
        let invoker = Arc::new(Invoker::new(Arc::new(client), RetryConfig::default()));
        let agent = MemoryCurator::new(invoker);

        let ctx = test_context();
        let mut task = test_task(AgentName::MemoryCurator, json!({}));
        task.action = "load_preferences".to_string();
        let progress = ProgressReporter::silent(AgentName::MemoryCurator);

        let result = agent.run(&task, &ctx, &progress).await.unwrap();
        match result {
            AgentResult::RecommendResult { items } => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].id, "tt-dark");
            }
            other => panic!("expected recommend result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_memory_is_empty_not_error() {
        let client = ScriptedClient::new()
            .respond(Capability::MemoryRetrieve, json!({"found": false}));
        let invoker = Arc::new(Invoker::new(Arc::new(client), RetryConfig::default()));
        let agent = MemoryCurator::new(invoker);

        let ctx = test_context();
        let mut task = test_task(AgentName::MemoryCurator, json!({}));
        task.action = "load_preferences".to_string();
        let progress = ProgressReporter::silent(AgentName::MemoryCurator);

        let result = agent.run(&task, &ctx, &progress).await.unwrap();
        match result {
            AgentResult::RecommendResult { items } => assert!(items.is_empty()),
            other => panic!("expected empty recommend result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_record_outcome_stores_with_ttl() {
        let client = ScriptedClient::new()
            .respond(Capability::MemoryStore, json!({"success": true, "key": "q-test"}));
        let client = Arc::new(client);
        let invoker = Arc::new(Invoker::new(client.clone(), RetryConfig::default()));
        let agent = MemoryCurator::new(invoker);

        let ctx = test_context();
        agent.record_outcome(&ctx, 0.8, 5).await.unwrap();
        assert_eq!(client.call_count(), 1);
    }
}
