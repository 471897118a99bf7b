//! # Content Searcher
//!
//! Specialist agent wrapping the `search` capability. Builds a filtered
//! search from the extracted entities and returns the raw catalog hits.

use async_trait::async_trait;
use std::sync::Arc;

use crate::capability::{Capability, Invoker, SearchFilters, SearchInput, SearchOutput};
use crate::error::AgentError;
use crate::models::{AgentName, AgentResult, AgentRole, ExecutionContext, Task};

use super::{Agent, ProgressReporter};

const DEFAULT_LIMIT: u32 = 20;

pub struct ContentSearcher {
    invoker: Arc<Invoker>,
}

impl ContentSearcher {
    pub fn new(invoker: Arc<Invoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl Agent for ContentSearcher {
    fn name(&self) -> AgentName {
        AgentName::ContentSearcher
    }

    fn role(&self) -> AgentRole {
        AgentRole::Specialist
    }

    async fn run(
        &self,
        task: &Task,
        ctx: &ExecutionContext,
        progress: &ProgressReporter,
    ) -> Result<AgentResult, AgentError> {
        let limit = task
            .input
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(DEFAULT_LIMIT);
        let offset = task
            .input
            .get("offset")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;

        let input = SearchInput {
            query: ctx.query.clone(),
            filters: SearchFilters {
                genres: ctx.entities.genres.clone(),
                media_type: ctx.entities.media_type.clone(),
                region: Some(ctx.region.clone()),
            },
            limit,
            offset,
        };

        let output: SearchOutput = self.invoker.invoke_typed(Capability::Search, &input).await?;

        progress.send(serde_json::json!({
            "found": output.results.len(),
            "total": output.total,
        }));

        Ok(AgentResult::SearchResult {
            items: output.results,
            total: output.total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::{test_context, test_task};
    use crate::config::RetryConfig;
    use crate::capability::ScriptedClient;
    use serde_json::json;

    #[tokio::test]
    async fn test_search_maps_entities_to_filters() {
        let client = ScriptedClient::new().respond(
            Capability::Search,
            json!({
                "results": [
                    {"id": "tt-dark", "title": "Dark", "genres": ["sci-fi"], "relevance": 0.92}
                ],
                "total": 1
            }),
        );
        let invoker = Arc::new(Invoker::new(Arc::new(client), RetryConfig::default()));
        let agent = ContentSearcher::new(invoker);

        let ctx = test_context();
        let task = test_task(AgentName::ContentSearcher, json!({"limit": 5}));
        let progress = ProgressReporter::silent(AgentName::ContentSearcher);

        let result = agent.run(&task, &ctx, &progress).await.unwrap();
        match result {
            AgentResult::SearchResult { items, total } => {
                assert_eq!(total, 1);
                assert_eq!(items[0].id, "tt-dark");
            }
            other => panic!("expected search result, got {:?}", other),
        }
    }
}
