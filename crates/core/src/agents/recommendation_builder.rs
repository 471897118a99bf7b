//! # Recommendation Builder
//!
//! Specialist agent wrapping the `recommend` capability. Seeds the remote
//! recommender with the extracted entities, any content ids projected from
//! an earlier agent, and the user context loaded by the memory curator.

use async_trait::async_trait;
use std::sync::Arc;

use crate::capability::{Capability, Invoker, RecommendInput, RecommendOutput};
use crate::error::AgentError;
use crate::models::{AgentName, AgentResult, AgentRole, ExecutionContext, Task};

use super::{Agent, ProgressReporter};

const DEFAULT_COUNT: u32 = 10;
const DEFAULT_DIVERSITY: f64 = 0.5;

pub struct RecommendationBuilder {
    invoker: Arc<Invoker>,
}

impl RecommendationBuilder {
    pub fn new(invoker: Arc<Invoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl Agent for RecommendationBuilder {
    fn name(&self) -> AgentName {
        AgentName::RecommendationBuilder
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
        let seed_ids = task
            .input
            .get("seed_ids")
            .cloned()
            .unwrap_or(serde_json::Value::Array(vec![]));

        let input = RecommendInput {
            user_id: ctx.user_id.clone(),
            content_context: serde_json::json!({
                "titles": ctx.entities.titles,
                "genres": ctx.entities.genres,
                "media_type": ctx.entities.media_type,
                "seed_ids": seed_ids,
                "user_context": ctx.user_context,
            }),
            count: task
                .input
                .get("count")
                .and_then(|v| v.as_u64())
                .map(|v| v as u32)
                .unwrap_or(DEFAULT_COUNT),
            diversity: task
                .input
                .get("diversity")
                .and_then(|v| v.as_f64())
                .unwrap_or(DEFAULT_DIVERSITY),
        };

        let output: RecommendOutput = self
            .invoker
            .invoke_typed(Capability::Recommend, &input)
            .await?;

        progress.send(serde_json::json!({
            "recommended": output.recommendations.len(),
        }));

        Ok(AgentResult::RecommendResult {
            items: output.recommendations,
        })
    }
}
