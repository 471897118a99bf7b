//! # Availability Checker
//!
//! Specialist agent wrapping the `check_availability` capability, one call
//! per content id. The ids arrive through the task input, typically
//! projected from a completed search agent in sequential mode.

use async_trait::async_trait;
use std::sync::Arc;

use crate::capability::{AvailabilityInput, AvailabilityOutput, Capability, Invoker};
use crate::error::AgentError;
use crate::models::{AgentName, AgentResult, AgentRole, ExecutionContext, Task};

use super::{Agent, ProgressReporter};

pub struct AvailabilityChecker {
    invoker: Arc<Invoker>,
}

impl AvailabilityChecker {
    pub fn new(invoker: Arc<Invoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl Agent for AvailabilityChecker {
    fn name(&self) -> AgentName {
        AgentName::AvailabilityChecker
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
        let content_ids: Vec<String> = task
            .input
            .get("content_ids")
            .and_then(|v| v.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let mut records = Vec::with_capacity(content_ids.len());
        for content_id in &content_ids {
            let input = AvailabilityInput {
                content_id: content_id.clone(),
                region: ctx.region.clone(),
            };
            let output: AvailabilityOutput = self
                .invoker
                .invoke_typed(Capability::CheckAvailability, &input)
                .await?;
            records.push(output.into_record(content_id));

            progress.send(serde_json::json!({
                "checked": records.len(),
                "of": content_ids.len(),
            }));
        }

        Ok(AgentResult::AvailabilityResult { records })
    }
}
