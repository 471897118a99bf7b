//! # Device Controller
//!
//! Specialist agent wrapping the `send_to_device` capability. Targets the
//! first device named in the request unless the task input overrides it.

use async_trait::async_trait;
use std::sync::Arc;

use crate::capability::{Capability, DeviceCommandInput, DeviceCommandOutput, Invoker};
use crate::error::AgentError;
use crate::models::{AgentName, AgentResult, AgentRole, ExecutionContext, Task};

use super::{Agent, ProgressReporter};

pub struct DeviceController {
    invoker: Arc<Invoker>,
}

impl DeviceController {
    pub fn new(invoker: Arc<Invoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl Agent for DeviceController {
    fn name(&self) -> AgentName {
        AgentName::DeviceController
    }

    fn role(&self) -> AgentRole {
        AgentRole::Specialist
    }

    async fn run(
        &self,
        task: &Task,
        ctx: &ExecutionContext,
        _progress: &ProgressReporter,
    ) -> Result<AgentResult, AgentError> {
        let (device_id, device_type) = match (
            task.input.get("device_id").and_then(|v| v.as_str()),
            task.input.get("device_type").and_then(|v| v.as_str()),
        ) {
            (Some(id), Some(ty)) => (id.to_string(), ty.to_string()),
            _ => match ctx.devices.first() {
                Some(device) => (device.device_id.clone(), device.device_type.clone()),
                None => {
                    return Err(AgentError::Logic {
                        agent: AgentName::DeviceController,
                        reason: "no target device in request or task input".to_string(),
                    })
                }
            },
        };

        let command = task
            .input
            .get("command")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({"action": "play"}));

        let input = DeviceCommandInput {
            device_id: device_id.clone(),
            device_type,
            command,
        };

        let output: DeviceCommandOutput = self
            .invoker
            .invoke_typed(Capability::SendToDevice, &input)
            .await?;

        if !output.success {
            return Err(AgentError::Logic {
                agent: AgentName::DeviceController,
                reason: output
                    .error
                    .unwrap_or_else(|| "device rejected command".to_string()),
            });
        }

        Ok(AgentResult::DeviceAck {
            device_id,
            success: true,
            state: output.state,
        })
    }
}
