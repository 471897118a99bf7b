//! # Agent Registry
//!
//! Owns the static agent descriptors and the per-agent-type concurrency
//! state: one semaphore per type for the ceiling, plus atomic live/waiting
//! counters. Admission hands back a scoped guard that releases the slot on
//! every exit path, success, error, or cancellation alike.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::agents::{
    Agent, AvailabilityChecker, ContentSearcher, DeviceController, MemoryCurator,
    RecommendationBuilder,
};
use crate::capability::{Capability, Invoker};
use crate::error::OrchestratorError;
use crate::models::{AgentName, AgentRole, TaskPriority};

/// Static configuration of one agent type. Loaded once at bootstrap,
/// immutable thereafter.
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    pub name: AgentName,
    pub role: AgentRole,
    /// Ceiling on concurrently live instances of this type
    pub max_concurrency: usize,
    pub priority: TaskPriority,
    /// Default task budget
    pub timeout_ms: u64,
    /// Capabilities this agent declares it invokes
    pub capabilities: Vec<Capability>,
    pub default_action: &'static str,
}

impl AgentDescriptor {
    /// Built-in descriptor for each agent type
    pub fn builtin(name: AgentName) -> Self {
        match name {
            AgentName::ContentSearcher => Self {
                name,
                role: AgentRole::Specialist,
                max_concurrency: 4,
                priority: TaskPriority::Normal,
                timeout_ms: 3_000,
                capabilities: vec![Capability::Search],
                default_action: "search",
            },
            AgentName::RecommendationBuilder => Self {
                name,
                role: AgentRole::Specialist,
                max_concurrency: 3,
                priority: TaskPriority::Normal,
                timeout_ms: 4_000,
                capabilities: vec![Capability::Recommend],
                default_action: "recommend",
            },
            AgentName::AvailabilityChecker => Self {
                name,
                role: AgentRole::Specialist,
                max_concurrency: 4,
                priority: TaskPriority::Normal,
                timeout_ms: 3_000,
                capabilities: vec![Capability::CheckAvailability],
                default_action: "check_availability",
            },
            AgentName::DeviceController => Self {
                name,
                role: AgentRole::Specialist,
                max_concurrency: 2,
                priority: TaskPriority::High,
                timeout_ms: 2_500,
                capabilities: vec![Capability::SendToDevice],
                default_action: "send_to_device",
            },
            AgentName::MemoryCurator => Self {
                name,
                role: AgentRole::Memory,
                max_concurrency: 2,
                priority: TaskPriority::High,
                timeout_ms: 1_500,
                capabilities: vec![Capability::MemoryRetrieve, Capability::MemoryStore],
                default_action: "load_preferences",
            },
        }
    }
}

struct AgentSlot {
    descriptor: AgentDescriptor,
    agent: Arc<dyn Agent>,
    semaphore: Arc<Semaphore>,
    live: Arc<AtomicUsize>,
    waiting: Arc<AtomicUsize>,
}

/// Releases one live-instance slot when dropped
pub struct InstanceGuard {
    _permit: OwnedSemaphorePermit,
    live: Arc<AtomicUsize>,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A granted admission: the agent instance plus its slot guard
pub struct Admission {
    pub agent: Arc<dyn Agent>,
    pub guard: InstanceGuard,
    /// Measured queue wait before the slot opened
    pub waited_ms: u64,
}

impl std::fmt::Debug for Admission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Admission")
            .field("waited_ms", &self.waited_ms)
            .finish_non_exhaustive()
    }
}

/// The closed agent set, resolved through a static lookup table built at
/// startup. An agent name missing from the table is a configuration breach,
/// surfaced as `FatalConfiguration` before anything is dispatched.
pub struct AgentRegistry {
    slots: HashMap<AgentName, AgentSlot>,
}

impl AgentRegistry {
    /// Register every built-in agent
    pub fn bootstrap(invoker: &Arc<Invoker>) -> Self {
        Self::with_agents(invoker, &AgentName::all())
    }

    /// Register a subset (e.g. device control disabled)
    pub fn with_agents(invoker: &Arc<Invoker>, names: &[AgentName]) -> Self {
        let mut slots = HashMap::new();
        for &name in names {
            let agent: Arc<dyn Agent> = match name {
                AgentName::ContentSearcher => Arc::new(ContentSearcher::new(invoker.clone())),
                AgentName::RecommendationBuilder => {
                    Arc::new(RecommendationBuilder::new(invoker.clone()))
                }
                AgentName::AvailabilityChecker => {
                    Arc::new(AvailabilityChecker::new(invoker.clone()))
                }
                AgentName::DeviceController => Arc::new(DeviceController::new(invoker.clone())),
                AgentName::MemoryCurator => Arc::new(MemoryCurator::new(invoker.clone())),
            };
            let descriptor = AgentDescriptor::builtin(name);
            slots.insert(
                name,
                AgentSlot {
                    semaphore: Arc::new(Semaphore::new(descriptor.max_concurrency)),
                    live: Arc::new(AtomicUsize::new(0)),
                    waiting: Arc::new(AtomicUsize::new(0)),
                    agent,
                    descriptor,
                },
            );
        }
        Self { slots }
    }

    pub fn contains(&self, name: AgentName) -> bool {
        self.slots.contains_key(&name)
    }

    pub fn descriptor(&self, name: AgentName) -> Result<&AgentDescriptor, OrchestratorError> {
        self.slots
            .get(&name)
            .map(|slot| &slot.descriptor)
            .ok_or_else(|| {
                OrchestratorError::FatalConfiguration(format!(
                    "strategy names unregistered agent '{}'",
                    name
                ))
            })
    }

    /// Currently live instances of the given type
    pub fn live_count(&self, name: AgentName) -> usize {
        self.slots
            .get(&name)
            .map(|slot| slot.live.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Admit a task against the type's ceiling, queueing when saturated.
    ///
    /// Queue depth beyond `queue_threshold` sheds the newest low-priority
    /// admission with `Backpressure`; `High`/`Critical` tasks always wait.
    pub async fn admit(
        &self,
        name: AgentName,
        priority: TaskPriority,
        queue_threshold: usize,
    ) -> Result<Admission, OrchestratorError> {
        let slot = self.slots.get(&name).ok_or_else(|| {
            OrchestratorError::FatalConfiguration(format!(
                "cannot admit unregistered agent '{}'",
                name
            ))
        })?;

        let (permit, waited_ms) = match slot.semaphore.clone().try_acquire_owned() {
            Ok(permit) => (permit, 0),
            Err(_) => {
                let depth = slot.waiting.fetch_add(1, Ordering::SeqCst) + 1;
                if depth > queue_threshold && priority < TaskPriority::High {
                    slot.waiting.fetch_sub(1, Ordering::SeqCst);
                    return Err(OrchestratorError::Backpressure { agent: name, depth });
                }

                let started = Instant::now();
                let acquired = slot.semaphore.clone().acquire_owned().await;
                slot.waiting.fetch_sub(1, Ordering::SeqCst);
                let permit = acquired.map_err(|_| {
                    OrchestratorError::FatalConfiguration(format!(
                        "admission semaphore for '{}' closed",
                        name
                    ))
                })?;

                let waited_ms = started.elapsed().as_millis() as u64;
                tracing::debug!(agent = %name, waited_ms, depth, "task queued before admission");
                (permit, waited_ms)
            }
        };

        slot.live.fetch_add(1, Ordering::SeqCst);
        Ok(Admission {
            agent: Arc::clone(&slot.agent),
            guard: InstanceGuard {
                _permit: permit,
                live: Arc::clone(&slot.live),
            },
            waited_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ScriptedClient;
    use crate::config::RetryConfig;

    fn test_registry() -> AgentRegistry {
        let invoker = Arc::new(Invoker::new(
            Arc::new(ScriptedClient::new()),
            RetryConfig::default(),
        ));
        AgentRegistry::bootstrap(&invoker)
    }

    #[test]
    fn test_builtin_descriptors_cover_all_agents() {
        for name in AgentName::all() {
            let descriptor = AgentDescriptor::builtin(name);
            assert!(descriptor.max_concurrency > 0);
            assert!(!descriptor.capabilities.is_empty());
        }
    }

    #[tokio::test]
    async fn test_guard_releases_slot_on_drop() {
        let registry = test_registry();
        assert_eq!(registry.live_count(AgentName::ContentSearcher), 0);

        let admission = registry
            .admit(AgentName::ContentSearcher, TaskPriority::Normal, 8)
            .await
            .unwrap();
        assert_eq!(registry.live_count(AgentName::ContentSearcher), 1);

        drop(admission);
        assert_eq!(registry.live_count(AgentName::ContentSearcher), 0);
    }

    #[tokio::test]
    async fn test_ceiling_never_exceeded() {
        let registry = test_registry();
        let max = AgentDescriptor::builtin(AgentName::MemoryCurator).max_concurrency;

        let mut held = Vec::new();
        for _ in 0..max {
            held.push(
                registry
                    .admit(AgentName::MemoryCurator, TaskPriority::High, 8)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(registry.live_count(AgentName::MemoryCurator), max);

        // The next low-priority admission beyond the queue threshold sheds
        let err = registry
            .admit(AgentName::MemoryCurator, TaskPriority::Normal, 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "backpressure");
        assert_eq!(registry.live_count(AgentName::MemoryCurator), max);
    }

    #[tokio::test]
    async fn test_high_priority_waits_instead_of_shedding() {
        let registry = test_registry();
        let max = AgentDescriptor::builtin(AgentName::DeviceController).max_concurrency;

        let mut held = Vec::new();
        for _ in 0..max {
            held.push(
                registry
                    .admit(AgentName::DeviceController, TaskPriority::High, 8)
                    .await
                    .unwrap(),
            );
        }

        // Critical admission queues; release one slot and it proceeds
        let registry = Arc::new(registry);
        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .admit(AgentName::DeviceController, TaskPriority::Critical, 0)
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        held.pop();
        let admission = waiter.await.unwrap().unwrap();
        assert!(registry.live_count(AgentName::DeviceController) <= max);
        drop(admission);
    }

    #[tokio::test]
    async fn test_unregistered_agent_is_fatal() {
        let invoker = Arc::new(Invoker::new(
            Arc::new(ScriptedClient::new()),
            RetryConfig::default(),
        ));
        let registry = AgentRegistry::with_agents(&invoker, &[AgentName::ContentSearcher]);

        let err = registry.descriptor(AgentName::DeviceController).unwrap_err();
        assert_eq!(err.kind(), "fatal_configuration");
    }
}
