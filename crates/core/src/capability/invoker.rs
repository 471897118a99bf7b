//! # Capability Invoker
//!
//! Uniform client for calling a named remote capability with schema
//! validation, a declared timeout, bounded retries with exponential backoff,
//! and latency/success recording. `Timeout` and `Unavailable` are retried;
//! `SchemaViolation` and `Remote` are contract breaches and never are.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::RetryConfig;
use crate::error::CapabilityError;
use crate::models::CapabilityStat;

use super::schema::{self, Capability};

/// Transport seam: something that can move one invocation to a remote
/// capability and bring the raw response back.
#[async_trait]
pub trait CapabilityClient: Send + Sync {
    async fn call(
        &self,
        capability: Capability,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError>;
}

/// Production transport: POSTs the payload to `{base_url}/capabilities/{name}`.
pub struct HttpCapabilityClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpCapabilityClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CapabilityClient for HttpCapabilityClient {
    async fn call(
        &self,
        capability: Capability,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        let url = format!(
            "{}/capabilities/{}",
            self.base_url.trim_end_matches('/'),
            capability.name()
        );

        let response = self
            .http
            .post(&url)
            .json(&input)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CapabilityError::Timeout {
                        capability: capability.name().to_string(),
                        budget_ms: capability.timeout_ms(),
                    }
                } else {
                    CapabilityError::Unavailable {
                        capability: capability.name().to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| CapabilityError::SchemaViolation {
                    capability: capability.name().to_string(),
                    detail: format!("non-JSON response: {}", e),
                })?;

        if !status.is_success() {
            return Err(CapabilityError::Remote {
                capability: capability.name().to_string(),
                code: body
                    .get("code")
                    .and_then(|v| v.as_str())
                    .unwrap_or(status.as_str())
                    .to_string(),
                message: body
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("remote capability error")
                    .to_string(),
            });
        }

        Ok(body)
    }
}

/// Fixture transport resolving invocations from a scripted response table.
/// Used by tests and offline development; responses for one capability are
/// consumed in order, the last one repeating.
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<HashMap<&'static str, Vec<Result<serde_json::Value, CapabilityError>>>>,
    calls: AtomicU64,
    latency: Option<Duration>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated per-call latency (suspension point per invocation)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a successful response for a capability
    pub fn respond(self, capability: Capability, body: serde_json::Value) -> Self {
        self.responses
            .lock()
            .expect("scripted client poisoned")
            .entry(capability.name())
            .or_default()
            .push(Ok(body));
        self
    }

    /// Queue a failure for a capability
    pub fn fail(self, capability: Capability, error: CapabilityError) -> Self {
        self.responses
            .lock()
            .expect("scripted client poisoned")
            .entry(capability.name())
            .or_default()
            .push(Err(error));
        self
    }

    /// Total calls observed across all capabilities
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityClient for ScriptedClient {
    async fn call(
        &self,
        capability: Capability,
        _input: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut responses = self.responses.lock().expect("scripted client poisoned");
        match responses.get_mut(capability.name()) {
            Some(queue) if !queue.is_empty() => {
                if queue.len() == 1 {
                    queue[0].clone()
                } else {
                    queue.remove(0)
                }
            }
            _ => Err(CapabilityError::Unavailable {
                capability: capability.name().to_string(),
                reason: "no scripted response".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct CapabilityCounters {
    calls: AtomicU64,
    failures: AtomicU64,
    total_latency_ms: AtomicU64,
}

/// Latency and success/failure counters per capability
#[derive(Default)]
pub struct InvokerMetrics {
    counters: Mutex<HashMap<&'static str, Arc<CapabilityCounters>>>,
}

impl InvokerMetrics {
    fn counters_for(&self, capability: Capability) -> Arc<CapabilityCounters> {
        let mut counters = self.counters.lock().expect("metrics poisoned");
        counters
            .entry(capability.name())
            .or_insert_with(|| Arc::new(CapabilityCounters::default()))
            .clone()
    }

    fn record(&self, capability: Capability, latency: Duration, success: bool) {
        let counters = self.counters_for(capability);
        counters.calls.fetch_add(1, Ordering::Relaxed);
        counters
            .total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
        if !success {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot for the final metrics payload
    pub fn snapshot(&self) -> Vec<CapabilityStat> {
        let counters = self.counters.lock().expect("metrics poisoned");
        let mut stats: Vec<CapabilityStat> = counters
            .iter()
            .map(|(name, c)| {
                let calls = c.calls.load(Ordering::Relaxed);
                CapabilityStat {
                    capability: name.to_string(),
                    calls,
                    failures: c.failures.load(Ordering::Relaxed),
                    avg_latency_ms: if calls == 0 {
                        0
                    } else {
                        c.total_latency_ms.load(Ordering::Relaxed) / calls
                    },
                }
            })
            .collect();
        stats.sort_by(|a, b| a.capability.cmp(&b.capability));
        stats
    }
}

/// Schema-validating, retrying front door for all remote calls
pub struct Invoker {
    client: Arc<dyn CapabilityClient>,
    retry: RetryConfig,
    metrics: Arc<InvokerMetrics>,
}

impl Invoker {
    pub fn new(client: Arc<dyn CapabilityClient>, retry: RetryConfig) -> Self {
        Self {
            client,
            retry,
            metrics: Arc::new(InvokerMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<InvokerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Invoke a capability with validation, per-call timeout, and retries.
    pub async fn invoke(
        &self,
        capability: Capability,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        if let Err(violation) = schema::validate_input(capability, &input) {
            // Attach the declared shape to the rejection diagnostics
            if let Ok(declared) = serde_json::to_value(capability.input_schema()) {
                tracing::debug!(
                    capability = capability.name(),
                    error = %violation,
                    schema = %declared,
                    "input rejected against declared schema"
                );
            }
            return Err(violation);
        }

        let budget = Duration::from_millis(capability.timeout_ms());
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let started = Instant::now();

            let outcome = match tokio::time::timeout(
                budget,
                self.client.call(capability, input.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(CapabilityError::Timeout {
                    capability: capability.name().to_string(),
                    budget_ms: capability.timeout_ms(),
                }),
            };

            let latency = started.elapsed();

            match outcome {
                Ok(body) => {
                    // A malformed response is fatal even on a 200
                    if let Err(violation) = schema::validate_output(capability, &body) {
                        self.metrics.record(capability, latency, false);
                        return Err(violation);
                    }
                    self.metrics.record(capability, latency, true);
                    tracing::debug!(
                        capability = capability.name(),
                        latency_ms = latency.as_millis() as u64,
                        attempt,
                        "capability call succeeded"
                    );
                    return Ok(body);
                }
                Err(err) => {
                    self.metrics.record(capability, latency, false);
                    if err.is_retryable() && attempt < self.retry.max_attempts {
                        let delay = self.retry.delay_for(attempt);
                        tracing::warn!(
                            capability = capability.name(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "transient capability failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Typed convenience wrapper around [`Invoker::invoke`]
    pub async fn invoke_typed<I, O>(&self, capability: Capability, input: &I) -> Result<O, CapabilityError>
    where
        I: Serialize + Sync,
        O: DeserializeOwned,
    {
        let input = serde_json::to_value(input).map_err(|e| CapabilityError::SchemaViolation {
            capability: capability.name().to_string(),
            detail: format!("input not serializable: {}", e),
        })?;
        let output = self.invoke(capability, input).await?;
        serde_json::from_value(output).map_err(|e| CapabilityError::SchemaViolation {
            capability: capability.name().to_string(),
            detail: e.to_string(),
        })
    }
}
