//! # Query Events
//!
//! Typed event stream delivered to the caller while a query runs.
//! Every run emits zero or more progress-class events followed by exactly
//! one terminal event (`final_results` or `error`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::{AgentName, AgentResult, ExecutionStrategy, ResultMetrics, ScoredItem};

/// Payload of one event in the stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryEventKind {
    /// Agent admitted and started
    AgentStart { agent: AgentName, task_id: String },
    /// Intermediate partial output from a running agent
    AgentProgress {
        agent: AgentName,
        partial: serde_json::Value,
    },
    /// Agent settled successfully
    AgentComplete {
        agent: AgentName,
        result: AgentResult,
        duration_ms: u64,
    },
    /// Agent failed; siblings keep running
    AgentError { agent: AgentName, error: String },
    /// Terminal: ranked, deduplicated, trust-scored results
    FinalResults {
        results: Vec<ScoredItem>,
        strategy: ExecutionStrategy,
        metrics: ResultMetrics,
    },
    /// Terminal: the pipeline ended in its error state
    Error { kind: String, message: String },
}

impl QueryEventKind {
    /// Terminal events end the stream and are never shed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryEventKind::FinalResults { .. } | QueryEventKind::Error { .. }
        )
    }
}

/// An event in a query's stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEvent {
    pub id: String,
    pub query_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: QueryEventKind,
}

impl QueryEvent {
    pub fn new(query_id: &str, kind: QueryEventKind) -> Self {
        Self {
            id: event_id(),
            query_id: query_id.to_string(),
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Single-producer emitter over a bounded channel.
///
/// The backpressure policy is explicit: progress-class events use `try_send`
/// and are dropped when the buffer is full; terminal events always await
/// channel capacity so the stream cannot end silently.
#[derive(Clone)]
pub struct EventSink {
    query_id: String,
    tx: Option<mpsc::Sender<QueryEvent>>,
}

impl EventSink {
    /// Create a sink and the receiver the caller consumes
    pub fn channel(query_id: &str, capacity: usize) -> (Self, mpsc::Receiver<QueryEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                query_id: query_id.to_string(),
                tx: Some(tx),
            },
            rx,
        )
    }

    /// A sink that discards everything (no subscriber attached)
    pub fn disabled(query_id: &str) -> Self {
        Self {
            query_id: query_id.to_string(),
            tx: None,
        }
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// Emit a progress-class event; shed when the buffer is full
    pub fn emit(&self, kind: QueryEventKind) {
        debug_assert!(!kind.is_terminal(), "terminal events go through finish()");
        if let Some(tx) = &self.tx {
            let event = QueryEvent::new(&self.query_id, kind);
            if let Err(mpsc::error::TrySendError::Full(event)) = tx.try_send(event) {
                tracing::debug!(query_id = %self.query_id, event_id = %event.id, "event buffer full, shedding progress event");
            }
        }
    }

    /// Emit the terminal event, awaiting buffer capacity
    pub async fn finish(&self, kind: QueryEventKind) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(QueryEvent::new(&self.query_id, kind)).await;
        }
    }
}

/// Generate a short unique id for events and tasks
pub(crate) fn event_id() -> String {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    format!("{:x}-{:x}", nanos, rand_u32())
}

/// Simple random number (not cryptographic)
fn rand_u32() -> u32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    RandomState::new().build_hasher().finish() as u32
}
