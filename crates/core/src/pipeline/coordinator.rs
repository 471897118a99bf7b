//! # Query Coordinator
//!
//! Drives one query through the five pipeline stages: classify the text,
//! plan (or reuse) a strategy, run its agents, aggregate and score what
//! came back, then persist what was learned and emit the terminal event.
//! A run never panics outward and always ends in exactly one terminal
//! event, however badly the agents fared.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::agents::MemoryCurator;
use crate::capability::Invoker;
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::events::{event_id, EventSink, QueryEvent, QueryEventKind};
use crate::models::{
    ExecutionContext, ExecutionStrategy, QueryRequest, ResultMetrics, ScoredItem, Verbosity,
};
use crate::patterns::{fingerprint, PatternStore, ReasoningBank};
use crate::rank;
use crate::scheduler::{AgentRegistry, DispatchOutcome, Scheduler};
use crate::state::db::PrismDb;

use super::stage::{QueryPipeline, QueryStage};
use super::{intent, strategy};

/// Everything a finished (or failed) run reports back to the caller.
/// Streaming consumers get the same data through the terminal event.
#[derive(Debug)]
pub struct QueryOutcome {
    pub query_id: String,
    pub results: Vec<ScoredItem>,
    /// The strategy that actually ran, fallback included
    pub strategy: Option<ExecutionStrategy>,
    pub metrics: ResultMetrics,
    /// The terminal stage the pipeline ended in (`Complete` or `Failed`)
    pub stage: QueryStage,
    pub degraded: bool,
    pub failed: bool,
}

/// The query coordinator
pub struct QueryCoordinator {
    config: OrchestratorConfig,
    invoker: Arc<Invoker>,
    scheduler: Scheduler,
    bank: Arc<ReasoningBank>,
    curator: MemoryCurator,
    db: Option<Arc<PrismDb>>,
}

impl QueryCoordinator {
    /// Create a coordinator with the full built-in agent set and an
    /// in-memory pattern bank
    pub fn new(config: OrchestratorConfig, invoker: Arc<Invoker>) -> Self {
        let registry = Arc::new(AgentRegistry::bootstrap(&invoker));
        Self::with_registry(config, invoker, registry)
    }

    /// Create with an explicit registry (e.g. device control disabled)
    pub fn with_registry(
        config: OrchestratorConfig,
        invoker: Arc<Invoker>,
        registry: Arc<AgentRegistry>,
    ) -> Self {
        let scheduler = Scheduler::new(registry, config.queue_depth_threshold);
        let bank = Arc::new(ReasoningBank::new(config.patterns.clone()));
        let curator = MemoryCurator::new(invoker.clone());
        Self {
            config,
            invoker,
            scheduler,
            bank,
            curator,
            db: None,
        }
    }

    /// Attach the unified database: patterns become durable and every run
    /// lands in the query log
    pub fn with_db(mut self, db: Arc<PrismDb>) -> anyhow::Result<Self> {
        let store = PatternStore::new(&db);
        self.bank = Arc::new(ReasoningBank::with_store(
            self.config.patterns.clone(),
            store,
        )?);
        self.db = Some(db);
        Ok(self)
    }

    pub fn bank(&self) -> &ReasoningBank {
        &self.bank
    }

    /// Build the event channel a caller subscribes to, sized to the
    /// configured buffer. Progress events are shed when the consumer lags;
    /// the terminal event always lands.
    pub fn event_channel(
        &self,
        query_id: &str,
    ) -> (EventSink, tokio::sync::mpsc::Receiver<QueryEvent>) {
        EventSink::channel(query_id, self.config.event_buffer)
    }

    /// Run one query to its terminal event
    #[tracing::instrument(skip(self, request, sink), fields(user_id = %request.user_id))]
    pub async fn run(&self, request: QueryRequest, sink: &EventSink) -> QueryOutcome {
        let query_id = event_id();
        let started = Instant::now();
        let mut pipeline = QueryPipeline::new();

        // SPECIFICATION: classify, extract, load what we know of the user
        let intents = intent::classify(&request.text);
        let entities = intent::extract_entities(&request.text, &request.region);
        let user_context = tokio::time::timeout(
            Duration::from_millis(self.config.stage_timeout_ms),
            self.curator.load_user_context(&request.user_id),
        )
        .await
        .unwrap_or_else(|_| {
            tracing::warn!(query_id = %query_id, "user context load hit the stage budget");
            None
        });
        let fp = fingerprint(&intents, &entities);
        tracing::debug!(query_id = %query_id, intents = ?intents, fingerprint = %fp, "query classified");

        let mut ctx = ExecutionContext {
            query_id: query_id.clone(),
            user_id: request.user_id.clone(),
            query: request.text.clone(),
            region: request.region.clone(),
            devices: request.devices.clone(),
            intents: intents.clone(),
            entities,
            user_context,
            pattern_fingerprint: None,
            timestamp: Utc::now(),
            metadata: Default::default(),
        };
        pipeline.advance();

        // PSEUDOCODE: reuse a proven plan or derive a fresh one
        let pattern_hit = self.bank.lookup(&fp);
        let planned = match &pattern_hit {
            Some(pattern) => {
                ctx.pattern_fingerprint = Some(fp.clone());
                tracing::info!(query_id = %query_id, fingerprint = %fp, quality = pattern.quality, "strategy reused from pattern bank");
                pattern.strategy.clone()
            }
            None => strategy::derive_strategy(&intents, &self.config),
        };
        pipeline.advance();

        // ARCHITECTURE: run the plan, falling back once if it yields nothing
        let ctx = Arc::new(ctx);
        let mut ran = planned.clone();
        let mut dispatch = match self.dispatch(&ran, &ctx, sink).await {
            Ok(dispatch) => dispatch,
            Err(e) => return self.fail(&mut pipeline, query_id, started, e, sink).await,
        };

        if dispatch.succeeded() == 0 {
            let Some(fallback) = planned.fallback.as_deref() else {
                let e = OrchestratorError::StrategyExhausted {
                    reason: "strategy produced nothing and has no fallback".to_string(),
                };
                return self.fail(&mut pipeline, query_id, started, e, sink).await;
            };
            pipeline.degrade();
            tracing::warn!(query_id = %query_id, "primary strategy produced nothing, running fallback");
            ran = fallback.clone();
            dispatch = match self.dispatch(&ran, &ctx, sink).await {
                Ok(dispatch) => dispatch,
                Err(e) => return self.fail(&mut pipeline, query_id, started, e, sink).await,
            };
            if dispatch.succeeded() == 0 {
                let e = OrchestratorError::StrategyExhausted {
                    reason: "primary and fallback strategies both produced nothing".to_string(),
                };
                return self.fail(&mut pipeline, query_id, started, e, sink).await;
            }
        }
        pipeline.advance();

        // REFINEMENT: merge, dedup, score, rank
        let results = rank::aggregate(&dispatch.results, &ctx, &self.config);
        pipeline.advance();

        // COMPLETION: learn from the run, log it, emit the terminal event
        // The bank learns the planned strategy, never the fallback. Completion
        // is measured against the primary's agent set: a degraded run stores
        // a penalized quality under the plan it will retry next time.
        let quality = outcome_quality(&dispatch, planned.required_agents.len(), results.len());
        self.bank.upsert(&fp, &planned, quality);
        if let Err(e) = self
            .curator
            .record_outcome(&ctx, quality, results.len())
            .await
        {
            // Memory is best-effort; the results still ship
            tracing::warn!(query_id = %query_id, error = %e, "outcome record failed");
        }

        let metrics = ResultMetrics {
            duration_ms: started.elapsed().as_millis() as u64,
            agent_durations_ms: dispatch.agent_durations_ms.clone(),
            failed_agents: dispatch.failed.clone(),
            pattern_hit: pattern_hit.is_some(),
            capabilities: self.invoker.metrics().snapshot(),
        };
        self.log_query(&query_id, &request, &ctx, results.len(), &metrics, pipeline.degraded);

        let results = render(results, self.config.verbosity);
        sink.finish(QueryEventKind::FinalResults {
            results: results.clone(),
            strategy: ran.clone(),
            metrics: metrics.clone(),
        })
        .await;
        pipeline.advance();

        QueryOutcome {
            query_id,
            results,
            strategy: Some(ran),
            metrics,
            stage: pipeline.stage,
            degraded: pipeline.degraded,
            failed: false,
        }
    }

    async fn dispatch(
        &self,
        strategy: &ExecutionStrategy,
        ctx: &Arc<ExecutionContext>,
        sink: &EventSink,
    ) -> Result<DispatchOutcome, OrchestratorError> {
        self.scheduler
            .run_strategy(strategy, Arc::clone(ctx), sink)
            .await
    }

    /// Terminal failure: park the state machine in `Failed`, emit one error
    /// event, ship no results
    async fn fail(
        &self,
        pipeline: &mut QueryPipeline,
        query_id: String,
        started: Instant,
        error: OrchestratorError,
        sink: &EventSink,
    ) -> QueryOutcome {
        pipeline.fail();
        tracing::error!(query_id = %query_id, error = %error, "query failed");
        sink.finish(QueryEventKind::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
        })
        .await;
        QueryOutcome {
            query_id,
            results: Vec::new(),
            strategy: None,
            metrics: ResultMetrics {
                duration_ms: started.elapsed().as_millis() as u64,
                capabilities: self.invoker.metrics().snapshot(),
                ..Default::default()
            },
            stage: pipeline.stage,
            degraded: pipeline.degraded,
            failed: true,
        }
    }

    fn log_query(
        &self,
        query_id: &str,
        request: &QueryRequest,
        ctx: &ExecutionContext,
        result_count: usize,
        metrics: &ResultMetrics,
        degraded: bool,
    ) {
        let Some(db) = &self.db else {
            return;
        };
        let entry = crate::state::db::QueryLogEntry {
            query_id: query_id.to_string(),
            user_id: request.user_id.clone(),
            text: request.text.clone(),
            intents: ctx.intents.iter().map(|i| i.as_str().to_string()).collect(),
            result_count: result_count as u64,
            duration_ms: metrics.duration_ms,
            degraded,
            created_at: ctx.timestamp.to_rfc3339(),
        };
        if let Err(e) = db.log_query(&entry) {
            tracing::warn!(query_id = %query_id, error = %e, "query log write failed");
        }
    }
}

/// How well the run went, [0, 1]: mostly agent completion, partly yield
fn outcome_quality(dispatch: &DispatchOutcome, required: usize, result_count: usize) -> f64 {
    if required == 0 {
        return 0.0;
    }
    let completion = dispatch.succeeded() as f64 / required as f64;
    let yield_score = (result_count as f64 / 10.0).min(1.0);
    (0.7 * completion + 0.3 * yield_score).clamp(0.0, 1.0)
}

/// Trim the payload to the configured verbosity
fn render(mut results: Vec<ScoredItem>, verbosity: Verbosity) -> Vec<ScoredItem> {
    match verbosity {
        Verbosity::Compact => {
            for scored in &mut results {
                scored.availability = None;
                scored.explanation = None;
                scored.item.metadata = serde_json::Value::Null;
            }
        }
        Verbosity::Standard => {
            for scored in &mut results {
                scored.item.metadata = serde_json::Value::Null;
            }
        }
        Verbosity::Detailed => {}
    }
    results
}
