//! # Prism Core
//!
//! The query orchestration engine for unified streaming-catalog search -
//! classifies a natural-language query, plans an agent strategy, runs the
//! specialist agents concurrently, and streams trust-scored results back.
//!
//! ## Architecture
//!
//! - `capability/` - Typed capability schemas and the validating invoker
//! - `agents/` - The specialist agents and their execution harness
//! - `scheduler/` - Agent registry, concurrency ceilings, strategy dispatch
//! - `pipeline/` - Intent classification, planning, the query coordinator
//! - `patterns/` - Fingerprinting and the reasoning bank
//! - `rank/` - Trust scoring and result aggregation
//! - `state/` - Unified SQLite persistence
//!
//! ## Usage
//!
//! ```rust,ignore
//! use prism_core::capability::{HttpCapabilityClient, Invoker};
//! use prism_core::config::OrchestratorConfig;
//! use prism_core::pipeline::QueryCoordinator;
//!
//! let config = OrchestratorConfig::default();
//! let client = std::sync::Arc::new(HttpCapabilityClient::new("http://localhost:9100"));
//! let invoker = std::sync::Arc::new(Invoker::new(client, config.retry.clone()));
//! let coordinator = QueryCoordinator::new(config, invoker);
//!
//! let (sink, mut events) = coordinator.event_channel("query");
//! let outcome = coordinator.run(request, &sink).await;
//! ```

pub mod agents;
pub mod capability;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod patterns;
pub mod pipeline;
pub mod rank;
pub mod scheduler;
pub mod state;
