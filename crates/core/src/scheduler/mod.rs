//! # Scheduling
//!
//! Agent registry (the closed agent set, concurrency ceilings, admission)
//! and the dispatcher that runs execution strategies against it.

pub mod dispatch;
pub mod registry;

pub use dispatch::{carry_forward, DispatchOutcome, Scheduler};
pub use registry::{AgentDescriptor, AgentRegistry, Admission, InstanceGuard};
