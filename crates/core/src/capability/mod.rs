//! # Capabilities
//!
//! Everything the orchestrator consumes from the outside world goes through
//! here: a closed set of named remote capabilities, typed schemas validated
//! on both sides of the wire, and a retrying invoker that records latency.

pub mod invoker;
pub mod schema;

pub use invoker::{CapabilityClient, HttpCapabilityClient, Invoker, InvokerMetrics, ScriptedClient};
pub use schema::{
    AvailabilityInput, AvailabilityOutput, Capability, DeviceCommandInput, DeviceCommandOutput,
    MemoryRetrieveInput, MemoryRetrieveOutput, MemoryStoreInput, MemoryStoreOutput, RecommendInput,
    RecommendOutput, SearchFilters, SearchInput, SearchOutput,
};
