//! # Capability Schemas
//!
//! Typed input/output payloads for each remote capability, validated at the
//! invoker boundary before anything reaches agent logic. Structural shape is
//! enforced by deserializing into these types; numeric ranges and enums get
//! explicit checks on top.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;
use crate::models::{AvailabilityRecord, ContentItem};

/// The closed set of remote capabilities the orchestrator consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Search,
    Recommend,
    CheckAvailability,
    SendToDevice,
    MemoryStore,
    MemoryRetrieve,
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Search => "search",
            Capability::Recommend => "recommend",
            Capability::CheckAvailability => "check_availability",
            Capability::SendToDevice => "send_to_device",
            Capability::MemoryStore => "memory_store",
            Capability::MemoryRetrieve => "memory_retrieve",
        }
    }

    /// Declared per-capability response budget
    pub fn timeout_ms(&self) -> u64 {
        match self {
            Capability::Search => 2_500,
            Capability::Recommend => 3_000,
            Capability::CheckAvailability => 1_500,
            Capability::SendToDevice => 2_000,
            Capability::MemoryStore | Capability::MemoryRetrieve => 1_000,
        }
    }

    /// JSON schema of the declared input shape
    pub fn input_schema(&self) -> schemars::Schema {
        match self {
            Capability::Search => schemars::schema_for!(SearchInput),
            Capability::Recommend => schemars::schema_for!(RecommendInput),
            Capability::CheckAvailability => schemars::schema_for!(AvailabilityInput),
            Capability::SendToDevice => schemars::schema_for!(DeviceCommandInput),
            Capability::MemoryStore => schemars::schema_for!(MemoryStoreInput),
            Capability::MemoryRetrieve => schemars::schema_for!(MemoryRetrieveInput),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SearchFilters {
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchInput {
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchOutput {
    pub results: Vec<ContentItem>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecommendInput {
    pub user_id: String,
    /// Seed context: extracted entities, reference titles, prior picks
    pub content_context: serde_json::Value,
    pub count: u32,
    /// Diversity knob in [0,1]
    pub diversity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecommendOutput {
    pub recommendations: Vec<ContentItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AvailabilityInput {
    pub content_id: String,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AvailabilityOutput {
    pub available: bool,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub restrictions: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AvailabilityOutput {
    pub fn into_record(self, content_id: &str) -> AvailabilityRecord {
        AvailabilityRecord {
            content_id: content_id.to_string(),
            available: self.available,
            platforms: self.platforms,
            restrictions: self.restrictions,
            expires_at: self.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeviceCommandInput {
    pub device_id: String,
    pub device_type: String,
    pub command: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeviceCommandOutput {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub state: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MemoryStoreInput {
    pub database: String,
    pub collection: String,
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub merge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MemoryStoreOutput {
    pub success: bool,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MemoryRetrieveInput {
    pub database: String,
    pub collection: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MemoryRetrieveOutput {
    pub found: bool,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

fn decode<T: DeserializeOwned>(
    capability: Capability,
    value: &serde_json::Value,
) -> Result<T, CapabilityError> {
    serde_json::from_value(value.clone()).map_err(|e| CapabilityError::SchemaViolation {
        capability: capability.name().to_string(),
        detail: e.to_string(),
    })
}

fn range_violation(capability: Capability, detail: &str) -> CapabilityError {
    CapabilityError::SchemaViolation {
        capability: capability.name().to_string(),
        detail: detail.to_string(),
    }
}

/// Validate an input payload before dispatch
pub fn validate_input(
    capability: Capability,
    input: &serde_json::Value,
) -> Result<(), CapabilityError> {
    match capability {
        Capability::Search => {
            let input: SearchInput = decode(capability, input)?;
            if input.query.trim().is_empty() {
                return Err(range_violation(capability, "query must be non-empty"));
            }
            if input.limit == 0 || input.limit > 100 {
                return Err(range_violation(capability, "limit must be in 1..=100"));
            }
        }
        Capability::Recommend => {
            let input: RecommendInput = decode(capability, input)?;
            if !(0.0..=1.0).contains(&input.diversity) {
                return Err(range_violation(capability, "diversity must be in [0,1]"));
            }
            if input.count == 0 || input.count > 50 {
                return Err(range_violation(capability, "count must be in 1..=50"));
            }
        }
        Capability::CheckAvailability => {
            let input: AvailabilityInput = decode(capability, input)?;
            if input.content_id.is_empty() || input.region.is_empty() {
                return Err(range_violation(
                    capability,
                    "content_id and region must be non-empty",
                ));
            }
        }
        Capability::SendToDevice => {
            let input: DeviceCommandInput = decode(capability, input)?;
            if input.device_id.is_empty() {
                return Err(range_violation(capability, "device_id must be non-empty"));
            }
        }
        Capability::MemoryStore => {
            let _: MemoryStoreInput = decode(capability, input)?;
        }
        Capability::MemoryRetrieve => {
            let _: MemoryRetrieveInput = decode(capability, input)?;
        }
    }
    Ok(())
}

/// Validate a response payload against the declared output shape
pub fn validate_output(
    capability: Capability,
    output: &serde_json::Value,
) -> Result<(), CapabilityError> {
    match capability {
        Capability::Search => {
            let out: SearchOutput = decode(capability, output)?;
            for item in &out.results {
                if item.id.is_empty() {
                    return Err(range_violation(
                        capability,
                        "result item missing content identity",
                    ));
                }
            }
        }
        Capability::Recommend => {
            let out: RecommendOutput = decode(capability, output)?;
            for item in &out.recommendations {
                if item.id.is_empty() {
                    return Err(range_violation(
                        capability,
                        "recommendation missing content identity",
                    ));
                }
            }
        }
        Capability::CheckAvailability => {
            let _: AvailabilityOutput = decode(capability, output)?;
        }
        Capability::SendToDevice => {
            let _: DeviceCommandOutput = decode(capability, output)?;
        }
        Capability::MemoryStore => {
            let _: MemoryStoreOutput = decode(capability, output)?;
        }
        Capability::MemoryRetrieve => {
            let _: MemoryRetrieveOutput = decode(capability, output)?;
        }
    }
    Ok(())
}
