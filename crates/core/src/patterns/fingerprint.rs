//! # Pattern Fingerprinting
//!
//! Canonical fingerprint for a classified query. Built from the intents
//! and the categorical entities only: reference titles and other
//! instance-specific values are excluded, so "shows like Severance" and
//! "shows like Dark" land in the same bucket and share a strategy.

use sha2::{Digest, Sha256};

use crate::models::{ExtractedEntities, QueryIntent};

/// Fingerprint the classified shape of a query.
///
/// Intents and list entities are sorted before hashing so the fingerprint
/// is independent of classification order.
pub fn fingerprint(intents: &[QueryIntent], entities: &ExtractedEntities) -> String {
    let mut intent_names: Vec<&str> = intents.iter().map(|i| i.as_str()).collect();
    intent_names.sort_unstable();
    intent_names.dedup();

    let mut genres: Vec<&str> = entities.genres.iter().map(String::as_str).collect();
    genres.sort_unstable();
    let mut platforms: Vec<&str> = entities.platforms.iter().map(String::as_str).collect();
    platforms.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(intent_names.join(","));
    hasher.update("|");
    hasher.update(genres.join(","));
    hasher.update("|");
    hasher.update(entities.media_type.as_deref().unwrap_or(""));
    hasher.update("|");
    hasher.update(platforms.join(","));
    hasher.update("|");
    hasher.update(entities.region.as_deref().unwrap_or(""));

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}
