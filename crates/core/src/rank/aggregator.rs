//! # Result Aggregation
//!
//! Refinement-stage merge of every settled agent's output into one ranked
//! list: duplicates collapse across sources, availability joins in, each
//! survivor gets a trust breakdown, and diversity caps keep any one genre
//! or platform from monopolizing the page. Ordering is fully
//! deterministic for a given input set.

use std::collections::HashMap;

use crate::config::OrchestratorConfig;
use crate::models::{
    AgentName, AgentResult, AvailabilityRecord, ContentItem, ExecutionContext, ScoredItem,
};

use super::trust::{self, TrustSignals};

/// Aggregate settled agent results into the final ranked list
pub fn aggregate(
    results: &[(AgentName, AgentResult)],
    ctx: &ExecutionContext,
    config: &OrchestratorConfig,
) -> Vec<ScoredItem> {
    // Availability joins by content identity
    let mut availability: HashMap<String, AvailabilityRecord> = HashMap::new();
    for (_, result) in results {
        if let AgentResult::AvailabilityResult { records } = result {
            for record in records {
                availability.insert(record.content_id.clone(), record.clone());
            }
        }
    }

    // Collapse duplicates: one candidate per content id, every producing
    // agent remembered. The richer item body wins.
    let mut candidates: HashMap<String, Candidate> = HashMap::new();
    let mut producer_count = 0usize;
    for (agent, result) in results {
        let items = match result {
            AgentResult::SearchResult { items, .. } => items,
            AgentResult::RecommendResult { items } => items,
            _ => continue,
        };
        producer_count += 1;
        for item in items {
            if item.id.is_empty() {
                continue;
            }
            match candidates.get_mut(&item.id) {
                Some(candidate) => {
                    if !candidate.sources.contains(agent) {
                        candidate.sources.push(*agent);
                    }
                    if item.relevance > candidate.item.relevance {
                        candidate.item = merge_items(&candidate.item, item);
                    } else {
                        candidate.item = merge_items(item, &candidate.item);
                    }
                }
                None => {
                    candidates.insert(
                        item.id.clone(),
                        Candidate {
                            item: item.clone(),
                            sources: vec![*agent],
                        },
                    );
                }
            }
        }
    }

    let mut scored: Vec<ScoredItem> = candidates
        .into_values()
        .map(|candidate| {
            let record = availability.get(&candidate.item.id).cloned();
            let signals = signals_for(&candidate, record.as_ref(), producer_count, ctx);
            ScoredItem {
                trust: trust::score(&signals),
                availability: record,
                sources: candidate.sources,
                explanation: None,
                item: candidate.item,
            }
        })
        .filter(|scored| scored.trust.composite >= config.min_trust)
        .collect();

    // Composite desc, relevance desc, id asc. The id tie-break pins the
    // order for equal scores.
    scored.sort_by(|a, b| {
        b.trust
            .composite
            .partial_cmp(&a.trust.composite)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.item
                    .relevance
                    .partial_cmp(&a.item.relevance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.item.id.cmp(&b.item.id))
    });

    let mut ranked = apply_diversity_caps(scored, config);

    for (rank, scored) in ranked.iter_mut().take(config.explain_top_n).enumerate() {
        scored.explanation = Some(explain(scored, rank));
    }

    ranked
}

struct Candidate {
    item: ContentItem,
    sources: Vec<AgentName>,
}

/// Field-wise union of two records for the same content id; `primary`
/// wins where both carry a value
fn merge_items(primary: &ContentItem, secondary: &ContentItem) -> ContentItem {
    let mut merged = primary.clone();
    if merged.media_type.is_none() {
        merged.media_type = secondary.media_type.clone();
    }
    if merged.platform.is_none() {
        merged.platform = secondary.platform.clone();
    }
    if merged.year.is_none() {
        merged.year = secondary.year;
    }
    for genre in &secondary.genres {
        if !merged.genres.contains(genre) {
            merged.genres.push(genre.clone());
        }
    }
    merged.relevance = primary.relevance.max(secondary.relevance);
    merged
}

fn signals_for(
    candidate: &Candidate,
    record: Option<&AvailabilityRecord>,
    producer_count: usize,
    ctx: &ExecutionContext,
) -> TrustSignals {
    let item = &candidate.item;
    let mut signals = TrustSignals::neutral(ctx.timestamp);

    signals.relevance = item.relevance.clamp(0.0, 1.0);
    signals.cross_source_agreement = if producer_count > 0 {
        candidate.sources.len() as f64 / producer_count as f64
    } else {
        0.0
    };

    // Field coverage out of the four optional descriptors
    let present = [
        item.media_type.is_some(),
        !item.genres.is_empty(),
        item.platform.is_some(),
        item.year.is_some(),
    ]
    .iter()
    .filter(|p| **p)
    .count();
    signals.metadata_completeness = present as f64 / 4.0;
    signals.metadata_consistency = signals.cross_source_agreement.max(0.5);

    if let Some(record) = record {
        signals.availability_confirmed = record.available;
        signals.availability_checked_at = Some(ctx.timestamp);
        signals.platform_coverage = if ctx.entities.platforms.is_empty() {
            if record.platforms.is_empty() { 0.0 } else { 1.0 }
        } else {
            let covered = ctx
                .entities
                .platforms
                .iter()
                .filter(|p| record.platforms.contains(p))
                .count();
            covered as f64 / ctx.entities.platforms.len() as f64
        };
    }

    // Personalized producers raise the recommendation and preference
    // signals; the curator only speaks for users it has history on.
    let personalized = candidate
        .sources
        .iter()
        .any(|s| matches!(s, AgentName::RecommendationBuilder | AgentName::MemoryCurator));
    if personalized {
        signals.personalization = 0.8;
    }
    if let Some(user_context) = &ctx.user_context {
        signals.history_depth = 0.8;
        signals.preference_match = preference_match(item, user_context);
    }

    signals
}

/// Overlap between the item's genres and the user's liked genres
fn preference_match(item: &ContentItem, user_context: &serde_json::Value) -> f64 {
    let liked: Vec<&str> = user_context
        .get("liked_genres")
        .and_then(|v| v.as_array())
        .map(|genres| genres.iter().filter_map(|g| g.as_str()).collect())
        .unwrap_or_default();
    if liked.is_empty() || item.genres.is_empty() {
        return 0.5;
    }
    let matched = item
        .genres
        .iter()
        .filter(|g| liked.contains(&g.as_str()))
        .count();
    matched as f64 / item.genres.len() as f64
}

/// Walk the ranked list keeping per-genre and per-platform counts; items
/// past a cap are dropped, never reordered
fn apply_diversity_caps(
    ranked: Vec<ScoredItem>,
    config: &OrchestratorConfig,
) -> Vec<ScoredItem> {
    let mut genre_counts: HashMap<String, usize> = HashMap::new();
    let mut platform_counts: HashMap<String, usize> = HashMap::new();
    let mut kept = Vec::with_capacity(ranked.len());

    for scored in ranked {
        // Primary genre only; a multi-genre item is not multiply penalized
        let genre = scored.item.genres.first().cloned();
        if let Some(genre) = &genre {
            if genre_counts.get(genre).copied().unwrap_or(0) >= config.max_per_genre {
                continue;
            }
        }
        let platform = scored.item.platform.clone();
        if let Some(platform) = &platform {
            if platform_counts.get(platform).copied().unwrap_or(0) >= config.max_per_platform {
                continue;
            }
        }
        if let Some(genre) = genre {
            *genre_counts.entry(genre).or_insert(0) += 1;
        }
        if let Some(platform) = platform {
            *platform_counts.entry(platform).or_insert(0) += 1;
        }
        kept.push(scored);
    }
    kept
}

fn explain(scored: &ScoredItem, rank: usize) -> String {
    let mut reasons = Vec::new();
    if scored.sources.len() > 1 {
        reasons.push(format!("agreed on by {} agents", scored.sources.len()));
    }
    if let Some(record) = &scored.availability {
        if record.available {
            if let Some(platform) = record.platforms.first() {
                reasons.push(format!("available now on {}", platform));
            } else {
                reasons.push("availability confirmed".to_string());
            }
        }
    }
    if scored.trust.preference_confidence > 0.6 {
        reasons.push("matches your viewing preferences".to_string());
    }
    if reasons.is_empty() {
        reasons.push("strong catalog match for your query".to_string());
    }
    format!("#{}: {}", rank + 1, reasons.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedEntities, QueryIntent};
    use chrono::Utc;

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            query_id: "q-agg".to_string(),
            user_id: "u-1".to_string(),
            query: "find sci-fi shows".to_string(),
            region: "US".to_string(),
            devices: vec![],
            intents: vec![QueryIntent::Search],
            entities: ExtractedEntities::default(),
            user_context: None,
            pattern_fingerprint: None,
            timestamp: Utc::now(),
            metadata: Default::default(),
        }
    }

    fn item(id: &str, relevance: f64) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            title: id.to_string(),
            media_type: Some("series".to_string()),
            genres: vec!["sci-fi".to_string()],
            platform: Some("netflix".to_string()),
            year: Some(2024),
            relevance,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_higher_relevance_outranks_lower() {
        let results = vec![(
            AgentName::ContentSearcher,
            AgentResult::SearchResult {
                items: vec![item("tt-low", 0.4), item("tt-high", 0.9)],
                total: 2,
            },
        )];
        let ranked = aggregate(&results, &ctx(), &OrchestratorConfig::default());
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].item.id, "tt-high");
        assert_eq!(ranked[1].item.id, "tt-low");
        assert!(ranked[0].trust.composite >= ranked[1].trust.composite);
    }

    #[test]
    fn test_cross_source_duplicate_collapses_and_scores_higher() {
        let duplicated = vec![
            (
                AgentName::ContentSearcher,
                AgentResult::SearchResult {
                    items: vec![item("tt-dup", 0.7)],
                    total: 1,
                },
            ),
            (
                AgentName::RecommendationBuilder,
                AgentResult::RecommendResult {
                    items: vec![item("tt-dup", 0.7)],
                },
            ),
        ];
        let single = vec![duplicated[0].clone()];

        let config = OrchestratorConfig::default();
        let merged = aggregate(&duplicated, &ctx(), &config);
        let alone = aggregate(&single, &ctx(), &config);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].sources.len(), 2);
        assert!(merged[0].trust.composite > alone[0].trust.composite);
    }

    #[test]
    fn test_availability_joins_by_content_id() {
        let results = vec![
            (
                AgentName::ContentSearcher,
                AgentResult::SearchResult {
                    items: vec![item("tt-1", 0.8)],
                    total: 1,
                },
            ),
            (
                AgentName::AvailabilityChecker,
                AgentResult::AvailabilityResult {
                    records: vec![AvailabilityRecord {
                        content_id: "tt-1".to_string(),
                        available: true,
                        platforms: vec!["netflix".to_string()],
                        restrictions: vec![],
                        expires_at: None,
                    }],
                },
            ),
        ];
        let ranked = aggregate(&results, &ctx(), &OrchestratorConfig::default());
        let record = ranked[0].availability.as_ref().unwrap();
        assert!(record.available);
        assert!(ranked[0].trust.availability_confidence > 0.5);
    }

    #[test]
    fn test_low_trust_items_are_dropped() {
        let mut sparse = item("tt-sparse", 0.05);
        sparse.media_type = None;
        sparse.genres = vec![];
        sparse.platform = None;
        sparse.year = None;

        let results = vec![(
            AgentName::ContentSearcher,
            AgentResult::SearchResult {
                items: vec![sparse],
                total: 1,
            },
        )];
        let mut config = OrchestratorConfig::default();
        config.min_trust = 0.45;
        assert!(aggregate(&results, &ctx(), &config).is_empty());
    }

    #[test]
    fn test_genre_cap_limits_a_run_of_one_genre() {
        let items: Vec<ContentItem> = (0..6).map(|i| item(&format!("tt-{i}"), 0.8)).collect();
        let results = vec![(
            AgentName::ContentSearcher,
            AgentResult::SearchResult {
                total: items.len() as u64,
                items,
            },
        )];
        let mut config = OrchestratorConfig::default();
        config.max_per_genre = 3;
        config.max_per_platform = 10;
        let ranked = aggregate(&results, &ctx(), &config);
        assert_eq!(ranked.len(), 3);
    }

    #[test]
    fn test_top_items_carry_explanations() {
        let results = vec![(
            AgentName::ContentSearcher,
            AgentResult::SearchResult {
                items: vec![item("tt-1", 0.9), item("tt-2", 0.8)],
                total: 2,
            },
        )];
        let mut config = OrchestratorConfig::default();
        config.explain_top_n = 1;
        let ranked = aggregate(&results, &ctx(), &config);
        assert!(ranked[0].explanation.is_some());
        assert!(ranked[1].explanation.is_none());
    }

    #[test]
    fn test_equal_scores_tie_break_on_id() {
        let results = vec![(
            AgentName::ContentSearcher,
            AgentResult::SearchResult {
                items: vec![item("tt-b", 0.8), item("tt-a", 0.8)],
                total: 2,
            },
        )];
        let ranked = aggregate(&results, &ctx(), &OrchestratorConfig::default());
        assert_eq!(ranked[0].item.id, "tt-a");
        assert_eq!(ranked[1].item.id, "tt-b");
    }
}
