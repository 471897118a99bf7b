//! # Reasoning Bank
//!
//! In-memory cache of successful execution strategies keyed by query
//! fingerprint. A hit lets the Pseudocode stage skip derivation and reuse
//! a plan that worked before. Bounded LRU with a TTL; every mutation is
//! written through to the durable store when one is attached.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::config::PatternConfig;
use crate::models::ExecutionStrategy;

use super::store::{PatternStore, StoredPattern};

/// Exponential moving average weight for new quality observations
const QUALITY_ALPHA: f64 = 0.3;

/// One cached pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    pub fingerprint: String,
    pub strategy: ExecutionStrategy,
    /// Moving average of outcome quality, [0, 1]
    pub quality: f64,
    pub uses: u64,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BankStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// The pattern cache. Interior mutability so the coordinator can share it
/// behind an `Arc` without a write lock around the whole pipeline.
pub struct ReasoningBank {
    config: PatternConfig,
    store: Option<PatternStore>,
    inner: Mutex<BankInner>,
}

#[derive(Default)]
struct BankInner {
    patterns: HashMap<String, Pattern>,
    stats: BankStats,
}

impl ReasoningBank {
    pub fn new(config: PatternConfig) -> Self {
        Self {
            config,
            store: None,
            inner: Mutex::new(BankInner::default()),
        }
    }

    /// Attach durable storage and warm the cache from it. Rows already past
    /// their TTL are dropped during the load.
    pub fn with_store(config: PatternConfig, store: PatternStore) -> anyhow::Result<Self> {
        let bank = Self {
            config,
            store: Some(store),
            inner: Mutex::new(BankInner::default()),
        };
        bank.warm()?;
        Ok(bank)
    }

    fn warm(&self) -> anyhow::Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let now = Utc::now();
        let ttl = Duration::seconds(self.config.ttl_secs);
        let mut inner = self.inner.lock().expect("pattern bank poisoned");
        for row in store.load_all()? {
            let last_used = row
                .last_used
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| now - ttl);
            if now - last_used >= ttl {
                store.remove(&row.fingerprint).ok();
                continue;
            }
            if inner.patterns.len() >= self.config.capacity {
                break;
            }
            inner.patterns.insert(
                row.fingerprint.clone(),
                Pattern {
                    fingerprint: row.fingerprint,
                    strategy: row.strategy,
                    quality: row.quality,
                    uses: row.uses,
                    created_at: row.created_at.parse().unwrap_or(now),
                    last_used,
                },
            );
        }
        tracing::info!(patterns = inner.patterns.len(), "pattern bank warmed");
        Ok(())
    }

    /// Look up a strategy worth reusing. Expired entries are purged on
    /// contact; entries below the quality floor miss but survive, so
    /// further outcomes can rehabilitate them.
    pub fn lookup(&self, fingerprint: &str) -> Option<Pattern> {
        let now = Utc::now();
        let ttl = Duration::seconds(self.config.ttl_secs);
        let mut inner = self.inner.lock().expect("pattern bank poisoned");

        let expired = matches!(
            inner.patterns.get(fingerprint),
            Some(p) if now - p.last_used >= ttl
        );
        if expired {
            inner.patterns.remove(fingerprint);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            if let Some(store) = &self.store {
                store.remove(fingerprint).ok();
            }
            return None;
        }

        match inner.patterns.get_mut(fingerprint) {
            Some(pattern) if pattern.quality >= self.config.min_quality => {
                pattern.last_used = now;
                pattern.uses += 1;
                let snapshot = pattern.clone();
                inner.stats.hits += 1;
                if let Some(store) = &self.store {
                    store.upsert(&to_row(&snapshot)).ok();
                }
                Some(snapshot)
            }
            _ => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Record the strategy and outcome quality of a completed query.
    /// Quality folds into the existing entry as a moving average; a new
    /// fingerprint may evict the least recently used entry.
    pub fn upsert(&self, fingerprint: &str, strategy: &ExecutionStrategy, quality: f64) {
        let quality = quality.clamp(0.0, 1.0);
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("pattern bank poisoned");

        let pattern = match inner.patterns.get_mut(fingerprint) {
            Some(existing) => {
                existing.quality = (1.0 - QUALITY_ALPHA) * existing.quality + QUALITY_ALPHA * quality;
                existing.strategy = strategy.clone();
                existing.last_used = now;
                existing.uses += 1;
                existing.clone()
            }
            None => {
                if inner.patterns.len() >= self.config.capacity {
                    if let Some(oldest) = inner
                        .patterns
                        .values()
                        .min_by_key(|p| p.last_used)
                        .map(|p| p.fingerprint.clone())
                    {
                        inner.patterns.remove(&oldest);
                        inner.stats.evictions += 1;
                        if let Some(store) = &self.store {
                            store.remove(&oldest).ok();
                        }
                    }
                }
                let pattern = Pattern {
                    fingerprint: fingerprint.to_string(),
                    strategy: strategy.clone(),
                    quality,
                    uses: 1,
                    created_at: now,
                    last_used: now,
                };
                inner
                    .patterns
                    .insert(fingerprint.to_string(), pattern.clone());
                pattern
            }
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.upsert(&to_row(&pattern)) {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "pattern write-through failed");
            }
        }
    }

    pub fn stats(&self) -> BankStats {
        self.inner.lock().expect("pattern bank poisoned").stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("pattern bank poisoned").patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn to_row(pattern: &Pattern) -> StoredPattern {
    StoredPattern {
        fingerprint: pattern.fingerprint.clone(),
        strategy: pattern.strategy.clone(),
        quality: pattern.quality,
        uses: pattern.uses,
        created_at: pattern.created_at.to_rfc3339(),
        last_used: pattern.last_used.to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentName, ExecutionMode};
    use crate::state::db::PrismDb;

    fn strategy() -> ExecutionStrategy {
        ExecutionStrategy {
            required_agents: vec![AgentName::ContentSearcher],
            mode: ExecutionMode::Sequential,
            timeout_ms: 4_000,
            fallback: None,
        }
    }

    fn config(capacity: usize) -> PatternConfig {
        PatternConfig {
            capacity,
            ttl_secs: 3_600,
            min_quality: 0.5,
        }
    }

    #[test]
    fn test_lookup_hit_after_upsert() {
        let bank = ReasoningBank::new(config(8));
        assert!(bank.lookup("fp-1").is_none());
        bank.upsert("fp-1", &strategy(), 0.9);

        let hit = bank.lookup("fp-1").unwrap();
        assert_eq!(hit.strategy, strategy());
        let stats = bank.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_low_quality_entries_do_not_hit() {
        let bank = ReasoningBank::new(config(8));
        bank.upsert("fp-1", &strategy(), 0.2);
        assert!(bank.lookup("fp-1").is_none());

        // Good outcomes pull the average back over the floor
        bank.upsert("fp-1", &strategy(), 1.0);
        bank.upsert("fp-1", &strategy(), 1.0);
        bank.upsert("fp-1", &strategy(), 1.0);
        assert!(bank.lookup("fp-1").is_some());
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let bank = ReasoningBank::new(config(2));
        bank.upsert("fp-old", &strategy(), 0.9);
        bank.upsert("fp-mid", &strategy(), 0.9);
        // Touch fp-old so fp-mid becomes the LRU entry
        bank.lookup("fp-old").unwrap();

        bank.upsert("fp-new", &strategy(), 0.9);
        assert_eq!(bank.len(), 2);
        assert!(bank.lookup("fp-mid").is_none());
        assert!(bank.lookup("fp-old").is_some());
        assert!(bank.lookup("fp-new").is_some());
        assert_eq!(bank.stats().evictions, 1);
    }

    #[test]
    fn test_quality_moves_as_average_not_replacement() {
        let bank = ReasoningBank::new(config(8));
        bank.upsert("fp-1", &strategy(), 1.0);
        bank.upsert("fp-1", &strategy(), 0.0);
        let pattern = bank.lookup("fp-1").unwrap();
        // One bad outcome dents the average, it does not zero it
        assert!(pattern.quality > 0.5);
        assert!(pattern.quality < 1.0);
    }

    #[test]
    fn test_write_through_and_warm_restart() {
        let db = PrismDb::open_in_memory().unwrap();
        {
            let bank =
                ReasoningBank::with_store(config(8), PatternStore::new(&db)).unwrap();
            bank.upsert("fp-1", &strategy(), 0.8);
        }
        // Same connection plays the role of the surviving database
        let bank = ReasoningBank::with_store(config(8), PatternStore::new(&db)).unwrap();
        let hit = bank.lookup("fp-1").unwrap();
        assert_eq!(hit.strategy, strategy());
        assert!((hit.quality - 0.8).abs() < 1e-9);
    }
}
