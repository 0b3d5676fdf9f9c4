// Replacement policy for a full cache.
use crate::infrastructure::storage::cache::CacheEntry;
use std::collections::HashMap;
use std::time::Instant;

/// Picks the entry to replace when the cache is at capacity.
///
/// The cache only consults the policy once every slot is occupied; a free
/// slot is always preferred over an eviction. Returns the map key of the
/// victim, or `None` when there is nothing to evict.
pub trait EvictionPolicy: Send + Sync {
    fn select_victim(&self, now: Instant, entries: &HashMap<String, CacheEntry>) -> Option<String>;
}

/// The canonical policy: evict the entry with the highest weight, i.e. the
/// one that is oldest, least read and longest idle, blending recency and
/// frequency into a single score. Ties break to the lexicographically
/// smallest key so the choice is deterministic regardless of map iteration
/// order.
pub struct WeightedEviction;

impl EvictionPolicy for WeightedEviction {
    fn select_victim(&self, now: Instant, entries: &HashMap<String, CacheEntry>) -> Option<String> {
        let mut victim: Option<(&String, f64)> = None;

        for (key, entry) in entries {
            let weight = entry.weight(now);
            victim = match victim {
                None => Some((key, weight)),
                Some((best_key, best_weight)) => {
                    if weight > best_weight
                        || (weight == best_weight && key.as_str() < best_key.as_str())
                    {
                        Some((key, weight))
                    } else {
                        Some((best_key, best_weight))
                    }
                }
            };
        }

        victim.map(|(key, _)| key.clone())
    }
}
