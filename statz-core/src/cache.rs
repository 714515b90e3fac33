//! The concurrent per-entity statistics cache.
//!
//! Backed by a sharded [`DashMap`] of `Arc<EntityInfo>` snapshots. `add`
//! merges outside any lock and then publishes the result with a
//! compare-and-swap on the cached `Arc`: the shard lock is held only for a
//! pointer comparison and swap. If another write landed in between, the
//! merge is redone against the newer snapshot, so concurrent adds for the
//! same entity never lose an update.
//!
//! Readers observe either the previous or the merged snapshot, never a
//! half-merged one.
//!
//! Every slot also remembers whether it includes the entity's stored
//! history. Slots created by `add` for an entity that was never loaded hold
//! only new records; storage code folds the stored aggregate in with
//! [`CacheStore::rebase_on_stored`] before saving them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tracing::{debug, trace, warn};

use crate::config::CacheConfig;
use crate::entity::EntityInfo;
use crate::error::{Result, StatzError};
use crate::metrics::{CacheCounters, LatencyMonitor, spans};
use crate::types::EntityId;

#[derive(Debug)]
struct Slot {
    info: Arc<EntityInfo>,
    loaded: bool,
}

/// A cached snapshot together with its origin.
#[derive(Debug, Clone)]
pub struct CachedSnapshot {
    /// The cached aggregate.
    pub info: Arc<EntityInfo>,
    /// Whether the aggregate includes the entity's stored history, i.e. it
    /// was registered or loaded rather than started by `add`.
    pub loaded: bool,
}

/// Process-wide cache of merged statistics, keyed by entity.
#[derive(Debug)]
pub struct CacheStore {
    entries: DashMap<EntityId, Slot>,
    dirty: DashSet<EntityId>,
    counters: CacheCounters,
    merge_latency: LatencyMonitor,
    slow_merge: Duration,
}

impl CacheStore {
    /// Create a cache with default sizing.
    #[must_use]
    pub fn new() -> Self {
        let defaults = CacheConfig::default();
        Self {
            entries: DashMap::new(),
            dirty: DashSet::new(),
            counters: CacheCounters::new(),
            merge_latency: LatencyMonitor::default(),
            slow_merge: Duration::from_secs_f64(defaults.slow_merge_warn_ms / 1000.0),
        }
    }

    /// Create a cache sized by `config`.
    ///
    /// # Errors
    /// Returns [`StatzError::Config`] unless `shard_amount` is a power of two
    /// greater than one, or if the slow-merge threshold is negative.
    pub fn with_config(config: &CacheConfig) -> Result<Self> {
        if config.shard_amount <= 1 || !config.shard_amount.is_power_of_two() {
            return Err(StatzError::Config(format!(
                "cache.shard_amount must be a power of two greater than 1, got {}",
                config.shard_amount
            )));
        }
        let slow_merge = Duration::try_from_secs_f64(config.slow_merge_warn_ms / 1000.0)
            .map_err(|e| StatzError::Config(format!("cache.slow_merge_warn_ms: {e}")))?;

        Ok(Self {
            entries: DashMap::with_capacity_and_shard_amount(
                config.initial_capacity,
                config.shard_amount,
            ),
            dirty: DashSet::new(),
            counters: CacheCounters::new(),
            merge_latency: LatencyMonitor::default(),
            slow_merge,
        })
    }

    /// Store `info` for `id`, overwriting whatever was cached. No merge.
    ///
    /// Used for initial population, e.g. after loading from storage, so the
    /// entity is not marked as changed and counts as loaded.
    ///
    /// # Errors
    /// Returns [`StatzError::NullData`] if `info` is `None`; the cache is
    /// left untouched.
    pub fn register(&self, id: EntityId, info: impl Into<Option<EntityInfo>>) -> Result<()> {
        let info = self.require(id, info.into())?;
        let records = info.total_count();
        self.entries.insert(
            id,
            Slot {
                info: Arc::new(info),
                loaded: true,
            },
        );
        CacheCounters::bump(&self.counters.registers);
        debug!(entity = %id, records, "Registered cached statistics");
        Ok(())
    }

    /// Merge `info` into the cached data for `id`.
    ///
    /// Without cached data this behaves like [`CacheStore::register`], except
    /// that the new entry is marked as changed and not loaded. Otherwise the
    /// cached aggregate is merged with `info` and the result replaces it,
    /// atomically with respect to every other write for `id`.
    ///
    /// # Errors
    /// Returns [`StatzError::NullData`] if `info` is `None`; the cache is
    /// left untouched.
    pub fn add(&self, id: EntityId, info: impl Into<Option<EntityInfo>>) -> Result<()> {
        let info = Arc::new(self.require(id, info.into())?);
        let _span = tracing::trace_span!(spans::CACHE_ADD, entity = %id).entered();
        let start = Instant::now();

        loop {
            let current = self.entries.get(&id).map(|slot| Arc::clone(&slot.info));
            let next = match &current {
                Some(cached) => Arc::new(cached.merge(&info)),
                None => Arc::clone(&info),
            };
            if self.publish(id, current.as_ref(), next) {
                if current.is_some() {
                    CacheCounters::bump(&self.counters.merges);
                }
                break;
            }
            CacheCounters::bump(&self.counters.conflicts);
            trace!(entity = %id, "Entry changed during merge, retrying");
        }

        // Only mark after the write is visible, so a flush that drains the
        // flag always sees this update.
        self.dirty.insert(id);
        CacheCounters::bump(&self.counters.adds);

        let elapsed = start.elapsed();
        self.merge_latency.record(elapsed);
        if elapsed > self.slow_merge {
            warn!(
                entity = %id,
                elapsed_us = elapsed.as_micros(),
                "Slow statistics merge"
            );
        } else {
            trace!(entity = %id, elapsed_us = elapsed.as_micros(), "Merged statistics");
        }
        Ok(())
    }

    /// Swap in `next` if the entry still holds `expected` (or is still
    /// vacant when `expected` is `None`).
    fn publish(&self, id: EntityId, expected: Option<&Arc<EntityInfo>>, next: Arc<EntityInfo>) -> bool {
        match (self.entries.entry(id), expected) {
            (Entry::Occupied(mut entry), Some(expected))
                if Arc::ptr_eq(&entry.get().info, expected) =>
            {
                entry.get_mut().info = next;
                true
            }
            (Entry::Vacant(entry), None) => {
                entry.insert(Slot {
                    info: next,
                    loaded: false,
                });
                true
            }
            _ => false,
        }
    }

    fn require(&self, id: EntityId, info: Option<EntityInfo>) -> Result<EntityInfo> {
        info.ok_or_else(|| {
            CacheCounters::bump(&self.counters.rejected);
            warn!(entity = %id, "Rejected cache write without data");
            StatzError::NullData
        })
    }

    /// Fold an entity's stored history into the cache.
    ///
    /// - nothing cached: `stored` is cached as loaded
    /// - cached data started by `add`: the cached records are merged on top
    ///   of `stored`, so newer values win and log entries follow the stored
    ///   ones
    /// - already loaded: nothing changes
    ///
    /// Returns whether the cache changed.
    pub fn load_stored(&self, id: EntityId, stored: EntityInfo) -> bool {
        self.attach_stored(id, stored, true)
    }

    /// Like [`CacheStore::load_stored`], but never creates an entry.
    ///
    /// Used before saving an entry that was started by `add`, so the saved
    /// aggregate never drops the stored history.
    pub fn rebase_on_stored(&self, id: EntityId, stored: EntityInfo) -> bool {
        self.attach_stored(id, stored, false)
    }

    fn attach_stored(&self, id: EntityId, stored: EntityInfo, create: bool) -> bool {
        match self.entries.entry(id) {
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                if slot.loaded {
                    return false;
                }
                slot.info = Arc::new(stored.merge(&slot.info));
                slot.loaded = true;
                debug!(entity = %id, "Merged stored statistics under cached updates");
                true
            }
            Entry::Vacant(entry) if create => {
                entry.insert(Slot {
                    info: Arc::new(stored),
                    loaded: true,
                });
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Current snapshot for `id`.
    ///
    /// An absent or unknown id yields `None`; that is "no data yet", not an
    /// error.
    pub fn get(&self, id: impl Into<Option<EntityId>>) -> Option<Arc<EntityInfo>> {
        self.snapshot(id).map(|cached| cached.info)
    }

    /// Current snapshot for `id` along with whether it includes stored
    /// history.
    pub fn snapshot(&self, id: impl Into<Option<EntityId>>) -> Option<CachedSnapshot> {
        let id = id.into()?;
        let found = self.entries.get(&id).map(|slot| CachedSnapshot {
            info: Arc::clone(&slot.info),
            loaded: slot.loaded,
        });
        if found.is_some() {
            CacheCounters::bump(&self.counters.hits);
        } else {
            CacheCounters::bump(&self.counters.misses);
            trace!(entity = %id, "No cached statistics");
        }
        found
    }

    /// Whether the entry for `id` includes stored history; `None` when
    /// nothing is cached.
    #[must_use]
    pub fn is_loaded(&self, id: EntityId) -> Option<bool> {
        self.entries.get(&id).map(|slot| slot.loaded)
    }

    /// Evict one entity, returning its last snapshot.
    pub fn remove(&self, id: EntityId) -> Option<Arc<EntityInfo>> {
        self.dirty.remove(&id);
        let removed = self.entries.remove(&id).map(|(_, slot)| slot.info);
        if removed.is_some() {
            CacheCounters::bump(&self.counters.removals);
            debug!(entity = %id, "Evicted cached statistics");
        }
        removed
    }

    /// Evict `id` only if it still holds exactly `expected`.
    ///
    /// Returns `false` when a write replaced the snapshot since it was read;
    /// the caller then has newer data to save first.
    pub fn remove_if_unchanged(&self, id: EntityId, expected: &Arc<EntityInfo>) -> bool {
        let removed = self
            .entries
            .remove_if(&id, |_, slot| Arc::ptr_eq(&slot.info, expected))
            .is_some();
        if removed {
            CacheCounters::bump(&self.counters.removals);
            debug!(entity = %id, "Evicted cached statistics");
        }
        removed
    }

    /// Drop every cached entity.
    pub fn clear(&self) {
        let evicted = self.entries.len() as u64;
        self.entries.clear();
        self.dirty.clear();
        self.counters
            .removals
            .fetch_add(evicted, std::sync::atomic::Ordering::Relaxed);
        debug!(evicted, "Cleared statistics cache");
    }

    /// Whether anything is cached for `id`.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of cached entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of every cached entity.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }

    /// Drain the set of entities changed by `add` since the last call.
    #[must_use]
    pub fn take_dirty(&self) -> Vec<EntityId> {
        let ids: Vec<EntityId> = self.dirty.iter().map(|id| *id.key()).collect();
        ids.into_iter()
            .filter(|id| self.dirty.remove(id).is_some())
            .collect()
    }

    /// Flag `id` as changed, e.g. after a failed save.
    pub fn mark_dirty(&self, id: EntityId) {
        if self.contains(id) {
            self.dirty.insert(id);
        }
    }

    /// Whether `id` has unsaved changes.
    #[must_use]
    pub fn is_dirty(&self, id: EntityId) -> bool {
        self.dirty.contains(&id)
    }

    /// Activity counters.
    #[must_use]
    pub fn counters(&self) -> &CacheCounters {
        &self.counters
    }

    /// Timings of recent `add` calls.
    #[must_use]
    pub fn merge_latency(&self) -> &LatencyMonitor {
        &self.merge_latency
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}
