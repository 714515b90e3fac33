//! Persistence of cached entities.
//!
//! The cache tracks which entities were touched by `add` since the last
//! drain. A flush takes that set, saves the current snapshot of each entity
//! and puts failed ids back so the next flush retries them.
//!
//! Every load and save goes through a [`Persister`], which serializes store
//! I/O per entity with a striped lock. An entry created by `add` before the
//! player's stored history was read is only a partial aggregate: it is
//! rebased on the stored data before it is ever written, so a late event
//! can never overwrite what was saved on quit.

use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use statz_core::error::Result;
use statz_core::metrics::{CacheCounters, spans};
use statz_core::types::EntityId;
use statz_core::{CacheStore, EntityInfo, StatStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Number of persistence lock stripes.
const LOCK_STRIPES: usize = 64;

/// Outcome of one or more flushes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Entities written to the store.
    pub saved: usize,
    /// Entities whose save failed and were re-queued.
    pub failed: usize,
}

impl AddAssign for FlushReport {
    fn add_assign(&mut self, other: Self) {
        self.saved += other.saved;
        self.failed += other.failed;
    }
}

/// Moves entities between the cache and a [`StatStore`].
///
/// Loads and saves of one entity never overlap; different entities only
/// wait on each other when they share a lock stripe. Recording through
/// [`CacheStore::add`] never takes these locks.
pub struct Persister {
    cache: Arc<CacheStore>,
    store: Arc<dyn StatStore>,
    locks: Box<[Mutex<()>]>,
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("cached", &self.cache.len())
            .field("stripes", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl Persister {
    #[must_use]
    pub fn new(cache: Arc<CacheStore>, store: Arc<dyn StatStore>) -> Self {
        Self {
            cache,
            store,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn StatStore> {
        &self.store
    }

    fn lock_for(&self, id: EntityId) -> MutexGuard<'_, ()> {
        let stripe = usize::from(id.0.as_bytes()[15]) % self.locks.len();
        self.locks[stripe].lock()
    }

    fn read_stored(&self, id: EntityId) -> Result<EntityInfo> {
        let _span = tracing::debug_span!(spans::PERSIST_LOAD, entity = %id).entered();
        Ok(self.store.load(id)?.unwrap_or_default())
    }

    /// Bring `id`'s stored statistics into the cache.
    ///
    /// Updates recorded before the load are kept on top of the stored data.
    /// An entity whose stored data is already attached is left alone.
    ///
    /// # Errors
    /// Store failures. The cache is unchanged.
    pub fn load(&self, id: EntityId) -> Result<()> {
        let _guard = self.lock_for(id);
        if self.cache.is_loaded(id) == Some(true) {
            debug!(entity = %id, "Player already cached");
            return Ok(());
        }
        let stored = self.read_stored(id)?;
        let records = stored.total_count();
        self.cache.load_stored(id, stored);
        info!(entity = %id, records, "Loaded player statistics");
        Ok(())
    }

    /// Write `id`'s current snapshot, rebasing a partial entry on the stored
    /// data first. Returns the snapshot written, or `None` if `id` is not
    /// cached. The caller holds `id`'s lock.
    fn save_locked(&self, id: EntityId) -> Result<Option<Arc<EntityInfo>>> {
        loop {
            let Some(cached) = self.cache.snapshot(id) else {
                return Ok(None);
            };
            if !cached.loaded {
                let stored = self.read_stored(id).inspect_err(|_| self.cache.mark_dirty(id))?;
                self.cache.rebase_on_stored(id, stored);
                continue;
            }

            let _span = tracing::debug_span!(spans::PERSIST_SAVE, entity = %id).entered();
            if let Err(e) = self.store.save(id, &cached.info) {
                self.cache.mark_dirty(id);
                return Err(e);
            }
            return Ok(Some(cached.info));
        }
    }

    /// Save `id` if it is cached. Returns whether anything was written.
    ///
    /// # Errors
    /// Store failures. The entity stays marked as changed.
    pub fn save(&self, id: EntityId) -> Result<bool> {
        let _guard = self.lock_for(id);
        Ok(self.save_locked(id)?.is_some())
    }

    /// Save `id` and evict it.
    ///
    /// The entry is only removed while it still holds exactly what was
    /// written; an update that lands in between is saved by another round.
    ///
    /// # Errors
    /// Store failures. The entity stays cached and marked as changed.
    pub fn save_and_evict(&self, id: EntityId) -> Result<bool> {
        let _guard = self.lock_for(id);
        let mut saved_any = false;
        while let Some(saved) = self.save_locked(id)? {
            saved_any = true;
            if self.cache.remove_if_unchanged(id, &saved) {
                info!(entity = %id, "Saved and evicted player statistics");
                break;
            }
            debug!(entity = %id, "Statistics changed during eviction, saving again");
        }
        Ok(saved_any)
    }

    /// Save every entity changed since the previous flush.
    ///
    /// Entities evicted between the change and the flush are skipped;
    /// eviction does its own final save.
    pub fn flush_dirty(&self) -> FlushReport {
        let _span = tracing::debug_span!(spans::FLUSH).entered();
        let mut report = FlushReport::default();

        for id in self.cache.take_dirty() {
            match self.save(id) {
                Ok(true) => {
                    report.saved += 1;
                    CacheCounters::bump(&self.cache.counters().saves_completed);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(entity = %id, error = %e, "Failed to save statistics, will retry");
                    report.failed += 1;
                    CacheCounters::bump(&self.cache.counters().save_failures);
                }
            }
        }

        if report.saved + report.failed > 0 {
            info!(saved = report.saved, failed = report.failed, "Flushed statistics");
        }
        report
    }
}

async fn flush_blocking(persister: &Arc<Persister>) -> FlushReport {
    let persister = Arc::clone(persister);
    match tokio::task::spawn_blocking(move || persister.flush_dirty()).await {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "Flush task did not complete");
            FlushReport::default()
        }
    }
}

/// Flush on a fixed interval until `shutdown` turns `true` or its sender is
/// dropped, then flush one last time.
///
/// Store I/O runs on the blocking pool. The returned handle yields the
/// accumulated report.
pub fn spawn_flush_worker(
    persister: Arc<Persister>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<FlushReport> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let mut total = FlushReport::default();
        debug!(interval_ms = interval.as_millis(), "Flush worker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    total += flush_blocking(&persister).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        total += flush_blocking(&persister).await;
        info!(saved = total.saved, failed = total.failed, "Flush worker stopped");
        total
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicBool, Ordering};

    use statz_core::StatType;
    use statz_core::SpecificationRegistry;
    use statz_core::error::StatzError;
    use statz_core::types::Value;

    /// In-memory store that can be told to fail.
    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Vec<(EntityId, EntityInfo)>>,
        failing: AtomicBool,
        /// Recorded into the cache during the first save, as a game thread
        /// would while the write is in flight.
        during_first_save: OnceLock<(Arc<CacheStore>, EntityInfo)>,
    }

    impl StatStore for MemoryStore {
        fn load(&self, id: EntityId) -> Result<Option<EntityInfo>> {
            Ok(self
                .saved
                .lock()
                .iter()
                .rev()
                .find(|(saved, _)| *saved == id)
                .map(|(_, info)| info.clone()))
        }

        fn save(&self, id: EntityId, info: &EntityInfo) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StatzError::Serialization("store offline".into()));
            }
            let first = {
                let mut saved = self.saved.lock();
                saved.push((id, info.clone()));
                saved.len() == 1
            };
            if first {
                if let Some((cache, extra)) = self.during_first_save.get() {
                    cache.add(id, extra.clone())?;
                }
            }
            Ok(())
        }

        fn delete(&self, _id: EntityId) -> Result<bool> {
            Ok(false)
        }
    }

    fn joins(count: i64) -> EntityInfo {
        let registry = SpecificationRegistry::with_defaults();
        EntityInfo::new().with_record(
            registry
                .build(&StatType::Joins, [("count", Value::Integer(count))])
                .expect("record"),
        )
    }

    fn join_total(info: &EntityInfo) -> f64 {
        info.total(&StatType::Joins, "count").expect("total")
    }

    fn persister(store: &Arc<MemoryStore>) -> Persister {
        Persister::new(
            Arc::new(CacheStore::new()),
            Arc::clone(store) as Arc<dyn StatStore>,
        )
    }

    #[test]
    fn only_changed_entities_are_saved() {
        let store = Arc::new(MemoryStore::default());
        let persister = persister(&store);
        let cache = persister.cache();
        let (loaded, changed) = (EntityId::new(), EntityId::new());
        cache.register(loaded, joins(1)).expect("register");
        cache.add(changed, joins(1)).expect("add");

        let report = persister.flush_dirty();
        assert_eq!(report, FlushReport { saved: 1, failed: 0 });
        assert_eq!(store.saved.lock()[0].0, changed);

        // Nothing changed since.
        assert_eq!(persister.flush_dirty(), FlushReport::default());
    }

    #[test]
    fn failed_saves_are_retried() {
        let store = Arc::new(MemoryStore::default());
        let persister = persister(&store);
        let cache = persister.cache();
        let id = EntityId::new();
        cache.add(id, joins(1)).expect("add");

        store.failing.store(true, Ordering::SeqCst);
        assert_eq!(persister.flush_dirty(), FlushReport { saved: 0, failed: 1 });
        assert!(cache.is_dirty(id));

        store.failing.store(false, Ordering::SeqCst);
        assert_eq!(persister.flush_dirty(), FlushReport { saved: 1, failed: 0 });
        let counters = cache.counters().snapshot();
        assert_eq!(counters.save_failures, 1);
        assert_eq!(counters.saves_completed, 1);
    }

    #[test]
    fn updates_for_unloaded_players_build_on_stored_history() {
        let store = Arc::new(MemoryStore::default());
        let id = EntityId::new();
        store.save(id, &joins(5)).expect("seed");
        let persister = persister(&store);

        // Recorded before the player's stored data was read.
        persister.cache().add(id, joins(1)).expect("add");
        assert_eq!(persister.flush_dirty().saved, 1);

        let written = store.load(id).expect("load").expect("saved");
        assert!((join_total(&written) - 6.0).abs() < f64::EPSILON);
        assert_eq!(persister.cache().is_loaded(id), Some(true));

        // A later join must not fold the stored data in a second time.
        persister.load(id).expect("load");
        let cached = persister.cache().get(id).expect("cached");
        assert!((join_total(&cached) - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn load_keeps_updates_recorded_before_it() {
        let store = Arc::new(MemoryStore::default());
        let id = EntityId::new();
        store.save(id, &joins(5)).expect("seed");
        let persister = persister(&store);

        persister.cache().add(id, joins(2)).expect("add");
        persister.load(id).expect("load");

        let cached = persister.cache().get(id).expect("cached");
        assert!((join_total(&cached) - 7.0).abs() < f64::EPSILON);
        assert!(persister.cache().is_dirty(id));
    }

    #[test]
    fn eviction_saves_again_when_updates_land_mid_save() {
        let store = Arc::new(MemoryStore::default());
        let persister = persister(&store);
        let id = EntityId::new();
        assert!(
            store
                .during_first_save
                .set((Arc::clone(persister.cache()), joins(1)))
                .is_ok()
        );

        persister.load(id).expect("load");
        persister.cache().add(id, joins(2)).expect("add");
        assert!(persister.save_and_evict(id).expect("evict"));

        assert!(!persister.cache().contains(id));
        assert_eq!(store.saved.lock().len(), 2);
        let written = store.load(id).expect("load").expect("saved");
        assert!((join_total(&written) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn evicting_an_unknown_player_writes_nothing() {
        let store = Arc::new(MemoryStore::default());
        let persister = persister(&store);
        assert!(!persister.save_and_evict(EntityId::new()).expect("evict"));
        assert!(store.saved.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn worker_flushes_on_interval_and_on_shutdown() {
        let store = Arc::new(MemoryStore::default());
        let persister = Arc::new(persister(&store));
        let cache = Arc::clone(persister.cache());
        let (tx, rx) = watch::channel(false);
        let worker = spawn_flush_worker(Arc::clone(&persister), Duration::from_secs(60), rx);

        let id = EntityId::new();
        cache.add(id, joins(1)).expect("add");
        tokio::time::sleep(Duration::from_secs(61)).await;
        // Let the blocking flush finish.
        while cache.is_dirty(id) || store.saved.lock().is_empty() {
            tokio::task::yield_now().await;
        }

        cache.add(id, joins(2)).expect("add");
        tx.send(true).expect("worker alive");
        let total = worker.await.expect("worker");

        assert_eq!(total, FlushReport { saved: 2, failed: 0 });
        let latest = store.load(id).expect("load").expect("saved");
        assert!((join_total(&latest) - 3.0).abs() < f64::EPSILON);
    }
}
