//! Player lifecycle facade over the cache, the store and the systems.
//!
//! On join a player's stored statistics are loaded into the cache. Events
//! are merged into the cache while they play. On quit the final snapshot
//! is saved and the player is evicted. Joins, quits and flushes of one
//! player are serialized by the [`Persister`]; recording is never blocked
//! by them.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use statz_core::config::StatzConfig;
use statz_core::error::Result;
use statz_core::suppression::{ClaimHook, RegionHook};
use statz_core::types::EntityId;
use statz_core::{CacheStore, EntityInfo, SpecificationRegistry, SqliteStore, StatStore, SuppressionManager};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::events::GameEvent;
use crate::flush::{self, FlushReport, Persister};
use crate::systems::{self, BatchOutcome, RecordOutcome, StatzContext};

/// The statistics service a game server holds for its lifetime.
pub struct StatzService {
    config: StatzConfig,
    context: StatzContext,
    persister: Arc<Persister>,
}

impl std::fmt::Debug for StatzService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatzService")
            .field("enabled", &self.config.general.enabled)
            .field("cached", &self.context.cache.len())
            .finish_non_exhaustive()
    }
}

impl StatzService {
    /// Assemble a service from already-built parts.
    ///
    /// # Errors
    /// Returns [`statz_core::StatzError::Config`] if the cache settings are
    /// invalid.
    pub fn new(
        config: StatzConfig,
        registry: Arc<SpecificationRegistry>,
        store: Arc<dyn StatStore>,
        suppression: SuppressionManager,
    ) -> Result<Self> {
        let cache = Arc::new(CacheStore::with_config(&config.cache)?);
        let persister = Arc::new(Persister::new(Arc::clone(&cache), store));
        let context = StatzContext::new(registry, cache, Arc::new(suppression));
        Ok(Self {
            config,
            context,
            persister,
        })
    }

    /// Build everything from `config`: the catalog (built-ins plus any
    /// configured specifications), the SQLite store and the suppression
    /// rules. Plugin hooks are attached afterwards with
    /// [`StatzService::with_hooks`].
    ///
    /// # Errors
    /// Fails on invalid specifications, invalid cache settings or if the
    /// database cannot be opened.
    pub fn open(config: StatzConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(
            SpecificationRegistry::from_defs(&config.specifications)
                .context("invalid statistic specification in config")?,
        );

        let store = SqliteStore::open(
            &config.persistence.database_path,
            &config.persistence,
            Arc::clone(&registry),
        )
        .with_context(|| {
            format!(
                "failed to open statistics database at {}",
                config.persistence.database_path
            )
        })?;

        let suppression = SuppressionManager::from_config(&config.suppression);
        Ok(Self::new(config, registry, Arc::new(store), suppression)?)
    }

    /// Load `path` as TOML and [`open`](StatzService::open) it.
    ///
    /// # Errors
    /// Fails if the file cannot be read or parsed, or if opening fails.
    pub fn from_config_file(path: &Path) -> anyhow::Result<Self> {
        let config = StatzConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        Self::open(config)
    }

    /// Attach region and claim plugins to the suppression rules.
    #[must_use]
    pub fn with_hooks(
        mut self,
        regions: Option<Arc<dyn RegionHook>>,
        claims: Option<Arc<dyn ClaimHook>>,
    ) -> Self {
        let mut suppression = self.context.suppression.as_ref().clone();
        if let Some(hook) = regions {
            suppression = suppression.with_region_hook(hook);
        }
        if let Some(hook) = claims {
            suppression = suppression.with_claim_hook(hook);
        }
        self.context.suppression = Arc::new(suppression);
        self
    }

    /// Load a joining player's stored statistics into the cache.
    ///
    /// A player without stored data starts with an empty aggregate. A player
    /// already cached (e.g. a quick reconnect) keeps the cached data, and
    /// events recorded before the join are kept on top of the stored data.
    ///
    /// # Errors
    /// Store failures.
    pub fn on_join(&self, player: EntityId) -> Result<()> {
        self.persister.load(player)
    }

    /// Record one gameplay event.
    ///
    /// # Errors
    /// Fails if the event cannot be turned into a valid record.
    pub fn record(&self, event: &GameEvent) -> Result<RecordOutcome> {
        if !self.config.general.enabled {
            return Ok(RecordOutcome::Disabled);
        }
        systems::record_event(event, &self.context)
    }

    /// Record a tick's worth of events.
    ///
    /// # Errors
    /// Fails if any event cannot be turned into a valid record.
    pub fn record_batch(&self, events: &[GameEvent]) -> Result<BatchOutcome> {
        if !self.config.general.enabled {
            return Ok(BatchOutcome::default());
        }
        systems::record_batch(events, &self.context)
    }

    /// Save a leaving player's statistics and evict them.
    ///
    /// Events recorded while the save is in flight are saved too before the
    /// player is evicted. When the save fails the player stays cached and marked as changed,
    /// so the flush worker retries.
    ///
    /// # Errors
    /// Store failures.
    pub fn on_quit(&self, player: EntityId) -> Result<()> {
        self.persister.save_and_evict(player).map(|_| ())
    }

    /// Current statistics of `player`, if cached.
    #[must_use]
    pub fn stats(&self, player: EntityId) -> Option<Arc<EntityInfo>> {
        self.context.cache.get(player)
    }

    /// Save every changed entity now.
    pub fn flush(&self) -> FlushReport {
        self.persister.flush_dirty()
    }

    /// Start the periodic flush worker. Send `true` on the paired sender to
    /// stop it.
    #[must_use]
    pub fn spawn_flush_worker(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<FlushReport> {
        flush::spawn_flush_worker(
            Arc::clone(&self.persister),
            Duration::from_secs(self.config.persistence.flush_interval_seconds.max(1)),
            shutdown,
        )
    }

    /// Shared state for callers that drive the systems directly.
    #[must_use]
    pub fn context(&self) -> &StatzContext {
        &self.context
    }

    /// The live cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.context.cache
    }

    /// The effective configuration.
    #[must_use]
    pub fn config(&self) -> &StatzConfig {
        &self.config
    }
}
