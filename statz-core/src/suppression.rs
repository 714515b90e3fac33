//! Location-based suppression of statistic recording.
//!
//! Server owners can disable individual statistics inside named regions
//! (region-protection plugins) or inside land claims (claim plugins). Those
//! plugins are reached through the narrow [`RegionHook`] and [`ClaimHook`]
//! traits; this module only decides whether an event should be dropped
//! before it is ever turned into records.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::DisabledAreas;
use crate::types::{EntityId, Location, StatType};

/// A region-protection plugin that knows named regions.
pub trait RegionHook: Send + Sync {
    /// Whether the plugin is installed and usable.
    fn is_available(&self) -> bool;

    /// Whether `location` lies inside the region called `region`.
    fn is_in_region(&self, location: &Location, region: &str) -> bool;
}

/// A land-claim plugin that knows claims by UUID.
pub trait ClaimHook: Send + Sync {
    /// Whether the plugin is installed and usable.
    fn is_available(&self) -> bool;

    /// Whether `location` lies inside the claim `claim`.
    fn is_in_claim(&self, location: &Location, claim: Uuid) -> bool;
}

#[derive(Debug, Clone, Default)]
struct DisabledFor {
    regions: Vec<String>,
    claims: Vec<Uuid>,
}

/// Decides whether a statistic should be recorded at a location.
#[derive(Default, Clone)]
pub struct SuppressionManager {
    disabled: BTreeMap<StatType, DisabledFor>,
    regions: Option<Arc<dyn RegionHook>>,
    claims: Option<Arc<dyn ClaimHook>>,
}

impl std::fmt::Debug for SuppressionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuppressionManager")
            .field("disabled", &self.disabled)
            .field("region_hook", &self.regions.is_some())
            .field("claim_hook", &self.claims.is_some())
            .finish()
    }
}

impl SuppressionManager {
    /// Build from the `[suppression]` config section.
    ///
    /// Claim ids that are not valid UUIDs are logged and skipped.
    #[must_use]
    pub fn from_config(config: &BTreeMap<StatType, DisabledAreas>) -> Self {
        let disabled = config
            .iter()
            .map(|(stat, areas)| {
                let claims = areas
                    .claims
                    .iter()
                    .filter_map(|raw| match Uuid::parse_str(raw) {
                        Ok(claim) => Some(claim),
                        Err(e) => {
                            warn!(stat = %stat, claim = %raw, error = %e, "Ignoring malformed claim id");
                            None
                        }
                    })
                    .collect();
                let entry = DisabledFor {
                    regions: areas.regions.clone(),
                    claims,
                };
                (stat.clone(), entry)
            })
            .collect();

        Self {
            disabled,
            regions: None,
            claims: None,
        }
    }

    /// Attach the region-protection plugin.
    #[must_use]
    pub fn with_region_hook(mut self, hook: Arc<dyn RegionHook>) -> Self {
        self.regions = Some(hook);
        self
    }

    /// Attach the land-claim plugin.
    #[must_use]
    pub fn with_claim_hook(mut self, hook: Arc<dyn ClaimHook>) -> Self {
        self.claims = Some(hook);
        self
    }

    /// Regions in which `stat` is disabled.
    #[must_use]
    pub fn disabled_regions(&self, stat: &StatType) -> &[String] {
        self.disabled.get(stat).map(|d| d.regions.as_slice()).unwrap_or(&[])
    }

    /// Claims in which `stat` is disabled.
    #[must_use]
    pub fn disabled_claims(&self, stat: &StatType) -> &[Uuid] {
        self.disabled.get(stat).map(|d| d.claims.as_slice()).unwrap_or(&[])
    }

    /// Whether recording `stat` for `entity` at `location` should be skipped.
    ///
    /// Hooks that are missing or unavailable never suppress anything.
    #[must_use]
    pub fn should_skip(&self, entity: EntityId, location: &Location, stat: &StatType) -> bool {
        let Some(disabled) = self.disabled.get(stat) else {
            return false;
        };

        if let Some(hook) = self.regions.as_ref().filter(|h| h.is_available()) {
            if let Some(region) = disabled
                .regions
                .iter()
                .find(|region| hook.is_in_region(location, region))
            {
                debug!(entity = %entity, stat = %stat, region = %region, "Statistic disabled in region");
                return true;
            }
        }

        if let Some(hook) = self.claims.as_ref().filter(|h| h.is_available()) {
            if let Some(claim) = disabled
                .claims
                .iter()
                .find(|claim| hook.is_in_claim(location, **claim))
            {
                debug!(entity = %entity, stat = %stat, claim = %claim, "Statistic disabled in claim");
                return true;
            }
        }

        false
    }
}
