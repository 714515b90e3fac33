//! Registry of known statistic specifications.
//!
//! Loaded once at startup: the built-in catalog plus any statistics defined
//! in the `[[specifications]]` section of the config file.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::entity::EntityInfo;
use crate::error::{Result, StatzError};
use crate::record::{Record, RecordData};
use crate::specification::{
    FieldDef, FieldKind, MergePolicy, Specification, SpecificationDef, WORLD_FIELD,
};
use crate::types::{StatType, Value};

/// Lookup table from [`StatType`] to its [`Specification`].
#[derive(Debug, Clone, Default)]
pub struct SpecificationRegistry {
    specs: HashMap<StatType, Arc<Specification>>,
}

impl SpecificationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in catalog.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for spec in builtin_specifications() {
            registry.register(spec);
        }
        registry
    }

    /// Create a registry holding the built-in catalog plus `defs`.
    ///
    /// A definition for a built-in statistic replaces the built-in one.
    ///
    /// # Errors
    /// Returns [`StatzError::InvalidSpecification`] for the first invalid
    /// definition.
    pub fn from_defs(defs: &[SpecificationDef]) -> Result<Self> {
        let mut registry = Self::with_defaults();
        for def in defs {
            let spec = Specification::from_def(def.clone())?;
            debug!(stat = %spec.stat(), policy = %spec.policy(), "Registered configured statistic");
            registry.register(spec);
        }
        info!(statistics = registry.len(), "Specification registry loaded");
        Ok(registry)
    }

    /// Add or replace a specification, returning the one it replaced.
    pub fn register(&mut self, spec: Specification) -> Option<Arc<Specification>> {
        self.specs.insert(spec.stat().clone(), Arc::new(spec))
    }

    /// Look up a specification.
    ///
    /// # Errors
    /// Returns [`StatzError::UnknownStat`] if none is registered.
    pub fn get(&self, stat: &StatType) -> Result<&Arc<Specification>> {
        self.specs
            .get(stat)
            .ok_or_else(|| StatzError::UnknownStat(stat.clone()))
    }

    /// Build a record for `stat`.
    ///
    /// # Errors
    /// `UnknownStat` or `MalformedRecord`.
    pub fn build<K, I>(&self, stat: &StatType, fields: I) -> Result<Record>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        self.get(stat)?.build(fields)
    }

    /// Rebuild a record from its storage representation, re-validating it.
    ///
    /// # Errors
    /// `UnknownStat` or `MalformedRecord`.
    pub fn record_from_data(&self, data: RecordData) -> Result<Record> {
        self.build(&data.stat, data.fields)
    }

    /// Rebuild an aggregate from stored records.
    ///
    /// # Errors
    /// Fails on the first record that cannot be rebuilt.
    pub fn info_from_data(&self, data: Vec<RecordData>) -> Result<EntityInfo> {
        let records = data
            .into_iter()
            .map(|d| self.record_from_data(d))
            .collect::<Result<Vec<_>>>()?;
        Ok(EntityInfo::from_records(records))
    }

    /// Number of registered statistics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Registered specifications, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Specification>> {
        self.specs.values()
    }
}

fn field(name: &str, kind: FieldKind) -> FieldDef {
    FieldDef::new(name, kind)
}

fn world() -> FieldDef {
    field(WORLD_FIELD, FieldKind::Token)
}

fn counter(stat: StatType, identity: Vec<FieldDef>, world_support: bool) -> Specification {
    spec(
        stat,
        MergePolicy::Cumulative,
        identity,
        vec![field("count", FieldKind::Integer)],
        vec![],
        world_support,
    )
}

#[allow(clippy::expect_used)]
fn spec(
    stat: StatType,
    policy: MergePolicy,
    identity: Vec<FieldDef>,
    value: Vec<FieldDef>,
    context: Vec<FieldDef>,
    world_support: bool,
) -> Specification {
    Specification::new(stat, policy, identity, value, context, world_support)
        .expect("built-in specifications are valid")
}

/// The built-in statistic catalog.
#[must_use]
pub fn builtin_specifications() -> Vec<Specification> {
    use FieldKind::{Float, Location, Text, Token};

    vec![
        counter(StatType::BlocksPlaced, vec![world(), field("material", Token)], true),
        counter(StatType::BlocksBroken, vec![world(), field("material", Token)], true),
        spec(
            StatType::DistanceTravelled,
            MergePolicy::Cumulative,
            vec![world(), field("movement", Token)],
            vec![field("distance", Float)],
            vec![],
            true,
        ),
        spec(
            StatType::TimePlayed,
            MergePolicy::Cumulative,
            vec![world()],
            vec![field("minutes", Float)],
            vec![],
            true,
        ),
        counter(StatType::Joins, vec![], false),
        counter(
            StatType::KillsMobs,
            vec![world(), field("mob", Token), field("weapon", Token)],
            true,
        ),
        counter(StatType::KillsPlayers, vec![world(), field("victim", Token)], true),
        counter(StatType::ItemsCrafted, vec![world(), field("item", Token)], true),
        spec(
            StatType::Deaths,
            MergePolicy::Append,
            vec![world()],
            vec![],
            vec![field("cause", Text), field("location", Location)],
            true,
        ),
        spec(
            StatType::LastLocation,
            MergePolicy::Replace,
            vec![],
            vec![field("location", Location)],
            vec![world()],
            false,
        ),
    ]
}
