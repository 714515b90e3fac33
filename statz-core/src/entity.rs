//! The per-entity aggregate of cached statistic records.
//!
//! An [`EntityInfo`] groups [`Record`]s by [`StatType`]. It is built from
//! freshly observed records on gameplay threads and reconciled with the
//! cached version through [`EntityInfo::merge`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::query::Query;
use crate::record::{Record, RecordData};
use crate::specification::MergePolicy;
use crate::types::StatType;

/// All statistic records known for one entity.
///
/// Within one statistic type no two records are identity-equal, unless the
/// statistic uses [`MergePolicy::Append`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityInfo {
    stats: BTreeMap<StatType, Vec<Arc<Record>>>,
}

impl EntityInfo {
    /// Create an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an aggregate from records, folding identity-equal ones by
    /// their merge policy.
    #[must_use]
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        let mut info = Self::new();
        for record in records {
            info.insert(record);
        }
        info
    }

    /// Add one record, applying its specification's merge policy.
    pub fn insert(&mut self, record: impl Into<Arc<Record>>) {
        self.apply(record.into());
    }

    /// Builder form of [`EntityInfo::insert`].
    #[must_use]
    pub fn with_record(mut self, record: Record) -> Self {
        self.insert(record);
        self
    }

    fn apply(&mut self, record: Arc<Record>) {
        let policy = record.spec().policy();
        let entries = self.stats.entry(record.stat().clone()).or_default();

        if policy == MergePolicy::Append {
            entries.push(record);
            return;
        }

        match entries.iter().position(|e| e.is_identity_equal(&record)) {
            Some(idx) if policy == MergePolicy::Replace => entries[idx] = record,
            Some(idx) => entries[idx] = Arc::new(entries[idx].summed_with(&record)),
            None => entries.push(record),
        }
    }

    /// Reconcile `incoming` with `self`, producing a new aggregate.
    ///
    /// - Append statistics: self's log followed by incoming's log
    /// - Replace statistics: identity-equal incoming records win
    /// - Cumulative statistics: identity-equal records have value keys summed
    ///
    /// Neither input is modified. The result shares immutable records with
    /// its inputs but no mutable state.
    #[must_use]
    pub fn merge(&self, incoming: &Self) -> Self {
        let mut merged = self.clone();
        for record in incoming.stats.values().flatten() {
            merged.apply(Arc::clone(record));
        }
        merged
    }

    /// Records held for one statistic.
    #[must_use]
    pub fn records(&self, stat: &StatType) -> &[Arc<Record>] {
        self.stats.get(stat).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Typed accessors over every record of one statistic.
    pub fn queries<'a>(&'a self, stat: &StatType) -> impl Iterator<Item = Query<'a>> + use<'a> {
        self.records(stat).iter().map(|r| r.query())
    }

    /// All records, grouped by statistic.
    pub fn iter(&self) -> impl Iterator<Item = (&StatType, &[Arc<Record>])> {
        self.stats.iter().map(|(stat, records)| (stat, records.as_slice()))
    }

    /// Statistics with at least one record.
    pub fn stat_types(&self) -> impl Iterator<Item = &StatType> {
        self.stats
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(stat, _)| stat)
    }

    /// Whether any record exists for `stat`.
    #[must_use]
    pub fn has_data(&self, stat: &StatType) -> bool {
        !self.records(stat).is_empty()
    }

    /// Total number of records across all statistics.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.stats.values().map(Vec::len).sum()
    }

    /// Whether no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }

    /// The record identity-equal to `record`, if one is held.
    #[must_use]
    pub fn find(&self, record: &Record) -> Option<&Arc<Record>> {
        self.records(record.stat())
            .iter()
            .find(|held| held.is_identity_equal(record))
    }

    /// Sum a numeric field across every record of `stat`.
    ///
    /// Records that leave an optional field unset contribute nothing.
    /// Returns `0.0` when no records exist.
    ///
    /// # Errors
    /// `FieldNotFound` if the statistic does not declare `field`,
    /// `TypeMismatch` if the field is not numeric.
    pub fn total(&self, stat: &StatType, field: &str) -> Result<f64> {
        let mut total = 0.0;
        for query in self.queries(stat) {
            if query.get(field)?.is_some() {
                total += query.number(field)?;
            }
        }
        Ok(total)
    }

    /// Convert every record into its storage representation.
    #[must_use]
    pub fn to_data(&self) -> Vec<RecordData> {
        self.stats.values().flatten().map(|r| r.to_data()).collect()
    }
}
