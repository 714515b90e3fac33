//! Records: one immutable observation of a statistic for one entity.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::query::Query;
use crate::specification::Specification;
use crate::types::{StatType, Value};

/// An immutable, ordered field → value bag tagged with its specification.
///
/// Records are only created through [`Specification::build`] (or by a merge
/// folding two records together), so they always satisfy their
/// specification's required keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    spec: Arc<Specification>,
    fields: BTreeMap<String, Value>,
}

/// Specification-free form of a record, used by storage backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordData {
    /// Statistic tag, used to find the specification again on load.
    pub stat: StatType,
    /// Raw field values.
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub(crate) fn new(spec: Arc<Specification>, fields: BTreeMap<String, Value>) -> Self {
        Self { spec, fields }
    }

    /// The specification this record belongs to.
    #[must_use]
    pub fn spec(&self) -> &Arc<Specification> {
        &self.spec
    }

    /// The statistic this record belongs to.
    #[must_use]
    pub fn stat(&self) -> &StatType {
        self.spec.stat()
    }

    /// Raw access to a field value.
    #[must_use]
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// All set fields, ordered by name.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// A typed read-only accessor over this record.
    #[must_use]
    pub fn query(&self) -> Query<'_> {
        Query::new(self)
    }

    /// Whether both records describe the same underlying fact.
    ///
    /// Records of different statistics are never identity-equal. The world
    /// field is ignored for statistics without world support.
    #[must_use]
    pub fn is_identity_equal(&self, other: &Self) -> bool {
        self.stat() == other.stat()
            && self
                .spec
                .compared_identity_keys()
                .all(|key| self.fields.get(&key.name) == other.fields.get(&key.name))
    }

    /// Fold `incoming` into this record by summing every value key.
    ///
    /// Non-value fields are kept from `self`. A value key that cannot be
    /// summed takes the incoming value.
    #[must_use]
    pub fn summed_with(&self, incoming: &Self) -> Self {
        let mut fields = self.fields.clone();
        for key in self.spec.value_keys() {
            let (Some(ours), Some(theirs)) =
                (self.fields.get(&key.name), incoming.fields.get(&key.name))
            else {
                continue;
            };
            let summed = ours.checked_sum(theirs).unwrap_or_else(|| theirs.clone());
            fields.insert(key.name.clone(), summed);
        }
        Self {
            spec: Arc::clone(&self.spec),
            fields,
        }
    }

    /// Convert into the storage representation.
    #[must_use]
    pub fn to_data(&self) -> RecordData {
        RecordData {
            stat: self.stat().clone(),
            fields: self.fields.clone(),
        }
    }
}
