//! Statistic specifications: what a record of each statistic looks like
//! and how two records of it are reconciled.
//!
//! A [`Specification`] is plain data: identity keys, value keys, optional
//! context keys, a world-support flag and a [`MergePolicy`]. Merge behaviour
//! dispatches on the policy tag, so every statistic shares one code path.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StatzError};
use crate::record::Record;
use crate::types::{StatType, Value};

/// Name of the field holding the world a record was observed in.
pub const WORLD_FIELD: &str = "world";

/// How two identity-equal records of the same statistic are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergePolicy {
    /// Value keys are summed.
    Cumulative,
    /// The newest record replaces the old one.
    Replace,
    /// Records are kept as distinct log entries.
    Append,
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cumulative => "CUMULATIVE",
            Self::Replace => "REPLACE",
            Self::Append => "APPEND",
        })
    }
}

/// Kind of value a field may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free-form text.
    Text,
    /// Whole number.
    Integer,
    /// Floating point number.
    Float,
    /// Enum-like name.
    Token,
    /// Location reference.
    Location,
}

impl FieldKind {
    /// Whether values of this kind can be summed.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// Human-readable kind name, matching [`Value::kind_name`].
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Token => "token",
            Self::Location => "location",
        }
    }

    /// Check `value` against this kind, widening integers for float fields.
    fn admit(self, value: Value) -> std::result::Result<Value, &'static str> {
        match (self, value) {
            (Self::Text, v @ Value::Text(_))
            | (Self::Integer, v @ Value::Integer(_))
            | (Self::Float, v @ Value::Float(_))
            | (Self::Token, v @ Value::Token(_))
            | (Self::Location, v @ Value::Location(_)) => Ok(v),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float, Value::Integer(i)) => Ok(Value::Float(i as f64)),
            (_, other) => Err(other.kind_name()),
        }
    }
}

/// A declared record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Kind of value the field holds.
    pub kind: FieldKind,
}

impl FieldDef {
    /// Declare a field.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Description of one statistic type.
///
/// Immutable once constructed; shared between records as an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specification {
    stat: StatType,
    identity_keys: Vec<FieldDef>,
    value_keys: Vec<FieldDef>,
    context_keys: Vec<FieldDef>,
    world_support: bool,
    policy: MergePolicy,
}

/// Serde-friendly definition of a specification, as found in config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecificationDef {
    /// Statistic tag.
    pub stat: StatType,
    /// Merge policy.
    pub policy: MergePolicy,
    /// Fields that decide whether two records describe the same fact.
    #[serde(default)]
    pub identity_keys: Vec<FieldDef>,
    /// Fields holding the data to merge.
    #[serde(default)]
    pub value_keys: Vec<FieldDef>,
    /// Optional fields carried along without taking part in merging.
    #[serde(default)]
    pub context_keys: Vec<FieldDef>,
    /// Whether records are scoped per world.
    #[serde(default)]
    pub world_support: bool,
}

impl Specification {
    /// Create a validated specification.
    ///
    /// # Errors
    /// Returns [`StatzError::InvalidSpecification`] when a field name is
    /// declared twice, no identity or value key is declared, or a cumulative
    /// statistic declares a non-numeric value key.
    pub fn new(
        stat: StatType,
        policy: MergePolicy,
        identity_keys: Vec<FieldDef>,
        value_keys: Vec<FieldDef>,
        context_keys: Vec<FieldDef>,
        world_support: bool,
    ) -> Result<Self> {
        let invalid = |reason: String| StatzError::InvalidSpecification {
            stat: stat.clone(),
            reason,
        };

        if identity_keys.is_empty() && value_keys.is_empty() {
            return Err(invalid("declares no identity or value keys".to_string()));
        }

        let mut seen = HashSet::new();
        for field in identity_keys.iter().chain(&value_keys).chain(&context_keys) {
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("field '{}' declared twice", field.name)));
            }
        }

        if policy == MergePolicy::Cumulative {
            if let Some(field) = value_keys.iter().find(|f| !f.kind.is_numeric()) {
                return Err(invalid(format!(
                    "cumulative value key '{}' is {}, not numeric",
                    field.name,
                    field.kind.name()
                )));
            }
        }

        Ok(Self {
            stat,
            identity_keys,
            value_keys,
            context_keys,
            world_support,
            policy,
        })
    }

    /// Create a specification from its config definition.
    ///
    /// # Errors
    /// See [`Specification::new`].
    pub fn from_def(def: SpecificationDef) -> Result<Self> {
        Self::new(
            def.stat,
            def.policy,
            def.identity_keys,
            def.value_keys,
            def.context_keys,
            def.world_support,
        )
    }

    /// The statistic this specification describes.
    #[must_use]
    pub fn stat(&self) -> &StatType {
        &self.stat
    }

    /// Merge policy.
    #[must_use]
    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Whether records of this statistic are scoped per world.
    #[must_use]
    pub fn has_world_support(&self) -> bool {
        self.world_support
    }

    /// Identity key declarations, in order.
    #[must_use]
    pub fn identity_keys(&self) -> &[FieldDef] {
        &self.identity_keys
    }

    /// Value key declarations, in order.
    #[must_use]
    pub fn value_keys(&self) -> &[FieldDef] {
        &self.value_keys
    }

    /// Optional context field declarations, in order.
    #[must_use]
    pub fn context_keys(&self) -> &[FieldDef] {
        &self.context_keys
    }

    /// Whether `field` is an identity key.
    #[must_use]
    pub fn is_identity_key(&self, field: &str) -> bool {
        self.identity_keys.iter().any(|f| f.name == field)
    }

    /// Whether `field` is a value key.
    #[must_use]
    pub fn is_value_key(&self, field: &str) -> bool {
        self.value_keys.iter().any(|f| f.name == field)
    }

    /// Whether `field` is declared at all.
    #[must_use]
    pub fn declares(&self, field: &str) -> bool {
        self.field(field).is_some()
    }

    /// Look up the declaration of `field`.
    #[must_use]
    pub fn field(&self, field: &str) -> Option<&FieldDef> {
        self.identity_keys
            .iter()
            .chain(&self.value_keys)
            .chain(&self.context_keys)
            .find(|f| f.name == field)
    }

    /// Identity keys that take part in identity comparison.
    ///
    /// The world field is skipped for statistics without world support.
    pub fn compared_identity_keys(&self) -> impl Iterator<Item = &FieldDef> {
        self.identity_keys
            .iter()
            .filter(|f| self.world_support || f.name != WORLD_FIELD)
    }

    /// Build a record from raw fields.
    ///
    /// # Errors
    /// Returns [`StatzError::MalformedRecord`] if a required identity or value
    /// key is missing, a field is not declared, or a value has the wrong kind.
    pub fn build<K, I>(self: &Arc<Self>, fields: I) -> Result<Record>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let malformed = |field: &str, reason: String| StatzError::MalformedRecord {
            stat: self.stat.clone(),
            field: field.to_string(),
            reason,
        };

        let mut data = BTreeMap::new();
        for (name, value) in fields {
            let name = name.into();
            let Some(def) = self.field(&name) else {
                return Err(malformed(&name, "is not declared".to_string()));
            };
            let value = def.kind.admit(value).map_err(|found| {
                malformed(&name, format!("holds {found}, expected {}", def.kind.name()))
            })?;
            data.insert(name, value);
        }

        if let Some(missing) = self
            .identity_keys
            .iter()
            .chain(&self.value_keys)
            .find(|f| !data.contains_key(&f.name))
        {
            return Err(malformed(&missing.name, "is required but missing".to_string()));
        }

        Ok(Record::new(Arc::clone(self), data))
    }
}
