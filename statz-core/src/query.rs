//! Read-only typed access to a single [`Record`].

use crate::error::{Result, StatzError};
use crate::record::Record;
use crate::types::{Location, StatType, Value};

/// A transient accessor used to pull typed values out of a record.
///
/// Never mutates the record and holds no reference to the cache, so any
/// number of queries may read the same record concurrently.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    record: &'a Record,
}

impl<'a> Query<'a> {
    /// Wrap a record.
    #[must_use]
    pub fn new(record: &'a Record) -> Self {
        Self { record }
    }

    /// The statistic of the wrapped record.
    #[must_use]
    pub fn stat(&self) -> &'a StatType {
        self.record.stat()
    }

    /// The wrapped record.
    #[must_use]
    pub fn record(&self) -> &'a Record {
        self.record
    }

    /// Every field that is set, ordered by name. Unset optional fields are
    /// skipped.
    pub fn fields(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + use<'a> {
        self.record.fields()
    }

    /// Read a field.
    ///
    /// Returns `Ok(None)` for a declared optional field that is not set.
    ///
    /// # Errors
    /// Returns [`StatzError::FieldNotFound`] if the specification does not
    /// declare `field`.
    pub fn get(&self, field: &str) -> Result<Option<&'a Value>> {
        if !self.record.spec().declares(field) {
            return Err(StatzError::FieldNotFound {
                stat: self.stat().clone(),
                field: field.to_string(),
            });
        }
        Ok(self.record.value(field))
    }

    fn require(&self, field: &str) -> Result<&'a Value> {
        self.get(field)?.ok_or_else(|| StatzError::MissingValue {
            stat: self.stat().clone(),
            field: field.to_string(),
        })
    }

    fn mismatch(field: &str, expected: &'static str, found: &Value) -> StatzError {
        StatzError::TypeMismatch {
            field: field.to_string(),
            expected,
            found: found.kind_name(),
        }
    }

    /// Read an integer field.
    ///
    /// # Errors
    /// `FieldNotFound`, `MissingValue`, or `TypeMismatch`.
    pub fn integer(&self, field: &str) -> Result<i64> {
        match self.require(field)? {
            Value::Integer(v) => Ok(*v),
            other => Err(Self::mismatch(field, "integer", other)),
        }
    }

    /// Read a float field. Integer fields are widened.
    ///
    /// # Errors
    /// `FieldNotFound`, `MissingValue`, or `TypeMismatch`.
    pub fn float(&self, field: &str) -> Result<f64> {
        let value = self.require(field)?;
        value
            .as_f64()
            .ok_or_else(|| Self::mismatch(field, "float", value))
    }

    /// Read any numeric field as `f64`.
    ///
    /// # Errors
    /// `FieldNotFound`, `MissingValue`, or `TypeMismatch`.
    pub fn number(&self, field: &str) -> Result<f64> {
        self.float(field)
    }

    /// Read a text field.
    ///
    /// # Errors
    /// `FieldNotFound`, `MissingValue`, or `TypeMismatch`.
    pub fn text(&self, field: &str) -> Result<&'a str> {
        match self.require(field)? {
            Value::Text(v) => Ok(v),
            other => Err(Self::mismatch(field, "text", other)),
        }
    }

    /// Read a token field.
    ///
    /// # Errors
    /// `FieldNotFound`, `MissingValue`, or `TypeMismatch`.
    pub fn token(&self, field: &str) -> Result<&'a str> {
        match self.require(field)? {
            Value::Token(v) => Ok(v),
            other => Err(Self::mismatch(field, "token", other)),
        }
    }

    /// Read a location field.
    ///
    /// # Errors
    /// `FieldNotFound`, `MissingValue`, or `TypeMismatch`.
    pub fn location(&self, field: &str) -> Result<&'a Location> {
        match self.require(field)? {
            Value::Location(v) => Ok(v),
            other => Err(Self::mismatch(field, "location", other)),
        }
    }
}
