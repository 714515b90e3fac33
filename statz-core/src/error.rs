//! Error types for the Statz core library.

use thiserror::Error;

use crate::types::StatType;

/// Top-level error type for all Statz operations.
#[derive(Error, Debug)]
pub enum StatzError {
    /// An operation required an [`EntityInfo`](crate::EntityInfo) but none was given.
    #[error("Data to cache is absent")]
    NullData,

    /// A record could not be built from the supplied fields.
    #[error("Malformed {stat} record: field '{field}' {reason}")]
    MalformedRecord {
        /// Statistic the record was built for.
        stat: StatType,
        /// Offending field.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A query addressed a field its specification does not declare.
    #[error("Field '{field}' is not declared by {stat}")]
    FieldNotFound {
        /// Statistic of the queried record.
        stat: StatType,
        /// Requested field.
        field: String,
    },

    /// A declared optional field was read but is not set on the record.
    #[error("Field '{field}' of {stat} has no value")]
    MissingValue {
        /// Statistic of the queried record.
        stat: StatType,
        /// Requested field.
        field: String,
    },

    /// A field holds a value of a different kind than requested.
    #[error("Field '{field}' holds {found}, expected {expected}")]
    TypeMismatch {
        /// Requested field.
        field: String,
        /// Kind the caller asked for.
        expected: &'static str,
        /// Kind actually stored.
        found: &'static str,
    },

    /// No specification is registered for this statistic.
    #[error("Unknown statistic: {0}")]
    UnknownStat(StatType),

    /// A specification definition is inconsistent.
    #[error("Invalid specification for {stat}: {reason}")]
    InvalidSpecification {
        /// Statistic being defined.
        stat: StatType,
        /// Why it was rejected.
        reason: String,
    },

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, StatzError>;
