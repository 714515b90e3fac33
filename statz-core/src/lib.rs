//! # Statz Core Library
//!
//! Game-agnostic statistics cache for multiplayer game servers.
//!
//! Gameplay threads observe events (blocks placed, distance walked, deaths)
//! and turn them into [`Record`]s. Records for one player are gathered in an
//! [`EntityInfo`] and handed to the [`CacheStore`], which reconciles them
//! with what is already cached:
//!
//! - **Cumulative**: identity-equal records have their values summed
//! - **Replace**: the newest identity-equal record wins
//! - **Append**: every record is kept as a log entry
//!
//! How a record merges is decided by its [`Specification`], looked up by
//! [`StatType`] in the [`SpecificationRegistry`].
//!
//! ## Concurrency Contract
//!
//! - `add` for one entity is an atomic read-merge-write; concurrent adds
//!   never lose an update
//! - merges run outside any lock; operations on different entities only
//!   contend when they hash to the same shard, and then only for a pointer
//!   swap
//! - readers receive immutable `Arc<EntityInfo>` snapshots

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod catalog;
pub mod config;
pub mod entity;
pub mod error;
pub mod metrics;
pub mod persistence;
pub mod query;
pub mod record;
pub mod specification;
pub mod suppression;
pub mod types;

pub use cache::{CacheStore, CachedSnapshot};
pub use catalog::SpecificationRegistry;
pub use config::StatzConfig;
pub use entity::EntityInfo;
pub use error::StatzError;
pub use persistence::{SqliteStore, StatStore};
pub use query::Query;
pub use record::Record;
pub use specification::{FieldDef, FieldKind, MergePolicy, Specification};
pub use suppression::SuppressionManager;
pub use types::*;
