//! # statz-server: Game-Server Integration for Statz
//!
//! This crate connects the game-agnostic `statz-core` cache to a running
//! game server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Game server listeners            │
//! │                    │                        │
//! │                    ▼                        │
//! │   hooks ──► GameEvent ──► systems           │
//! │                             │   (suppression│
//! │                             │    checked    │
//! │                             ▼    first)     │
//! │                    ┌──────────────────┐     │
//! │                    │ statz-core cache │     │
//! │                    └────────┬─────────┘     │
//! │                             │ get snapshots │
//! │                             ▼               │
//! │           persister / flush ──► store       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `events`: gameplay events that produce statistics
//! - `hooks`: constructors called from the server's listener layer
//! - `systems`: turns events into records and feeds the cache
//! - `flush`: per-entity load/save and background flushing
//! - `service`: join/quit lifecycle facade
//! - `logging`: `tracing` subscriber setup

pub mod events;
pub mod flush;
pub mod hooks;
pub mod logging;
pub mod service;
pub mod systems;

pub use events::GameEvent;
pub use flush::Persister;
pub use service::StatzService;
pub use systems::{RecordOutcome, StatzContext};
