//! Event-to-statistic systems.
//!
//! Called from the server's tick loop and listener callbacks. Each event is
//! checked against suppression rules first, then turned into a single
//! record and merged into the shared cache.
//!
//! ## Budget (per call):
//!
//! | System         | Budget  | Frequency          |
//! |----------------|---------|--------------------|
//! | `record_event` | 0.05ms  | Every stat event   |
//! | `record_batch` | 0.05ms  | Per player per tick|

use std::collections::BTreeMap;
use std::sync::Arc;

use statz_core::metrics::{CacheCounters, spans};
use statz_core::types::{EntityId, Value};
use statz_core::error::Result;
use statz_core::{CacheStore, EntityInfo, Record, SpecificationRegistry, SuppressionManager};
use tracing::trace;

use crate::events::GameEvent;

/// Shared state the systems operate on.
#[derive(Debug, Clone)]
pub struct StatzContext {
    /// Statistic catalog used to build records.
    pub registry: Arc<SpecificationRegistry>,
    /// The live statistics cache.
    pub cache: Arc<CacheStore>,
    /// Region and claim rules.
    pub suppression: Arc<SuppressionManager>,
}

impl StatzContext {
    /// Bundle the pieces together.
    #[must_use]
    pub fn new(
        registry: Arc<SpecificationRegistry>,
        cache: Arc<CacheStore>,
        suppression: Arc<SuppressionManager>,
    ) -> Self {
        Self {
            registry,
            cache,
            suppression,
        }
    }
}

/// What happened to an event handed to [`record_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The event was merged into the cache.
    Recorded,
    /// A region or claim rule disabled the statistic at that location.
    Suppressed,
    /// Statistic recording is switched off server-wide.
    Disabled,
}

/// Totals from [`record_batch`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Events merged into the cache.
    pub recorded: usize,
    /// Events dropped by suppression rules.
    pub suppressed: usize,
}

/// Build the record an event contributes.
///
/// # Errors
/// Fails if the event's statistic is missing from `registry` or the record
/// does not fit its specification.
pub fn event_to_record(event: &GameEvent, registry: &SpecificationRegistry) -> Result<Record> {
    let stat = event.stat_type();
    let world = Value::Token(event.location().world.clone());

    match event {
        GameEvent::BlockPlaced { material, .. } | GameEvent::BlockBroken { material, .. } => {
            registry.build(
                &stat,
                [
                    ("world", world),
                    ("material", Value::Token(material.clone())),
                    ("count", Value::Integer(1)),
                ],
            )
        }
        GameEvent::Moved {
            movement, distance, ..
        } => registry.build(
            &stat,
            [
                ("world", world),
                ("movement", Value::Token(movement.clone())),
                ("distance", Value::Float(*distance)),
            ],
        ),
        GameEvent::Played { minutes, .. } => registry.build(
            &stat,
            [("world", world), ("minutes", Value::Float(*minutes))],
        ),
        GameEvent::Joined { .. } => registry.build(&stat, [("count", Value::Integer(1))]),
        GameEvent::MobKilled { mob, weapon, .. } => registry.build(
            &stat,
            [
                ("world", world),
                ("mob", Value::Token(mob.clone())),
                ("weapon", Value::Token(weapon.clone())),
                ("count", Value::Integer(1)),
            ],
        ),
        GameEvent::PlayerKilled { victim, .. } => registry.build(
            &stat,
            [
                ("world", world),
                ("victim", Value::Token(victim.to_string())),
                ("count", Value::Integer(1)),
            ],
        ),
        GameEvent::ItemCrafted { item, amount, .. } => registry.build(
            &stat,
            [
                ("world", world),
                ("item", Value::Token(item.clone())),
                ("count", Value::Integer(*amount)),
            ],
        ),
        GameEvent::Died {
            location, cause, ..
        } => registry.build(
            &stat,
            [
                ("world", world),
                ("cause", Value::Text(cause.clone())),
                ("location", Value::Location(location.clone())),
            ],
        ),
        GameEvent::Teleported { location, .. } => registry.build(
            &stat,
            [
                ("world", world),
                ("location", Value::Location(location.clone())),
            ],
        ),
    }
}

/// Wrap the record for one event in a fresh [`EntityInfo`].
///
/// # Errors
/// See [`event_to_record`].
pub fn event_to_info(event: &GameEvent, registry: &SpecificationRegistry) -> Result<EntityInfo> {
    Ok(EntityInfo::new().with_record(event_to_record(event, registry)?))
}

fn suppressed(event: &GameEvent, context: &StatzContext) -> bool {
    let skip = context
        .suppression
        .should_skip(event.player(), event.location(), &event.stat_type());
    if skip {
        CacheCounters::bump(&context.cache.counters().suppressed);
    }
    skip
}

/// Record a single event for its player.
///
/// # Errors
/// Fails if the event cannot be turned into a valid record. Nothing is
/// written in that case.
pub fn record_event(event: &GameEvent, context: &StatzContext) -> Result<RecordOutcome> {
    let stat = event.stat_type();
    let _span = tracing::debug_span!(spans::RECORD_EVENT, stat = %stat).entered();

    if suppressed(event, context) {
        return Ok(RecordOutcome::Suppressed);
    }

    let info = event_to_info(event, &context.registry)?;
    context.cache.add(event.player(), info)?;
    trace!(entity = %event.player(), stat = %stat, "Recorded event");
    Ok(RecordOutcome::Recorded)
}

/// Record many events, merging once per player.
///
/// Every event is validated before anything is written, so one bad event
/// leaves the cache untouched.
///
/// # Errors
/// Fails on the first event that cannot be turned into a valid record.
pub fn record_batch(events: &[GameEvent], context: &StatzContext) -> Result<BatchOutcome> {
    let mut outcome = BatchOutcome::default();
    let mut per_player: BTreeMap<EntityId, EntityInfo> = BTreeMap::new();

    for event in events {
        if suppressed(event, context) {
            outcome.suppressed += 1;
            continue;
        }
        let record = event_to_record(event, &context.registry)?;
        let pending = per_player.entry(event.player()).or_default();
        *pending = pending.merge(&EntityInfo::new().with_record(record));
        outcome.recorded += 1;
    }

    for (player, info) in per_player {
        context.cache.add(player, info)?;
    }
    Ok(outcome)
}
