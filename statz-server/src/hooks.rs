//! Integration hooks for the server's event listeners.
//!
//! Listener code calls these to turn raw server callbacks into
//! [`GameEvent`]s. Block, mob and item names are upper-cased so that
//! `stone` and `STONE` count as the same material.

use statz_core::types::{EntityId, Location};

use crate::events::GameEvent;

fn normalize(name: impl Into<String>) -> String {
    name.into().to_uppercase()
}

/// Create a block-place event.
#[must_use]
pub fn on_block_place(player: EntityId, location: Location, material: impl Into<String>) -> GameEvent {
    GameEvent::BlockPlaced {
        player,
        location,
        material: normalize(material),
    }
}

/// Create a block-break event.
#[must_use]
pub fn on_block_break(player: EntityId, location: Location, material: impl Into<String>) -> GameEvent {
    GameEvent::BlockBroken {
        player,
        location,
        material: normalize(material),
    }
}

/// Create a movement event from two consecutive positions in one world.
///
/// Returns `None` when the player changed worlds or did not move.
#[must_use]
pub fn on_move(
    player: EntityId,
    from: &Location,
    to: Location,
    movement: impl Into<String>,
) -> Option<GameEvent> {
    if from.world != to.world {
        return None;
    }
    let distance =
        ((to.x - from.x).powi(2) + (to.y - from.y).powi(2) + (to.z - from.z).powi(2)).sqrt();
    (distance > 0.0).then(|| GameEvent::Moved {
        player,
        location: to,
        movement: normalize(movement),
        distance,
    })
}

/// Create a play-time tick.
#[must_use]
pub fn on_play_tick(player: EntityId, location: Location, minutes: f64) -> GameEvent {
    GameEvent::Played {
        player,
        location,
        minutes,
    }
}

/// Create a join event.
#[must_use]
pub fn on_join(player: EntityId, location: Location) -> GameEvent {
    GameEvent::Joined { player, location }
}

/// Create a mob-kill event.
#[must_use]
pub fn on_mob_kill(
    player: EntityId,
    location: Location,
    mob: impl Into<String>,
    weapon: impl Into<String>,
) -> GameEvent {
    GameEvent::MobKilled {
        player,
        location,
        mob: normalize(mob),
        weapon: normalize(weapon),
    }
}

/// Create a player-kill event.
#[must_use]
pub fn on_player_kill(player: EntityId, location: Location, victim: EntityId) -> GameEvent {
    GameEvent::PlayerKilled {
        player,
        location,
        victim,
    }
}

/// Create a crafting event.
#[must_use]
pub fn on_craft(player: EntityId, location: Location, item: impl Into<String>, amount: i64) -> GameEvent {
    GameEvent::ItemCrafted {
        player,
        location,
        item: normalize(item),
        amount,
    }
}

/// Create a death event.
#[must_use]
pub fn on_death(player: EntityId, location: Location, cause: impl Into<String>) -> GameEvent {
    GameEvent::Died {
        player,
        location,
        cause: cause.into(),
    }
}

/// Create a teleport event. Only the destination is recorded.
#[must_use]
pub fn on_teleport(player: EntityId, to: Location) -> GameEvent {
    GameEvent::Teleported {
        player,
        location: to,
    }
}
