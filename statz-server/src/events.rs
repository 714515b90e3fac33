//! Gameplay events that produce statistics.
//!
//! Every event belongs to exactly one player and one statistic type.

use serde::{Deserialize, Serialize};
use statz_core::types::{EntityId, Location, StatType};

/// A gameplay event observed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameEvent {
    /// A player placed a block.
    BlockPlaced {
        player: EntityId,
        location: Location,
        material: String,
    },

    /// A player broke a block.
    BlockBroken {
        player: EntityId,
        location: Location,
        material: String,
    },

    /// A player moved some distance.
    Moved {
        player: EntityId,
        location: Location,
        movement: String,
        distance: f64,
    },

    /// Periodic play-time tick.
    Played {
        player: EntityId,
        location: Location,
        minutes: f64,
    },

    /// A player joined the server.
    Joined { player: EntityId, location: Location },

    /// A player killed a mob.
    MobKilled {
        player: EntityId,
        location: Location,
        mob: String,
        weapon: String,
    },

    /// A player killed another player.
    PlayerKilled {
        player: EntityId,
        location: Location,
        victim: EntityId,
    },

    /// A player crafted items.
    ItemCrafted {
        player: EntityId,
        location: Location,
        item: String,
        amount: i64,
    },

    /// A player died.
    Died {
        player: EntityId,
        location: Location,
        cause: String,
    },

    /// A player teleported; `location` is the destination.
    Teleported {
        player: EntityId,
        location: Location,
    },
}

impl GameEvent {
    /// The player the statistic is recorded for.
    #[must_use]
    pub fn player(&self) -> EntityId {
        match self {
            Self::BlockPlaced { player, .. }
            | Self::BlockBroken { player, .. }
            | Self::Moved { player, .. }
            | Self::Played { player, .. }
            | Self::Joined { player, .. }
            | Self::MobKilled { player, .. }
            | Self::PlayerKilled { player, .. }
            | Self::ItemCrafted { player, .. }
            | Self::Died { player, .. }
            | Self::Teleported { player, .. } => *player,
        }
    }

    /// Where the event happened.
    #[must_use]
    pub fn location(&self) -> &Location {
        match self {
            Self::BlockPlaced { location, .. }
            | Self::BlockBroken { location, .. }
            | Self::Moved { location, .. }
            | Self::Played { location, .. }
            | Self::Joined { location, .. }
            | Self::MobKilled { location, .. }
            | Self::PlayerKilled { location, .. }
            | Self::ItemCrafted { location, .. }
            | Self::Died { location, .. }
            | Self::Teleported { location, .. } => location,
        }
    }

    /// The statistic this event contributes to.
    #[must_use]
    pub fn stat_type(&self) -> StatType {
        match self {
            Self::BlockPlaced { .. } => StatType::BlocksPlaced,
            Self::BlockBroken { .. } => StatType::BlocksBroken,
            Self::Moved { .. } => StatType::DistanceTravelled,
            Self::Played { .. } => StatType::TimePlayed,
            Self::Joined { .. } => StatType::Joins,
            Self::MobKilled { .. } => StatType::KillsMobs,
            Self::PlayerKilled { .. } => StatType::KillsPlayers,
            Self::ItemCrafted { .. } => StatType::ItemsCrafted,
            Self::Died { .. } => StatType::Deaths,
            Self::Teleported { .. } => StatType::LastLocation,
        }
    }
}
