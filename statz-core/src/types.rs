//! Core type definitions for the Statz statistics system.
//!
//! All types are serializable so cached data can be handed to any storage
//! backend without an intermediate representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a tracked entity (usually a player).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Create a new random entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ---------------------------------------------------------------------------
// Spatial
// ---------------------------------------------------------------------------

/// A position inside a named world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Name of the world the position belongs to.
    pub world: String,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Location {
    /// Create a location in `world`.
    #[must_use]
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:.1}, {:.1}, {:.1})", self.world, self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Statistic Types
// ---------------------------------------------------------------------------

/// Stable tag identifying a statistic type.
///
/// Serialised as `SCREAMING_SNAKE_CASE` names; any name that is not one of
/// the built-in statistics becomes [`StatType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatType {
    /// Blocks placed, per world and material.
    BlocksPlaced,
    /// Blocks broken, per world and material.
    BlocksBroken,
    /// Death log.
    Deaths,
    /// Distance travelled, per world and movement type.
    DistanceTravelled,
    /// Number of times the player joined.
    Joins,
    /// Mobs killed, per world, mob and weapon.
    KillsMobs,
    /// Players killed, per world and victim.
    KillsPlayers,
    /// Minutes played, per world.
    TimePlayed,
    /// Items crafted, per world and item.
    ItemsCrafted,
    /// Most recently observed location.
    LastLocation,
    /// A statistic defined through configuration.
    Custom(String),
}

impl StatType {
    /// All built-in statistic types.
    pub const BUILTIN: [Self; 10] = [
        Self::BlocksPlaced,
        Self::BlocksBroken,
        Self::Deaths,
        Self::DistanceTravelled,
        Self::Joins,
        Self::KillsMobs,
        Self::KillsPlayers,
        Self::TimePlayed,
        Self::ItemsCrafted,
        Self::LastLocation,
    ];

    /// The stable name of this statistic.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::BlocksPlaced => "BLOCKS_PLACED",
            Self::BlocksBroken => "BLOCKS_BROKEN",
            Self::Deaths => "DEATHS",
            Self::DistanceTravelled => "DISTANCE_TRAVELLED",
            Self::Joins => "JOINS",
            Self::KillsMobs => "KILLS_MOBS",
            Self::KillsPlayers => "KILLS_PLAYERS",
            Self::TimePlayed => "TIME_PLAYED",
            Self::ItemsCrafted => "ITEMS_CRAFTED",
            Self::LastLocation => "LAST_LOCATION",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::BUILTIN
            .into_iter()
            .find(|stat| stat.as_str() == s)
            .unwrap_or_else(|| Self::Custom(s.to_string())))
    }
}

impl From<String> for StatType {
    fn from(name: String) -> Self {
        match name.parse() {
            Ok(stat) => stat,
            Err(never) => match never {},
        }
    }
}

impl From<StatType> for String {
    fn from(stat: StatType) -> Self {
        stat.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A typed value stored in a record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Free-form text.
    Text(String),
    /// Whole number.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Enum-like name such as a material or mob type.
    Token(String),
    /// A location reference.
    Location(Location),
}

impl Value {
    /// Human-readable kind name, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Token(_) => "token",
            Self::Location(_) => "location",
        }
    }

    /// Numeric view of the value, if it is a number.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Field-wise sum used by cumulative merges.
    ///
    /// Integers saturate at the `i64` bounds; mixed operands promote to float.
    /// Returns `None` when either side is not numeric.
    #[must_use]
    pub fn checked_sum(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some(Self::Integer(a.saturating_add(*b))),
            (Self::Float(a), Self::Float(b)) => Some(Self::Float(a + b)),
            _ => Some(Self::Float(self.as_f64()? + other.as_f64()?)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) | Self::Token(v) => f.write_str(v),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Location(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Location> for Value {
    fn from(v: Location) -> Self {
        Self::Location(v)
    }
}
