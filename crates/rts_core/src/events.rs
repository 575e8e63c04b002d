//! Outbox of notifications produced by the tick engine and command handlers.
//!
//! The core never talks to sockets. Anything a client should hear about is
//! pushed here with an [`Audience`] and drained by the transport after each
//! tick or command.

use serde::Serialize;

use crate::data::option_fixed_serde;
use crate::elimination::MatchOutcome;
use crate::entities::{EntityId, PlayerIndex};
use crate::kinds::{BuildingType, TechId, UnitType};
use crate::math::{fixed_serde, Fixed};

/// Who receives an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Audience {
    /// Every connection in the match.
    Everyone,
    /// One player slot.
    Player(PlayerIndex),
    /// Every connection except one player slot.
    AllExcept(PlayerIndex),
}

impl Audience {
    /// Check if a player slot receives events sent to this audience.
    #[must_use]
    pub fn includes(self, player: PlayerIndex) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::Player(p) => p == player,
            Audience::AllExcept(p) => p != player,
        }
    }
}

/// What was hit, for attack alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// A unit.
    Unit,
    /// A regular building.
    Building,
    /// A landmark.
    Landmark,
}

/// A player's or ally's entity is under attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackAlert {
    pub kind: AlertKind,
    /// The victim belongs to a teammate rather than the recipient.
    pub is_ally: bool,
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
    /// Attacker position, omitted when the recipient can already see it.
    #[serde(with = "option_fixed_serde")]
    pub attacker_x: Option<Fixed>,
    #[serde(with = "option_fixed_serde")]
    pub attacker_y: Option<Fixed>,
}

/// A landmark fell to 0 hp and became a corpse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkDestroyed {
    pub building_id: EntityId,
    pub building_type: BuildingType,
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Where a finished technology applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchScope {
    /// Every building and unit of the player.
    Player,
    /// Only the researching building.
    Building,
    /// Age reached by completing a landmark.
    Landmark,
}

/// A technology or age-up finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchComplete {
    /// `None` for ages reached through landmarks.
    pub tech_id: Option<TechId>,
    pub name: String,
    pub is_age: bool,
    pub age_tier: Option<u8>,
    /// Age name once an age was reached.
    pub age: Option<String>,
    pub building_id: Option<EntityId>,
    pub scope: ResearchScope,
}

/// Notification payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GameEvent {
    AttackAlert(AttackAlert),
    LandmarkDestroyed(LandmarkDestroyed),
    ResearchComplete(ResearchComplete),
    #[serde(rename_all = "camelCase")]
    UnitComplete { unit_type: UnitType },
    #[serde(rename_all = "camelCase")]
    BuildingComplete { building_type: BuildingType },
    #[serde(rename_all = "camelCase")]
    PlayerResigned { player_index: PlayerIndex, label: String },
    MatchEnded(MatchOutcome),
}

impl GameEvent {
    /// Wire event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            GameEvent::AttackAlert(_) => "attackAlert",
            GameEvent::LandmarkDestroyed(_) => "landmarkDestroyed",
            GameEvent::ResearchComplete(_) => "researchComplete",
            GameEvent::UnitComplete { .. } => "unitComplete",
            GameEvent::BuildingComplete { .. } => "buildingComplete",
            GameEvent::PlayerResigned { .. } => "playerResigned",
            GameEvent::MatchEnded(_) => "matchEnded",
        }
    }
}

/// An event with its recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub audience: Audience,
    pub event: GameEvent,
}

/// Pending notifications of one match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outbox {
    events: Vec<Envelope>,
    snapshot_requested: bool,
}

impl Outbox {
    /// Queue an event.
    pub fn push(&mut self, audience: Audience, event: GameEvent) {
        self.events.push(Envelope { audience, event });
    }

    /// Queue an event for one player.
    pub fn to_player(&mut self, player: PlayerIndex, event: GameEvent) {
        self.push(Audience::Player(player), event);
    }

    /// Queue an event for everyone in the match.
    pub fn broadcast(&mut self, event: GameEvent) {
        self.push(Audience::Everyone, event);
    }

    /// Ask the transport to send a snapshot now instead of waiting for the
    /// next tick.
    pub fn request_snapshot(&mut self) {
        self.snapshot_requested = true;
    }

    /// Take and reset the snapshot request.
    pub fn take_snapshot_request(&mut self) -> bool {
        std::mem::take(&mut self.snapshot_requested)
    }

    /// Queued events, oldest first.
    #[must_use]
    pub fn events(&self) -> &[Envelope] {
        &self.events
    }

    /// Remove and return every queued event.
    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.events)
    }

    /// Check if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && !self.snapshot_requested
    }
}
