//! # RTS Core
//!
//! Deterministic match simulation for a server-authoritative real-time
//! strategy game.
//!
//! This crate contains **only** simulation logic:
//! - No IO or networking
//! - No system randomness (map generation uses a seeded generator)
//! - No floating-point math inside the tick (uses fixed-point)
//!
//! The server crate owns sockets, lobbies and timers. It feeds decoded
//! [`commands::Command`]s into [`dispatch::dispatch`], advances the match
//! with [`simulation::tick`] and flushes the [`events::Outbox`].
//!
//! ## Crate Structure
//!
//! - [`data`] - Content tables loaded from RON
//! - [`setup`] - Match creation and map layout
//! - [`commands`] / [`dispatch`] - Player commands and their validation
//! - [`simulation`] - The tick loop
//! - [`snapshot`] - Per-tick state broadcast
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod buildings;
pub mod combat;
pub mod commands;
pub mod construction;
pub mod data;
pub mod defenses;
pub mod dispatch;
pub mod economy;
pub mod elimination;
pub mod entities;
pub mod error;
pub mod events;
pub mod healing;
pub mod kinds;
pub mod map_generation;
pub mod math;
pub mod movement;
pub mod orders;
pub mod pathfinding;
pub mod production;
pub mod relics;
pub mod setup;
pub mod simulation;
pub mod snapshot;
pub mod spawn;
pub mod state;
pub mod stats;
pub mod steering;
pub mod targeting;
pub mod trading;

#[cfg(test)]
mod test_support;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::commands::{Command, CommandOutcome, Rejection};
    pub use crate::data::ContentTables;
    pub use crate::dispatch::{disconnect, dispatch};
    pub use crate::economy::Stockpile;
    pub use crate::elimination::{MatchOutcome, OutcomeReason};
    pub use crate::entities::{EntityId, PlayerIndex};
    pub use crate::error::{GameError, Result};
    pub use crate::events::{Audience, Envelope, GameEvent, Outbox};
    pub use crate::kinds::{BuildingType, UnitType};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::setup::{create_match, MatchSetup, PlayerSetup, MAX_PLAYERS};
    pub use crate::simulation::{frame, state_hash, tick, TickReport};
    pub use crate::snapshot::Snapshot;
    pub use crate::state::{Match, MatchFlags};
}
