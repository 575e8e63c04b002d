//! Per-match task.
//!
//! Each match is owned by exactly one task. Commands and disconnects reach it
//! through a channel and are applied between ticks, so the simulation never
//! sees two writers. After every tick or input the match outbox is flushed to
//! the seated sessions.

use std::sync::Arc;
use std::time::Duration;

use rts_core::commands::Command;
use rts_core::dispatch::{disconnect, dispatch};
use rts_core::entities::PlayerIndex;
use rts_core::simulation::{frame, tick};
use rts_core::state::Match;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::context::ServerContext;
use crate::lobby::SessionId;
use crate::protocol::{encode, encode_ack, events};

/// Frames waiting to be written to one connection.
pub type Outbound = mpsc::Sender<String>;

/// Something for a match to apply between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchInput {
    /// A decoded command from a seated player.
    Command {
        player: PlayerIndex,
        command: Command,
        /// Acknowledgement request id.
        ack: Option<u64>,
    },
    /// The player's connection closed.
    Disconnect { player: PlayerIndex },
}

/// A session playing in a match.
#[derive(Debug, Clone)]
pub struct SeatLink {
    pub player: PlayerIndex,
    pub session: SessionId,
    pub outbound: Outbound,
}

/// A created match waiting for its task.
#[derive(Debug)]
pub struct MatchLaunch {
    pub game: Match,
    pub seats: Vec<SeatLink>,
    pub inputs: mpsc::UnboundedReceiver<MatchInput>,
}

/// The match and who to tell about it.
#[derive(Debug)]
pub struct MatchRunner {
    game: Match,
    seats: Vec<SeatLink>,
}

impl MatchRunner {
    /// Wrap a created match.
    #[must_use]
    pub fn new(game: Match, seats: Vec<SeatLink>) -> Self {
        Self { game, seats }
    }

    /// The match.
    #[must_use]
    pub fn game(&self) -> &Match {
        &self.game
    }

    /// Check if the match should stop: decided, or nobody left to watch.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.game.is_over() || self.seats.is_empty()
    }

    /// Advance one tick and flush.
    pub fn step(&mut self) {
        tick(&mut self.game);
        self.flush();
    }

    /// Apply one input and flush.
    pub fn apply(&mut self, input: MatchInput) {
        match input {
            MatchInput::Command { player, command, ack } => {
                let outcome = dispatch(&mut self.game, player, &command);
                if let (Some(request), Some(answer)) = (ack, outcome.ack()) {
                    match encode_ack(request, &answer) {
                        Ok(text) => self.send_to(player, text),
                        Err(e) => error!(match_id = self.game.id, error = %e, "failed to encode ack"),
                    }
                }
            }
            MatchInput::Disconnect { player } => {
                info!(match_id = self.game.id, player, "player disconnected");
                self.seats.retain(|s| s.player != player);
                disconnect(&mut self.game, player);
            }
        }
        self.flush();
    }

    /// Send queued events to their audiences, then a snapshot if one was
    /// asked for and the match is still running.
    pub fn flush(&mut self) {
        for envelope in self.game.outbox.drain() {
            let text = match encode(envelope.event.name(), &envelope.event) {
                Ok(text) => text,
                Err(e) => {
                    error!(match_id = self.game.id, error = %e, "failed to encode event");
                    continue;
                }
            };
            for seat in self.seats.iter().filter(|s| envelope.audience.includes(s.player)) {
                deliver(seat, text.clone());
            }
        }

        if self.game.outbox.take_snapshot_request() && !self.game.is_over() {
            let state = frame(&mut self.game);
            match encode(events::STATE_UPDATE, &state) {
                Ok(text) => {
                    for seat in &self.seats {
                        deliver(seat, text.clone());
                    }
                }
                Err(e) => error!(match_id = self.game.id, error = %e, "failed to encode snapshot"),
            }
        }
    }

    fn send_to(&self, player: PlayerIndex, text: String) {
        if let Some(seat) = self.seats.iter().find(|s| s.player == player) {
            deliver(seat, text);
        }
    }
}

/// Queue a frame without waiting. A connection that cannot keep up loses
/// frames rather than stalling the match.
fn deliver(seat: &SeatLink, text: String) {
    match seat.outbound.try_send(text) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => warn!(session = seat.session, "outbound queue full, frame dropped"),
        Err(TrySendError::Closed(_)) => debug!(session = seat.session, "connection gone, frame dropped"),
    }
}

/// Run a match until it is decided or abandoned, then unregister it.
pub async fn run_match(launch: MatchLaunch, period: Duration, ctx: Arc<ServerContext>) {
    let MatchLaunch { game, seats, mut inputs } = launch;
    let id = game.id;
    let mut runner = MatchRunner::new(game, seats);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval completes at once; the match starts one
    // period after `matchStart`.
    ticker.tick().await;

    while !runner.finished() {
        tokio::select! {
            _ = ticker.tick() => runner.step(),
            input = inputs.recv() => match input {
                Some(input) => runner.apply(input),
                None => break,
            },
        }
    }

    info!(match_id = id, tick = runner.game().tick, outcome = ?runner.game().outcome, "match closed");
    ctx.finish_match(id).await;
}
