//! Process-wide registries and the request handlers that use them.
//!
//! Every handler here is synchronous and runs under the context lock. Starting
//! a match only builds it; the caller spawns its task.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rts_core::data::ContentTables;
use rts_core::entities::PlayerIndex;
use rts_core::setup::{create_match, MatchSetup, PlayerSetup};
use rts_core::snapshot::match_start;
use rts_core::state::MatchFlags;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::lobby::{Departure, Lobbies, LobbyError, SessionId};
use crate::match_loop::{MatchInput, MatchLaunch, Outbound, SeatLink};
use crate::protocol::{
    encode, encode_ack, events, ClientEvent, ClientFrame, CommandPayload, LobbyLeft, QueueStatus, Reply,
};

/// Colour of the player in a single-player match.
const SINGLEPLAYER_COLOR: &str = "blue";

/// Where a session sits in a running match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seat {
    pub match_id: u64,
    pub player: PlayerIndex,
}

#[derive(Debug)]
struct SessionEntry {
    outbound: Outbound,
    queued: bool,
    seat: Option<Seat>,
}

/// Monotonic id source shared by sessions and matches.
#[derive(Debug, Default)]
pub struct IdCounter(AtomicU64);

impl IdCounter {
    /// Next id, starting at 1.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Sessions, lobbies, the waiting queue and running matches.
#[derive(Debug)]
pub struct Registry {
    content: Arc<ContentTables>,
    config: ServerConfig,
    ids: IdCounter,
    sessions: BTreeMap<SessionId, SessionEntry>,
    lobbies: Lobbies,
    waiting: VecDeque<SessionId>,
    matches: BTreeMap<u64, mpsc::UnboundedSender<MatchInput>>,
}

impl Registry {
    /// Empty registry.
    #[must_use]
    pub fn new(content: Arc<ContentTables>, config: ServerConfig) -> Self {
        let lobbies = Lobbies::new(config.lobby_capacity(), content.color_options.clone());
        Self {
            content,
            config,
            ids: IdCounter::default(),
            sessions: BTreeMap::new(),
            lobbies,
            waiting: VecDeque::new(),
            matches: BTreeMap::new(),
        }
    }

    /// Open lobbies.
    #[must_use]
    pub fn lobbies(&self) -> &Lobbies {
        &self.lobbies
    }

    /// Number of running matches.
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Sessions waiting for a quick match, oldest first.
    #[must_use]
    pub fn waiting(&self) -> Vec<SessionId> {
        self.waiting.iter().copied().collect()
    }

    /// Where `session` is playing.
    #[must_use]
    pub fn seat(&self, session: SessionId) -> Option<Seat> {
        self.sessions.get(&session).and_then(|s| s.seat)
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    fn send_text(&self, session: SessionId, text: String) {
        let Some(entry) = self.sessions.get(&session) else {
            return;
        };
        if entry.outbound.try_send(text).is_err() {
            debug!(session, "frame dropped");
        }
    }

    fn send<T: Serialize + ?Sized>(&self, session: SessionId, event: &str, payload: &T) {
        match encode(event, payload) {
            Ok(text) => self.send_text(session, text),
            Err(e) => error!(event, error = %e, "failed to encode frame"),
        }
    }

    fn reply(&self, session: SessionId, ack: Option<u64>, reply: &Reply) {
        let Some(ack) = ack else {
            return;
        };
        match encode_ack(ack, reply) {
            Ok(text) => self.send_text(session, text),
            Err(e) => error!(error = %e, "failed to encode ack"),
        }
    }

    fn broadcast_lobby_list(&self) {
        let list = self.lobbies.list();
        match encode(events::LOBBY_LIST, &list) {
            Ok(text) => {
                for session in self.sessions.keys() {
                    self.send_text(*session, text.clone());
                }
            }
            Err(e) => error!(error = %e, "failed to encode lobby list"),
        }
    }

    fn emit_lobby_update(&self, lobby_id: &str) {
        let Some(lobby) = self.lobbies.get(lobby_id) else {
            return;
        };
        for member in &lobby.members {
            self.send(*member, events::LOBBY_UPDATE, &lobby.room(*member));
        }
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Register a connection and send it the lobby list.
    pub fn connect(&mut self, outbound: Outbound) -> SessionId {
        let session = self.ids.next();
        self.sessions.insert(
            session,
            SessionEntry {
                outbound,
                queued: false,
                seat: None,
            },
        );
        self.send(session, events::LOBBY_LIST, &self.lobbies.list());
        session
    }

    /// Forget a closed connection. A seated player is eliminated; anyone
    /// else leaves their lobby and the waiting queue.
    pub fn disconnect(&mut self, session: SessionId) {
        match self.live_seat(session) {
            Some(seat) => {
                if let Some(inputs) = self.matches.get(&seat.match_id) {
                    let _ = inputs.send(MatchInput::Disconnect { player: seat.player });
                }
            }
            None => self.leave_lobby(session, "disconnect"),
        }
        self.remove_from_queue(session);
        self.sessions.remove(&session);
    }

    /// The session's seat, cleared if its match has ended.
    fn live_seat(&mut self, session: SessionId) -> Option<Seat> {
        let entry = self.sessions.get_mut(&session)?;
        let seat = entry.seat?;
        if self.matches.contains_key(&seat.match_id) {
            Some(seat)
        } else {
            entry.seat = None;
            None
        }
    }

    fn remove_from_queue(&mut self, session: SessionId) {
        self.waiting.retain(|s| *s != session);
        if let Some(entry) = self.sessions.get_mut(&session) {
            entry.queued = false;
        }
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Handle one client frame. Returns a match to spawn, if one was created.
    pub fn handle(&mut self, session: SessionId, frame: &ClientFrame) -> Option<MatchLaunch> {
        if !self.sessions.contains_key(&session) {
            return None;
        }
        let Some(event) = ClientEvent::from_frame(frame, self.config.max_command_ids) else {
            debug!(session, event = %frame.event, "unknown event");
            return None;
        };
        let ack = frame.ack;
        match event {
            ClientEvent::RequestLobbies => self.send(session, events::LOBBY_LIST, &self.lobbies.list()),
            ClientEvent::CreateLobby { name } => {
                let reply = self.create_lobby(session, name.as_deref());
                self.reply(session, ack, &reply);
            }
            ClientEvent::JoinLobby { lobby } => {
                let reply = self.join_lobby(session, lobby.as_deref());
                self.reply(session, ack, &reply);
            }
            ClientEvent::LeaveLobby => self.leave_lobby(session, "left"),
            ClientEvent::StartLobby { lobby } => {
                let (reply, launch) = match self.start_lobby(session, lobby.as_deref()) {
                    Ok(launch) => (Reply::ok(), launch),
                    Err(e) => (Reply::refused(e.as_str()), None),
                };
                self.reply(session, ack, &reply);
                return launch;
            }
            ClientEvent::SetLobbyCheats { lobby, allow } => {
                let result = self.lobbies.set_cheats(session, lobby.as_deref(), allow).map(|l| l.id.clone());
                self.lobby_changed(session, ack, result);
            }
            ClientEvent::SetLobbyColor { lobby, color } => {
                let result = self.lobbies.set_color(session, lobby.as_deref(), &color).map(|l| l.id.clone());
                self.lobby_changed(session, ack, result);
            }
            ClientEvent::SetLobbyTeam { lobby, team } => {
                let result = self.lobbies.set_team(session, lobby.as_deref(), team).map(|l| l.id.clone());
                self.lobby_changed(session, ack, result);
            }
            ClientEvent::Play => return self.play(session),
            ClientEvent::CancelQueue => self.remove_from_queue(session),
            ClientEvent::Singleplayer => return self.singleplayer(session),
            ClientEvent::Command(payload) => self.command(session, payload, ack),
        }
        None
    }

    fn lobby_changed(&self, session: SessionId, ack: Option<u64>, result: Result<String, LobbyError>) {
        match result {
            Ok(id) => {
                self.emit_lobby_update(&id);
                self.broadcast_lobby_list();
                self.reply(session, ack, &Reply::lobby(id));
            }
            Err(e) => {
                debug!(session, reason = e.as_str(), "lobby change refused");
                self.reply(session, ack, &Reply::refused(e.as_str()));
            }
        }
    }

    fn leave_lobby(&mut self, session: SessionId, reason: &'static str) {
        let Some(Departure { lobby_id, still_open }) = self.lobbies.leave(session) else {
            return;
        };
        info!(session, lobby = %lobby_id, reason, "left lobby");
        self.send(session, events::LOBBY_LEFT, &LobbyLeft { reason });
        if still_open {
            self.emit_lobby_update(&lobby_id);
        }
        self.broadcast_lobby_list();
    }

    fn create_lobby(&mut self, session: SessionId, name: Option<&str>) -> Reply {
        if self.live_seat(session).is_some() {
            return Reply::refused(LobbyError::AlreadyInMatch.as_str());
        }
        self.leave_lobby(session, "switch");
        self.remove_from_queue(session);
        let lobby = self.lobbies.create(session, name);
        let id = lobby.id.clone();
        let room = lobby.room(session);
        info!(session, lobby = %id, "lobby created");
        self.send(session, events::LOBBY_JOINED, &room);
        self.emit_lobby_update(&id);
        self.broadcast_lobby_list();
        Reply::lobby(id)
    }

    fn join_lobby(&mut self, session: SessionId, lobby: Option<&str>) -> Reply {
        if self.live_seat(session).is_some() {
            return Reply::refused(LobbyError::AlreadyInMatch.as_str());
        }
        let id = match self.lobbies.check_join(lobby, session) {
            Ok(true) => return Reply::lobby(lobby.unwrap_or_default()),
            Ok(false) => lobby.unwrap_or_default().to_string(),
            Err(e) => return Reply::refused(e.as_str()),
        };
        self.leave_lobby(session, "switch");
        self.remove_from_queue(session);
        let room = match self.lobbies.join(&id, session) {
            Ok(lobby) => lobby.room(session),
            Err(e) => return Reply::refused(e.as_str()),
        };
        info!(session, lobby = %id, "joined lobby");
        self.send(session, events::LOBBY_JOINED, &room);
        self.emit_lobby_update(&id);
        self.broadcast_lobby_list();
        Reply::lobby(id)
    }

    fn start_lobby(&mut self, session: SessionId, lobby: Option<&str>) -> Result<Option<MatchLaunch>, LobbyError> {
        let start = self.lobbies.start(session, lobby)?;
        info!(lobby = %start.lobby_id, players = start.members.len(), "lobby starting");
        let flags = MatchFlags {
            allow_cheats: start.allow_cheats,
            ..self.base_flags()
        };
        let launch = self.launch(&start.members, start.players, flags);
        self.broadcast_lobby_list();
        Ok(launch)
    }

    fn play(&mut self, session: SessionId) -> Option<MatchLaunch> {
        let queued = self.sessions.get(&session).is_some_and(|s| s.queued);
        if self.live_seat(session).is_some() || queued {
            return None;
        }
        while let Some(opponent) = self.waiting.pop_front() {
            let Some(entry) = self.sessions.get_mut(&opponent) else {
                continue;
            };
            entry.queued = false;
            let members = [opponent, session];
            return self.launch(&members, vec![PlayerSetup::default(); 2], self.base_flags());
        }
        self.waiting.push_back(session);
        if let Some(entry) = self.sessions.get_mut(&session) {
            entry.queued = true;
        }
        debug!(session, "waiting for an opponent");
        self.send(session, events::QUEUE, &QueueStatus { status: "waiting" });
        None
    }

    fn singleplayer(&mut self, session: SessionId) -> Option<MatchLaunch> {
        let seated = self.live_seat(session).is_some();
        self.leave_lobby(session, "singleplayer");
        self.remove_from_queue(session);
        if seated {
            return None;
        }
        let player = PlayerSetup {
            team: None,
            color: Some(self.lobbies.color_hex(SINGLEPLAYER_COLOR)),
        };
        let flags = MatchFlags {
            singleplayer: true,
            host: Some(0),
            ..self.base_flags()
        };
        self.launch(&[session], vec![player], flags)
    }

    fn command(&mut self, session: SessionId, payload: CommandPayload, ack: Option<u64>) {
        let Some(seat) = self.live_seat(session) else {
            return;
        };
        let command = match payload {
            CommandPayload::Parsed(command) => command,
            CommandPayload::Invalid => {
                self.reply(session, ack, &Reply::refused("invalid_payload"));
                return;
            }
            CommandPayload::Unreadable(kind) => {
                warn!(session, kind = %kind, "unreadable command");
                return;
            }
        };
        if let Some(inputs) = self.matches.get(&seat.match_id) {
            let input = MatchInput::Command {
                player: seat.player,
                command,
                ack,
            };
            if inputs.send(input).is_err() {
                debug!(session, match_id = seat.match_id, "match already closed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Matches
    // ------------------------------------------------------------------

    fn base_flags(&self) -> MatchFlags {
        MatchFlags {
            alert_cooldown_ticks: self.config.alert_cooldown_ticks,
            ..MatchFlags::default()
        }
    }

    /// Create a match for `members` (slot order), seat them and send each
    /// their `matchStart`.
    fn launch(&mut self, members: &[SessionId], players: Vec<PlayerSetup>, flags: MatchFlags) -> Option<MatchLaunch> {
        let setup = MatchSetup {
            id: self.ids.next(),
            seed: rand::random(),
            players,
            flags,
        };
        let game = match create_match(Arc::clone(&self.content), &setup) {
            Ok(game) => game,
            Err(e) => {
                error!(error = %e, "failed to create match");
                return None;
            }
        };

        let mut seats = Vec::with_capacity(members.len());
        for (slot, session) in members.iter().enumerate() {
            let (Some(entry), Ok(player)) = (self.sessions.get_mut(session), PlayerIndex::try_from(slot)) else {
                continue;
            };
            entry.seat = Some(Seat {
                match_id: game.id,
                player,
            });
            entry.queued = false;
            seats.push(SeatLink {
                player,
                session: *session,
                outbound: entry.outbound.clone(),
            });
        }
        for seat in &seats {
            self.send(seat.session, events::MATCH_START, &match_start(&game, seat.player));
        }

        let (tx, inputs) = mpsc::unbounded_channel();
        self.matches.insert(game.id, tx);
        info!(
            match_id = game.id,
            seed = setup.seed,
            players = seats.len(),
            singleplayer = flags.singleplayer,
            "match started"
        );
        Some(MatchLaunch { game, seats, inputs })
    }

    /// Drop a closed match and free its players' seats.
    pub fn finish_match(&mut self, match_id: u64) {
        self.matches.remove(&match_id);
        for entry in self.sessions.values_mut() {
            if entry.seat.is_some_and(|s| s.match_id == match_id) {
                entry.seat = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rts_test_utils::fixtures::standard_content;
    use serde_json::{json, Value};

    struct Client {
        id: SessionId,
        rx: mpsc::Receiver<String>,
    }

    impl Client {
        fn frames(&mut self) -> Vec<Value> {
            let mut frames = Vec::new();
            while let Ok(text) = self.rx.try_recv() {
                frames.push(serde_json::from_str(&text).unwrap());
            }
            frames
        }

        fn last(&mut self, event: &str) -> Option<Value> {
            self.frames().into_iter().filter(|f| f["event"] == event).last().map(|f| f["payload"].clone())
        }
    }

    fn registry() -> Registry {
        Registry::new(standard_content(), ServerConfig::default())
    }

    fn connect(r: &mut Registry) -> Client {
        let (tx, rx) = mpsc::channel(256);
        let id = r.connect(tx);
        Client { id, rx }
    }

    fn send(r: &mut Registry, client: &Client, event: &str, payload: Value) -> Option<MatchLaunch> {
        let frame = ClientFrame {
            event: event.to_string(),
            payload,
            ack: Some(1),
        };
        r.handle(client.id, &frame)
    }

    #[test]
    fn test_connect_sends_lobby_list() {
        let mut r = registry();
        let mut a = connect(&mut r);
        assert_eq!(a.last("lobbyList"), Some(json!([])));
    }

    #[test]
    fn test_create_and_join_notify_everyone() {
        let mut r = registry();
        let mut a = connect(&mut r);
        let mut b = connect(&mut r);
        let mut watcher = connect(&mut r);

        send(&mut r, &a, "createLobby", json!({"name": "Arena"}));
        let frames = a.frames();
        assert!(frames.iter().any(|f| f["event"] == "lobbyJoined" && f["payload"]["isHost"] == true));
        assert!(frames.iter().any(|f| f["event"] == "ack" && f["payload"]["id"] == "lobby-1"));
        assert_eq!(watcher.last("lobbyList").unwrap()[0]["name"], "Arena");

        send(&mut r, &b, "joinLobby", json!({"id": "lobby-1"}));
        let update = a.last("lobbyUpdate").unwrap();
        assert_eq!(update["players"].as_array().unwrap().len(), 2);
        assert_eq!(update["teamAssignments"][b.id.to_string()], 2);
        assert!(b.frames().iter().any(|f| f["event"] == "lobbyJoined"));
        assert_eq!(watcher.last("lobbyList").unwrap()[0]["players"], 2);
    }

    #[test]
    fn test_join_missing_lobby_is_refused() {
        let mut r = registry();
        let mut a = connect(&mut r);
        send(&mut r, &a, "joinLobby", json!({"id": "lobby-7"}));
        let ack = a.last("ack").unwrap();
        assert_eq!(ack["ok"], false);
        assert_eq!(ack["reason"], "not_found");
    }

    #[test]
    fn test_switching_lobby_leaves_the_old_one() {
        let mut r = registry();
        let mut a = connect(&mut r);
        let b = connect(&mut r);
        send(&mut r, &a, "createLobby", json!({}));
        send(&mut r, &b, "createLobby", json!({}));
        a.frames();
        send(&mut r, &a, "joinLobby", json!({"id": "lobby-2"}));
        assert_eq!(a.last("lobbyJoined").map(|p| p["id"].clone()), Some(json!("lobby-2")));
        assert!(r.lobbies().get("lobby-1").is_none());
        assert_eq!(r.lobbies().get("lobby-2").unwrap().members, vec![b.id, a.id]);
    }

    #[test]
    fn test_start_lobby_launches_match() {
        let mut r = registry();
        let mut a = connect(&mut r);
        let mut b = connect(&mut r);
        send(&mut r, &a, "createLobby", json!({}));
        send(&mut r, &b, "joinLobby", json!({"id": "lobby-1"}));
        assert!(send(&mut r, &b, "startLobby", json!({})).is_none());
        assert_eq!(b.last("ack").unwrap()["reason"], "not_host");

        let launch = send(&mut r, &a, "startLobby", json!({})).expect("match launched");
        assert_eq!(launch.seats.len(), 2);
        assert_eq!(launch.game.players[0].team, 1);
        assert_eq!(launch.game.players[1].team, 2);
        assert!(r.lobbies().is_empty());
        assert_eq!(r.match_count(), 1);
        assert_eq!(r.seat(b.id).map(|s| s.player), Some(1));

        let start = b.last("matchStart").unwrap();
        assert_eq!(start["playerIndex"], 1);
        assert_eq!(start["singleplayer"], false);
        assert!(a.frames().iter().any(|f| f["event"] == "matchStart"));

        // Seated players cannot open lobbies.
        send(&mut r, &a, "createLobby", json!({}));
        assert_eq!(a.last("ack").unwrap()["reason"], "already_in_match");
    }

    #[test]
    fn test_play_pairs_two_sessions() {
        let mut r = registry();
        let mut a = connect(&mut r);
        let b = connect(&mut r);
        assert!(send(&mut r, &a, "play", Value::Null).is_none());
        assert_eq!(a.last("queue"), Some(json!({"status": "waiting"})));
        assert_eq!(r.waiting(), vec![a.id]);

        let launch = send(&mut r, &b, "play", Value::Null).expect("paired");
        assert!(r.waiting().is_empty());
        assert_eq!(launch.seats[0].session, a.id);
        assert_eq!(launch.seats[1].session, b.id);
    }

    #[test]
    fn test_cancel_queue() {
        let mut r = registry();
        let a = connect(&mut r);
        send(&mut r, &a, "play", Value::Null);
        send(&mut r, &a, "cancelQueue", Value::Null);
        assert!(r.waiting().is_empty());
    }

    #[test]
    fn test_singleplayer_leaves_lobby_and_starts_alone() {
        let mut r = registry();
        let mut a = connect(&mut r);
        send(&mut r, &a, "createLobby", json!({}));
        a.frames();
        let launch = send(&mut r, &a, "singleplayer", Value::Null).expect("started");
        assert!(r.lobbies().is_empty());
        assert_eq!(launch.game.players.len(), 1);
        assert!(launch.game.flags.singleplayer);
        assert_eq!(launch.game.flags.host, Some(0));
        assert_eq!(launch.game.players[0].color, "#2c7be5");
        let frames = a.frames();
        assert!(frames.iter().any(|f| f["event"] == "lobbyLeft" && f["payload"]["reason"] == "singleplayer"));
        assert!(frames.iter().any(|f| f["event"] == "matchStart" && f["payload"]["singleplayer"] == true));
    }

    #[test]
    fn test_commands_reach_the_match() {
        let mut r = registry();
        let mut a = connect(&mut r);
        let mut launch = send(&mut r, &a, "singleplayer", Value::Null).unwrap();
        a.frames();

        send(&mut r, &a, "command", json!("move"));
        assert_eq!(a.last("ack").unwrap()["reason"], "invalid_payload");

        send(&mut r, &a, "command", json!({"type": "resign"}));
        let input = launch.inputs.try_recv().unwrap();
        assert_eq!(
            input,
            MatchInput::Command {
                player: 0,
                command: rts_core::commands::Command::Resign,
                ack: Some(1)
            }
        );
    }

    #[test]
    fn test_disconnect_in_lobby_migrates_host() {
        let mut r = registry();
        let a = connect(&mut r);
        let mut b = connect(&mut r);
        send(&mut r, &a, "createLobby", json!({}));
        send(&mut r, &b, "joinLobby", json!({"id": "lobby-1"}));
        b.frames();
        r.disconnect(a.id);
        assert_eq!(r.lobbies().get("lobby-1").unwrap().host, b.id);
        assert_eq!(b.last("lobbyUpdate").unwrap()["isHost"], true);
    }

    #[test]
    fn test_disconnect_in_match_is_forwarded_and_seat_cleared_on_finish() {
        let mut r = registry();
        let a = connect(&mut r);
        let b = connect(&mut r);
        send(&mut r, &a, "play", Value::Null);
        let mut launch = send(&mut r, &b, "play", Value::Null).unwrap();
        r.disconnect(b.id);
        assert_eq!(launch.inputs.try_recv().unwrap(), MatchInput::Disconnect { player: 1 });

        r.finish_match(launch.game.id);
        assert_eq!(r.seat(a.id), None);
        assert_eq!(r.match_count(), 0);
    }

    #[test]
    fn test_lobby_color_and_team_changes() {
        let mut r = registry();
        let mut a = connect(&mut r);
        send(&mut r, &a, "createLobby", json!({}));
        send(&mut r, &a, "setLobbyColor", json!({"colorId": "purple"}));
        assert_eq!(a.last("lobbyUpdate").unwrap()["colorAssignments"][a.id.to_string()], "purple");
        send(&mut r, &a, "setLobbyTeam", json!({"team": 9}));
        assert_eq!(a.last("ack").unwrap()["reason"], "invalid_team");
        send(&mut r, &a, "setLobbyCheats", json!({"allowCheats": true}));
        assert_eq!(a.last("lobbyUpdate").unwrap()["allowCheats"], true);
    }
}
