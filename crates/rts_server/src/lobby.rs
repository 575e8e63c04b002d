//! Pre-match lobbies.
//!
//! A lobby is a named room of up to four sessions. The host can toggle cheats
//! and start the match; every member picks a colour and a team. Colours are
//! unique within a lobby, teams are not.
//!
//! The registry here only holds rules and state. Telling clients about the
//! changes is the caller's job.

use std::collections::{BTreeMap, BTreeSet};

use rts_core::data::ColorOption;
use rts_core::setup::PlayerSetup;
use serde::Serialize;
use thiserror::Error;

/// Connection id.
pub type SessionId = u64;

/// Teams a member may pick.
pub const TEAM_OPTIONS: [u8; 4] = [1, 2, 3, 4];

/// Name given to lobbies created without one.
pub const DEFAULT_LOBBY_NAME: &str = "New Lobby";

/// Longest lobby name kept, in characters.
pub const MAX_LOBBY_NAME: usize = 24;

/// Colour used when nothing else is known.
const FALLBACK_COLOR: &str = "#2c7be5";

/// Why a lobby request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LobbyError {
    /// The session is playing a match.
    #[error("already_in_match")]
    AlreadyInMatch,
    /// No lobby with that id.
    #[error("not_found")]
    NotFound,
    /// The lobby is at capacity.
    #[error("full")]
    Full,
    /// Only the host may do that.
    #[error("not_host")]
    NotHost,
    /// Fewer than two members.
    #[error("not_ready")]
    NotReady,
    /// Everyone is on one team.
    #[error("team_not_ready")]
    TeamNotReady,
    /// The session is not in that lobby.
    #[error("not_member")]
    NotMember,
    /// No such colour.
    #[error("invalid_color")]
    InvalidColor,
    /// Another member has that colour.
    #[error("color_taken")]
    ColorTaken,
    /// Not one of [`TEAM_OPTIONS`].
    #[error("invalid_team")]
    InvalidTeam,
}

impl LobbyError {
    /// Wire reason string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LobbyError::AlreadyInMatch => "already_in_match",
            LobbyError::NotFound => "not_found",
            LobbyError::Full => "full",
            LobbyError::NotHost => "not_host",
            LobbyError::NotReady => "not_ready",
            LobbyError::TeamNotReady => "team_not_ready",
            LobbyError::NotMember => "not_member",
            LobbyError::InvalidColor => "invalid_color",
            LobbyError::ColorTaken => "color_taken",
            LobbyError::InvalidTeam => "invalid_team",
        }
    }
}

/// One lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lobby {
    pub id: String,
    pub name: String,
    pub host: SessionId,
    /// Members in join order.
    pub members: Vec<SessionId>,
    pub capacity: usize,
    pub allow_cheats: bool,
    /// Colour id per member.
    pub colors: BTreeMap<SessionId, String>,
    /// Team per member.
    pub teams: BTreeMap<SessionId, u8>,
}

impl Lobby {
    /// Check if `session` is a member.
    #[must_use]
    pub fn is_member(&self, session: SessionId) -> bool {
        self.members.contains(&session)
    }

    /// Check if the lobby has no free slot.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    fn allocate_color(&mut self, session: SessionId, options: &[ColorOption]) {
        if self.colors.contains_key(&session) {
            return;
        }
        let taken: BTreeSet<&String> = self.colors.values().collect();
        let color = options
            .iter()
            .find(|c| !taken.contains(&c.id))
            .or_else(|| options.first())
            .map_or_else(|| "blue".to_string(), |c| c.id.clone());
        self.colors.insert(session, color);
    }

    fn allocate_team(&mut self, session: SessionId) {
        if self.teams.contains_key(&session) {
            return;
        }
        let used = |team: u8| self.teams.values().filter(|t| **t == team).count();
        // Ties go to the lowest team.
        let team = TEAM_OPTIONS
            .iter()
            .copied()
            .min_by_key(|team| used(*team))
            .unwrap_or(TEAM_OPTIONS[0]);
        self.teams.insert(session, team);
    }

    fn forget(&mut self, session: SessionId) {
        self.members.retain(|m| *m != session);
        self.colors.remove(&session);
        self.teams.remove(&session);
    }

    /// Entry in `lobbyList`.
    #[must_use]
    pub fn summary(&self) -> LobbySummary {
        LobbySummary {
            id: self.id.clone(),
            name: self.name.clone(),
            players: self.members.len(),
            capacity: self.capacity,
            allow_cheats: self.allow_cheats,
        }
    }

    /// `lobbyJoined` / `lobbyUpdate` payload as seen by `viewer`.
    #[must_use]
    pub fn room(&self, viewer: SessionId) -> LobbyRoom {
        LobbyRoom {
            id: self.id.clone(),
            name: self.name.clone(),
            capacity: self.capacity,
            players: self
                .members
                .iter()
                .enumerate()
                .map(|(i, id)| LobbyMember {
                    id: *id,
                    label: if *id == self.host {
                        "Host".to_string()
                    } else {
                        format!("Player {}", i + 1)
                    },
                    is_host: *id == self.host,
                    team: self.teams.get(id).copied().unwrap_or(TEAM_OPTIONS[0]),
                })
                .collect(),
            is_host: viewer == self.host,
            allow_cheats: self.allow_cheats,
            color_assignments: self.colors.clone(),
            team_assignments: self.teams.clone(),
        }
    }
}

/// `lobbyList` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    pub id: String,
    pub name: String,
    /// Member count.
    pub players: usize,
    pub capacity: usize,
    pub allow_cheats: bool,
}

/// Member entry of a [`LobbyRoom`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyMember {
    pub id: SessionId,
    pub label: String,
    pub is_host: bool,
    pub team: u8,
}

/// Full lobby view for its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyRoom {
    pub id: String,
    pub name: String,
    pub capacity: usize,
    pub players: Vec<LobbyMember>,
    pub is_host: bool,
    pub allow_cheats: bool,
    pub color_assignments: BTreeMap<SessionId, String>,
    pub team_assignments: BTreeMap<SessionId, u8>,
}

/// A member left a lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub lobby_id: String,
    /// `false` when the lobby emptied and was deleted.
    pub still_open: bool,
}

/// A lobby turned into a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyStart {
    pub lobby_id: String,
    /// Members in slot order.
    pub members: Vec<SessionId>,
    /// Team and colour per slot.
    pub players: Vec<PlayerSetup>,
    pub allow_cheats: bool,
}

/// Every open lobby.
#[derive(Debug, Clone)]
pub struct Lobbies {
    lobbies: BTreeMap<String, Lobby>,
    next_id: u64,
    capacity: usize,
    colors: Vec<ColorOption>,
}

impl Lobbies {
    /// No lobbies yet. New lobbies hold `capacity` members and offer `colors`.
    #[must_use]
    pub fn new(capacity: usize, colors: Vec<ColorOption>) -> Self {
        Self {
            lobbies: BTreeMap::new(),
            next_id: 1,
            capacity,
            colors,
        }
    }

    /// Lobby by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Lobby> {
        self.lobbies.get(id)
    }

    /// The lobby `session` is in.
    #[must_use]
    pub fn of(&self, session: SessionId) -> Option<&Lobby> {
        self.lobbies.values().find(|l| l.is_member(session))
    }

    /// `requested`, or the lobby `session` is in.
    fn resolve(&self, requested: Option<&str>, session: SessionId) -> Result<String, LobbyError> {
        let id = match requested {
            Some(id) => id.to_string(),
            None => self.of(session).map(|l| l.id.clone()).ok_or(LobbyError::NotFound)?,
        };
        if self.lobbies.contains_key(&id) {
            Ok(id)
        } else {
            Err(LobbyError::NotFound)
        }
    }

    /// Number of open lobbies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    /// Check if no lobby is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    /// `lobbyList` payload.
    #[must_use]
    pub fn list(&self) -> Vec<LobbySummary> {
        self.lobbies.values().map(Lobby::summary).collect()
    }

    /// Hex value of a colour id.
    #[must_use]
    pub fn color_hex(&self, color_id: &str) -> String {
        self.colors
            .iter()
            .find(|c| c.id == color_id)
            .or_else(|| self.colors.first())
            .map_or_else(|| FALLBACK_COLOR.to_string(), |c| c.hex.clone())
    }

    /// Open a lobby hosted by `host`. The host must not be in another lobby.
    pub fn create(&mut self, host: SessionId, name: Option<&str>) -> &Lobby {
        let id = format!("lobby-{}", self.next_id);
        self.next_id += 1;
        let mut lobby = Lobby {
            id: id.clone(),
            name: lobby_name(name),
            host,
            members: vec![host],
            capacity: self.capacity,
            allow_cheats: false,
            colors: BTreeMap::new(),
            teams: BTreeMap::new(),
        };
        lobby.allocate_color(host, &self.colors);
        lobby.allocate_team(host);
        self.lobbies.entry(id).or_insert(lobby)
    }

    /// Check whether `session` may join. `Ok(true)` means it already is a member.
    pub fn check_join(&self, id: Option<&str>, session: SessionId) -> Result<bool, LobbyError> {
        let lobby = id.and_then(|id| self.lobbies.get(id)).ok_or(LobbyError::NotFound)?;
        if lobby.is_member(session) {
            return Ok(true);
        }
        if lobby.is_full() {
            return Err(LobbyError::Full);
        }
        Ok(false)
    }

    /// Add `session` to lobby `id`. The session must not be in another lobby.
    pub fn join(&mut self, id: &str, session: SessionId) -> Result<&Lobby, LobbyError> {
        let lobby = self.lobbies.get_mut(id).ok_or(LobbyError::NotFound)?;
        if !lobby.is_member(session) {
            if lobby.is_full() {
                return Err(LobbyError::Full);
            }
            lobby.members.push(session);
            lobby.allocate_color(session, &self.colors);
            lobby.allocate_team(session);
        }
        Ok(&*lobby)
    }

    /// Take `session` out of its lobby. The host role passes to the oldest
    /// remaining member; an empty lobby is deleted.
    pub fn leave(&mut self, session: SessionId) -> Option<Departure> {
        let id = self.of(session)?.id.clone();
        let lobby = self.lobbies.get_mut(&id)?;
        lobby.forget(session);
        let still_open = match lobby.members.first() {
            None => false,
            Some(first) => {
                if lobby.host == session {
                    lobby.host = *first;
                }
                true
            }
        };
        if !still_open {
            self.lobbies.remove(&id);
        }
        Some(Departure { lobby_id: id, still_open })
    }

    /// Host-only cheat switch.
    pub fn set_cheats(&mut self, session: SessionId, id: Option<&str>, allow: bool) -> Result<&Lobby, LobbyError> {
        let id = self.resolve(id, session)?;
        let lobby = self.lobbies.get_mut(&id).ok_or(LobbyError::NotFound)?;
        if lobby.host != session {
            return Err(LobbyError::NotHost);
        }
        lobby.allow_cheats = allow;
        Ok(&*lobby)
    }

    /// Pick a colour not held by another member.
    pub fn set_color(&mut self, session: SessionId, id: Option<&str>, color: &str) -> Result<&Lobby, LobbyError> {
        let id = self.resolve(id, session)?;
        let color = color.trim();
        let valid = self.colors.iter().any(|c| c.id == color);
        let lobby = self.lobbies.get_mut(&id).ok_or(LobbyError::NotFound)?;
        if !lobby.is_member(session) {
            return Err(LobbyError::NotMember);
        }
        if !valid {
            return Err(LobbyError::InvalidColor);
        }
        if lobby.colors.iter().any(|(member, c)| *member != session && c == color) {
            return Err(LobbyError::ColorTaken);
        }
        lobby.colors.insert(session, color.to_string());
        Ok(&*lobby)
    }

    /// Pick a team.
    pub fn set_team(&mut self, session: SessionId, id: Option<&str>, team: Option<f64>) -> Result<&Lobby, LobbyError> {
        let id = self.resolve(id, session)?;
        let lobby = self.lobbies.get_mut(&id).ok_or(LobbyError::NotFound)?;
        if !lobby.is_member(session) {
            return Err(LobbyError::NotMember);
        }
        let team = team
            .and_then(|t| TEAM_OPTIONS.iter().copied().find(|option| f64::from(*option) == t))
            .ok_or(LobbyError::InvalidTeam)?;
        lobby.teams.insert(session, team);
        Ok(&*lobby)
    }

    /// Close the lobby and hand back what the match needs.
    ///
    /// Only the host may start, with at least two members on at least two
    /// teams.
    pub fn start(&mut self, session: SessionId, id: Option<&str>) -> Result<LobbyStart, LobbyError> {
        let id = self.resolve(id, session)?;
        let lobby = self.lobbies.get_mut(&id).ok_or(LobbyError::NotFound)?;
        if lobby.host != session {
            return Err(LobbyError::NotHost);
        }
        if lobby.members.len() < 2 {
            return Err(LobbyError::NotReady);
        }
        for member in lobby.members.clone() {
            lobby.allocate_color(member, &self.colors);
            lobby.allocate_team(member);
        }
        let teams: BTreeSet<u8> = lobby.members.iter().filter_map(|m| lobby.teams.get(m).copied()).collect();
        if teams.len() < 2 {
            return Err(LobbyError::TeamNotReady);
        }

        let lobby = self.lobbies.remove(&id).ok_or(LobbyError::NotFound)?;
        let players = lobby
            .members
            .iter()
            .map(|m| PlayerSetup {
                team: lobby.teams.get(m).copied(),
                color: lobby.colors.get(m).map(|c| self.color_hex(c)),
            })
            .collect();
        Ok(LobbyStart {
            lobby_id: lobby.id,
            members: lobby.members,
            players,
            allow_cheats: lobby.allow_cheats,
        })
    }
}

/// Trimmed, shortened name, or the default.
#[must_use]
pub fn lobby_name(raw: Option<&str>) -> String {
    let name: String = raw.unwrap_or_default().trim().chars().take(MAX_LOBBY_NAME).collect();
    let name = name.trim_end();
    if name.is_empty() {
        DEFAULT_LOBBY_NAME.to_string()
    } else {
        name.to_string()
    }
}
