//! Lobby model: membership, teams, ready flags and start validation

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::game::RosterEntry;
use crate::ws::protocol::{LobbyMember, LobbySettings, LobbyView, Team};

/// Unambiguous code characters (no 0/O, 1/I)
pub const LOBBY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const LOBBY_CODE_LENGTH: usize = 6;

pub const MIN_TEAM_SIZE: u8 = 1;
pub const MAX_TEAM_SIZE: u8 = 5;
pub const MIN_MATCH_DURATION: u32 = 60;
pub const MAX_MATCH_DURATION: u32 = 900;
pub const MAX_NAME_LENGTH: usize = 24;

/// Lobby errors, shown to the client that caused them
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("Lobby not found")]
    NotFound,

    #[error("Lobby is full")]
    Full,

    #[error("Team is full")]
    TeamFull,

    #[error("Already in a lobby")]
    AlreadyInLobby,

    #[error("Not in a lobby")]
    NotInLobby,

    #[error("Already in a match")]
    InMatch,

    #[error("Only the host can start the match")]
    NotHost,

    #[error("Not all players are ready")]
    NotReady,

    #[error("Each team needs at least one player")]
    EmptyTeam,

    #[error("Invalid settings: {0}")]
    InvalidSettings(&'static str),
}

/// Random lobby code
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..LOBBY_CODE_LENGTH)
        .map(|_| LOBBY_CODE_ALPHABET[rng.gen_range(0..LOBBY_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

pub fn validate_settings(settings: LobbySettings) -> Result<LobbySettings, LobbyError> {
    if !(MIN_TEAM_SIZE..=MAX_TEAM_SIZE).contains(&settings.team_size) {
        return Err(LobbyError::InvalidSettings("team size must be 1-5"));
    }
    if !(MIN_MATCH_DURATION..=MAX_MATCH_DURATION).contains(&settings.match_duration) {
        return Err(LobbyError::InvalidSettings(
            "match duration must be 60-900 seconds",
        ));
    }
    Ok(settings)
}

/// Trim and shorten a display name, falling back to one derived from the id
pub fn display_name(name: Option<&str>, id: Uuid) -> String {
    let trimmed: String = name
        .unwrap_or_default()
        .trim()
        .chars()
        .take(MAX_NAME_LENGTH)
        .collect();

    if trimmed.is_empty() {
        format!("Player_{}", &id.simple().to_string()[..8])
    } else {
        trimmed
    }
}

/// A pre-match lobby
#[derive(Debug, Clone)]
pub struct Lobby {
    pub code: String,
    pub host_id: Uuid,
    pub settings: LobbySettings,
    /// Join order
    pub members: Vec<LobbyMember>,
    pub created_at: DateTime<Utc>,
}

impl Lobby {
    /// New lobby with the host already seated on the home team
    pub fn new(code: String, host_id: Uuid, host_name: String, settings: LobbySettings) -> Self {
        Self {
            code,
            host_id,
            settings,
            members: vec![LobbyMember {
                id: host_id,
                name: host_name,
                team: Team::Home,
                ready: false,
            }],
            created_at: Utc::now(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.settings.team_size as usize * 2
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn team_count(&self, team: Team) -> usize {
        self.members.iter().filter(|m| m.team == team).count()
    }

    pub fn member(&self, id: Uuid) -> Option<&LobbyMember> {
        self.members.iter().find(|m| m.id == id)
    }

    fn member_mut(&mut self, id: Uuid) -> Result<&mut LobbyMember, LobbyError> {
        self.members
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(LobbyError::NotInLobby)
    }

    /// Seat a new member on the smaller team, home on a tie
    pub fn join(&mut self, id: Uuid, name: String) -> Result<&LobbyMember, LobbyError> {
        if self.member(id).is_some() {
            return Err(LobbyError::AlreadyInLobby);
        }
        if self.is_full() {
            return Err(LobbyError::Full);
        }

        let team = if self.team_count(Team::Away) < self.team_count(Team::Home) {
            Team::Away
        } else {
            Team::Home
        };

        self.members.push(LobbyMember {
            id,
            name,
            team,
            ready: false,
        });
        Ok(&self.members[self.members.len() - 1])
    }

    /// Remove a member. The host role passes to the longest-standing member.
    pub fn leave(&mut self, id: Uuid) -> Option<LobbyMember> {
        let index = self.members.iter().position(|m| m.id == id)?;
        let member = self.members.remove(index);

        if member.id == self.host_id {
            if let Some(next) = self.members.first() {
                self.host_id = next.id;
            }
        }
        Some(member)
    }

    pub fn select_team(&mut self, id: Uuid, team: Team) -> Result<(), LobbyError> {
        let current = self.member(id).ok_or(LobbyError::NotInLobby)?.team;
        if current == team {
            return Ok(());
        }
        if self.team_count(team) >= self.settings.team_size as usize {
            return Err(LobbyError::TeamFull);
        }
        self.member_mut(id)?.team = team;
        Ok(())
    }

    pub fn set_ready(&mut self, id: Uuid, ready: bool) -> Result<(), LobbyError> {
        self.member_mut(id)?.ready = ready;
        Ok(())
    }

    /// Check that `requester` may start the match now and build the roster
    pub fn validate_start(&self, requester: Uuid) -> Result<Vec<RosterEntry>, LobbyError> {
        if requester != self.host_id {
            return Err(LobbyError::NotHost);
        }
        if self.team_count(Team::Home) == 0 || self.team_count(Team::Away) == 0 {
            return Err(LobbyError::EmptyTeam);
        }
        if !self.members.iter().all(|m| m.ready) {
            return Err(LobbyError::NotReady);
        }

        Ok(self
            .members
            .iter()
            .map(|m| RosterEntry::new(m.id, m.name.clone(), m.team))
            .collect())
    }

    pub fn view(&self) -> LobbyView {
        LobbyView {
            code: self.code.clone(),
            host_id: self.host_id,
            settings: self.settings,
            players: self.members.clone(),
            created_at: self.created_at,
        }
    }
}
