//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Side a player plays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    /// Defends the -y goal, attacks +y
    Home,
    /// Defends the +y goal, attacks -y
    Away,
}

impl Team {
    pub fn opponent(self) -> Self {
        match self {
            Team::Home => Team::Away,
            Team::Away => Team::Home,
        }
    }

    /// +1.0 when attacking toward +y, -1.0 otherwise
    pub fn attack_sign(self) -> f32 {
        match self {
            Team::Home => 1.0,
            Team::Away => -1.0,
        }
    }
}

/// Coarse match state machine value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    Waiting,
    Kickoff,
    Playing,
    GoalScored,
    Halftime,
    Ended,
}

/// What a player is doing, as shown to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerActivity {
    Idle,
    Running,
    Tackling,
    Diving,
    Recovering,
}

/// Lobby settings chosen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LobbySettings {
    /// Players per team
    pub team_size: u8,
    /// Match length in seconds of playing clock
    pub match_duration: u32,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            team_size: 2,
            match_duration: 300,
        }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Open a new lobby and become its host
    CreateLobby {
        #[serde(default)]
        settings: LobbySettings,
        #[serde(default)]
        name: Option<String>,
    },

    /// Join an existing lobby by code
    JoinLobby { code: String, name: String },

    /// Leave the current lobby
    LeaveLobby,

    /// Switch sides in the current lobby
    SelectTeam { team: Team },

    /// Toggle ready state
    Ready { ready: bool },

    /// Host request to start the match
    StartMatch,

    /// Latest controller state
    Input {
        #[serde(default)]
        move_x: f32,
        #[serde(default)]
        move_y: f32,
        #[serde(default)]
        kick: bool,
        #[serde(default)]
        tackle: bool,
        #[serde(default)]
        sprint: bool,
    },

    /// Application-level ping
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Sent once the socket is accepted
    Connected { client_id: Uuid },

    LobbyCreated { lobby: LobbyView },

    LobbyJoined { lobby: LobbyView },

    /// Full lobby state after any change
    LobbyState { lobby: LobbyView },

    PlayerJoined { player: LobbyMember },

    PlayerLeft { player_id: Uuid },

    /// Logical error, sent only to the offending client
    Error { message: String },

    /// The lobby turned into a running match
    MatchStart {
        player_id: Uuid,
        team: Team,
        room_id: Uuid,
    },

    /// Authoritative state after a tick
    GameState {
        tick: u64,
        phase: MatchPhase,
        ball: BallSnapshot,
        players: Vec<PlayerSnapshot>,
        score: Score,
        clock: f64,
    },

    Goal { team: Team, score: Score },

    /// Final result, sent once when the room stops
    MatchEnd { score: Score, winner: Option<Team> },

    Pong {
        /// Server time in unix millis
        timestamp: u64,
    },
}

/// Goals per side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub fn credit(&mut self, team: Team) {
        match team {
            Team::Home => self.home += 1,
            Team::Away => self.away += 1,
        }
    }

    pub fn leader(&self) -> Option<Team> {
        match self.home.cmp(&self.away) {
            std::cmp::Ordering::Greater => Some(Team::Home),
            std::cmp::Ordering::Less => Some(Team::Away),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Lobby member as seen by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyMember {
    pub id: Uuid,
    pub name: String,
    pub team: Team,
    pub ready: bool,
}

/// Lobby as seen by clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyView {
    pub code: String,
    pub host_id: Uuid,
    pub settings: LobbySettings,
    pub players: Vec<LobbyMember>,
    pub created_at: DateTime<Utc>,
}

/// Ball state in a snapshot. Position is rounded to one decimal and
/// velocities to whole units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallSnapshot {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub owner_id: Option<Uuid>,
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: Uuid,
    pub name: String,
    pub team: Team,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    /// Facing in radians
    pub facing: f32,
    pub state: PlayerActivity,
    pub has_ball: bool,
    pub is_goalkeeper: bool,
    /// Kick charge in [0, 1], zero when not charging
    pub charge: f32,
}
