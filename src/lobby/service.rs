//! Lobby service - client registry, lobby lifecycle and match creation

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::player::InputState;
use crate::game::{GameMatch, MatchHandle, MatchRegistry, PlayerInput};
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, LobbySettings, LobbyView, ServerMsg, Team};

use super::model::{display_name, generate_code, normalize_code, validate_settings, Lobby, LobbyError};

/// Outbound queue depth per client
pub const CLIENT_QUEUE_CAPACITY: usize = 256;

/// Lobby service
pub struct LobbyManager {
    /// Outbound queue of every connected client
    clients: DashMap<Uuid, mpsc::Sender<ServerMsg>>,
    lobbies: DashMap<String, Lobby>,
    /// Map of client -> lobby code
    client_lobbies: DashMap<Uuid, String>,
    registry: Arc<MatchRegistry>,
}

impl LobbyManager {
    pub fn new(registry: Arc<MatchRegistry>) -> Self {
        Self {
            clients: DashMap::new(),
            lobbies: DashMap::new(),
            client_lobbies: DashMap::new(),
            registry,
        }
    }

    /// Register a client connection (called when WebSocket connects).
    /// Everything addressed to the client arrives on the returned receiver.
    pub fn register_client(&self, client_id: Uuid) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        self.clients.insert(client_id, tx);
        debug!(client_id = %client_id, "Client registered");
        rx
    }

    /// Unregister a client (called when WebSocket disconnects)
    pub fn unregister_client(&self, client_id: Uuid) {
        // NotInLobby is the common case here
        let _ = self.leave_lobby(client_id);
        if let Some(handle) = self.registry.leave(&client_id) {
            info!(client_id = %client_id, match_id = %handle.id, "Player disconnected from match");
        }
        self.clients.remove(&client_id);
        debug!(client_id = %client_id, "Client unregistered");
    }

    pub fn connected_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn active_lobbies(&self) -> usize {
        self.lobbies.len()
    }

    /// Route one decoded client message. Logical errors go back to the
    /// sender only.
    pub fn handle_message(&self, client_id: Uuid, msg: ClientMsg) {
        let result = match msg {
            ClientMsg::CreateLobby { settings, name } => {
                self.create_lobby(client_id, settings, name.as_deref())
            }
            ClientMsg::JoinLobby { code, name } => self.join_lobby(client_id, &code, &name),
            ClientMsg::LeaveLobby => self.leave_lobby(client_id),
            ClientMsg::SelectTeam { team } => self.select_team(client_id, team),
            ClientMsg::Ready { ready } => {
                self.update_lobby(client_id, |lobby| lobby.set_ready(client_id, ready))
            }
            ClientMsg::StartMatch => self.start_match(client_id),
            ClientMsg::Input {
                move_x,
                move_y,
                kick,
                tackle,
                sprint,
            } => {
                let input = PlayerInput {
                    player_id: client_id,
                    input: InputState {
                        move_x,
                        move_y,
                        sprint,
                        kick,
                        tackle,
                    },
                    received_at: unix_millis(),
                };
                let received_at = input.received_at;
                if !self.registry.route_input(input) {
                    debug!(
                        client_id = %client_id,
                        received_at,
                        "Input outside a match, ignoring"
                    );
                }
                Ok(())
            }
            ClientMsg::Ping => {
                self.send_to(client_id, ServerMsg::Pong {
                    timestamp: unix_millis(),
                });
                Ok(())
            }
        };

        if let Err(e) = result {
            debug!(client_id = %client_id, error = %e, "Lobby request rejected");
            self.send_to(client_id, ServerMsg::Error {
                message: e.to_string(),
            });
        }
    }

    /// Queue a message for one client without waiting
    pub fn send_to(&self, client_id: Uuid, msg: ServerMsg) {
        let Some(tx) = self.clients.get(&client_id).map(|c| c.value().clone()) else {
            return;
        };
        if let Err(e) = tx.try_send(msg) {
            debug!(client_id = %client_id, error = %e, "Dropping message for client");
        }
    }

    fn send_to_lobby(&self, view: &LobbyView, msg: &ServerMsg, skip: Option<Uuid>) {
        for member in view.players.iter().filter(|m| Some(m.id) != skip) {
            self.send_to(member.id, msg.clone());
        }
    }

    /// Clients already in a lobby or match can't open or join another
    fn ensure_free(&self, client_id: Uuid) -> Result<(), LobbyError> {
        if self.client_lobbies.contains_key(&client_id) {
            return Err(LobbyError::AlreadyInLobby);
        }
        if self.registry.room_for(&client_id).is_some() {
            return Err(LobbyError::InMatch);
        }
        Ok(())
    }

    fn create_lobby(
        &self,
        client_id: Uuid,
        settings: LobbySettings,
        name: Option<&str>,
    ) -> Result<(), LobbyError> {
        self.ensure_free(client_id)?;
        let settings = validate_settings(settings)?;
        let name = display_name(name, client_id);

        let view = loop {
            let code = generate_code(&mut rand::thread_rng());
            if let Entry::Vacant(slot) = self.lobbies.entry(code.clone()) {
                let lobby = Lobby::new(code, client_id, name.clone(), settings);
                let view = lobby.view();
                slot.insert(lobby);
                break view;
            }
        };

        self.client_lobbies.insert(client_id, view.code.clone());

        info!(
            client_id = %client_id,
            code = %view.code,
            team_size = settings.team_size,
            match_duration = settings.match_duration,
            "Lobby created"
        );

        self.send_to(client_id, ServerMsg::LobbyCreated { lobby: view });
        Ok(())
    }

    fn join_lobby(&self, client_id: Uuid, code: &str, name: &str) -> Result<(), LobbyError> {
        self.ensure_free(client_id)?;
        let code = normalize_code(code);
        let name = display_name(Some(name), client_id);

        let (member, view) = {
            let mut lobby = self.lobbies.get_mut(&code).ok_or(LobbyError::NotFound)?;
            let member = lobby.join(client_id, name)?.clone();
            (member, lobby.view())
        };

        self.client_lobbies.insert(client_id, code.clone());

        info!(client_id = %client_id, code = %code, team = ?member.team, "Joined lobby");

        self.send_to(client_id, ServerMsg::LobbyJoined { lobby: view.clone() });
        self.send_to_lobby(&view, &ServerMsg::PlayerJoined { player: member }, Some(client_id));
        self.send_to_lobby(&view, &ServerMsg::LobbyState { lobby: view.clone() }, Some(client_id));
        Ok(())
    }

    fn leave_lobby(&self, client_id: Uuid) -> Result<(), LobbyError> {
        let (_, code) = self
            .client_lobbies
            .remove(&client_id)
            .ok_or(LobbyError::NotInLobby)?;

        let remaining = match self.lobbies.get_mut(&code) {
            Some(mut lobby) => {
                lobby.leave(client_id);
                (!lobby.is_empty()).then(|| lobby.view())
            }
            None => return Ok(()),
        };

        match remaining {
            Some(view) => {
                info!(client_id = %client_id, code = %code, host = %view.host_id, "Left lobby");
                self.send_to_lobby(&view, &ServerMsg::PlayerLeft { player_id: client_id }, None);
                self.send_to_lobby(&view, &ServerMsg::LobbyState { lobby: view.clone() }, None);
            }
            None => {
                self.lobbies.remove_if(&code, |_, lobby| lobby.is_empty());
                info!(code = %code, "Lobby closed");
            }
        }
        Ok(())
    }

    fn select_team(&self, client_id: Uuid, team: Team) -> Result<(), LobbyError> {
        self.update_lobby(client_id, |lobby| lobby.select_team(client_id, team))
    }

    /// Apply a change to the client's lobby and push the new state to all
    /// members
    fn update_lobby<F>(&self, client_id: Uuid, change: F) -> Result<(), LobbyError>
    where
        F: FnOnce(&mut Lobby) -> Result<(), LobbyError>,
    {
        let code = self.lobby_code(client_id)?;
        let view = {
            let mut lobby = self.lobbies.get_mut(&code).ok_or(LobbyError::NotFound)?;
            change(&mut lobby)?;
            lobby.view()
        };
        self.send_to_lobby(&view, &ServerMsg::LobbyState { lobby: view.clone() }, None);
        Ok(())
    }

    fn lobby_code(&self, client_id: Uuid) -> Result<String, LobbyError> {
        self.client_lobbies
            .get(&client_id)
            .map(|c| c.value().clone())
            .ok_or(LobbyError::NotInLobby)
    }

    /// Turn the client's lobby into a running match
    fn start_match(&self, client_id: Uuid) -> Result<(), LobbyError> {
        let code = self.lobby_code(client_id)?;

        // Validate and remove under the same shard lock so no join or
        // ready change slips in between
        let (roster, lobby) = match self.lobbies.entry(code.clone()) {
            Entry::Occupied(entry) => {
                let roster = entry.get().validate_start(client_id)?;
                (roster, entry.remove())
            }
            Entry::Vacant(_) => return Err(LobbyError::NotFound),
        };
        for member in &lobby.members {
            self.client_lobbies.remove(&member.id);
        }

        let room_id = Uuid::new_v4();
        let members: Vec<Uuid> = roster.iter().map(|r| r.player_id).collect();
        let (game_match, handle) =
            GameMatch::new(room_id, rand::random(), lobby.settings, roster.clone());

        self.registry.insert(handle.clone(), &members);

        // Subscribe everyone before the first tick so nothing is missed
        for entry in &roster {
            self.forward_room(entry.player_id, &handle);
            self.send_to(
                entry.player_id,
                ServerMsg::MatchStart {
                    player_id: entry.player_id,
                    team: entry.team,
                    room_id,
                },
            );
        }

        info!(
            match_id = %room_id,
            code = %code,
            players = members.len(),
            "Lobby started a match"
        );

        self.registry.launch(game_match);
        Ok(())
    }

    /// Pipe a room's broadcasts into a client's outbound queue
    fn forward_room(&self, client_id: Uuid, handle: &MatchHandle) {
        let Some(tx) = self.clients.get(&client_id).map(|c| c.value().clone()) else {
            return;
        };
        let mut rx = handle.subscribe();
        let match_id = handle.id;

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => {
                        if tx.send(msg).await.is_err() {
                            debug!(client_id = %client_id, "Client queue closed");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            client_id = %client_id,
                            match_id = %match_id,
                            lagged = n,
                            "Client lagged, skipping {} messages", n
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}
