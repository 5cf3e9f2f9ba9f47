//! The single consumer of all client events (§4.3.1). Everything that
//! mutates a room or a player goes through here, one event at a time, so
//! room mutations are totally ordered without a per-room lock.

use base64::Engine as _;
use engine::GameEngine;
use protocol::messages::{
    GameEndedDisconnectData, GameMoveBroadcastData, GameMoveData, GameStartedData,
    LobbyJoinData, LobbyJoinedData, NewGameRequestData, NewGameRequestForwardData,
    NewGameResponseData, NewGameResponseForwardData, PlayerLeftRoomData, PlayerPauseData,
    PlayerResignData, PlayerResumeData, PlayersData, ResignAckData, RoomCreateData,
    RoomInfoData, RoomInfoPayload, RoomJoinData, RoomListData, RoomListEntry, TimerSyncData,
};
use protocol::{ClientId, ClientMessage, RoomId, Seat, ServerMessage};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::state::{seat_stone, seat_wire_id, AppState, MoveRecord, Player, Room, RoomStatus, TimerAnchor};

/// Everything a connection task can tell the dispatcher.
pub enum ClientEvent {
    Connected {
        client_id: ClientId,
        outbox: mpsc::UnboundedSender<Vec<u8>>,
    },
    Message {
        client_id: ClientId,
        message: ClientMessage,
    },
    Disconnected {
        client_id: ClientId,
    },
}

pub struct DispatcherConfig {
    pub reaper_poll: Duration,
    pub ping_deadline: Duration,
}

pub async fn run(
    mut state: AppState,
    mut events: mpsc::UnboundedReceiver<ClientEvent>,
    config: DispatcherConfig,
) {
    let mut reap_interval = tokio::time::interval(config.reaper_poll);
    reap_interval.tick().await; // the first tick fires immediately; skip it

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => handle_event(&mut state, event),
                    None => {
                        info!("all connection tasks gone, dispatcher shutting down");
                        break;
                    }
                }
            }
            _ = reap_interval.tick() => {
                reap_stale_players(&mut state, config.ping_deadline);
            }
        }
    }
}

fn handle_event(state: &mut AppState, event: ClientEvent) {
    match event {
        ClientEvent::Connected { client_id, outbox } => {
            let now = protocol::unix_timestamp();
            info!(%client_id, "client connected");
            state.players.insert(
                client_id.clone(),
                Player {
                    client_id: client_id.clone(),
                    name: format!("Player_{client_id}"),
                    session_token: mint_session_token(),
                    room_id: None,
                    connected_time: now,
                    last_ping: now,
                    outbox: Some(outbox),
                },
            );
        }
        ClientEvent::Message { client_id, message } => {
            if let Some(player) = state.players.get_mut(&client_id) {
                player.last_ping = protocol::unix_timestamp();
            } else {
                // A message arrived after the player record was already
                // torn down (race between reader and a reap/forfeit); drop.
                return;
            }
            handle_message(state, client_id, message);
        }
        ClientEvent::Disconnected { client_id } => {
            disconnect_player(state, &client_id);
        }
    }
}

fn handle_message(state: &mut AppState, client_id: ClientId, message: ClientMessage) {
    match message {
        ClientMessage::Ping => {
            send_to_client(state, &client_id, ServerMessage::Pong);
        }
        ClientMessage::LobbyJoin(data) => handle_lobby_join(state, client_id, data),
        ClientMessage::RoomCreate(data) => handle_room_create(state, client_id, data),
        ClientMessage::RoomJoin(data) => handle_room_join(state, client_id, data),
        ClientMessage::RoomLeave => handle_room_leave(state, &client_id),
        ClientMessage::RoomList => send_room_list(state, &client_id),
        ClientMessage::GameMove(data) => handle_game_move(state, client_id, data),
        ClientMessage::PlayerPause(data) => handle_player_pause(state, &client_id, data),
        ClientMessage::PlayerResume(data) => handle_player_resume(state, &client_id, data),
        ClientMessage::PlayerResign(data) => handle_player_resign(state, &client_id, data),
        ClientMessage::NewGameRequest(data) => handle_new_game_request(state, &client_id, data),
        ClientMessage::NewGameResponse(data) => handle_new_game_response(state, &client_id, data),
        ClientMessage::Unknown(tag) => {
            warn!(%client_id, tag, "unrecognized message type, ignoring");
        }
    }
}

// ---------------------------------------------------------------------
// Lobby operations (§4.3.2)
// ---------------------------------------------------------------------

fn handle_lobby_join(state: &mut AppState, client_id: ClientId, data: LobbyJoinData) {
    let Some(player) = state.players.get_mut(&client_id) else {
        return;
    };
    player.name = data.player_name.clone();
    info!(%client_id, name = %data.player_name, "joined lobby");

    let ack = LobbyJoinedData {
        client_id: client_id.to_string(),
        name: data.player_name,
        session_token: player.session_token.to_string(),
    };
    send_to_client(state, &client_id, ServerMessage::LobbyJoined(ack));
    send_room_list(state, &client_id);
}

fn handle_room_create(state: &mut AppState, client_id: ClientId, data: RoomCreateData) {
    let room_id = state.next_room_id();
    let now = protocol::unix_timestamp();
    let move_time_limit = state.default_move_time_limit;

    let room = Room {
        room_id: room_id.clone(),
        name: data.room_name.clone(),
        host_id: client_id.clone(),
        roster: vec![client_id.clone()],
        max_players: 2,
        status: RoomStatus::Waiting,
        board: state.fresh_board(),
        current_seat: Seat::Black,
        moves: Vec::new(),
        timer: TimerAnchor::fresh(now, move_time_limit),
        created_at: now,
        pause_initiator_id: None,
    };
    state.rooms.insert(room_id.clone(), room);

    if let Some(player) = state.players.get_mut(&client_id) {
        player.room_id = Some(room_id.clone());
    }

    let host_name = state.player_name(&client_id);
    info!(%client_id, %room_id, name = %data.room_name, "room created");

    send_to_client(
        state,
        &client_id,
        ServerMessage::RoomInfo(RoomInfoData {
            success: true,
            room_info: RoomInfoPayload {
                room_id: room_id.to_string(),
                name: data.room_name,
                host_name,
                players: 1,
                max_players: 2,
            },
            message: None,
        }),
    );

    broadcast_room_list_to_lobby(state);
}

fn handle_room_join(state: &mut AppState, client_id: ClientId, data: RoomJoinData) {
    let room_id = RoomId::from(data.room_id);
    let Some(room) = state.rooms.get(&room_id) else {
        return;
    };
    if !room.can_join() {
        // B1: joining a full room is a silent no-op for the joiner.
        return;
    }

    let room = state.rooms.get_mut(&room_id).unwrap();
    room.roster.push(client_id.clone());
    let roster = room.roster.clone();
    let host_id = room.host_id.clone();
    let room_name = room.name.clone();
    let players_count = room.roster.len() as u16;
    let max_players = room.max_players;
    let should_start = room.is_full();

    if let Some(player) = state.players.get_mut(&client_id) {
        player.room_id = Some(room_id.clone());
    }

    let host_name = state.player_name(&host_id);
    info!(%client_id, %room_id, "joined room");

    for recipient in &roster {
        send_to_client(
            state,
            recipient,
            ServerMessage::RoomInfo(RoomInfoData {
                success: true,
                room_info: RoomInfoPayload {
                    room_id: room_id.to_string(),
                    name: room_name.clone(),
                    host_name: host_name.clone(),
                    players: players_count,
                    max_players,
                },
                message: None,
            }),
        );
    }

    if should_start {
        start_game(state, &room_id);
    }

    broadcast_room_list_to_lobby(state);
}

fn start_game(state: &mut AppState, room_id: &RoomId) {
    let Some(room) = state.rooms.get_mut(room_id) else {
        return;
    };
    room.status = RoomStatus::Playing;
    room.board = state.fresh_board();
    room.moves.clear();
    room.current_seat = Seat::Black;
    room.pause_initiator_id = None;
    let now = protocol::unix_timestamp();
    room.timer = TimerAnchor::fresh(now, state.default_move_time_limit);

    let Some(black_id) = room.client_at_seat(Seat::Black).cloned() else {
        return;
    };
    let Some(white_id) = room.client_at_seat(Seat::White).cloned() else {
        return;
    };

    let black_name = state.player_name(&black_id);
    let white_name = state.player_name(&white_id);
    info!(%room_id, black = %black_name, white = %white_name, "game started");

    let players = PlayersData {
        black: black_name.clone(),
        white: white_name.clone(),
    };

    send_to_client(
        state,
        &black_id,
        ServerMessage::GameStarted(GameStartedData {
            room_id: room_id.to_string(),
            your_role: Seat::Black,
            your_name: black_name.clone(),
            opponent_name: white_name.clone(),
            players: players.clone(),
            your_turn: true,
        }),
    );
    send_to_client(
        state,
        &white_id,
        ServerMessage::GameStarted(GameStartedData {
            room_id: room_id.to_string(),
            your_role: Seat::White,
            your_name: white_name,
            opponent_name: black_name,
            players,
            your_turn: false,
        }),
    );
}

fn handle_room_leave(state: &mut AppState, client_id: &ClientId) {
    let Some(room_id) = state.players.get(client_id).and_then(|p| p.room_id.clone()) else {
        return;
    };
    let Some(room) = state.rooms.get_mut(&room_id) else {
        return;
    };
    room.roster.retain(|c| c != client_id);

    if let Some(player) = state.players.get_mut(client_id) {
        player.room_id = None;
    }

    let player_name = state.player_name(client_id);
    info!(%client_id, %room_id, "left room");

    let room_is_empty = state.rooms.get(&room_id).map(|r| r.roster.is_empty()).unwrap_or(true);
    if room_is_empty {
        info!(%room_id, "room emptied, removing");
        state.rooms.remove(&room_id);
    } else {
        handle_room_leave_side_effects(state, &room_id, client_id, &player_name);
    }

    send_room_list(state, client_id);
    broadcast_room_list_to_lobby(state);
}

/// Shared tail of an ordinary (non-forfeit) departure from a non-empty
/// room: notify the remaining roster and transfer host if needed. Used by
/// both an explicit `room_leave` and a disconnect that happens outside an
/// active game (§4.3.3 only runs the forfeit cascade while `PLAYING` or
/// `PAUSED`; any other disconnect is just a departure).
fn handle_room_leave_side_effects(
    state: &mut AppState,
    room_id: &RoomId,
    client_id: &ClientId,
    player_name: &str,
) {
    broadcast_to_room(
        state,
        room_id,
        ServerMessage::PlayerLeftRoom(PlayerLeftRoomData {
            player_name: player_name.to_string(),
        }),
        None,
    );

    let was_host = state.rooms.get(room_id).map(|r| &r.host_id == client_id).unwrap_or(false);
    if was_host {
        transfer_host(state, room_id);
    }
}

/// Hands the host role to the first remaining roster member and notifies
/// everyone left in the room (B4).
fn transfer_host(state: &mut AppState, room_id: &RoomId) {
    let Some(room) = state.rooms.get_mut(room_id) else {
        return;
    };
    let Some(new_host_id) = room.roster.first().cloned() else {
        return;
    };
    room.host_id = new_host_id.clone();
    let roster = room.roster.clone();
    let room_name = room.name.clone();
    let players_count = roster.len() as u16;
    let max_players = room.max_players;
    let new_host_name = state.player_name(&new_host_id);

    info!(%room_id, new_host = %new_host_name, "host transferred");

    for recipient in &roster {
        let message = if *recipient == new_host_id {
            "You are now the host!".to_string()
        } else {
            format!("{new_host_name} is now the host")
        };
        send_to_client(
            state,
            recipient,
            ServerMessage::RoomInfo(RoomInfoData {
                success: true,
                room_info: RoomInfoPayload {
                    room_id: room_id.to_string(),
                    name: room_name.clone(),
                    host_name: new_host_name.clone(),
                    players: players_count,
                    max_players,
                },
                message: Some(message),
            }),
        );
    }
}

// ---------------------------------------------------------------------
// Gameplay (§4.2.2)
// ---------------------------------------------------------------------

fn handle_game_move(state: &mut AppState, client_id: ClientId, data: GameMoveData) {
    let Some(room_id) = state.players.get(&client_id).and_then(|p| p.room_id.clone()) else {
        return;
    };
    let Some(room) = state.rooms.get(&room_id) else {
        return;
    };

    // 1. Authority check.
    if room.status != RoomStatus::Playing {
        warn!(%client_id, %room_id, "move rejected: room not playing");
        return;
    }
    let Some(seat) = room.seat_of(&client_id) else {
        warn!(%client_id, %room_id, "move rejected: sender not in roster");
        return;
    };
    if seat != room.current_seat {
        warn!(%client_id, %room_id, ?seat, "move rejected: out of turn");
        return;
    }

    // 2. Legality check via the engine interface — never re-derived locally.
    if !state.engine.is_legal(&room.board, data.row, data.col) {
        warn!(%client_id, %room_id, row = data.row, col = data.col, "illegal move dropped");
        return;
    }

    // 3. Commit.
    let player_name = state.player_name(&client_id);
    let room = state.rooms.get_mut(&room_id).unwrap();
    let stone = seat_stone(seat);
    if state.engine.apply(&mut room.board, data.row, data.col, stone).is_err() {
        // Legality was just checked above; this would only fire under a
        // racing mutation, which single-dispatcher ownership rules out.
        return;
    }
    room.moves.push(MoveRecord {
        player_name: player_name.clone(),
        row: data.row,
        col: data.col,
    });

    let terminal = state.engine.terminal_status(&room.board, Some((data.row, data.col)));
    if terminal.is_terminal() {
        room.status = RoomStatus::Finished;
        info!(%room_id, ?terminal, "game finished");
    } else {
        room.current_seat = seat.opponent();
    }

    // 4. Timer reset.
    let now = protocol::unix_timestamp();
    room.timer = TimerAnchor::fresh(now, room.timer.move_time_limit);
    let timer_wire = room.timer.to_wire();

    info!(%client_id, %room_id, row = data.row, col = data.col, "move committed");

    // 5. Fan-out.
    send_to_client(
        state,
        &client_id,
        ServerMessage::TimerSync(TimerSyncData { timer_state: timer_wire }),
    );
    broadcast_to_room(
        state,
        &room_id,
        ServerMessage::GameMove(GameMoveBroadcastData {
            player: player_name,
            row: data.row,
            col: data.col,
            player_id: seat_wire_id(seat),
            timer_state: timer_wire,
        }),
        Some(&client_id),
    );
}

fn handle_player_pause(state: &mut AppState, client_id: &ClientId, data: PlayerPauseData) {
    let Some(room_id) = state.players.get(client_id).and_then(|p| p.room_id.clone()) else {
        return;
    };
    let Some(room) = state.rooms.get_mut(&room_id) else {
        return;
    };
    if room.status != RoomStatus::Playing {
        return;
    }
    room.status = RoomStatus::Paused;
    room.pause_initiator_id = Some(client_id.clone());
    info!(%client_id, %room_id, "room paused");

    broadcast_to_room(state, &room_id, ServerMessage::PlayerPause(data), Some(client_id));
}

/// §4.2.3: the server relays `player_resume` and rebases its own timer
/// anchor, but (per the spec's explicit choice) does not enforce that only
/// the pause initiator may send it — the client gates that in its UI (B3).
fn handle_player_resume(state: &mut AppState, client_id: &ClientId, data: PlayerResumeData) {
    let Some(room_id) = state.players.get(client_id).and_then(|p| p.room_id.clone()) else {
        return;
    };
    let Some(room) = state.rooms.get_mut(&room_id) else {
        return;
    };
    if room.status != RoomStatus::Paused {
        return;
    }
    room.status = RoomStatus::Playing;
    room.pause_initiator_id = None;
    let now = protocol::unix_timestamp();
    room.timer.elapsed_before_pause = (room.timer.move_time_limit - data.remaining_turn).max(0.0);
    room.timer.turn_start_epoch = Some(now);
    info!(%client_id, %room_id, "room resumed");

    broadcast_to_room(state, &room_id, ServerMessage::PlayerResume(data), Some(client_id));
}

fn handle_player_resign(state: &mut AppState, client_id: &ClientId, data: PlayerResignData) {
    let Some(room_id) = state.players.get(client_id).and_then(|p| p.room_id.clone()) else {
        return;
    };
    let Some(room) = state.rooms.get_mut(&room_id) else {
        return;
    };
    room.status = RoomStatus::Finished;
    let roster = room.roster.clone();
    info!(%client_id, %room_id, player = %data.player, "player resigned");

    for recipient in &roster {
        if recipient == client_id {
            send_to_client(
                state,
                recipient,
                ServerMessage::ResignAck(ResignAckData {
                    message: format!("You ({}) resigned.", data.player),
                }),
            );
        } else {
            send_to_client(
                state,
                recipient,
                ServerMessage::PlayerResign(PlayerResignData {
                    player: data.player.clone(),
                }),
            );
        }
    }
}

fn handle_new_game_request(state: &mut AppState, client_id: &ClientId, data: NewGameRequestData) {
    let Some(room_id) = state.players.get(client_id).and_then(|p| p.room_id.clone()) else {
        return;
    };
    let Some(room) = state.rooms.get(&room_id) else {
        return;
    };
    let roster = room.roster.clone();
    let requester = state.player_name(client_id);
    info!(%client_id, %room_id, "new game requested");

    for recipient in &roster {
        if recipient != client_id {
            send_to_client(
                state,
                recipient,
                ServerMessage::NewGameRequest(NewGameRequestForwardData {
                    room_id: data.room_id.clone(),
                    requester: requester.clone(),
                }),
            );
        }
    }
}

fn handle_new_game_response(state: &mut AppState, client_id: &ClientId, data: NewGameResponseData) {
    let Some(room_id) = state.players.get(client_id).and_then(|p| p.room_id.clone()) else {
        return;
    };
    if !state.rooms.contains_key(&room_id) {
        return;
    }

    if data.accepted {
        info!(%client_id, %room_id, "new game accepted, restarting");
        start_game(state, &room_id);
    } else {
        let room = state.rooms.get(&room_id).unwrap();
        let roster = room.roster.clone();
        let decliner = state.player_name(client_id);
        info!(%client_id, %room_id, "new game declined");

        for recipient in &roster {
            if recipient != client_id {
                send_to_client(
                    state,
                    recipient,
                    ServerMessage::NewGameResponse(NewGameResponseForwardData {
                        room_id: room_id.to_string(),
                        accepted: false,
                        message: Some(format!("{decliner} declined the new game")),
                    }),
                );
            }
        }
    }
}

// ---------------------------------------------------------------------
// Disconnect cascade (§4.3.3)
// ---------------------------------------------------------------------

fn disconnect_player(state: &mut AppState, client_id: &ClientId) {
    let Some(player) = state.players.get(client_id) else {
        return;
    };
    let player_name = player.name.clone();
    let room_id = player.room_id.clone();
    info!(%client_id, name = %player_name, "client disconnected");

    if let Some(room_id) = room_id {
        if let Some(room) = state.rooms.get_mut(&room_id) {
            // §4.3.3 only forfeits a game that was actually in progress
            // (playing or mid-pause); a disconnect from a finished or
            // still-waiting room is an ordinary departure.
            let was_mid_game =
                matches!(room.status, RoomStatus::Playing | RoomStatus::Paused);
            room.roster.retain(|c| c != client_id);

            if room.roster.is_empty() {
                info!(%room_id, "room emptied by disconnect, removing");
                state.rooms.remove(&room_id);
            } else if !was_mid_game {
                handle_room_leave_side_effects(state, &room_id, client_id, &player_name);
            } else {
                // Max two seats: anyone left after removing one is the sole
                // survivor and, by construction, was mid-game.
                let winner_id = room.roster[0].clone();
                let winner_name = state.player_name(&winner_id);

                broadcast_to_room(
                    state,
                    &room_id,
                    ServerMessage::GameEndedDisconnect(GameEndedDisconnectData {
                        reason: "opponent_disconnected".to_string(),
                        disconnected_player: player_name.clone(),
                        winner: winner_name.clone(),
                        message: format!(
                            "{player_name} has disconnected. {winner_name} wins by forfeit!"
                        ),
                        forfeit: true,
                        no_rematch: true,
                    }),
                    None,
                );

                if let Some(room) = state.rooms.get_mut(&room_id) {
                    room.status = RoomStatus::Finished;
                }

                let was_host = state
                    .rooms
                    .get(&room_id)
                    .map(|r| &r.host_id == client_id)
                    .unwrap_or(false);
                if was_host {
                    transfer_host(state, &room_id);
                } else {
                    notify_room_info_unchanged_host(state, &room_id);
                }
            }
        }
    }

    state.players.remove(client_id);
}

/// Disconnect cascade's non-host-transfer branch: host stays the same, but
/// the remaining roster still needs an updated player count.
fn notify_room_info_unchanged_host(state: &mut AppState, room_id: &RoomId) {
    let Some(room) = state.rooms.get(room_id) else {
        return;
    };
    let roster = room.roster.clone();
    let host_id = room.host_id.clone();
    let room_name = room.name.clone();
    let players_count = roster.len() as u16;
    let max_players = room.max_players;
    let host_name = state.player_name(&host_id);

    for recipient in &roster {
        let message = if *recipient == host_id {
            "Opponent disconnected. You are the host.".to_string()
        } else {
            format!("{host_name} is the host")
        };
        send_to_client(
            state,
            recipient,
            ServerMessage::RoomInfo(RoomInfoData {
                success: true,
                room_info: RoomInfoPayload {
                    room_id: room_id.to_string(),
                    name: room_name.clone(),
                    host_name: host_name.clone(),
                    players: players_count,
                    max_players,
                },
                message: Some(message),
            }),
        );
    }
}

// ---------------------------------------------------------------------
// Reaper (§4.3.4)
// ---------------------------------------------------------------------

fn reap_stale_players(state: &mut AppState, ping_deadline: Duration) {
    let now = protocol::unix_timestamp();
    let deadline_secs = ping_deadline.as_secs_f64();
    let stale: Vec<ClientId> = state
        .players
        .iter()
        .filter(|(_, p)| p.outbox.is_some() && now - p.last_ping > deadline_secs)
        .map(|(id, _)| id.clone())
        .collect();

    for client_id in stale {
        warn!(%client_id, "ping timeout, reaping");
        disconnect_player(state, &client_id);
    }
}

// ---------------------------------------------------------------------
// Outbound helpers
// ---------------------------------------------------------------------

fn send_to_client(state: &AppState, client_id: &ClientId, message: ServerMessage) {
    let Some(player) = state.players.get(client_id) else {
        return;
    };
    let Some(outbox) = &player.outbox else {
        return;
    };
    let envelope = message.into_envelope();
    let bytes = protocol::encode(&envelope);
    // A send error means the connection's writer task already exited; the
    // matching `Disconnected` event will arrive from the reader shortly and
    // run the cascade exactly once, so we just log here.
    if outbox.send(bytes).is_err() {
        warn!(%client_id, "outbox closed, message dropped");
    }
}

fn broadcast_to_room(
    state: &AppState,
    room_id: &RoomId,
    message: ServerMessage,
    exclude: Option<&ClientId>,
) {
    let Some(room) = state.rooms.get(room_id) else {
        return;
    };
    for recipient in &room.roster {
        if Some(recipient) != exclude {
            send_to_client(state, recipient, message.clone());
        }
    }
}

fn send_room_list(state: &AppState, client_id: &ClientId) {
    let rooms = state
        .rooms
        .values()
        .filter(|r| r.can_join())
        .map(|r| RoomListEntry {
            room_id: r.room_id.to_string(),
            name: r.name.clone(),
            host_name: state.player_name(&r.host_id),
            players: r.roster.len() as u16,
            max_players: r.max_players,
        })
        .collect();

    send_to_client(state, client_id, ServerMessage::RoomList(RoomListData { rooms }));
}

fn broadcast_room_list_to_lobby(state: &AppState) {
    for player in state.players.values() {
        if player.room_id.is_none() {
            send_room_list(state, &player.client_id);
        }
    }
}

fn mint_session_token() -> protocol::SessionToken {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    protocol::SessionToken::from(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::messages::{GameMoveData, LobbyJoinData, RoomCreateData, RoomJoinData};

    /// Registers a connected client with its own outbox and returns the
    /// receiving half so a test can inspect what the dispatcher sent it.
    fn connect(state: &mut AppState, client_id: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let client_id = ClientId::from(client_id);
        let (tx, rx) = mpsc::unbounded_channel();
        handle_event(state, ClientEvent::Connected { client_id, outbox: tx });
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<protocol::Envelope> {
        let mut out = Vec::new();
        while let Ok(bytes) = rx.try_recv() {
            let line = String::from_utf8(bytes).unwrap();
            out.push(serde_json::from_str(line.trim_end()).unwrap());
        }
        out
    }

    fn join_lobby(state: &mut AppState, client_id: &str, name: &str) {
        handle_message(
            state,
            ClientId::from(client_id),
            ClientMessage::LobbyJoin(LobbyJoinData {
                player_name: name.to_string(),
                session_token: None,
            }),
        );
    }

    #[test]
    fn room_create_then_join_starts_the_game_with_black_first() {
        let mut state = AppState::new(30.0);
        let mut alice_rx = connect(&mut state, "alice");
        let mut bob_rx = connect(&mut state, "bob");
        join_lobby(&mut state, "alice", "Alice");
        join_lobby(&mut state, "bob", "Bob");
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        handle_message(
            &mut state,
            ClientId::from("alice"),
            ClientMessage::RoomCreate(RoomCreateData { room_name: "A".to_string() }),
        );
        let alice_msgs = drain(&mut alice_rx);
        assert_eq!(alice_msgs[0].kind, protocol::tags::ROOM_INFO);

        handle_message(
            &mut state,
            ClientId::from("bob"),
            ClientMessage::RoomJoin(RoomJoinData { room_id: "room_1".to_string() }),
        );

        let alice_msgs = drain(&mut alice_rx);
        let bob_msgs = drain(&mut bob_rx);
        let alice_started = alice_msgs
            .iter()
            .find(|e| e.kind == protocol::tags::GAME_STARTED)
            .expect("alice should receive game_started");
        assert_eq!(alice_started.data["your_role"], "black");
        assert_eq!(alice_started.data["your_turn"], true);

        let bob_started = bob_msgs
            .iter()
            .find(|e| e.kind == protocol::tags::GAME_STARTED)
            .expect("bob should receive game_started");
        assert_eq!(bob_started.data["your_role"], "white");
        assert_eq!(bob_started.data["your_turn"], false);

        let room = state.rooms.get(&RoomId::from("room_1")).unwrap();
        assert_eq!(room.status, RoomStatus::Playing);
        assert_eq!(room.roster.len(), 2);
    }

    #[test]
    fn joining_a_full_room_is_a_silent_no_op() {
        let mut state = AppState::new(30.0);
        connect(&mut state, "alice");
        connect(&mut state, "bob");
        let mut carol_rx = connect(&mut state, "carol");
        join_lobby(&mut state, "alice", "Alice");
        join_lobby(&mut state, "bob", "Bob");
        join_lobby(&mut state, "carol", "Carol");

        handle_message(
            &mut state,
            ClientId::from("alice"),
            ClientMessage::RoomCreate(RoomCreateData { room_name: "A".to_string() }),
        );
        handle_message(
            &mut state,
            ClientId::from("bob"),
            ClientMessage::RoomJoin(RoomJoinData { room_id: "room_1".to_string() }),
        );
        carol_rx.try_recv().ok(); // drop whatever lobby/room-list noise arrived

        let before = state.rooms.get(&RoomId::from("room_1")).unwrap().roster.len();
        handle_message(
            &mut state,
            ClientId::from("carol"),
            ClientMessage::RoomJoin(RoomJoinData { room_id: "room_1".to_string() }),
        );
        let after = state.rooms.get(&RoomId::from("room_1")).unwrap().roster.len();
        assert_eq!(before, after);
        assert!(carol_rx.try_recv().is_err());
    }

    #[test]
    fn out_of_turn_move_is_dropped() {
        let mut state = AppState::new(30.0);
        connect(&mut state, "alice");
        let mut bob_rx = connect(&mut state, "bob");
        join_lobby(&mut state, "alice", "Alice");
        join_lobby(&mut state, "bob", "Bob");
        handle_message(
            &mut state,
            ClientId::from("alice"),
            ClientMessage::RoomCreate(RoomCreateData { room_name: "A".to_string() }),
        );
        handle_message(
            &mut state,
            ClientId::from("bob"),
            ClientMessage::RoomJoin(RoomJoinData { room_id: "room_1".to_string() }),
        );
        drain(&mut bob_rx);

        // White moves first, illegally.
        handle_message(
            &mut state,
            ClientId::from("bob"),
            ClientMessage::GameMove(GameMoveData { row: 7, col: 7, player_id: 2 }),
        );
        let room = state.rooms.get(&RoomId::from("room_1")).unwrap();
        assert_eq!(room.moves.len(), 0);
        assert_eq!(room.current_seat, Seat::Black);
    }

    #[test]
    fn second_move_on_an_occupied_cell_is_dropped() {
        let mut state = AppState::new(30.0);
        let mut alice_rx = connect(&mut state, "alice");
        connect(&mut state, "bob");
        join_lobby(&mut state, "alice", "Alice");
        join_lobby(&mut state, "bob", "Bob");
        handle_message(
            &mut state,
            ClientId::from("alice"),
            ClientMessage::RoomCreate(RoomCreateData { room_name: "A".to_string() }),
        );
        handle_message(
            &mut state,
            ClientId::from("bob"),
            ClientMessage::RoomJoin(RoomJoinData { room_id: "room_1".to_string() }),
        );
        drain(&mut alice_rx);

        handle_message(
            &mut state,
            ClientId::from("alice"),
            ClientMessage::GameMove(GameMoveData { row: 7, col: 7, player_id: 1 }),
        );
        let moves_after_first = state.rooms.get(&RoomId::from("room_1")).unwrap().moves.len();
        assert_eq!(moves_after_first, 1);

        // Black moved; it's White's turn now, so a second Black move at the
        // same cell is rejected twice over: out of turn, and occupied.
        handle_message(
            &mut state,
            ClientId::from("alice"),
            ClientMessage::GameMove(GameMoveData { row: 7, col: 7, player_id: 1 }),
        );
        let moves_after_second = state.rooms.get(&RoomId::from("room_1")).unwrap().moves.len();
        assert_eq!(moves_after_second, 1);
    }

    #[test]
    fn disconnect_mid_game_forfeits_to_the_survivor() {
        let mut state = AppState::new(30.0);
        connect(&mut state, "alice");
        let mut bob_rx = connect(&mut state, "bob");
        join_lobby(&mut state, "alice", "Alice");
        join_lobby(&mut state, "bob", "Bob");
        handle_message(
            &mut state,
            ClientId::from("alice"),
            ClientMessage::RoomCreate(RoomCreateData { room_name: "A".to_string() }),
        );
        handle_message(
            &mut state,
            ClientId::from("bob"),
            ClientMessage::RoomJoin(RoomJoinData { room_id: "room_1".to_string() }),
        );
        drain(&mut bob_rx);

        disconnect_player(&mut state, &ClientId::from("alice"));

        let forfeit_messages: Vec<_> = drain(&mut bob_rx)
            .into_iter()
            .filter(|e| e.kind == protocol::tags::GAME_ENDED_DISCONNECT)
            .collect();
        assert_eq!(forfeit_messages.len(), 1);
        assert_eq!(forfeit_messages[0].data["winner"], "Bob");
        assert_eq!(forfeit_messages[0].data["forfeit"], true);
        assert!(!state.players.contains_key(&ClientId::from("alice")));
    }

    #[test]
    fn pause_then_resume_rebases_the_timer_and_blocks_moves_while_paused() {
        let mut state = AppState::new(30.0);
        let mut alice_rx = connect(&mut state, "alice");
        let mut bob_rx = connect(&mut state, "bob");
        join_lobby(&mut state, "alice", "Alice");
        join_lobby(&mut state, "bob", "Bob");
        handle_message(
            &mut state,
            ClientId::from("alice"),
            ClientMessage::RoomCreate(RoomCreateData { room_name: "A".to_string() }),
        );
        handle_message(
            &mut state,
            ClientId::from("bob"),
            ClientMessage::RoomJoin(RoomJoinData { room_id: "room_1".to_string() }),
        );
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        handle_message(
            &mut state,
            ClientId::from("alice"),
            ClientMessage::PlayerPause(protocol::messages::PlayerPauseData {
                player: "Alice".to_string(),
                remaining_turn: 22.5,
                pauses_remaining: None,
                pause_timestamp: protocol::unix_timestamp(),
            }),
        );
        assert_eq!(
            state.rooms.get(&RoomId::from("room_1")).unwrap().status,
            RoomStatus::Paused
        );
        let bob_paused = drain(&mut bob_rx);
        assert!(bob_paused.iter().any(|e| e.kind == protocol::tags::PLAYER_PAUSE));

        // Black's seat would otherwise be on turn; a move while paused is dropped.
        handle_message(
            &mut state,
            ClientId::from("alice"),
            ClientMessage::GameMove(GameMoveData { row: 3, col: 3, player_id: 1 }),
        );
        assert_eq!(state.rooms.get(&RoomId::from("room_1")).unwrap().moves.len(), 0);

        handle_message(
            &mut state,
            ClientId::from("alice"),
            ClientMessage::PlayerResume(protocol::messages::PlayerResumeData {
                player: "Alice".to_string(),
                remaining_turn: 22.5,
                pause_duration_used: None,
            }),
        );
        let room = state.rooms.get(&RoomId::from("room_1")).unwrap();
        assert_eq!(room.status, RoomStatus::Playing);
        assert_eq!(room.timer.elapsed_before_pause, 7.5);
        assert!(room.timer.turn_start_epoch.is_some());
        let bob_resumed = drain(&mut bob_rx);
        assert!(bob_resumed.iter().any(|e| e.kind == protocol::tags::PLAYER_RESUME));
    }

    #[test]
    fn host_leaving_transfers_to_the_remaining_player() {
        let mut state = AppState::new(30.0);
        connect(&mut state, "alice");
        let mut bob_rx = connect(&mut state, "bob");
        join_lobby(&mut state, "alice", "Alice");
        join_lobby(&mut state, "bob", "Bob");
        handle_message(
            &mut state,
            ClientId::from("alice"),
            ClientMessage::RoomCreate(RoomCreateData { room_name: "A".to_string() }),
        );
        handle_message(
            &mut state,
            ClientId::from("bob"),
            ClientMessage::RoomJoin(RoomJoinData { room_id: "room_1".to_string() }),
        );
        drain(&mut bob_rx);

        handle_room_leave(&mut state, &ClientId::from("alice"));

        let room_infos: Vec<_> = drain(&mut bob_rx)
            .into_iter()
            .filter(|e| e.kind == protocol::tags::ROOM_INFO)
            .collect();
        let last = room_infos.last().expect("bob should receive a room_info update");
        assert_eq!(last.data["message"], "You are now the host!");

        let room = state.rooms.get(&RoomId::from("room_1")).unwrap();
        assert_eq!(room.host_id, ClientId::from("bob"));
    }
}
