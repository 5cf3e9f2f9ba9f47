//! Authoritative in-memory state: the player registry and the room state
//! machine (§3, §4.2). Owned exclusively by the dispatcher task — no
//! `Mutex` here, because nothing outside the dispatcher ever touches it
//! (§4.3.1's whole point is to make per-room locking unnecessary).

use engine::{Board, GameEngine, GomokuEngine, Stone};
use protocol::{ClientId, RoomId, Seat, SessionToken};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

pub fn seat_stone(seat: Seat) -> Stone {
    match seat {
        Seat::Black => Stone::Black,
        Seat::White => Stone::White,
    }
}

/// 1-based wire identifier for a seat, matching the reference
/// implementation's `current_player ∈ {1, 2}` convention.
pub fn seat_wire_id(seat: Seat) -> i64 {
    seat.index() as i64 + 1
}

pub struct Player {
    pub client_id: ClientId,
    pub name: String,
    pub session_token: SessionToken,
    pub room_id: Option<RoomId>,
    pub connected_time: f64,
    pub last_ping: f64,
    /// `None` once the connection's writer half has gone away; the player
    /// record itself lives on only until the dispatcher finishes the
    /// disconnect cascade (§4.3.3).
    pub outbox: Option<UnboundedSender<Vec<u8>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Waiting,
    Playing,
    Paused,
    Finished,
}

#[derive(Debug, Clone, Copy)]
pub struct TimerAnchor {
    pub turn_start_epoch: Option<f64>,
    pub elapsed_before_pause: f64,
    pub move_time_limit: f64,
}

impl TimerAnchor {
    pub fn fresh(now: f64, move_time_limit: f64) -> Self {
        TimerAnchor {
            turn_start_epoch: Some(now),
            elapsed_before_pause: 0.0,
            move_time_limit,
        }
    }

    pub fn to_wire(self) -> protocol::messages::TimerStateWire {
        protocol::messages::TimerStateWire {
            turn_start_epoch: self.turn_start_epoch,
            elapsed_before_pause: self.elapsed_before_pause,
            move_time_limit: self.move_time_limit,
        }
    }
}

pub struct MoveRecord {
    pub player_name: String,
    pub row: u8,
    pub col: u8,
}

pub struct Room {
    pub room_id: RoomId,
    pub name: String,
    pub host_id: ClientId,
    /// Ordered roster; index 0 is Black, index 1 is White once the game
    /// has started. Capacity fixed at `max_players`.
    pub roster: Vec<ClientId>,
    pub max_players: u16,
    pub status: RoomStatus,
    pub board: Board,
    pub current_seat: Seat,
    pub moves: Vec<MoveRecord>,
    pub timer: TimerAnchor,
    pub created_at: f64,
    /// Set while `status == Paused`; the only client allowed to send
    /// `player_resume` for this room (§4.2.3).
    pub pause_initiator_id: Option<ClientId>,
}

impl Room {
    pub fn is_full(&self) -> bool {
        self.roster.len() as u16 >= self.max_players
    }

    pub fn can_join(&self) -> bool {
        !self.is_full()
    }

    pub fn seat_of(&self, client_id: &ClientId) -> Option<Seat> {
        self.roster.iter().position(|c| c == client_id).map(|idx| {
            if idx == 0 { Seat::Black } else { Seat::White }
        })
    }

    pub fn client_at_seat(&self, seat: Seat) -> Option<&ClientId> {
        self.roster.get(seat.index())
    }
}

pub struct AppState {
    pub players: HashMap<ClientId, Player>,
    pub rooms: HashMap<RoomId, Room>,
    next_room_seq: u64,
    pub engine: GomokuEngine,
    pub default_move_time_limit: f64,
}

impl AppState {
    pub fn new(default_move_time_limit: f64) -> Self {
        AppState {
            players: HashMap::new(),
            rooms: HashMap::new(),
            next_room_seq: 1,
            engine: GomokuEngine,
            default_move_time_limit,
        }
    }

    pub fn next_room_id(&mut self) -> RoomId {
        let id = RoomId::from(format!("room_{}", self.next_room_seq));
        self.next_room_seq += 1;
        id
    }

    pub fn player_name(&self, client_id: &ClientId) -> String {
        self.players
            .get(client_id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn fresh_board(&self) -> Board {
        Board::new(self.engine.board_size())
    }
}

/// Called from the acceptor, which owns its own sequence counter since it's
/// the only task that mints `client_id`s (matching the reference
/// implementation's accept-time allocation).
pub fn format_client_id(seq: u64, unix_ts: u64) -> ClientId {
    ClientId::from(format!("client_{seq}_{unix_ts}"))
}
