//! Typed payloads for every message tag in the wire protocol (§6.2), plus
//! the `ClientMessage`/`ServerMessage` sums the dispatcher and the client
//! session actually match on. The envelope (see [`crate::envelope`]) only
//! knows about `{type, data, timestamp}`; this module is where a `type`
//! string and a `data` object become a typed Rust value.

use crate::envelope::Envelope;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The string tags used on the wire. Kept as plain `&str` constants (not an
/// enum) because the envelope's `type` field is just a string and this
/// avoids a pointless round trip through a tag enum during decode.
pub mod tags {
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const LOBBY_JOIN: &str = "lobby_join";
    pub const LOBBY_JOINED: &str = "lobby_joined";
    pub const ROOM_CREATE: &str = "room_create";
    pub const ROOM_JOIN: &str = "room_join";
    pub const ROOM_LEAVE: &str = "room_leave";
    pub const ROOM_LIST: &str = "room_list";
    pub const ROOM_INFO: &str = "room_info";
    pub const GAME_MOVE: &str = "game_move";
    pub const GAME_STARTED: &str = "game_started";
    pub const TIMER_SYNC: &str = "timer_sync";
    pub const GAME_ENDED_DISCONNECT: &str = "game_ended_disconnect";
    pub const PLAYER_LEFT_ROOM: &str = "player_left_room";
    pub const PLAYER_PAUSE: &str = "player_pause";
    pub const PLAYER_RESUME: &str = "player_resume";
    pub const PLAYER_RESIGN: &str = "player_resign";
    pub const RESIGN_ACK: &str = "resign_ack";
    pub const NEW_GAME_REQUEST: &str = "new_game_request";
    pub const NEW_GAME_RESPONSE: &str = "new_game_response";
}

/// A seat in a room. Distinct from `client_id` — seat is a role, roster
/// index while a game is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    Black,
    White,
}

impl Seat {
    pub fn opponent(self) -> Seat {
        match self {
            Seat::Black => Seat::White,
            Seat::White => Seat::Black,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Seat::Black => 0,
            Seat::White => 1,
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seat::Black => write!(f, "black"),
            Seat::White => write!(f, "white"),
        }
    }
}

/// The timer anchor as it travels on the wire (§4.2.3). `turn_start_epoch`
/// is `None` while paused.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimerStateWire {
    pub turn_start_epoch: Option<f64>,
    pub elapsed_before_pause: f64,
    pub move_time_limit: f64,
}

// ---------------------------------------------------------------------
// Client -> Server payloads
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyJoinData {
    pub player_name: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomCreateData {
    pub room_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomJoinData {
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMoveData {
    pub row: u8,
    pub col: u8,
    /// Trusted for display only — see §9 Design Notes. The authoritative
    /// seat is derived server-side from the sender's roster position.
    pub player_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerPauseData {
    pub player: String,
    pub remaining_turn: f64,
    #[serde(default)]
    pub pauses_remaining: Option<u32>,
    pub pause_timestamp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerResumeData {
    pub player: String,
    pub remaining_turn: f64,
    #[serde(default)]
    pub pause_duration_used: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerResignData {
    pub player: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGameRequestData {
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGameResponseData {
    pub accepted: bool,
}

// ---------------------------------------------------------------------
// Server -> Client payloads
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyJoinedData {
    pub client_id: String,
    pub name: String,
    pub session_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInfoPayload {
    pub room_id: String,
    pub name: String,
    pub host_name: String,
    pub players: u16,
    pub max_players: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInfoData {
    pub success: bool,
    pub room_info: RoomInfoPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomListEntry {
    pub room_id: String,
    pub name: String,
    pub host_name: String,
    pub players: u16,
    pub max_players: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomListData {
    pub rooms: Vec<RoomListEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayersData {
    pub black: String,
    pub white: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStartedData {
    pub room_id: String,
    pub your_role: Seat,
    pub your_name: String,
    pub opponent_name: String,
    pub players: PlayersData,
    pub your_turn: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMoveBroadcastData {
    pub player: String,
    pub row: u8,
    pub col: u8,
    pub player_id: i64,
    pub timer_state: TimerStateWire,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerSyncData {
    pub timer_state: TimerStateWire,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEndedDisconnectData {
    pub reason: String,
    pub disconnected_player: String,
    pub winner: String,
    pub message: String,
    pub forfeit: bool,
    pub no_rematch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerLeftRoomData {
    pub player_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResignAckData {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGameRequestForwardData {
    pub room_id: String,
    pub requester: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGameResponseForwardData {
    pub room_id: String,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Error turning a raw envelope into a typed message: either `type` is
/// recognized but `data` doesn't match its shape (a protocol error, §7
/// item 2 — logged, no reply, no state change), never anything fatal.
#[derive(Debug, thiserror::Error)]
#[error("payload for `{kind}` did not match expected shape: {source}")]
pub struct PayloadMismatch {
    pub kind: String,
    #[source]
    pub source: serde_json::Error,
}

/// Every message type a client may legitimately send. `Unknown` is the
/// forward-compatibility fallback required by §4.1 — the dispatcher logs
/// and ignores it rather than tearing down the connection.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Ping,
    LobbyJoin(LobbyJoinData),
    RoomCreate(RoomCreateData),
    RoomJoin(RoomJoinData),
    RoomLeave,
    RoomList,
    GameMove(GameMoveData),
    PlayerPause(PlayerPauseData),
    PlayerResume(PlayerResumeData),
    PlayerResign(PlayerResignData),
    NewGameRequest(NewGameRequestData),
    NewGameResponse(NewGameResponseData),
    Unknown(String),
}

impl TryFrom<Envelope> for ClientMessage {
    type Error = PayloadMismatch;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let parse = |data: serde_json::Value| -> Result<_, PayloadMismatch> {
            serde_json::from_value(data).map_err(|source| PayloadMismatch {
                kind: envelope.kind.clone(),
                source,
            })
        };

        Ok(match envelope.kind.as_str() {
            tags::PING => ClientMessage::Ping,
            tags::LOBBY_JOIN => ClientMessage::LobbyJoin(parse(envelope.data)?),
            tags::ROOM_CREATE => ClientMessage::RoomCreate(parse(envelope.data)?),
            tags::ROOM_JOIN => ClientMessage::RoomJoin(parse(envelope.data)?),
            tags::ROOM_LEAVE => ClientMessage::RoomLeave,
            tags::ROOM_LIST => ClientMessage::RoomList,
            tags::GAME_MOVE => ClientMessage::GameMove(parse(envelope.data)?),
            tags::PLAYER_PAUSE => ClientMessage::PlayerPause(parse(envelope.data)?),
            tags::PLAYER_RESUME => ClientMessage::PlayerResume(parse(envelope.data)?),
            tags::PLAYER_RESIGN => ClientMessage::PlayerResign(parse(envelope.data)?),
            tags::NEW_GAME_REQUEST => ClientMessage::NewGameRequest(parse(envelope.data)?),
            tags::NEW_GAME_RESPONSE => ClientMessage::NewGameResponse(parse(envelope.data)?),
            other => ClientMessage::Unknown(other.to_string()),
        })
    }
}

/// Every message type the server sends back. Converting to an [`Envelope`]
/// is infallible — these are all built from already-valid Rust values.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    Pong,
    LobbyJoined(LobbyJoinedData),
    RoomInfo(RoomInfoData),
    RoomList(RoomListData),
    GameStarted(GameStartedData),
    GameMove(GameMoveBroadcastData),
    TimerSync(TimerSyncData),
    GameEndedDisconnect(GameEndedDisconnectData),
    PlayerLeftRoom(PlayerLeftRoomData),
    PlayerPause(PlayerPauseData),
    PlayerResume(PlayerResumeData),
    PlayerResign(PlayerResignData),
    ResignAck(ResignAckData),
    NewGameRequest(NewGameRequestForwardData),
    NewGameResponse(NewGameResponseForwardData),
}

impl ServerMessage {
    pub fn into_envelope(self) -> Envelope {
        // Every variant wraps a plain derive(Serialize) struct of owned data,
        // so `to_value` cannot fail here.
        let to_value = |v: impl Serialize| serde_json::to_value(v).expect("server payload serialization cannot fail");

        let (kind, data) = match self {
            ServerMessage::Pong => (tags::PONG, serde_json::json!({})),
            ServerMessage::LobbyJoined(d) => (tags::LOBBY_JOINED, to_value(d)),
            ServerMessage::RoomInfo(d) => (tags::ROOM_INFO, to_value(d)),
            ServerMessage::RoomList(d) => (tags::ROOM_LIST, to_value(d)),
            ServerMessage::GameStarted(d) => (tags::GAME_STARTED, to_value(d)),
            ServerMessage::GameMove(d) => (tags::GAME_MOVE, to_value(d)),
            ServerMessage::TimerSync(d) => (tags::TIMER_SYNC, to_value(d)),
            ServerMessage::GameEndedDisconnect(d) => (tags::GAME_ENDED_DISCONNECT, to_value(d)),
            ServerMessage::PlayerLeftRoom(d) => (tags::PLAYER_LEFT_ROOM, to_value(d)),
            ServerMessage::PlayerPause(d) => (tags::PLAYER_PAUSE, to_value(d)),
            ServerMessage::PlayerResume(d) => (tags::PLAYER_RESUME, to_value(d)),
            ServerMessage::PlayerResign(d) => (tags::PLAYER_RESIGN, to_value(d)),
            ServerMessage::ResignAck(d) => (tags::RESIGN_ACK, to_value(d)),
            ServerMessage::NewGameRequest(d) => (tags::NEW_GAME_REQUEST, to_value(d)),
            ServerMessage::NewGameResponse(d) => (tags::NEW_GAME_RESPONSE, to_value(d)),
        };
        Envelope::new(kind, data)
    }
}

/// Every message a conforming client needs to be able to receive. The
/// client session (C4) matches on this the way the dispatcher matches on
/// [`ClientMessage`] — `Unknown` is the same forward-compatibility
/// fallback required by §4.1, just on the other side of the wire.
#[derive(Debug, Clone)]
pub enum ServerMessageIn {
    Pong,
    LobbyJoined(LobbyJoinedData),
    RoomInfo(RoomInfoData),
    RoomList(RoomListData),
    GameStarted(GameStartedData),
    GameMove(GameMoveBroadcastData),
    TimerSync(TimerSyncData),
    GameEndedDisconnect(GameEndedDisconnectData),
    PlayerLeftRoom(PlayerLeftRoomData),
    PlayerPause(PlayerPauseData),
    PlayerResume(PlayerResumeData),
    PlayerResign(PlayerResignData),
    ResignAck(ResignAckData),
    NewGameRequest(NewGameRequestForwardData),
    NewGameResponse(NewGameResponseForwardData),
    Unknown(String),
}

impl ServerMessageIn {
    /// The wire tag this value was (or, for `Unknown`, would have been)
    /// decoded from. Lets a client key its `on_message` dispatch table by
    /// the same tag strings §6.2 defines without re-deriving them.
    pub fn tag(&self) -> &str {
        match self {
            ServerMessageIn::Pong => tags::PONG,
            ServerMessageIn::LobbyJoined(_) => tags::LOBBY_JOINED,
            ServerMessageIn::RoomInfo(_) => tags::ROOM_INFO,
            ServerMessageIn::RoomList(_) => tags::ROOM_LIST,
            ServerMessageIn::GameStarted(_) => tags::GAME_STARTED,
            ServerMessageIn::GameMove(_) => tags::GAME_MOVE,
            ServerMessageIn::TimerSync(_) => tags::TIMER_SYNC,
            ServerMessageIn::GameEndedDisconnect(_) => tags::GAME_ENDED_DISCONNECT,
            ServerMessageIn::PlayerLeftRoom(_) => tags::PLAYER_LEFT_ROOM,
            ServerMessageIn::PlayerPause(_) => tags::PLAYER_PAUSE,
            ServerMessageIn::PlayerResume(_) => tags::PLAYER_RESUME,
            ServerMessageIn::PlayerResign(_) => tags::PLAYER_RESIGN,
            ServerMessageIn::ResignAck(_) => tags::RESIGN_ACK,
            ServerMessageIn::NewGameRequest(_) => tags::NEW_GAME_REQUEST,
            ServerMessageIn::NewGameResponse(_) => tags::NEW_GAME_RESPONSE,
            ServerMessageIn::Unknown(tag) => tag.as_str(),
        }
    }
}

impl TryFrom<Envelope> for ServerMessageIn {
    type Error = PayloadMismatch;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let parse = |data: serde_json::Value| -> Result<_, PayloadMismatch> {
            serde_json::from_value(data).map_err(|source| PayloadMismatch {
                kind: envelope.kind.clone(),
                source,
            })
        };

        Ok(match envelope.kind.as_str() {
            tags::PONG => ServerMessageIn::Pong,
            tags::LOBBY_JOINED => ServerMessageIn::LobbyJoined(parse(envelope.data)?),
            tags::ROOM_INFO => ServerMessageIn::RoomInfo(parse(envelope.data)?),
            tags::ROOM_LIST => ServerMessageIn::RoomList(parse(envelope.data)?),
            tags::GAME_STARTED => ServerMessageIn::GameStarted(parse(envelope.data)?),
            tags::GAME_MOVE => ServerMessageIn::GameMove(parse(envelope.data)?),
            tags::TIMER_SYNC => ServerMessageIn::TimerSync(parse(envelope.data)?),
            tags::GAME_ENDED_DISCONNECT => {
                ServerMessageIn::GameEndedDisconnect(parse(envelope.data)?)
            }
            tags::PLAYER_LEFT_ROOM => ServerMessageIn::PlayerLeftRoom(parse(envelope.data)?),
            tags::PLAYER_PAUSE => ServerMessageIn::PlayerPause(parse(envelope.data)?),
            tags::PLAYER_RESUME => ServerMessageIn::PlayerResume(parse(envelope.data)?),
            tags::PLAYER_RESIGN => ServerMessageIn::PlayerResign(parse(envelope.data)?),
            tags::RESIGN_ACK => ServerMessageIn::ResignAck(parse(envelope.data)?),
            tags::NEW_GAME_REQUEST => ServerMessageIn::NewGameRequest(parse(envelope.data)?),
            tags::NEW_GAME_RESPONSE => ServerMessageIn::NewGameResponse(parse(envelope.data)?),
            other => ServerMessageIn::Unknown(other.to_string()),
        })
    }
}
