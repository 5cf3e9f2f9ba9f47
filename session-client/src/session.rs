//! The client session (C4): connects to the server, spawns the reader,
//! writer, and keepalive loops, exposes the typed request methods and
//! event dispatch table from §4.4.1, and runs the bounded reconnection
//! loop from §4.4.2 when a connection drops while a room is held.

use protocol::messages::TimerStateWire;
use protocol::{tags, ClientId, RoomId, ServerMessageIn, SessionToken};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::connection;
use crate::events::{ClientLifecycleEvent, EventTable};
use crate::timer;

/// Tunables for the reconnection loop and keepalive cadence (§4.4.2,
/// §4.4.3). Defaults match the literal values named throughout the spec.
#[derive(Debug, Clone)]
pub struct ClientSessionConfig {
    pub max_frame_bytes: usize,
    pub keepalive_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_backoff: Duration,
    /// How long to wait for `lobby_joined` after re-sending `lobby_join`
    /// on a reconnect attempt before treating that attempt as failed.
    /// Not named explicitly in the spec; bounded short so it doesn't
    /// meaningfully distort the ~60s total from scenario 6 in §8.
    pub lobby_join_ack_timeout: Duration,
    /// Pause tokens granted to this seat at game start (§3 Pause ledger).
    /// The server never enforces this — `send_pause` refuses once the
    /// local count hits zero (§4.2.4).
    pub pause_tokens: u32,
    /// Per-pause wall-clock cap the client runs locally (§3 Pause ledger).
    pub pause_cap: Duration,
    /// Assumed move-timer budget before any `timer_sync`/`game_move` has
    /// established a real one, so a pause sent before the first move
    /// still rebases against a sane `move_time_limit`.
    pub default_move_time_limit: f64,
}

impl Default for ClientSessionConfig {
    fn default() -> Self {
        ClientSessionConfig {
            max_frame_bytes: protocol::DEFAULT_MAX_FRAME_BYTES,
            keepalive_interval: Duration::from_secs(30),
            max_reconnect_attempts: 12,
            reconnect_backoff: Duration::from_secs(5),
            lobby_join_ack_timeout: Duration::from_secs(5),
            pause_tokens: 2,
            pause_cap: Duration::from_secs(30),
            default_move_time_limit: 30.0,
        }
    }
}

#[derive(Default)]
struct SessionState {
    host: String,
    port: u16,
    client_id: Option<ClientId>,
    session_token: Option<SessionToken>,
    player_name: Option<String>,
    room_id: Option<RoomId>,
    outbox: Option<mpsc::UnboundedSender<Vec<u8>>>,
    tasks: Vec<JoinHandle<()>>,
    /// The last timer anchor seen, rebased onto the local clock per
    /// §4.2.3. `current_timer`/`remaining_time` read this.
    last_timer: Option<TimerStateWire>,
    /// Remaining pause tokens for this seat (§3 Pause ledger). Decremented
    /// locally by `send_pause`; the server never enforces this.
    pause_tokens_remaining: u32,
    /// Set while a pause is in effect, to the timestamp the pause started
    /// (our own `local_now` if we initiated it, the peer's stamped
    /// `pause_timestamp` if they did — §4.2.3). Cleared on resume.
    pause_started_at: Option<f64>,
    /// Whether *this* client is the one that sent the currently active
    /// `player_pause` — gates `send_resume` per B3 (only the client
    /// enforces that restriction; the server does not).
    pause_initiated_by_me: bool,
}

impl SessionState {
    fn with_defaults(config: &ClientSessionConfig) -> Self {
        SessionState {
            pause_tokens_remaining: config.pause_tokens,
            ..Default::default()
        }
    }
}

struct Inner {
    events: EventTable,
    config: ClientSessionConfig,
    state: RwLock<SessionState>,
    reconnecting: AtomicBool,
    pending_lobby_join: Mutex<Option<oneshot::Sender<()>>>,
}

/// A handle to one client connection. Cheap to clone — clones share the
/// same underlying connection and event table, the way a `ewebsock`
/// sender or a `tokio::sync::mpsc::Sender` is shared across tasks.
#[derive(Clone)]
pub struct ClientSession {
    inner: Arc<Inner>,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSession {
    pub fn new() -> Self {
        Self::with_config(ClientSessionConfig::default())
    }

    pub fn with_config(config: ClientSessionConfig) -> Self {
        let state = SessionState::with_defaults(&config);
        ClientSession {
            inner: Arc::new(Inner {
                events: EventTable::new(),
                config,
                state: RwLock::new(state),
                reconnecting: AtomicBool::new(false),
                pending_lobby_join: Mutex::new(None),
            }),
        }
    }

    // -------------------------------------------------------------
    // Event subscriptions (§4.4.1)
    // -------------------------------------------------------------

    /// Registers a handler for one protocol tag, e.g. `"game_move"`.
    pub fn on_message(&self, tag: impl Into<String>, handler: impl Fn(&ServerMessageIn) + Send + Sync + 'static) {
        self.inner.events.on_message(tag, handler);
    }

    /// Registers a handler for one lifecycle event: `connect | disconnect |
    /// connection_lost | reconnecting | reconnect_success |
    /// reconnect_failed | error`.
    pub fn on_event(&self, name: &'static str, handler: impl Fn(&ClientLifecycleEvent) + Send + Sync + 'static) {
        self.inner.events.on_event(name, handler);
    }

    // -------------------------------------------------------------
    // Connection lifecycle (§4.4.1)
    // -------------------------------------------------------------

    pub async fn connect(&self, host: &str, port: u16) -> bool {
        match TcpStream::connect((host, port)).await {
            Ok(stream) => {
                {
                    let mut state = self.inner.state.write().unwrap();
                    state.host = host.to_string();
                    state.port = port;
                }
                Inner::spawn_connection(&self.inner, stream);
                info!(host, port, "connected");
                self.inner.events.dispatch_event(&ClientLifecycleEvent::Connect);
                true
            }
            Err(err) => {
                warn!(%err, host, port, "connect failed");
                self.inner
                    .events
                    .dispatch_event(&ClientLifecycleEvent::Error(err.to_string()));
                false
            }
        }
    }

    /// Tears down cleanly. Suppresses the `disconnect` callback if a
    /// reconnection attempt is in flight — that path emits its own
    /// `reconnect_failed` + `disconnect` pair when it gives up.
    pub fn disconnect(&self) {
        self.inner.teardown_tasks();
        if !self.inner.reconnecting.load(Ordering::SeqCst) {
            self.inner.events.dispatch_event(&ClientLifecycleEvent::Disconnect);
        }
    }

    /// Envelopes and writes one line. Write failure (or no live
    /// connection) is treated as connection loss — it returns `false`
    /// rather than an error; the reader task is what actually drives the
    /// reconnection loop once the socket itself notices the peer is gone.
    pub fn send(&self, kind: impl Into<String>, data: serde_json::Value) -> bool {
        Inner::send_raw(&self.inner, kind, data)
    }

    // -------------------------------------------------------------
    // Typed helpers (§4.4.1, §6.2)
    // -------------------------------------------------------------

    pub fn join_lobby(&self, name: impl Into<String>) -> bool {
        let token = self.inner.state.read().unwrap().session_token.clone();
        self.send(
            tags::LOBBY_JOIN,
            serde_json::json!({
                "player_name": name.into(),
                "session_token": token.map(|t| t.to_string()),
            }),
        )
    }

    pub fn create_room(&self, room_name: impl Into<String>) -> bool {
        self.send(tags::ROOM_CREATE, serde_json::json!({ "room_name": room_name.into() }))
    }

    pub fn join_room(&self, room_id: impl Into<String>) -> bool {
        self.send(tags::ROOM_JOIN, serde_json::json!({ "room_id": room_id.into() }))
    }

    pub fn leave_room(&self) -> bool {
        self.send(tags::ROOM_LEAVE, serde_json::json!({}))
    }

    pub fn get_rooms(&self) -> bool {
        self.send(tags::ROOM_LIST, serde_json::json!({}))
    }

    pub fn send_game_move(&self, row: u8, col: u8, player_id: i64) -> bool {
        self.send(
            tags::GAME_MOVE,
            serde_json::json!({ "row": row, "col": col, "player_id": player_id }),
        )
    }

    pub fn send_resign(&self, player: impl Into<String>) -> bool {
        self.send(tags::PLAYER_RESIGN, serde_json::json!({ "player": player.into() }))
    }

    /// Pauses the current turn (§4.2.3, §4.2.4). Refuses — returning `false`
    /// without sending anything — once the local pause-token ledger is
    /// exhausted; the conforming client gates its own UI the same way the
    /// spec says a server-enforced ledger is unnecessary.
    pub fn send_pause(&self, player: impl Into<String>, remaining_turn: f64) -> bool {
        let mut state = self.inner.state.write().unwrap();
        if state.pause_tokens_remaining == 0 {
            warn!("pause tokens exhausted, refusing to send player_pause");
            return false;
        }
        state.pause_tokens_remaining -= 1;
        let pause_timestamp = protocol::unix_timestamp();
        state.pause_started_at = Some(pause_timestamp);
        state.pause_initiated_by_me = true;
        let pauses_remaining = state.pause_tokens_remaining;
        drop(state);

        self.send(
            tags::PLAYER_PAUSE,
            serde_json::json!({
                "player": player.into(),
                "remaining_turn": remaining_turn,
                "pauses_remaining": pauses_remaining,
                "pause_timestamp": pause_timestamp,
            }),
        )
    }

    /// Resumes a paused turn (§4.2.3). Only meaningful from the side that
    /// initiated the pause (B3) — `can_resume` reports whether that's this
    /// client; the server relays a resume from either side regardless.
    pub fn send_resume(&self, player: impl Into<String>, remaining_turn: f64) -> bool {
        if !self.can_resume() {
            warn!("refusing to send player_resume: this client did not initiate the pause");
            return false;
        }
        self.inner.state.write().unwrap().pause_started_at = None;
        self.send(
            tags::PLAYER_RESUME,
            serde_json::json!({
                "player": player.into(),
                "remaining_turn": remaining_turn,
            }),
        )
    }

    /// Whether this client is allowed to show a Resume control right now
    /// (B3): a pause is active and this client is the one that sent it.
    pub fn can_resume(&self) -> bool {
        let state = self.inner.state.read().unwrap();
        state.pause_started_at.is_some() && state.pause_initiated_by_me
    }

    /// Remaining pause tokens in the local ledger (§3 Pause ledger).
    pub fn pause_tokens_remaining(&self) -> u32 {
        self.inner.state.read().unwrap().pause_tokens_remaining
    }

    /// Seconds left on the per-pause wall-clock cap, if a pause is active
    /// right now — the client-run cap from §3/§9 ("cooperative pause
    /// coordination"). `None` when not paused.
    pub fn pause_cap_remaining(&self) -> Option<f64> {
        let started_at = self.inner.state.read().unwrap().pause_started_at?;
        let elapsed = protocol::unix_timestamp() - started_at;
        Some((self.inner.config.pause_cap.as_secs_f64() - elapsed).max(0.0))
    }

    pub fn request_new_game(&self, room_id: impl Into<String>) -> bool {
        self.send(tags::NEW_GAME_REQUEST, serde_json::json!({ "room_id": room_id.into() }))
    }

    pub fn respond_new_game(&self, accepted: bool) -> bool {
        self.send(tags::NEW_GAME_RESPONSE, serde_json::json!({ "accepted": accepted }))
    }

    // -------------------------------------------------------------
    // Read-only accessors
    // -------------------------------------------------------------

    pub fn client_id(&self) -> Option<ClientId> {
        self.inner.state.read().unwrap().client_id.clone()
    }

    pub fn session_token(&self) -> Option<SessionToken> {
        self.inner.state.read().unwrap().session_token.clone()
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.inner.state.read().unwrap().room_id.clone()
    }

    /// The most recently reconciled timer anchor (§4.2.3), if any
    /// `timer_sync` or `game_move` has arrived yet.
    pub fn current_timer(&self) -> Option<TimerStateWire> {
        self.inner.state.read().unwrap().last_timer
    }

    /// Seconds left on the move timer right now, per the current anchor.
    pub fn remaining_time(&self) -> Option<f64> {
        let anchor = self.current_timer()?;
        Some(timer::remaining(anchor, protocol::unix_timestamp()))
    }
}

impl Inner {
    fn teardown_tasks(&self) {
        let mut state = self.state.write().unwrap();
        for task in state.tasks.drain(..) {
            task.abort();
        }
        state.outbox = None;
    }

    fn send_raw(inner: &Arc<Inner>, kind: impl Into<String>, data: serde_json::Value) -> bool {
        let envelope = protocol::Envelope::new(kind, data);
        let bytes = protocol::encode(&envelope);
        let outbox = inner.state.read().unwrap().outbox.clone();
        match outbox {
            Some(tx) => tx.send(bytes).is_ok(),
            None => false,
        }
    }

    /// Wires up reader/writer/keepalive tasks for a freshly (re)connected
    /// socket. Used both by the initial `connect()` and by each
    /// reconnection attempt.
    fn spawn_connection(inner: &Arc<Inner>, stream: TcpStream) {
        let (read_half, write_half) = stream.into_split();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let writer_handle = tokio::spawn(connection::writer_loop(write_half, outbox_rx));

        let reader_inner_for_loop = Arc::clone(inner);
        let reader_inner_for_end = Arc::clone(inner);
        let max_frame_bytes = inner.config.max_frame_bytes;
        let reader_handle = tokio::spawn(async move {
            let result = connection::reader_loop(read_half, max_frame_bytes, move |message, recv_time| {
                Inner::handle_inbound(&reader_inner_for_loop, message, recv_time);
            })
            .await;
            Inner::on_connection_ended(reader_inner_for_end, result).await;
        });

        let keepalive_inner = Arc::clone(inner);
        let keepalive_interval = inner.config.keepalive_interval;
        let keepalive_handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(keepalive_interval).await;
                if !Inner::send_raw(&keepalive_inner, tags::PING, serde_json::json!({})) {
                    break;
                }
            }
        });

        let mut state = inner.state.write().unwrap();
        state.outbox = Some(outbox_tx);
        state.tasks = vec![writer_handle, reader_handle, keepalive_handle];
    }

    /// Applies a decoded server message to local session state, then
    /// dispatches it to whatever `on_message` handler the UI registered
    /// for its tag.
    fn handle_inbound(inner: &Arc<Inner>, message: ServerMessageIn, recv_time: f64) {
        match &message {
            ServerMessageIn::LobbyJoined(data) => {
                let mut state = inner.state.write().unwrap();
                state.client_id = Some(ClientId::from(data.client_id.clone()));
                state.session_token = Some(SessionToken::from(data.session_token.clone()));
                state.player_name = Some(data.name.clone());
                drop(state);
                if let Some(tx) = inner.pending_lobby_join.lock().unwrap().take() {
                    let _ = tx.send(());
                }
            }
            ServerMessageIn::RoomInfo(data) => {
                inner.state.write().unwrap().room_id = Some(RoomId::from(data.room_info.room_id.clone()));
            }
            ServerMessageIn::GameStarted(data) => {
                inner.state.write().unwrap().room_id = Some(RoomId::from(data.room_id.clone()));
            }
            ServerMessageIn::GameEndedDisconnect(_) => {
                // Graceful-termination policy (§4.3.3): the game has
                // already ended server-side. The client returns to the
                // lobby rather than holding a room reference.
                inner.state.write().unwrap().room_id = None;
            }
            ServerMessageIn::TimerSync(data) => {
                let anchor = timer::adopt_server_anchor(data.timer_state, recv_time);
                inner.state.write().unwrap().last_timer = Some(anchor);
            }
            ServerMessageIn::GameMove(data) => {
                let anchor = timer::adopt_server_anchor(data.timer_state, recv_time);
                inner.state.write().unwrap().last_timer = Some(anchor);
            }
            ServerMessageIn::PlayerPause(data) => {
                // Only the non-initiator ever receives this (the server
                // excludes the sender from the broadcast — §4.2.4): freeze
                // the local anchor at `remaining_turn` and adopt the
                // initiator's stamped `pause_timestamp`, not our own clock
                // (§4.2.3's "peer uses the stamped timestamp").
                let mut state = inner.state.write().unwrap();
                let move_time_limit = state
                    .last_timer
                    .map(|t| t.move_time_limit)
                    .unwrap_or(inner.config.default_move_time_limit);
                state.last_timer = Some(TimerStateWire {
                    turn_start_epoch: None,
                    elapsed_before_pause: (move_time_limit - data.remaining_turn).max(0.0),
                    move_time_limit,
                });
                state.pause_started_at = Some(data.pause_timestamp);
                state.pause_initiated_by_me = false;
            }
            ServerMessageIn::PlayerResume(data) => {
                // §8 scenario 3: rebase `elapsed_before_pause` from the
                // resumed `remaining_turn` budget and start a fresh anchor.
                let mut state = inner.state.write().unwrap();
                let move_time_limit = state
                    .last_timer
                    .map(|t| t.move_time_limit)
                    .unwrap_or(inner.config.default_move_time_limit);
                let anchor = timer::rebase_on_resume(move_time_limit, data.remaining_turn, recv_time);
                state.last_timer = Some(anchor);
                state.pause_started_at = None;
            }
            _ => {}
        }

        inner.events.dispatch_message(message.tag(), &message);
    }

    /// The reader loop ended (EOF or I/O error). Decide whether to run
    /// the bounded reconnection loop (§4.4.2) or just disconnect.
    async fn on_connection_ended(inner: Arc<Inner>, result: Result<(), crate::error::ClientError>) {
        if let Err(err) = &result {
            warn!(%err, "connection lost");
        }

        let held_room = inner.state.read().unwrap().room_id.is_some();
        if !held_room {
            inner.teardown_tasks();
            inner.events.dispatch_event(&ClientLifecycleEvent::Disconnect);
            return;
        }

        inner.reconnecting.store(true, Ordering::SeqCst);
        inner.events.dispatch_event(&ClientLifecycleEvent::ConnectionLost);

        let max = inner.config.max_reconnect_attempts;
        for attempt in 1..=max {
            inner
                .events
                .dispatch_event(&ClientLifecycleEvent::Reconnecting { attempt, max });
            tokio::time::sleep(inner.config.reconnect_backoff).await;

            let (host, port) = {
                let state = inner.state.read().unwrap();
                (state.host.clone(), state.port)
            };
            let Ok(stream) = TcpStream::connect((host.as_str(), port)).await else {
                continue;
            };

            Inner::spawn_connection(&inner, stream);

            let (name, token) = {
                let state = inner.state.read().unwrap();
                (state.player_name.clone().unwrap_or_default(), state.session_token.clone())
            };
            let (ack_tx, ack_rx) = oneshot::channel();
            *inner.pending_lobby_join.lock().unwrap() = Some(ack_tx);
            let sent = Inner::send_raw(
                &inner,
                tags::LOBBY_JOIN,
                serde_json::json!({
                    "player_name": name,
                    "session_token": token.map(|t| t.to_string()),
                }),
            );

            if sent
                && tokio::time::timeout(inner.config.lobby_join_ack_timeout, ack_rx)
                    .await
                    .is_ok()
            {
                // Graceful-termination policy (§4.3.3): the game this client
                // held a reference to has already ended server-side. A
                // successful reconnect lands back in the lobby, never back
                // in the room, so the stale room reference is dropped here.
                inner.state.write().unwrap().room_id = None;
                inner.reconnecting.store(false, Ordering::SeqCst);
                inner
                    .events
                    .dispatch_event(&ClientLifecycleEvent::ReconnectSuccess);
                return;
            }

            inner.pending_lobby_join.lock().unwrap().take();
            inner.teardown_tasks();
        }

        inner.reconnecting.store(false, Ordering::SeqCst);
        inner.events.dispatch_event(&ClientLifecycleEvent::ReconnectFailed);
        inner.events.dispatch_event(&ClientLifecycleEvent::Disconnect);
        inner.teardown_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::messages::{GameStartedData, PlayersData, TimerSyncData};
    use protocol::Seat;
    use std::sync::atomic::AtomicBool;
    use tokio::net::TcpListener;

    async fn send_envelope(stream: &mut TcpStream, kind: &str, data: serde_json::Value) {
        use tokio::io::AsyncWriteExt;
        let bytes = protocol::encode(&protocol::Envelope::new(kind, data));
        stream.write_all(&bytes).await.unwrap();
    }

    /// Reads and discards up to one line — enough to let a fake server
    /// acknowledge a client sent *something* without caring what.
    async fn drain_one_line(stream: &mut TcpStream) {
        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf).await;
    }

    #[tokio::test]
    async fn connect_and_lobby_join_round_trip() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            drain_one_line(&mut stream).await;
            send_envelope(
                &mut stream,
                tags::LOBBY_JOINED,
                serde_json::json!({ "client_id": "c1", "name": "Alice", "session_token": "tok123" }),
            )
            .await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let session = ClientSession::new();
        let joined = Arc::new(AtomicBool::new(false));
        let joined_clone = Arc::clone(&joined);
        session.on_message(tags::LOBBY_JOINED, move |_| {
            joined_clone.store(true, Ordering::SeqCst);
        });

        assert!(session.connect("127.0.0.1", port).await);
        assert!(session.join_lobby("Alice"));

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(joined.load(Ordering::SeqCst));
        assert_eq!(session.client_id().unwrap().as_str(), "c1");
        assert_eq!(session.session_token().unwrap().as_str(), "tok123");
    }

    #[tokio::test]
    async fn timer_sync_updates_the_locally_reconciled_anchor() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let now = protocol::unix_timestamp();
            let data = TimerSyncData {
                timer_state: protocol::messages::TimerStateWire {
                    turn_start_epoch: Some(now),
                    elapsed_before_pause: 0.0,
                    move_time_limit: 30.0,
                },
            };
            send_envelope(&mut stream, tags::TIMER_SYNC, serde_json::to_value(data).unwrap()).await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let session = ClientSession::new();
        assert!(session.connect("127.0.0.1", port).await);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let remaining = session.remaining_time().expect("timer_sync should have landed");
        assert!(remaining > 29.0 && remaining <= 30.0);
    }

    #[tokio::test]
    async fn disconnect_without_a_room_fires_disconnect_and_suppresses_reconnect() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let session = ClientSession::new();
        let disconnected = Arc::new(AtomicBool::new(false));
        let disconnected_clone = Arc::clone(&disconnected);
        session.on_event("disconnect", move |_| {
            disconnected_clone.store(true, Ordering::SeqCst);
        });

        assert!(session.connect("127.0.0.1", port).await);
        session.disconnect();

        assert!(disconnected.load(Ordering::SeqCst));
        assert!(!session.send(tags::PING, serde_json::json!({})));
    }

    #[tokio::test]
    async fn connection_loss_while_holding_a_room_triggers_a_successful_reconnect() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            // First connection: tells the client it's in a room, then the
            // socket is dropped to simulate connection loss.
            let (mut stream, _) = listener.accept().await.unwrap();
            let data = GameStartedData {
                room_id: "room_1".to_string(),
                your_role: Seat::Black,
                your_name: "Alice".to_string(),
                opponent_name: "Bob".to_string(),
                players: PlayersData {
                    black: "Alice".to_string(),
                    white: "Bob".to_string(),
                },
                your_turn: true,
            };
            send_envelope(&mut stream, tags::GAME_STARTED, serde_json::to_value(data).unwrap()).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(stream);

            // Reconnect attempt: client re-sends lobby_join with its token.
            let (mut stream2, _) = listener.accept().await.unwrap();
            drain_one_line(&mut stream2).await;
            send_envelope(
                &mut stream2,
                tags::LOBBY_JOINED,
                serde_json::json!({ "client_id": "c1", "name": "Alice", "session_token": "tok123" }),
            )
            .await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let config = ClientSessionConfig {
            max_frame_bytes: protocol::DEFAULT_MAX_FRAME_BYTES,
            keepalive_interval: Duration::from_secs(3600),
            max_reconnect_attempts: 3,
            reconnect_backoff: Duration::from_millis(20),
            lobby_join_ack_timeout: Duration::from_millis(500),
            pause_tokens: 2,
            pause_cap: Duration::from_secs(30),
            default_move_time_limit: 30.0,
        };
        let session = ClientSession::with_config(config);

        let lost = Arc::new(AtomicBool::new(false));
        let lost_clone = Arc::clone(&lost);
        session.on_event("connection_lost", move |_| {
            lost_clone.store(true, Ordering::SeqCst);
        });
        let reconnected = Arc::new(AtomicBool::new(false));
        let reconnected_clone = Arc::clone(&reconnected);
        session.on_event("reconnect_success", move |_| {
            reconnected_clone.store(true, Ordering::SeqCst);
        });

        assert!(session.connect("127.0.0.1", port).await);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(session.room_id().unwrap().as_str(), "room_1");

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(lost.load(Ordering::SeqCst));
        assert!(reconnected.load(Ordering::SeqCst));
        assert_eq!(session.session_token().unwrap().as_str(), "tok123");
    }
}
