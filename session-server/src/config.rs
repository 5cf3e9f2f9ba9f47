//! Startup configuration, sourced from CLI flags with environment-variable
//! fallback. Defaults match the literal values named throughout the spec.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "session-server", about = "Authoritative Gomoku session server")]
pub struct ServerConfig {
    /// Address to bind the TCP listener on.
    #[arg(long, env = "GOMOKU_BIND_HOST", default_value = "0.0.0.0")]
    pub bind_host: String,

    /// Port to bind the TCP listener on.
    #[arg(long, env = "GOMOKU_BIND_PORT", default_value_t = 12345)]
    pub bind_port: u16,

    /// Listen backlog passed to the OS; must be at least 10.
    #[arg(long, env = "GOMOKU_BACKLOG", default_value_t = 16)]
    pub backlog: u32,

    /// Maximum size in bytes of a single unterminated frame before the
    /// connection is dropped.
    #[arg(long, env = "GOMOKU_MAX_FRAME_BYTES", default_value_t = protocol::DEFAULT_MAX_FRAME_BYTES)]
    pub max_frame_bytes: usize,

    /// How often the reaper scans for stale connections, in seconds.
    #[arg(long, env = "GOMOKU_REAPER_POLL_SECS", default_value_t = 30)]
    pub reaper_poll_secs: u64,

    /// A player is reaped if this many seconds pass with no ping, in seconds.
    #[arg(long, env = "GOMOKU_PING_DEADLINE_SECS", default_value_t = 90)]
    pub ping_deadline_secs: u64,

    /// Default per-move time limit stamped into a fresh timer anchor, in seconds.
    #[arg(long, env = "GOMOKU_MOVE_TIME_LIMIT_SECS", default_value_t = 30.0)]
    pub move_time_limit_secs: f64,

    /// Default pause tokens granted to each seat at game start.
    #[arg(long, env = "GOMOKU_PAUSE_TOKENS", default_value_t = 2)]
    pub pause_tokens: u32,

    /// Default wall-clock cap on a single pause, in seconds.
    #[arg(long, env = "GOMOKU_PAUSE_CAP_SECS", default_value_t = 30.0)]
    pub pause_cap_secs: f64,

    /// Per-connection accept timeout before the socket is considered idle, in seconds.
    #[arg(long, env = "GOMOKU_ACCEPT_TIMEOUT_SECS", default_value_t = 30)]
    pub accept_timeout_secs: u64,

    /// A connection's own reader loop tears it down after this many
    /// consecutive seconds without a single byte read, independent of (and
    /// tighter than) the reaper's `ping_deadline_secs` sweep.
    #[arg(long, env = "GOMOKU_IDLE_SILENCE_SECS", default_value_t = 60)]
    pub idle_silence_secs: u64,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }
}
