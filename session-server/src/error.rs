//! Error types for the session server. Per the spec's error taxonomy
//! (§7), framing/protocol/authority errors never produce a `Result::Err`
//! that crosses the dispatcher boundary — they're logged and dropped in
//! place. The types here cover the two places that genuinely need one:
//! the connection task's I/O boundary, and startup.

use thiserror::Error;

/// Fatal to a single connection. Always routed into the graceful-disconnect
/// path (§4.3.3) rather than propagated further.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame exceeded the configured cap")]
    FrameTooLarge(#[from] protocol::FrameTooLarge),

    #[error("peer closed the connection")]
    Closed,

    #[error("no data read for {0:?}, closing idle connection")]
    IdleTimeout(std::time::Duration),
}

/// Fatal to the whole process; only used at the `main` boundary.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
