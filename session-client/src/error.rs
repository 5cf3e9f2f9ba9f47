//! Client-side error taxonomy. Mirrors the session server's split
//! (`session-server::error::ConnectionError`) between framing/protocol
//! failures, which are logged and dropped, and I/O failures, which are
//! always routed into the connection-loss path (§4.4.2) rather than
//! bubbling up to the UI as a `Result::Err`.

use thiserror::Error;

/// Returned by the handful of client operations that can fail in a way the
/// caller needs to observe directly (mainly `connect`). Everything that
/// happens after a connection is established is surfaced through events
/// instead (`on_event` / `on_message`), matching the public contract in
/// §4.4.1 — `send` and the typed helpers report failure as `bool`, not `Err`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame exceeded the configured cap")]
    FrameTooLarge(#[from] protocol::FrameTooLarge),

    #[error("server sent a message we could not parse: {0}")]
    Protocol(#[from] protocol::PayloadMismatch),

    #[error("not connected")]
    NotConnected,
}
