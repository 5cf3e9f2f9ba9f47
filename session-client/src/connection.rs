//! Low-level per-connection plumbing: a reader task that frames and
//! parses inbound bytes into [`ServerMessageIn`], and a writer task that
//! serializes outbound lines. Paired the same way the session server
//! pairs a reader and writer per socket (`session-server::connection`),
//! just with the roles of client and server swapped.

use protocol::{Framer, ServerMessageIn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::ClientError;

/// Drives the reader half of a connection until EOF or an I/O error,
/// handing each successfully decoded message to `on_message` along with
/// the local time it was received — the client needs that instant to
/// rebase timer anchors (§4.2.3).
pub async fn reader_loop(
    mut read_half: OwnedReadHalf,
    max_frame_bytes: usize,
    mut on_message: impl FnMut(ServerMessageIn, f64),
) -> Result<(), ClientError> {
    let mut framer = Framer::new(max_frame_bytes);
    let mut buf = vec![0u8; 4096];
    loop {
        let n = read_half.read(&mut buf).await?;
        if n == 0 {
            return Ok(()); // peer closed the connection
        }
        let decoded = framer.feed(&buf[..n])?;
        let recv_time = protocol::unix_timestamp();
        for result in decoded {
            match result {
                Ok(envelope) => match ServerMessageIn::try_from(envelope) {
                    Ok(message) => on_message(message, recv_time),
                    Err(err) => warn!(%err, "server payload did not match expected shape, dropped"),
                },
                Err(err) => warn!(%err, "malformed frame from server dropped"),
            }
        }
    }
}

/// Drains the outbox and writes each already-framed line to the socket.
/// Serializing all writes through one task (fed by an mpsc channel) is
/// what keeps concurrent `send` calls from interleaving partial frames —
/// the same role the session server's per-connection writer mutex plays.
pub async fn writer_loop(mut write_half: OwnedWriteHalf, mut outbox_rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(bytes) = outbox_rx.recv().await {
        if let Err(err) = write_half.write_all(&bytes).await {
            warn!(%err, "write error, closing connection");
            return;
        }
    }
}
