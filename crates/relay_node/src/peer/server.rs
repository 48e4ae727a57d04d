//! Newline-framed TCP transport for the peer protocol.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{Instrument, debug, info, info_span, warn};

use super::message::PeerMessage;
use super::router::PeerMessageRouter;
use crate::error::{NodeError, ProtocolError};

/// Largest accepted message, excluding the newline.
pub const MAX_MESSAGE_BYTES: usize = 1 << 20;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounds on inbound peer connections.
#[derive(Debug, Clone, Copy)]
pub struct ServerLimits {
    /// Connections served at once; further ones are closed on accept.
    pub max_connections: usize,
    /// A connection that sends nothing for this long is closed.
    pub idle_timeout: Duration,
}

impl Default for ServerLimits {
    fn default() -> Self {
        ServerLimits {
            max_connections: 64,
            idle_timeout: Duration::from_secs(120),
        }
    }
}

pub async fn bind(port: u16) -> Result<TcpListener, NodeError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .map_err(|source| NodeError::Bind { addr, source })
}

/// Accepts peer connections forever, serving each on its own task.
pub async fn serve(listener: TcpListener, router: Arc<PeerMessageRouter>, limits: ServerLimits) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, max_connections = limits.max_connections, "listening for peers");
    }
    let slots = Arc::new(Semaphore::new(limits.max_connections));
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        let Ok(permit) = slots.clone().try_acquire_owned() else {
            warn!(%addr, "rejecting peer connection, at capacity");
            continue;
        };
        let router = router.clone();
        tokio::spawn(
            async move {
                match handle_connection(stream, &router, limits.idle_timeout).await {
                    Ok(()) => debug!("connection closed"),
                    Err(e) => warn!("connection dropped: {e}"),
                }
                drop(permit);
            }
            .instrument(info_span!("peer", %addr)),
        );
    }
}

/// Reads messages until EOF, or until nothing arrives for `idle_timeout`.
/// Malformed messages are logged and skipped.
pub async fn handle_connection<S>(
    stream: S,
    router: &PeerMessageRouter,
    idle_timeout: Duration,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = timeout(
            idle_timeout,
            (&mut reader)
                .take(MAX_MESSAGE_BYTES as u64 + 1)
                .read_until(b'\n', &mut buf),
        )
        .await
        .map_err(|_| ProtocolError::Idle(idle_timeout))??;
        if n == 0 {
            return Ok(());
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        } else if buf.len() > MAX_MESSAGE_BYTES {
            return Err(ProtocolError::Oversized {
                limit: MAX_MESSAGE_BYTES,
            });
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        if buf.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match router.route(&buf).await {
            Ok(Some(reply)) => {
                let mut line = reply.encode()?;
                line.push('\n');
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            Ok(None) => {}
            Err(e @ ProtocolError::Malformed(_)) => warn!("{e}"),
            Err(e) => warn!("failed to handle peer message: {e}"),
        }
    }
}

/// Sends `message` to every peer on a fresh connection. Returns how many
/// peers received it; failures are logged.
pub async fn broadcast(peers: &[String], message: &PeerMessage) -> Result<usize, ProtocolError> {
    let mut line = message.encode()?;
    line.push('\n');

    let mut delivered = 0;
    for peer in peers {
        match send_line(peer, line.as_bytes()).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!(%peer, tag = message.tag(), "broadcast failed: {e}"),
        }
    }
    Ok(delivered)
}

async fn send_line(peer: &str, line: &[u8]) -> std::io::Result<()> {
    let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(peer))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
    stream.write_all(line).await?;
    stream.shutdown().await
}
