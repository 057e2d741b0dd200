use std::{
    fmt, io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    task::JoinSet,
};
use tracing::{debug, warn};

/// Size of the per-direction copy buffer
pub const RELAY_BUFFER_SIZE: usize = 4096;

/// Direction names one half of a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToUpstream => f.write_str("client->upstream"),
            Direction::UpstreamToClient => f.write_str("upstream->client"),
        }
    }
}

/// RelayStats counts the bytes forwarded in each direction
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

/// relay drives both directions concurrently. As soon as either one ends,
/// the other is aborted, and every half passed in is dropped (closed) before
/// this returns.
pub async fn relay<CR, CW, UR, UW>(
    client_read: CR,
    client_write: CW,
    upstream_read: UR,
    upstream_write: UW,
) -> RelayStats
where
    CR: AsyncRead + Unpin + Send + 'static,
    CW: AsyncWrite + Unpin + Send + 'static,
    UR: AsyncRead + Unpin + Send + 'static,
    UW: AsyncWrite + Unpin + Send + 'static,
{
    let to_upstream = Arc::new(AtomicU64::new(0));
    let to_client = Arc::new(AtomicU64::new(0));

    let mut directions = JoinSet::new();
    directions.spawn(pump(
        client_read,
        upstream_write,
        Direction::ClientToUpstream,
        Arc::clone(&to_upstream),
    ));
    directions.spawn(pump(
        upstream_read,
        client_write,
        Direction::UpstreamToClient,
        Arc::clone(&to_client),
    ));

    // First direction to finish ends the session
    if let Some(Ok(finished)) = directions.join_next().await {
        debug!("{finished} finished, stopping the other direction");
    }

    // Abort the sibling and wait so its halves are dropped before returning
    directions.shutdown().await;

    RelayStats {
        client_to_upstream: to_upstream.load(Ordering::Relaxed),
        upstream_to_client: to_client.load(Ordering::Relaxed),
    }
}

/// pump copies `reader` into `writer` until EOF or an error on either side,
/// then shuts down `writer` to pass the close along. Errors end the
/// direction quietly; they are only logged.
pub async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    direction: Direction,
    counter: Arc<AtomicU64>,
) -> Direction
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; RELAY_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("{direction}: EOF");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                log_relay_error(direction, "read", &e);
                break;
            }
        };

        if let Err(e) = writer.write_all(&buf[..n]).await {
            log_relay_error(direction, "write", &e);
            break;
        }

        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    let _ = writer.shutdown().await;
    direction
}

/// Resets and broken pipes are how peers normally hang up
fn log_relay_error(direction: Direction, op: &str, e: &io::Error) {
    match e.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => debug!("{direction}: {op} ended: {e}"),
        _ => warn!("{direction}: {op} error: {e}"),
    }
}
