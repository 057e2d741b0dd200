use crate::{
    config::UpstreamCredentials,
    error::{HandshakeStage, SessionError},
    relay::{self, RelayStats},
    resp,
};
use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::timeout,
};
use tracing::{debug, info, warn};

/// SessionState tracks where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Relaying,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Relaying => "relaying",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Session owns one client connection and its companion upstream
/// connection for as long as both are alive
pub struct Session {
    client: TcpStream,
    peer_addr: SocketAddr,
    upstream: Arc<UpstreamCredentials>,
    connect_timeout: Duration,
}

/// Upstream connection after a completed AUTH exchange. The reader keeps any
/// bytes that arrived behind the AUTH reply.
pub struct AuthenticatedUpstream {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Session {
    /// new is a constructor for the Session type
    pub fn new(
        client: TcpStream,
        peer_addr: SocketAddr,
        upstream: Arc<UpstreamCredentials>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            client,
            peer_addr,
            upstream,
            connect_timeout,
        }
    }

    /// run drives the session to completion: connect upstream, inject AUTH,
    /// relay until either side closes. Both connections are closed on every
    /// path out of this function.
    pub async fn run(self) -> Result<RelayStats, SessionError> {
        let Session {
            client,
            peer_addr,
            upstream: creds,
            connect_timeout,
        } = self;
        let mut state = SessionState::Connecting;

        let upstream = match connect_upstream(&creds, connect_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                transition(&mut state, SessionState::Closed);
                return Err(e);
            }
        };

        transition(&mut state, SessionState::Authenticating);
        let upstream = match authenticate(&creds, &client, upstream).await {
            Ok(upstream) => upstream,
            Err(e) => {
                transition(&mut state, SessionState::Closed);
                return Err(e);
            }
        };

        transition(&mut state, SessionState::Relaying);
        let (client_read, client_write) = client.into_split();
        let stats = relay::relay(client_read, client_write, upstream.reader, upstream.writer).await;
        transition(&mut state, SessionState::Closed);

        info!(
            "connection closed for {}. Sent: {}, Received: {}",
            peer_addr, stats.client_to_upstream, stats.upstream_to_client
        );

        Ok(stats)
    }
}

fn transition(state: &mut SessionState, next: SessionState) {
    debug!("session {} -> {}", state, next);
    *state = next;
}

/// connect_upstream makes a single, time-bounded connection attempt
pub async fn connect_upstream(
    creds: &UpstreamCredentials,
    connect_timeout: Duration,
) -> Result<TcpStream, SessionError> {
    let addr = creds.addr();

    let stream = match timeout(connect_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(SessionError::UpstreamConnect { addr, source }),
        Err(_) => {
            return Err(SessionError::UpstreamConnectTimeout {
                addr,
                timeout: connect_timeout,
            });
        }
    };

    set_nodelay(&stream);
    debug!("connected to upstream {}", addr);
    Ok(stream)
}

/// authenticate writes AUTH upstream, then reads and discards one reply
/// line. The reply never reaches the client, success or not. If the client
/// hangs up while the reply is outstanding, the upstream is released at once.
pub async fn authenticate(
    creds: &UpstreamCredentials,
    client: &TcpStream,
    upstream: TcpStream,
) -> Result<AuthenticatedUpstream, SessionError> {
    let (read_half, mut writer) = upstream.into_split();

    let auth = resp::auth_command(creds);
    let written = async {
        writer.write_all(&auth).await?;
        writer.flush().await
    };
    if let Err(source) = written.await {
        return Err(SessionError::Handshake {
            stage: HandshakeStage::WriteAuth,
            source,
        });
    }

    let mut reader = BufReader::new(read_half);
    let reply = tokio::select! {
        reply = resp::read_reply_line(&mut reader) => match reply {
            Ok(reply) => reply,
            Err(source) => {
                return Err(SessionError::Handshake {
                    stage: HandshakeStage::ReadReply,
                    source,
                });
            }
        },
        () = client_hung_up(client) => return Err(SessionError::ClientClosed),
    };

    // Discarded either way; the client finds out on its first command
    if resp::is_error_reply(&reply) {
        warn!(
            "upstream rejected AUTH for user {:?}; continuing, client commands will fail",
            creds.username
        );
    } else {
        debug!("discarded {} byte AUTH reply", reply.len());
    }

    Ok(AuthenticatedUpstream { reader, writer })
}

/// client_hung_up resolves once the client has closed or reset its side.
/// Pending client data is left unread for the relay and never resolves this.
async fn client_hung_up(client: &TcpStream) {
    let mut byte = [0u8; 1];
    match client.peek(&mut byte).await {
        Ok(0) | Err(_) => {}
        Ok(_) => std::future::pending().await,
    }
}

/// set_nodelay disables Nagle on a relay socket, best effort
pub(crate) fn set_nodelay(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("failed to set TCP_NODELAY: {}", e);
    }
}
