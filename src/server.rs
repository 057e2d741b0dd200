use crate::{
    config::{ProxyConfig, UpstreamCredentials},
    error::ListenError,
    session::{self, Session},
};
use anyhow::{Result, bail};
use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::net::TcpListener;
use tracing::{Instrument, debug, error, info, info_span};

/// Pause after a failed accept so a persistent error does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// ProxyServer represents the listening side of the proxy and houses the
/// configuration shared by every session
pub struct ProxyServer {
    pub listen_addr: String,
    upstream: Arc<UpstreamCredentials>,
    connect_timeout: Duration,
    listener: Option<TcpListener>,
    next_session_id: AtomicU64,
}

/// ProxyServer implementation block
impl ProxyServer {
    /// new is a constructor for the ProxyServer type
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            listen_addr: config.listen_addr,
            // Arc allows every session to share the credentials read-only
            upstream: Arc::new(config.upstream),
            connect_timeout: config.connect_timeout,
            listener: None,
            next_session_id: AtomicU64::new(1),
        }
    }

    /// bind to the listen address and return the bound address
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        if self.listener.is_some() {
            bail!("listener already bound on {}", self.listen_addr);
        }

        let listener = TcpListener::bind(&self.listen_addr)
            .await
            .map_err(|source| ListenError {
                addr: self.listen_addr.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;

        info!("proxy listening on {} -> {}", addr, self.upstream.addr());

        self.listener = Some(listener);
        Ok(addr)
    }

    /// run binds if needed, then accepts connections until the process ends
    pub async fn run(mut self) -> Result<()> {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => {
                self.bind().await?;
                match self.listener.take() {
                    Some(listener) => listener,
                    None => bail!("listener missing after bind"),
                }
            }
        };

        // Listen for connections to proxy
        loop {
            let (inbound, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    // One failed accept does not stop the listener
                    error!("accept error: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            session::set_nodelay(&inbound);

            let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
            let session = Session::new(
                inbound,
                peer_addr,
                Arc::clone(&self.upstream),
                self.connect_timeout,
            );

            // Spawn async task
            tokio::spawn(
                async move {
                    info!("new client: {}", peer_addr);

                    if let Err(e) = session.run().await {
                        error!("session error: {}", e);
                    }
                    debug!("session finished");
                }
                .instrument(info_span!("session", id, peer = %peer_addr)),
            );
        }
    }
}
