//! A transparent TCP relay for Redis clients
//!
//! Local clients connect without credentials; for every client the proxy
//! opens a connection to a credentialed upstream server, sends `AUTH` with
//! the configured username and password, swallows the reply, and then
//! relays raw bytes both ways until either side hangs up.
//!
//! - Features:
//!     - One task per client connection, two relay tasks per session
//!     - AUTH injected with exact RESP byte-length prefixes
//!     - AUTH reply never reaches the client
//!     - Time-bounded upstream connect, no idle timeout while relaying
//!     - When one relay direction ends the other is stopped and both sockets close
//!
//! # Example
//! ```no_run
//! use redis_auth_proxy::{ProxyConfig, ProxyServer, UpstreamCredentials};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let upstream = UpstreamCredentials {
//!         host: "redis.example.com".into(),
//!         port: 16379,
//!         username: "default".into(),
//!         password: "<pass>".into(),
//!     };
//!     let server = ProxyServer::new(ProxyConfig::new("0.0.0.0:6379", upstream));
//!     server.run().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod relay;
pub mod resp;
pub mod server;
pub mod session;

// Re-export main types at crate root for convenience
pub use config::{ProxyConfig, UpstreamCredentials, UpstreamSettings};
pub use error::{ConfigError, HandshakeStage, ListenError, SessionError};
pub use relay::RelayStats;
pub use server::ProxyServer;
pub use session::{Session, SessionState};
