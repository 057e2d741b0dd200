use crate::error::{ConfigError, InvalidField};
use std::{fmt, time::Duration};

/// Default local listen address, the standard Redis port on all interfaces
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:6379";

/// Default bound on how long a client waits for the upstream connect
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const HOST_VAR: &str = "REDIS_HOST";
pub const PORT_VAR: &str = "REDIS_PORT";
pub const USER_VAR: &str = "REDIS_USER";
pub const PASS_VAR: &str = "REDIS_PASS";

/// UpstreamCredentials holds the address and credentials of the upstream
/// Redis server. Loaded once at startup and shared read-only by every session.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl UpstreamCredentials {
    /// addr returns the upstream address as `host:port`
    pub fn addr(&self) -> String {
        // IPv6 literals need brackets to stay parseable
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

// Keep the password out of logs
impl fmt::Debug for UpstreamCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// UpstreamSettings holds the raw, unvalidated upstream settings as they
/// arrive from the command line or environment
#[derive(Debug, Default, Clone)]
pub struct UpstreamSettings {
    pub host: Option<String>,
    pub port: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl UpstreamSettings {
    /// resolve validates every field and returns the credentials, or a single
    /// error naming all missing and invalid fields
    pub fn resolve(self) -> Result<UpstreamCredentials, ConfigError> {
        let mut missing = Vec::new();
        let mut invalid = Vec::new();

        let host = required(self.host, HOST_VAR, &mut missing);
        let port = required(self.port, PORT_VAR, &mut missing);
        let username = required(self.username, USER_VAR, &mut missing);
        let password = required(self.password, PASS_VAR, &mut missing);

        let port = port.and_then(|raw| match parse_port(&raw) {
            Ok(port) => Some(port),
            Err(reason) => {
                invalid.push(InvalidField {
                    field: PORT_VAR,
                    reason,
                });
                None
            }
        });

        match (host, port, username, password) {
            (Some(host), Some(port), Some(username), Some(password))
                if missing.is_empty() && invalid.is_empty() =>
            {
                Ok(UpstreamCredentials {
                    host,
                    port,
                    username,
                    password,
                })
            }
            _ => Err(ConfigError { missing, invalid }),
        }
    }
}

/// ProxyConfig is everything the listener and its sessions need
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_addr: String,
    pub upstream: UpstreamCredentials,
    pub connect_timeout: Duration,
}

impl ProxyConfig {
    /// new builds a config with the default connect timeout
    pub fn new(listen_addr: impl Into<String>, upstream: UpstreamCredentials) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            upstream,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// with_connect_timeout overrides the upstream connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// required treats unset and empty values alike
fn required(
    value: Option<String>,
    field: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<String> {
    match value {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            missing.push(field);
            None
        }
    }
}

fn parse_port(raw: &str) -> Result<u16, String> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("expected an integer in 1-65535, got {raw:?}")),
        Ok(port) => Ok(port),
    }
}
