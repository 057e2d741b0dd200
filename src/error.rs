use std::{fmt, io, time::Duration};
use thiserror::Error;

/// InvalidField describes a setting that was present but unusable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidField {
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for InvalidField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.field, self.reason)
    }
}

/// ConfigError collects every missing and invalid setting found while
/// resolving the upstream configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ConfigError {
    pub missing: Vec<&'static str>,
    pub invalid: Vec<InvalidField>,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if !self.missing.is_empty() {
            parts.push(format!(
                "required settings not set: {}",
                self.missing.join(", ")
            ));
        }

        if !self.invalid.is_empty() {
            let invalid: Vec<String> = self.invalid.iter().map(ToString::to_string).collect();
            parts.push(format!("invalid settings: {}", invalid.join(", ")));
        }

        write!(f, "{}", parts.join("; "))
    }
}

/// ListenError is returned when the local listen address cannot be bound
#[derive(Debug, Error)]
#[error("failed to bind listener on {addr}: {source}")]
pub struct ListenError {
    pub addr: String,
    #[source]
    pub source: io::Error,
}

/// HandshakeStage names the step of the upstream AUTH exchange that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    WriteAuth,
    ReadReply,
}

impl fmt::Display for HandshakeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeStage::WriteAuth => f.write_str("writing AUTH command"),
            HandshakeStage::ReadReply => f.write_str("reading AUTH reply"),
        }
    }
}

/// SessionError covers the failures that end a single client session before
/// relaying starts. Relay I/O errors are logged, never returned.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("upstream connection to {addr} failed: {source}")]
    UpstreamConnect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("upstream connection to {addr} timed out after {timeout:?}")]
    UpstreamConnectTimeout { addr: String, timeout: Duration },

    #[error("client disconnected during upstream handshake")]
    ClientClosed,

    #[error("upstream handshake failed while {stage}: {source}")]
    Handshake {
        stage: HandshakeStage,
        #[source]
        source: io::Error,
    },
}
