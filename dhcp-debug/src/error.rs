//! Error types for dhcp-debug.

use crate::session::Phase;
use std::io;
use thiserror::Error;

/// Errors raised while building a session, before any packet is sent.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("Interface name is required")]
    EmptyInterface,

    #[error("Unknown interface '{name}': {source}")]
    UnknownInterface { name: String, source: io::Error },

    #[error("Invalid address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("Timeout must be greater than zero")]
    InvalidTimeout,

    #[error("Failed to bind endpoint: {0}")]
    Bind(#[source] NetworkError),
}

/// Errors reported by a protocol engine for a single request/response round trip.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Operation timed out")]
    Timeout,

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("Socket error: {0}")]
    Socket(#[from] io::Error),

    #[error("DHCP NAK received")]
    DhcpNak,

    #[error("Response is missing the {0} option")]
    MissingOption(&'static str),

    #[error("Endpoint is closed")]
    Closed,

    #[error("Failed to close endpoint: {0}")]
    Close(#[from] nix::errno::Errno),
}

/// Errors that end (or shadow) a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{phase} timed out")]
    PhaseTimeout { phase: Phase },

    #[error("{phase} failed: {source}")]
    Protocol {
        phase: Phase,
        #[source]
        source: NetworkError,
    },

    #[error("{phase} cancelled")]
    Cancelled { phase: Phase },

    #[error("Cleanup failed: {0}")]
    Cleanup(#[source] NetworkError),

    #[error("Lease release failed: {0}")]
    Release(#[source] NetworkError),

    #[error("Session ended without publishing an outcome")]
    Abandoned,
}

impl SessionError {
    /// Phase this error was raised in, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            SessionError::PhaseTimeout { phase }
            | SessionError::Protocol { phase, .. }
            | SessionError::Cancelled { phase } => Some(*phase),
            SessionError::Release(_) => Some(Phase::Release),
            SessionError::Cleanup(_) | SessionError::Abandoned => None,
        }
    }
}
