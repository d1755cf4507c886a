use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Identifier validation
    #[error("Invalid card id: {0}")]
    InvalidCardId(String),

    #[error("Invalid totem id: {0}")]
    InvalidTotemId(String),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    // Broker argument errors
    #[error("Wait timeout must be positive, got {timeout_ms}ms")]
    InvalidTimeout { timeout_ms: u64 },

    // Ingress feed errors
    #[error("Malformed feed payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("Feed disconnected: {reason}")]
    FeedDisconnected { reason: String },

    #[error("Not connected to feed")]
    NotConnected,

    #[error("Connect timeout after {duration_ms}ms")]
    ConnectTimeout { duration_ms: u64 },

    #[error("Feed frame exceeds {max_bytes} bytes")]
    FrameTooLarge { max_bytes: usize },

    // Stream errors
    #[error("Invalid session state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
