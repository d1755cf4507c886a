//! Typed events pushed to a session client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tapgate_core::{CardId, CardRead, SessionId};

/// One event on the client push stream.
///
/// Serialized with a `type` tag so transports that speak JSON (server-sent
/// events, websockets) get self-describing payloads:
///
/// ```json
/// {"type":"card_read","card_id":"AB12","timestamp":"2026-08-29T12:00:00Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Stream established; echoes the session correlation key.
    Connected { session_id: SessionId },

    /// Keep-alive marker so intermediary proxies do not drop the idle
    /// connection. Carries no payload beyond its timestamp.
    Heartbeat { timestamp: DateTime<Utc> },

    /// The one card match for this connection.
    CardRead {
        card_id: CardId,
        timestamp: DateTime<Utc>,
    },

    /// Fatal stream error surfaced to the client.
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// End of stream.
    Close,
}

impl StreamEvent {
    /// Heartbeat stamped now.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::Heartbeat {
            timestamp: Utc::now(),
        }
    }

    /// Card-read event for a claimed read, stamped with the read's own
    /// observation time rather than the delivery time.
    #[must_use]
    pub fn card_read(read: &CardRead) -> Self {
        Self::CardRead {
            card_id: read.card_id.clone(),
            timestamp: read.observed_at,
        }
    }

    /// Error event stamped now.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
