use crate::{
    Result,
    constants::{MAX_ID_LENGTH, MIN_ID_LENGTH},
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validate and normalize an identifier string shared by all id newtypes.
///
/// Identifiers are trimmed, must be non-empty after trimming, ASCII only,
/// and bounded in length. The broker treats them as opaque tokens; this
/// validation exists to reject obviously broken feed payloads early, not to
/// interpret the id.
fn validate_id(raw: &str, kind: &str) -> std::result::Result<String, String> {
    let value = raw.trim().to_string();

    let len = value.len();
    if !(MIN_ID_LENGTH..=MAX_ID_LENGTH).contains(&len) {
        return Err(format!(
            "{kind} must be {MIN_ID_LENGTH}-{MAX_ID_LENGTH} chars, got {len}"
        ));
    }

    if !value.is_ascii() {
        return Err(format!("{kind} must be ASCII"));
    }

    Ok(value)
}

/// Opaque card identifier emitted by a badge reader.
///
/// The broker transports card ids without interpreting them; mapping an id
/// to a user record is an external concern. Ids are normalized (trimmed)
/// and validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardId(String);

impl CardId {
    /// Create a new card id with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardId` if the id is empty after trimming,
    /// longer than 64 characters, or contains non-ASCII characters.
    pub fn new(id: &str) -> Result<Self> {
        validate_id(id, "Card id")
            .map(CardId)
            .map_err(Error::InvalidCardId)
    }

    /// Get the card id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CardId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CardId::new(s)
    }
}

/// Identifier of the totem (physical reader kiosk) a card was tapped at.
///
/// Optional throughout the broker: a feed payload that omits it produces a
/// read with unknown origin, which is still claimable by any waiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TotemId(String);

impl TotemId {
    /// Create a new totem id with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidTotemId` if the id is empty after trimming,
    /// longer than 64 characters, or contains non-ASCII characters.
    pub fn new(id: &str) -> Result<Self> {
        validate_id(id, "Totem id")
            .map(TotemId)
            .map_err(Error::InvalidTotemId)
    }

    /// Get the totem id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TotemId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TotemId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TotemId::new(s)
    }
}

/// Correlation key for one logical client session.
///
/// Supplied by the caller (one per kiosk registration flow, not per card
/// event) or generated server-side when the client has none. At most one
/// live wait exists per session id at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new session id with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidSessionId` if the id is empty after trimming,
    /// longer than 64 characters, or contains non-ASCII characters.
    pub fn new(id: &str) -> Result<Self> {
        validate_id(id, "Session id")
            .map(SessionId)
            .map_err(Error::InvalidSessionId)
    }

    /// Generate a fresh random session id (UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }

    /// Get the session id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SessionId::new(s)
    }
}

/// A normalized card-tap event.
///
/// Produced by the ingress layer from a raw feed payload and handed to the
/// broker; also what a resolved waiter receives back on a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRead {
    /// The tapped card.
    pub card_id: CardId,

    /// Origin reader, when the feed reported one.
    pub totem_id: Option<TotemId>,

    /// When the ingress layer observed the tap.
    pub observed_at: DateTime<Utc>,
}

impl CardRead {
    /// Create a read observed now.
    #[must_use]
    pub fn new(card_id: CardId, totem_id: Option<TotemId>) -> Self {
        Self {
            card_id,
            totem_id,
            observed_at: Utc::now(),
        }
    }

    /// Age of this read relative to `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.observed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("AB12", "AB12")]
    #[case("  AB12  ", "AB12")] // trimmed
    #[case("04ab-cd-ef", "04ab-cd-ef")] // case preserved, ids are opaque
    fn test_card_id_valid(#[case] input: &str, #[case] expected: &str) {
        let card = CardId::new(input).unwrap();
        assert_eq!(card.as_str(), expected);
    }

    #[rstest]
    #[case("")] // empty
    #[case("   ")] // whitespace only
    #[case("cartão")] // non-ASCII
    fn test_card_id_invalid(#[case] input: &str) {
        assert!(CardId::new(input).is_err());
    }

    #[test]
    fn test_card_id_too_long() {
        let long = "x".repeat(65);
        assert!(CardId::new(&long).is_err());
        let max = "x".repeat(64);
        assert!(CardId::new(&max).is_ok());
    }

    #[rstest]
    #[case("T1")]
    #[case("totem-07")]
    fn test_totem_id_valid(#[case] input: &str) {
        let totem: TotemId = input.parse().unwrap();
        assert_eq!(totem.as_str(), input);
    }

    #[test]
    fn test_session_id_generate_is_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        // Generated ids must pass their own validation
        assert!(SessionId::new(a.as_str()).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("\t\n")]
    fn test_session_id_invalid(#[case] input: &str) {
        assert!(SessionId::new(input).is_err());
    }

    #[test]
    fn test_card_read_age() {
        let read = CardRead::new(CardId::new("AB12").unwrap(), None);
        let later = read.observed_at + chrono::Duration::seconds(5);
        assert_eq!(read.age(later), chrono::Duration::seconds(5));
    }

    #[test]
    fn test_card_read_serde_roundtrip() {
        let read = CardRead::new(
            CardId::new("AB12").unwrap(),
            Some(TotemId::new("T1").unwrap()),
        );
        let json = serde_json::to_string(&read).unwrap();
        let back: CardRead = serde_json::from_str(&json).unwrap();
        assert_eq!(back, read);
    }
}
