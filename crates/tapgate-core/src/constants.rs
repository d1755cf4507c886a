//! Core constants for the card-read broker.
//!
//! This module centralizes the timing and sizing parameters shared across
//! the broker, ingress, and stream crates. Values are expressed in
//! milliseconds (or bytes) so they can be plugged directly into config
//! structs and `Duration::from_millis`.
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use tapgate_core::constants::DEFAULT_WAIT_TIMEOUT_MS;
//!
//! let timeout = Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS);
//! assert_eq!(timeout.as_secs(), 30);
//! ```

/// How long an unclaimed pending read stays in the broker pool (ms).
///
/// Reads older than this are dropped during pool maintenance. The window
/// only needs to cover the gap between a physical tap and the next session
/// wait attempt; it is a bounded recent-history window, not a log.
pub const PENDING_READ_RETENTION_MS: u64 = 30_000;

/// Default timeout for a single `wait_for_card` attempt (ms).
///
/// Session adapters re-arm the wait after each timeout, so this bounds how
/// long an abandoned waiter can linger, not how long a client may wait.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Interval between keep-alive events on a session push stream (ms).
///
/// Deliberately shorter than typical intermediary proxy idle timeouts
/// (usually 30-60 s) and independent of the wait-loop timeout.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;

/// Initial delay before the first feed reconnection attempt (ms).
pub const INITIAL_BACKOFF_MS: u64 = 500;

/// Ceiling for the exponential reconnection backoff (ms).
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Default timeout for feed connect/read operations (ms).
pub const DEFAULT_FEED_TIMEOUT_MS: u64 = 3_000;

/// Maximum size of a single feed frame in bytes (64 KB).
///
/// Frames beyond this are rejected to keep a misbehaving publisher from
/// growing the decode buffer without bound.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Minimum length of a card/totem/session identifier.
pub const MIN_ID_LENGTH: usize = 1;

/// Maximum length of a card/totem/session identifier.
pub const MAX_ID_LENGTH: usize = 64;
