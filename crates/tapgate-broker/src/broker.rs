//! Broker state and wait/claim coordination.
//!
//! # Concurrency discipline
//!
//! All pool and registry mutations (`submit_read`, the claim step inside
//! `wait_for_card`, `consume_card`, `cancel_wait`) go through one async
//! mutex, and no I/O or awaiting happens while it is held. The only
//! suspension point is the per-waiter oneshot channel, awaited *after* the
//! lock is released, so a suspended waiter never blocks ingress or other
//! sessions.
//!
//! # Fairness
//!
//! Waiters resolve in registration order: when a read arrives while several
//! waiters are suspended, the oldest registration wins. This is a contract,
//! not an accident — without it a busy kiosk could starve an older session
//! indefinitely.
//!
//! # Read scoping
//!
//! A pending read is not scoped to a session or totem: any live waiter may
//! claim any read from any reader. The deployment assumption is a single
//! physical reader per active wait; with several independent kiosks waiting
//! concurrently, a tap at one kiosk can resolve a wait at another.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tokio::time::Instant;
use tracing::{debug, trace};

use tapgate_core::{CardId, CardRead, Error, Result, SessionId, TotemId, constants};

/// Configuration for a [`ReadBroker`].
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// How long an unclaimed read stays in the pool before passive expiry.
    pub retention: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_millis(constants::PENDING_READ_RETENTION_MS),
        }
    }
}

/// Terminal outcome of a [`ReadBroker::wait_for_card`] call.
///
/// Timeouts and cancellations are ordinary control-flow outcomes the caller
/// branches on, not errors: a session adapter re-arms on `TimedOut` and
/// stops on `Cancelled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A pending read was atomically assigned to this waiter.
    Match(CardRead),

    /// The timeout elapsed with no read available.
    TimedOut,

    /// The wait was cancelled via [`ReadBroker::cancel_wait`] or superseded
    /// by a newer wait for the same session.
    Cancelled,
}

/// Read-only snapshot of broker occupancy.
#[derive(Debug, Clone)]
pub struct BrokerStats {
    /// Number of reads currently in the pool.
    pub pending_count: usize,

    /// Number of sessions with a suspended wait.
    pub active_waiter_count: usize,

    /// Most recently submitted read, if any. Survives consumption; this is
    /// reporting state, not pool state.
    pub last_read: Option<CardRead>,
}

/// Resolution delivered to a suspended waiter over its oneshot channel.
#[derive(Debug)]
enum Resolution {
    Match(CardRead),
    Cancelled,
}

/// A session's outstanding request for the next read.
#[derive(Debug)]
struct Waiter {
    /// Unique per registration, so a timed-out call deregisters exactly its
    /// own entry and never a successor for the same session.
    waiter_id: u64,
    session_id: SessionId,
    tx: oneshot::Sender<Resolution>,
}

/// A card event not yet claimed.
#[derive(Debug)]
struct PendingEntry {
    read: CardRead,
    /// Monotonic insertion time, used for expiry and earliest-first claim
    /// order. Kept separate from `CardRead::observed_at` so ageing follows
    /// the tokio clock (and is testable under a paused clock).
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct BrokerInner {
    /// Pool of unclaimed reads, keyed by card id. Resubmitting a card id
    /// overwrites the entry and refreshes its timestamp.
    pool: HashMap<CardId, PendingEntry>,

    /// Suspended waiters in registration order (front is oldest).
    waiters: VecDeque<Waiter>,

    /// Most recent submission, for status reporting.
    last_read: Option<CardRead>,

    next_waiter_id: u64,
}

impl BrokerInner {
    /// Drop reads older than the retention ceiling.
    ///
    /// Passive cleanup run at the start of every mutation pass; there is no
    /// background sweeper task, so the broker has exactly one mutator model.
    fn prune_expired(&mut self, retention: Duration) {
        let before = self.pool.len();
        self.pool.retain(|_, entry| entry.inserted_at.elapsed() <= retention);
        let dropped = before - self.pool.len();
        if dropped > 0 {
            trace!(dropped, "expired pending reads pruned");
        }
    }

    /// Key of the earliest still-unconsumed pending read, if any.
    fn earliest_pending_key(&self) -> Option<CardId> {
        self.pool
            .values()
            .min_by_key(|entry| entry.inserted_at)
            .map(|entry| entry.read.card_id.clone())
    }

    /// Hand pending reads to suspended waiters, oldest waiter first, each
    /// receiving the earliest available read.
    ///
    /// A waiter whose receiver is gone (its wait future was dropped without
    /// a cancel) is discarded and the read goes back into the pool for the
    /// next waiter, so no read is lost to a dead registration.
    fn satisfy_waiters(&mut self) {
        while !self.waiters.is_empty() {
            let Some(key) = self.earliest_pending_key() else {
                break;
            };
            let Some(entry) = self.pool.remove(&key) else {
                break;
            };
            let Some(waiter) = self.waiters.pop_front() else {
                // No waiter after all; put the read back.
                self.pool.insert(key, entry);
                break;
            };

            trace!(
                session_id = %waiter.session_id,
                card_id = %entry.read.card_id,
                "assigning pending read to waiter"
            );
            if let Err(Resolution::Match(read)) = waiter.tx.send(Resolution::Match(entry.read)) {
                debug!(
                    session_id = %waiter.session_id,
                    "waiter receiver gone, returning read to pool"
                );
                self.pool.insert(
                    read.card_id.clone(),
                    PendingEntry {
                        read,
                        inserted_at: entry.inserted_at,
                    },
                );
            }
        }
    }

    /// Remove and cancel the live waiter for a session, if any.
    ///
    /// Returns `true` when a waiter was resolved as cancelled.
    fn cancel_session_waiter(&mut self, session_id: &SessionId) -> bool {
        let Some(pos) = self
            .waiters
            .iter()
            .position(|w| &w.session_id == session_id)
        else {
            return false;
        };
        if let Some(waiter) = self.waiters.remove(pos) {
            let _ = waiter.tx.send(Resolution::Cancelled);
            return true;
        }
        false
    }

    /// Remove a registration by waiter id. Returns `true` if it was still
    /// present (i.e. nothing resolved it first).
    fn remove_waiter(&mut self, waiter_id: u64) -> bool {
        let Some(pos) = self.waiters.iter().position(|w| w.waiter_id == waiter_id) else {
            return false;
        };
        self.waiters.remove(pos);
        true
    }
}

/// The card-read broker.
///
/// One instance is constructed at process start and shared (via `Arc`) with
/// the event ingress and every session adapter; there is no ambient global.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tapgate_broker::{BrokerConfig, ReadBroker, WaitOutcome};
/// use tapgate_core::{CardId, SessionId};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> tapgate_core::Result<()> {
/// let broker = Arc::new(ReadBroker::new(BrokerConfig::default()));
///
/// broker.submit_read(CardId::new("AB12")?, None).await;
///
/// let session = SessionId::new("kiosk-1")?;
/// match broker.wait_for_card(&session, Duration::from_secs(30)).await? {
///     WaitOutcome::Match(read) => println!("claimed {}", read.card_id),
///     WaitOutcome::TimedOut => println!("no tap"),
///     WaitOutcome::Cancelled => println!("cancelled"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ReadBroker {
    inner: Mutex<BrokerInner>,
    retention: Duration,
}

impl ReadBroker {
    /// Create a broker with the given configuration.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            inner: Mutex::new(BrokerInner::default()),
            retention: config.retention,
        }
    }

    /// Insert a pending read and attempt to satisfy suspended waiters.
    ///
    /// Resubmitting an already-pending card id overwrites the entry and
    /// refreshes its timestamp. At most one waiter resolves per available
    /// read: the read is removed from the pool in the same locked step that
    /// assigns it, preserving at-most-once delivery across sessions.
    pub async fn submit_read(&self, card_id: CardId, totem_id: Option<TotemId>) {
        let read = CardRead::new(card_id, totem_id);
        let mut inner = self.inner.lock().await;
        inner.prune_expired(self.retention);

        debug!(
            card_id = %read.card_id,
            totem_id = read.totem_id.as_ref().map(|t| t.as_str()),
            "card read submitted"
        );
        inner.last_read = Some(read.clone());
        inner.pool.insert(
            read.card_id.clone(),
            PendingEntry {
                read,
                inserted_at: Instant::now(),
            },
        );
        inner.satisfy_waiters();
    }

    /// Suspend until the next pending read is assigned to this session, the
    /// timeout elapses, or the wait is cancelled.
    ///
    /// Registering a wait for a session that already has one supersedes the
    /// prior wait: it resolves as [`WaitOutcome::Cancelled`] and only the new
    /// registration remains live. If a read is already pending on entry, it
    /// is claimed immediately without suspending.
    ///
    /// The registry entry is removed as part of every resolution path; a
    /// timed-out or cancelled wait leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTimeout`] for a zero timeout. Timeouts and
    /// cancellations are *not* errors — they are [`WaitOutcome`] variants.
    pub async fn wait_for_card(
        &self,
        session_id: &SessionId,
        timeout: Duration,
    ) -> Result<WaitOutcome> {
        if timeout.is_zero() {
            return Err(Error::InvalidTimeout { timeout_ms: 0 });
        }

        let (waiter_id, mut rx) = {
            let mut inner = self.inner.lock().await;
            inner.prune_expired(self.retention);

            if inner.cancel_session_waiter(session_id) {
                debug!(session_id = %session_id, "prior wait superseded");
            }

            // Immediate claim: check-and-remove under the same lock that
            // registration would take, so two sessions cannot claim one read.
            if let Some(key) = inner.earliest_pending_key()
                && let Some(entry) = inner.pool.remove(&key)
            {
                debug!(
                    session_id = %session_id,
                    card_id = %entry.read.card_id,
                    "immediate claim"
                );
                return Ok(WaitOutcome::Match(entry.read));
            }

            let waiter_id = inner.next_waiter_id;
            inner.next_waiter_id += 1;
            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(Waiter {
                waiter_id,
                session_id: session_id.clone(),
                tx,
            });
            trace!(session_id = %session_id, waiter_id, "waiter registered");
            (waiter_id, rx)
        };

        // Suspension happens outside the critical section; ingress and other
        // sessions stay serviceable while this task sleeps.
        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(Resolution::Match(read))) => Ok(WaitOutcome::Match(read)),
            Ok(Ok(Resolution::Cancelled)) => Ok(WaitOutcome::Cancelled),
            // Sender dropped without resolving; only possible if the broker
            // itself is being torn down. Treat as cancellation.
            Ok(Err(_)) => Ok(WaitOutcome::Cancelled),
            Err(_elapsed) => {
                let raced = {
                    let mut inner = self.inner.lock().await;
                    !inner.remove_waiter(waiter_id)
                };
                if raced {
                    // A resolution won the race against the timer: the send
                    // happened under the lock before our entry disappeared,
                    // so the value is already in the channel. Surfacing a
                    // timeout here would silently drop a claimed read.
                    match rx.try_recv() {
                        Ok(Resolution::Match(read)) => Ok(WaitOutcome::Match(read)),
                        Ok(Resolution::Cancelled) => Ok(WaitOutcome::Cancelled),
                        Err(_) => Ok(WaitOutcome::TimedOut),
                    }
                } else {
                    trace!(session_id = %session_id, waiter_id, "wait timed out");
                    Ok(WaitOutcome::TimedOut)
                }
            }
        }
    }

    /// Remove a pending read if still present.
    ///
    /// Idempotent: returns `false` when the read was already claimed,
    /// consumed, or expired. Used by callers that obtained a card id through
    /// a side channel to retire it before another waiter claims it.
    pub async fn consume_card(&self, card_id: &CardId) -> bool {
        let mut inner = self.inner.lock().await;
        inner.prune_expired(self.retention);
        let removed = inner.pool.remove(card_id).is_some();
        if removed {
            debug!(card_id = %card_id, "pending read consumed");
        }
        removed
    }

    /// Cancel the live wait for a session, resolving it immediately as
    /// [`WaitOutcome::Cancelled`]. No-op if the session has no live wait.
    pub async fn cancel_wait(&self, session_id: &SessionId) {
        let mut inner = self.inner.lock().await;
        inner.prune_expired(self.retention);
        if inner.cancel_session_waiter(session_id) {
            debug!(session_id = %session_id, "wait cancelled");
        }
    }

    /// Consistent snapshot of broker occupancy. Never mutates.
    pub async fn stats(&self) -> BrokerStats {
        let inner = self.inner.lock().await;
        BrokerStats {
            pending_count: inner.pool.len(),
            active_waiter_count: inner.waiters.len(),
            last_read: inner.last_read.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn card(id: &str) -> CardId {
        CardId::new(id).unwrap()
    }

    fn session(id: &str) -> SessionId {
        SessionId::new(id).unwrap()
    }

    fn broker() -> Arc<ReadBroker> {
        Arc::new(ReadBroker::new(BrokerConfig::default()))
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected() {
        let broker = broker();
        let result = broker
            .wait_for_card(&session("s1"), Duration::ZERO)
            .await;
        assert!(matches!(result, Err(Error::InvalidTimeout { .. })));
        // The failed call must not leave a registration behind
        assert_eq!(broker.stats().await.active_waiter_count, 0);
    }

    #[tokio::test]
    async fn test_immediate_claim_when_read_pending() {
        let broker = broker();
        broker.submit_read(card("AB12"), None).await;

        let outcome = broker
            .wait_for_card(&session("s1"), Duration::from_secs(30))
            .await
            .unwrap();
        match outcome {
            WaitOutcome::Match(read) => assert_eq!(read.card_id, card("AB12")),
            other => panic!("expected match, got {other:?}"),
        }

        let stats = broker.stats().await;
        assert_eq!(stats.pending_count, 0);
        assert!(stats.last_read.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_at_deadline() {
        let broker = broker();
        let start = Instant::now();
        let outcome = broker
            .wait_for_card(&session("s1"), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        assert_eq!(broker.stats().await.active_waiter_count, 0);
    }

    #[tokio::test]
    async fn test_cancel_resolves_outstanding_wait() {
        let broker = broker();
        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .wait_for_card(&session("s1"), Duration::from_secs(60))
                    .await
                    .unwrap()
            })
        };

        // Let the waiter register before cancelling
        while broker.stats().await.active_waiter_count == 0 {
            tokio::task::yield_now().await;
        }
        broker.cancel_wait(&session("s1")).await;

        assert_eq!(waiter.await.unwrap(), WaitOutcome::Cancelled);
        assert_eq!(broker.stats().await.active_waiter_count, 0);
    }

    #[tokio::test]
    async fn test_cancel_without_wait_is_noop() {
        let broker = broker();
        broker.cancel_wait(&session("ghost")).await;
        assert_eq!(broker.stats().await.active_waiter_count, 0);
    }

    #[tokio::test]
    async fn test_consume_card_is_idempotent() {
        let broker = broker();
        broker.submit_read(card("AB12"), None).await;

        assert!(broker.consume_card(&card("AB12")).await);
        assert!(!broker.consume_card(&card("AB12")).await);
    }

    #[tokio::test]
    async fn test_second_wait_supersedes_first() {
        let broker = broker();
        let first = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .wait_for_card(&session("s1"), Duration::from_secs(60))
                    .await
                    .unwrap()
            })
        };
        while broker.stats().await.active_waiter_count == 0 {
            tokio::task::yield_now().await;
        }

        let second = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .wait_for_card(&session("s1"), Duration::from_secs(60))
                    .await
                    .unwrap()
            })
        };

        // First wait resolves as cancelled; only the second remains live
        assert_eq!(first.await.unwrap(), WaitOutcome::Cancelled);
        let stats = broker.stats().await;
        assert_eq!(stats.active_waiter_count, 1);

        broker.submit_read(card("AB12"), None).await;
        match second.await.unwrap() {
            WaitOutcome::Match(read) => assert_eq!(read.card_id, card("AB12")),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resubmit_refreshes_existing_entry() {
        let broker = broker();
        broker.submit_read(card("AB12"), None).await;
        broker
            .submit_read(card("AB12"), Some(TotemId::new("T1").unwrap()))
            .await;

        let stats = broker.stats().await;
        assert_eq!(stats.pending_count, 1);
        let last = stats.last_read.unwrap();
        assert_eq!(last.totem_id, Some(TotemId::new("T1").unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_expire_after_retention() {
        let broker = Arc::new(ReadBroker::new(BrokerConfig {
            retention: Duration::from_secs(30),
        }));
        broker.submit_read(card("AB12"), None).await;
        assert_eq!(broker.stats().await.pending_count, 1);

        tokio::time::advance(Duration::from_secs(31)).await;

        // Expiry is passive: the read is gone on the next mutation pass
        assert!(!broker.consume_card(&card("AB12")).await);
        assert_eq!(broker.stats().await.pending_count, 0);
    }

    #[tokio::test]
    async fn test_dead_waiter_does_not_swallow_read() {
        let broker = broker();
        let abandoned = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .wait_for_card(&session("dead"), Duration::from_secs(60))
                    .await
            })
        };
        while broker.stats().await.active_waiter_count == 0 {
            tokio::task::yield_now().await;
        }
        // Drop the wait future without cancelling: the registration leaks
        // until the next submit discards it
        abandoned.abort();
        let _ = abandoned.await;

        broker.submit_read(card("AB12"), None).await;

        // The read survived the dead registration and is still claimable
        let stats = broker.stats().await;
        assert_eq!(stats.active_waiter_count, 0);
        assert_eq!(stats.pending_count, 1);
        assert!(broker.consume_card(&card("AB12")).await);
    }
}
