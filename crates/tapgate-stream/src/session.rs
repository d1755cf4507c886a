//! The per-connection wait loop.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::events::StreamEvent;
use crate::state::SessionState;
use tapgate_broker::{ReadBroker, WaitOutcome};
use tapgate_core::{Result, SessionId, constants};

/// Configuration for a [`SessionStream`].
#[derive(Debug, Clone)]
pub struct SessionStreamConfig {
    /// Timeout for one internal `wait_for_card` attempt. Timeouts re-arm
    /// silently; the client never sees them.
    pub wait_timeout: Duration,

    /// Keep-alive cadence, independent of the wait timeout.
    pub heartbeat_interval: Duration,
}

impl Default for SessionStreamConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_millis(constants::DEFAULT_WAIT_TIMEOUT_MS),
            heartbeat_interval: Duration::from_millis(constants::DEFAULT_HEARTBEAT_INTERVAL_MS),
        }
    }
}

/// Adapter between one client connection and the broker.
///
/// Delivers at most one `card_read` per connection — that contract lives
/// here, not in the broker. On client disconnect (the event receiver is
/// dropped) the adapter calls `cancel_wait` immediately so the session's
/// waiter never lingers until its timeout.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tapgate_broker::{BrokerConfig, ReadBroker};
/// use tapgate_core::{CardId, SessionId};
/// use tapgate_stream::{SessionStream, SessionStreamConfig, StreamEvent};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> tapgate_core::Result<()> {
/// let broker = Arc::new(ReadBroker::new(BrokerConfig::default()));
/// broker.submit_read(CardId::new("AB12")?, None).await;
///
/// let session_id = SessionId::new("kiosk-1")?;
/// let mut stream = SessionStream::new(session_id, broker, SessionStreamConfig::default());
///
/// let (tx, mut rx) = tokio::sync::mpsc::channel(16);
/// stream.run(tx).await?;
///
/// assert!(matches!(rx.recv().await, Some(StreamEvent::Connected { .. })));
/// assert!(matches!(rx.recv().await, Some(StreamEvent::CardRead { .. })));
/// assert!(matches!(rx.recv().await, Some(StreamEvent::Close)));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SessionStream {
    session_id: SessionId,
    broker: Arc<ReadBroker>,
    config: SessionStreamConfig,
    state: SessionState,
}

impl SessionStream {
    /// Create an adapter for one client connection.
    #[must_use]
    pub fn new(session_id: SessionId, broker: Arc<ReadBroker>, config: SessionStreamConfig) -> Self {
        Self {
            session_id,
            broker,
            config,
            state: SessionState::Connecting,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The session this stream serves.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Drive the stream until a match is delivered, the client disconnects,
    /// or the wait is cancelled externally.
    ///
    /// Pushes events to `tx`; a failed send means the client is gone and the
    /// stream stops after releasing its wait.
    ///
    /// # Errors
    ///
    /// Only configuration errors (a zero `wait_timeout`) surface as `Err`;
    /// timeouts, cancellations, and disconnects end the stream with `Ok`.
    pub async fn run(&mut self, tx: mpsc::Sender<StreamEvent>) -> Result<()> {
        let broker = Arc::clone(&self.broker);
        let session_id = self.session_id.clone();
        let wait_timeout = self.config.wait_timeout;

        if tx
            .send(StreamEvent::Connected {
                session_id: session_id.clone(),
            })
            .await
            .is_err()
        {
            debug!(session_id = %session_id, "client gone before stream start");
            self.state = self.state.transition_to(SessionState::Closed)?;
            return Ok(());
        }
        self.state = self.state.transition_to(SessionState::Streaming)?;
        info!(session_id = %session_id, "session stream started");

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick completes immediately; consume it so the
        // first heartbeat lands one full interval after connect.
        heartbeat.tick().await;

        let result = 'stream: loop {
            let mut wait = pin!(broker.wait_for_card(&session_id, wait_timeout));
            loop {
                tokio::select! {
                    () = tx.closed() => {
                        debug!(session_id = %session_id, "client disconnected, releasing wait");
                        broker.cancel_wait(&session_id).await;
                        break 'stream Ok(());
                    }
                    _ = heartbeat.tick() => {
                        if tx.send(StreamEvent::heartbeat()).await.is_err() {
                            broker.cancel_wait(&session_id).await;
                            break 'stream Ok(());
                        }
                    }
                    outcome = &mut wait => match outcome {
                        Ok(WaitOutcome::Match(read)) => {
                            info!(
                                session_id = %session_id,
                                card_id = %read.card_id,
                                "delivering card read"
                            );
                            if tx.send(StreamEvent::card_read(&read)).await.is_err() {
                                // Claim already happened; the read is spent
                                warn!(
                                    session_id = %session_id,
                                    card_id = %read.card_id,
                                    "client disconnected before delivery, read dropped"
                                );
                            }
                            let _ = tx.send(StreamEvent::Close).await;
                            break 'stream Ok(());
                        }
                        Ok(WaitOutcome::TimedOut) => {
                            // Expected and silent: the client sees no event
                            trace!(session_id = %session_id, "wait timed out, re-arming");
                            break;
                        }
                        Ok(WaitOutcome::Cancelled) => {
                            debug!(session_id = %session_id, "wait cancelled, closing stream");
                            let _ = tx.send(StreamEvent::Close).await;
                            break 'stream Ok(());
                        }
                        Err(e) => {
                            let _ = tx.send(StreamEvent::error(e.to_string())).await;
                            let _ = tx.send(StreamEvent::Close).await;
                            break 'stream Err(e);
                        }
                    },
                }
            }
        };

        self.state = self.state.transition_to(SessionState::Closed)?;
        info!(session_id = %session_id, "session stream closed");
        result
    }
}
