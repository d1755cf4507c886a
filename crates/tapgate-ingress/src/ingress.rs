//! Ingress run loop: feed frames in, broker submissions out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::codec::{TapFrame, TapPayload};
use crate::feed::TapFeed;
use tapgate_broker::ReadBroker;
use tapgate_core::{CardId, TotemId, constants};

/// Configuration for [`CardIngress`].
#[derive(Debug, Clone)]
pub struct IngressConfig {
    /// Delay before the first reconnection attempt.
    pub initial_backoff: Duration,

    /// Ceiling for the doubling reconnection backoff.
    pub max_backoff: Duration,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(constants::INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(constants::MAX_BACKOFF_MS),
        }
    }
}

/// Why the pump loop returned.
enum PumpExit {
    Shutdown,
    Disconnected,
}

/// Handle to a running [`CardIngress`].
///
/// Exposes the feed connectivity signal for status reporting and a
/// graceful-shutdown switch. Cloneable; all clones observe the same task.
#[derive(Debug, Clone)]
pub struct IngressHandle {
    connectivity_rx: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
}

impl IngressHandle {
    /// Whether the feed subscription is currently up.
    ///
    /// Connectivity never gates the broker: pending reads stay claimable
    /// while the feed is down.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.connectivity_rx.borrow()
    }

    /// Watch receiver over the connectivity flag, for status reporters that
    /// want change notifications rather than polling.
    #[must_use]
    pub fn connectivity(&self) -> watch::Receiver<bool> {
        self.connectivity_rx.clone()
    }

    /// Ask the ingress task to stop after its current frame.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// The event ingress: drives a [`TapFeed`], normalizes payloads, and
/// forwards them to the broker.
///
/// Owns the full feed lifecycle: connect, pump, and reconnect with
/// exponential backoff on disconnect. Parse failures are logged and dropped
/// without disturbing the subscription or the broker.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tapgate_broker::{BrokerConfig, ReadBroker};
/// use tapgate_ingress::{CardIngress, IngressConfig, MockTapFeed};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let broker = Arc::new(ReadBroker::new(BrokerConfig::default()));
/// let (feed, taps) = MockTapFeed::new();
/// let (ingress, handle) = CardIngress::new(feed, broker.clone(), IngressConfig::default());
/// let task = tokio::spawn(ingress.run());
///
/// taps.inject_tap("AB12", Some("T1")).await;
///
/// # while broker.stats().await.pending_count == 0 { tokio::task::yield_now().await; }
/// assert_eq!(broker.stats().await.pending_count, 1);
/// handle.shutdown();
/// task.await.unwrap();
/// # }
/// ```
pub struct CardIngress<F: TapFeed> {
    feed: F,
    broker: Arc<ReadBroker>,
    config: IngressConfig,
    connectivity_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<F: TapFeed> CardIngress<F> {
    /// Create an ingress over a feed and its control handle.
    #[must_use]
    pub fn new(feed: F, broker: Arc<ReadBroker>, config: IngressConfig) -> (Self, IngressHandle) {
        let (connectivity_tx, connectivity_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            Self {
                feed,
                broker,
                config,
                connectivity_tx,
                shutdown_rx,
            },
            IngressHandle {
                connectivity_rx,
                shutdown_tx,
            },
        )
    }

    /// Run until shutdown. Intended to be spawned as its own task.
    pub async fn run(mut self) {
        let mut backoff = self.config.initial_backoff;
        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            match self.feed.connect().await {
                Ok(()) => {
                    let _ = self.connectivity_tx.send(true);
                    backoff = self.config.initial_backoff;

                    let exit = self.pump().await;
                    let _ = self.connectivity_tx.send(false);
                    match exit {
                        PumpExit::Shutdown => break,
                        PumpExit::Disconnected => {
                            warn!(
                                backoff_ms = backoff.as_millis() as u64,
                                "card feed disconnected, reconnecting"
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "card feed connect failed"
                    );
                }
            }

            // Back off, but stay responsive to shutdown
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                changed = self.shutdown_rx.changed() => {
                    // A closed channel means every handle is gone; stop too
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
            }
            backoff = (backoff * 2).min(self.config.max_backoff);
        }

        let _ = self.feed.disconnect().await;
        info!("card ingress stopped");
    }

    /// Forward frames to the broker until disconnect or shutdown.
    async fn pump(&mut self) -> PumpExit {
        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    // A closed channel means every handle is gone; stop too
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        return PumpExit::Shutdown;
                    }
                }
                result = self.feed.next_tap() => match result {
                    Ok(TapFrame::Tap(payload)) => self.submit(payload).await,
                    Ok(TapFrame::Malformed { reason }) => {
                        // One bad payload never tears down the subscription
                        warn!(%reason, "malformed feed payload dropped");
                    }
                    Err(e) => {
                        debug!(error = %e, "feed read failed");
                        return PumpExit::Disconnected;
                    }
                },
            }
        }
    }

    /// Validate a payload into broker newtypes and submit it.
    ///
    /// An invalid card id drops the whole payload; an invalid totem id only
    /// drops the origin annotation, the tap itself still counts.
    async fn submit(&self, payload: TapPayload) {
        let card_id = match CardId::new(&payload.card_id) {
            Ok(card_id) => card_id,
            Err(e) => {
                warn!(error = %e, "feed payload with unusable card id dropped");
                return;
            }
        };

        let totem_id = match payload.totem_id.as_deref().map(TotemId::new) {
            Some(Ok(totem_id)) => Some(totem_id),
            Some(Err(e)) => {
                warn!(error = %e, card_id = %card_id, "unusable totem id ignored");
                None
            }
            None => None,
        };

        self.broker.submit_read(card_id, totem_id).await;
    }
}
