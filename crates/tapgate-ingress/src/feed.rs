//! Card feed abstraction and the TCP subscription implementation.
//!
//! The broker does not care where taps come from; the ingress loop drives
//! any [`TapFeed`] implementation. Production uses [`TcpTapFeed`] against
//! the reader bridge; tests and the manual injection hook use
//! [`crate::MockTapFeed`].
//!
//! Traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::{TapCodec, TapFrame};
use tapgate_core::{Error, Result, constants};

/// A subscription to the card-tap feed.
///
/// Implementations own a single connection; the ingress loop handles
/// reconnection and backoff above this trait. `next_tap` resolves with the
/// next frame, which may be [`TapFrame::Malformed`] — the caller decides to
/// drop it; only transport failures are `Err`.
pub trait TapFeed {
    /// Establish the subscription.
    async fn connect(&mut self) -> Result<()>;

    /// Receive the next frame, suspending until one arrives.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] before `connect`, and
    /// [`Error::FeedDisconnected`] (or an I/O error) when the transport
    /// drops; after an error the feed must be reconnected.
    async fn next_tap(&mut self) -> Result<TapFrame>;

    /// Tear the subscription down.
    async fn disconnect(&mut self) -> Result<()>;

    /// Whether the subscription is currently established.
    fn is_connected(&self) -> bool;
}

/// Configuration for [`TcpTapFeed`].
#[derive(Debug, Clone)]
pub struct TcpTapFeedConfig {
    /// Address of the reader bridge publishing tap frames.
    pub feed_addr: SocketAddr,

    /// Timeout for the connect handshake. Reads have no timeout: a healthy
    /// feed is silent for as long as nobody taps a card.
    pub connect_timeout: Duration,
}

impl Default for TcpTapFeedConfig {
    fn default() -> Self {
        Self {
            feed_addr: "127.0.0.1:4570".parse().unwrap(),
            connect_timeout: Duration::from_millis(constants::DEFAULT_FEED_TIMEOUT_MS),
        }
    }
}

/// TCP subscription to the reader bridge, framed by [`TapCodec`].
///
/// # Thread Safety
///
/// `TcpTapFeed` is driven from a single ingress task; it is not shared.
#[derive(Debug)]
pub struct TcpTapFeed {
    config: TcpTapFeedConfig,
    framed: Option<Framed<TcpStream, TapCodec>>,
}

impl TcpTapFeed {
    /// Create a feed client. No connection is attempted until
    /// [`TapFeed::connect`].
    #[must_use]
    pub fn new(config: TcpTapFeedConfig) -> Self {
        Self {
            config,
            framed: None,
        }
    }
}

impl TapFeed for TcpTapFeed {
    async fn connect(&mut self) -> Result<()> {
        if self.framed.is_some() {
            self.disconnect().await?;
        }

        debug!(addr = %self.config.feed_addr, "connecting to card feed");
        let connect = TcpStream::connect(self.config.feed_addr);
        let stream = match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::Io(e)),
            Err(_) => {
                return Err(Error::ConnectTimeout {
                    duration_ms: self.config.connect_timeout.as_millis() as u64,
                });
            }
        };

        info!(addr = %self.config.feed_addr, "card feed connected");
        self.framed = Some(Framed::new(stream, TapCodec::new()));
        Ok(())
    }

    async fn next_tap(&mut self) -> Result<TapFrame> {
        let Some(framed) = self.framed.as_mut() else {
            return Err(Error::NotConnected);
        };

        match framed.next().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => {
                // Codec-level errors are transport faults (oversize, I/O);
                // malformed payloads arrive as items, not errors.
                warn!(error = %e, "card feed transport error");
                self.framed = None;
                Err(e)
            }
            None => {
                self.framed = None;
                Err(Error::FeedDisconnected {
                    reason: "stream closed by peer".to_string(),
                })
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut framed) = self.framed.take() {
            debug!("closing card feed connection");
            framed.get_mut().shutdown().await?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.framed.is_some()
    }
}
