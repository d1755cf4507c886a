//! Mock card feed for testing and manual injection.
//!
//! The mock plays two roles: deterministic feed substitute in tests, and
//! the local injection path for exercising a deployment without physical
//! hardware (a support operator "taps" a card from a shell).

use tokio::sync::mpsc;

use crate::codec::{TapFrame, TapPayload};
use crate::feed::TapFeed;
use tapgate_core::{Error, Result};

/// Buffered frames before an injecting caller is backpressured.
const CHANNEL_CAPACITY: usize = 32;

/// Mock feed delivering programmatically injected frames.
///
/// # Examples
///
/// ```
/// use tapgate_ingress::{MockTapFeed, TapFeed, TapFrame};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> tapgate_core::Result<()> {
///     let (mut feed, handle) = MockTapFeed::new();
///     feed.connect().await?;
///
///     handle.inject_tap("AB12", Some("T1")).await;
///
///     match feed.next_tap().await? {
///         TapFrame::Tap(payload) => assert_eq!(payload.card_id, "AB12"),
///         TapFrame::Malformed { .. } => unreachable!(),
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockTapFeed {
    frame_rx: mpsc::Receiver<TapFrame>,
    connected: bool,
}

impl MockTapFeed {
    /// Create a mock feed and its injection handle.
    #[must_use]
    pub fn new() -> (Self, MockTapFeedHandle) {
        let (frame_tx, frame_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                frame_rx,
                connected: false,
            },
            MockTapFeedHandle { frame_tx },
        )
    }
}

impl TapFeed for MockTapFeed {
    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn next_tap(&mut self) -> Result<TapFrame> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        match self.frame_rx.recv().await {
            Some(frame) => Ok(frame),
            // All handles dropped: behaves like a feed outage
            None => {
                self.connected = false;
                Err(Error::FeedDisconnected {
                    reason: "injection handle dropped".to_string(),
                })
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Handle for injecting frames into a [`MockTapFeed`].
#[derive(Debug, Clone)]
pub struct MockTapFeedHandle {
    frame_tx: mpsc::Sender<TapFrame>,
}

impl MockTapFeedHandle {
    /// Inject a well-formed tap.
    pub async fn inject_tap(&self, card_id: &str, totem_id: Option<&str>) {
        let _ = self
            .frame_tx
            .send(TapFrame::Tap(TapPayload {
                card_id: card_id.to_string(),
                totem_id: totem_id.map(str::to_string),
            }))
            .await;
    }

    /// Inject an arbitrary frame, including malformed ones.
    pub async fn inject_frame(&self, frame: TapFrame) {
        let _ = self.frame_tx.send(frame).await;
    }
}
