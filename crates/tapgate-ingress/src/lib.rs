//! Event ingress for the tapgate card-read broker.
//!
//! This crate subscribes to the hardware card feed, normalizes each inbound
//! payload into a canonical read, and forwards it to the broker. It owns the
//! feed connection lifecycle (reconnect with backoff) and exposes a
//! connectivity signal for status reporting; it never gates the broker,
//! which keeps serving whatever is already pending while the feed is down.
//!
//! # Architecture
//!
//! ```text
//! badge reader ──(pub/sub)──► TcpTapFeed ─┐
//!                                         ├──► CardIngress ──► ReadBroker
//! manual test hook ─────────► MockTapFeed ┘        │
//!                                                  └──► connectivity (watch)
//! ```
//!
//! # Components
//!
//! - [`TapCodec`]: newline-delimited JSON framing for the feed transport
//! - [`TapFeed`]: async trait over feed implementations
//! - [`TcpTapFeed`]: framed TCP subscription to the reader bridge
//! - [`MockTapFeed`]: mpsc-backed feed for tests and manual injection
//! - [`CardIngress`]: the run loop tying a feed to a broker
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tapgate_broker::{BrokerConfig, ReadBroker};
//! use tapgate_ingress::{CardIngress, IngressConfig, TcpTapFeed, TcpTapFeedConfig};
//!
//! # async fn example() {
//! let broker = Arc::new(ReadBroker::new(BrokerConfig::default()));
//! let feed = TcpTapFeed::new(TcpTapFeedConfig::default());
//! let (ingress, handle) = CardIngress::new(feed, broker.clone(), IngressConfig::default());
//!
//! tokio::spawn(ingress.run());
//! assert!(!handle.is_connected()); // not yet connected
//! # }
//! ```

mod codec;
mod feed;
mod ingress;
mod mock;

pub use codec::{TapCodec, TapFrame, TapPayload};
pub use feed::{TapFeed, TcpTapFeed, TcpTapFeedConfig};
pub use ingress::{CardIngress, IngressConfig, IngressHandle};
pub use mock::{MockTapFeed, MockTapFeedHandle};
