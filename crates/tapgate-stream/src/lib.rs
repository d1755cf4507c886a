//! Session stream adapter for the tapgate card-read broker.
//!
//! One [`SessionStream`] runs per client connection: it repeatedly asks the
//! broker to wait for the next card on behalf of its session, pushes the
//! match (and periodic heartbeats) to the client as typed events, and
//! releases its wait the moment the client disconnects.
//!
//! # Architecture
//!
//! ```text
//!              wait_for_card ┌──────────────┐  StreamEvent   ┌────────┐
//! ReadBroker ◄───────────────┤ SessionStream├───(mpsc)──────►│ client │
//!              cancel_wait   └──────────────┘                └────────┘
//!                                    ▲
//! IngressHandle ── connectivity ─────┴── StatusReporter (read-only)
//! ```
//!
//! The adapter enforces the "at most one card per connection" contract:
//! after the first match it emits `card_read`, then `close`, and stops. The
//! broker itself imposes no such limit.

mod events;
mod session;
mod state;
mod status;

pub use events::StreamEvent;
pub use session::{SessionStream, SessionStreamConfig};
pub use state::SessionState;
pub use status::{StatusReporter, StatusSnapshot};
