//! Card-read broker for tapgate.
//!
//! This crate bridges the asynchronous hardware card feed with many
//! independent, short-lived client sessions that each want to "wait for the
//! next card" with their own timeout and cancellation.
//!
//! # Architecture
//!
//! ```text
//! Event Ingress ──submit_read──► ┌────────────────┐
//!                                │  ReadBroker    │
//! Session 1  ──wait_for_card──►  │  pending pool  │
//! Session 2  ──wait_for_card──►  │  waiter queue  │
//! Session N  ──cancel_wait────►  └────────────────┘
//! ```
//!
//! The broker owns the only shared mutable state in the core: the pool of
//! not-yet-claimed reads and the registry of suspended waiters. Every claim
//! is check-and-remove inside one critical section, so a read resolves at
//! most one waiter no matter how many sessions race for it.

mod broker;

pub use broker::{BrokerConfig, BrokerStats, ReadBroker, WaitOutcome};
