//! Session events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle events emitted by the supervisor and its
//! child components.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor` (startup steps, port changes, stop),
//!   `ProcessApp` (restarts), `PeriodicUpdateChecker` (new releases).
//! - **Consumers**: the supervisor's listener, which fans out to the
//!   `SubscriberSet` (the run log and any user subscribers).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
