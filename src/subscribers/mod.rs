//! # Event subscribers for session events.
//!
//! This module provides the [`Subscribe`] trait and built-in implementations
//! for handling events broadcast through the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Supervisor ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit(&Event)
//!                                                           │
//!                                                ┌──────────┼──────────┐
//!                                                ▼          ▼          ▼
//!                                            LogWriter   Custom      ...
//!                                            (run log)
//! ```
//!
//! The [`SubscriberSet`] is the session's shared logging sink: the supervisor
//! finalizes it exactly once, on the first `stop()`, draining every queue.

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
