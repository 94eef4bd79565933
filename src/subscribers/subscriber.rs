//! # Event subscriber trait.
//!
//! Provides [`Subscribe`], the extension point for plugging custom event
//! handlers into a session (run log, test journals, desktop notifications).
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and logged)
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use devvisor::{Event, EventKind, Subscribe};
//!
//! struct Notifier;
//!
//! #[async_trait]
//! impl Subscribe for Notifier {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::ComponentFailed) {
//!             // pop a desktop notification, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "notifier" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for session observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
/// - Slow processing affects only this subscriber's queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, in FIFO order per subscriber.
    async fn on_event(&self, event: &Event);

    /// Subscriber name used in overflow and panic logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
