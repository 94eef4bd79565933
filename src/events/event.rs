//! # Session events emitted by the supervisor and its children.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Session events**: banner, app URL, outcome, stop
//! - **Component events**: starting, started, failed, stopped
//! - **App loop events**: port regeneration and relaunches
//!
//! The [`Event`] struct carries metadata such as the component name, a port,
//! a reason or a free-form detail.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the publish order.
//!
//! ## Example
//! ```rust
//! use devvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ComponentFailed)
//!     .with_component("database")
//!     .with_reason("port 3001 in use");
//!
//! assert_eq!(ev.kind, EventKind::ComponentFailed);
//! assert_eq!(ev.component.as_deref(), Some("database"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of session events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Session events ===
    /// Reverse proxy is listening; the banner should be shown.
    ///
    /// Sets: `detail` (banner text)
    SessionBanner,

    /// Every startup step completed; the app is reachable.
    ///
    /// Sets: `detail` (root URL)
    AppRunning,

    /// The terminal outcome was taken by the driver.
    ///
    /// Sets: `reason` (outcome label)
    OutcomeResolved,

    /// Stop was requested (first call only).
    ShutdownRequested,

    /// Every child was stopped. Last event of a session.
    SessionStopped,

    // === Component events ===
    /// A startup step began.
    ///
    /// Sets: `component`, `detail` (job title, if any)
    ComponentStarting,

    /// A startup step completed.
    ///
    /// Sets: `component`
    ComponentStarted,

    /// A child failed to start or died.
    ///
    /// Sets: `component`, `reason`
    ComponentFailed,

    /// A child was stopped during teardown.
    ///
    /// Sets: `component`
    ComponentStopped,

    // === App loop events ===
    /// A fresh application port was assigned.
    ///
    /// Sets: `port`
    PortRegenerated,

    /// The app process is being relaunched.
    ///
    /// Sets: `reason` (outcome label of the previous run)
    AppRestarting,

    /// The app crashed and waits for a source change before relaunching.
    AppWaitingForChange,

    /// A newer platform release is available.
    ///
    /// Sets: `detail` (release name)
    UpdateAvailable,
}

/// Session event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Component name, if applicable.
    pub component: Option<Arc<str>>,
    /// Port number, if applicable.
    pub port: Option<u16>,
    /// Human-readable reason (errors, outcome labels).
    pub reason: Option<Arc<str>>,
    /// Free-form payload (banner, URL, job title, release name).
    pub detail: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            component: None,
            port: None,
            reason: None,
            detail: None,
        }
    }

    /// Attaches a component name.
    #[inline]
    pub fn with_component(mut self, component: impl Into<Arc<str>>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Attaches a port.
    #[inline]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Attaches a reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a free-form detail.
    #[inline]
    pub fn with_detail(mut self, detail: impl Into<Arc<str>>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
