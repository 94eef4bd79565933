//! # LogWriter: the session run log
//!
//! Turns [`Event`]s into the user-facing run log through `tracing`.
//! Progress lines are suppressed in quiet mode; failures never are.
//!
//! ## Example output
//! ```text
//! [[[[[ ~/src/my-app ]]]]]
//! => Started proxy.
//! => Started database.
//! => Started your app.
//!
//! => App running at: http://localhost:3000/
//! => Server modified -- restarting...
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Run log subscriber.
#[derive(Debug, Default)]
pub struct LogWriter {
    quiet: bool,
}

impl LogWriter {
    /// Construct a new [`LogWriter`]; `quiet` hides progress lines.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let component = e.component.as_deref().unwrap_or("unknown");
        match e.kind {
            EventKind::ComponentFailed => {
                error!(
                    "=> {component} failed: {}",
                    e.reason.as_deref().unwrap_or("unknown error")
                );
                return;
            }
            EventKind::UpdateAvailable => {
                info!(
                    "=> A newer release is available: {}",
                    e.detail.as_deref().unwrap_or("unknown")
                );
                return;
            }
            _ => {}
        }

        if self.quiet {
            debug!(kind = ?e.kind, component, "event");
            return;
        }

        match e.kind {
            EventKind::SessionBanner => {
                info!("[[[[[ {} ]]]]]", e.detail.as_deref().unwrap_or_default());
            }
            EventKind::ComponentStarted => {
                info!("=> Started {component}.");
            }
            EventKind::AppRunning => {
                info!("");
                info!("=> App running at: {}", e.detail.as_deref().unwrap_or_default());
            }
            EventKind::AppRestarting => match e.reason.as_deref() {
                Some("source-changed") => info!("=> Server modified -- restarting..."),
                Some(reason) => info!("=> Restarting app ({reason})..."),
                None => info!("=> Restarting app..."),
            },
            EventKind::AppWaitingForChange => {
                info!("=> Your application is crashing. Waiting for file change.");
            }
            EventKind::PortRegenerated => {
                debug!(port = e.port, "app port assigned");
            }
            EventKind::ComponentStarting => {
                debug!(component, job = e.detail.as_deref(), "starting");
            }
            EventKind::ComponentStopped => {
                debug!(component, "stopped");
            }
            EventKind::OutcomeResolved => {
                debug!(outcome = e.reason.as_deref(), "session outcome");
            }
            EventKind::ShutdownRequested | EventKind::SessionStopped => {
                debug!(kind = ?e.kind, "shutdown");
            }
            EventKind::ComponentFailed | EventKind::UpdateAvailable => {}
        }
    }

    fn name(&self) -> &'static str {
        "run-log"
    }
}
