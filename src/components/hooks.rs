//! Callbacks from children back into the session policy.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ComponentError;
use crate::events::{Bus, Event, EventKind};
use crate::outcome::Outcome;

/// What the app manager does after its process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunEndAction {
    /// Launch the process again (continuous development loop).
    Restart,
    /// Leave the process down; the session is ending.
    Stop,
}

/// Session policy invoked by children.
#[async_trait]
pub trait SessionHooks: Send + Sync + 'static {
    /// A child hit an unrecoverable error.
    async fn on_failure(&self, err: ComponentError);

    /// The app process ended with `outcome`.
    async fn on_run_end(&self, outcome: Outcome) -> RunEndAction;
}

/// Handle children use to report failures detected after `start()` returned.
///
/// The hook runs on its own task: the policy stops the whole session, and
/// stopping a child waits for the very task that is reporting.
#[derive(Clone)]
pub struct FailureReporter {
    hooks: Arc<dyn SessionHooks>,
    bus: Bus,
}

impl FailureReporter {
    /// Creates a reporter bound to the session's hooks and bus.
    pub fn new(hooks: Arc<dyn SessionHooks>, bus: Bus) -> Self {
        Self { hooks, bus }
    }

    /// Publishes the failure and hands it to [`SessionHooks::on_failure`].
    pub fn report(&self, err: ComponentError) {
        debug!(label = err.as_label(), "component failure reported");
        self.bus.publish(
            Event::new(EventKind::ComponentFailed)
                .with_component(err.component())
                .with_reason(err.as_message()),
        );
        let hooks = Arc::clone(&self.hooks);
        tokio::spawn(async move { hooks.on_failure(err).await });
    }
}

impl std::fmt::Debug for FailureReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureReporter").finish_non_exhaustive()
    }
}
