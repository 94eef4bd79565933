//! The session policy: what a failure or an app exit means.

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use tracing::debug;

use crate::completion::Completion;
use crate::components::{RunEndAction, SessionHooks};
use crate::core::Supervisor;
use crate::error::ComponentError;
use crate::outcome::Outcome;

/// [`SessionHooks`] used by the driver.
///
/// Holds a weak reference to the supervisor it is wired into, attached right
/// after the supervisor is built.
pub(crate) struct DriverHooks {
    once: bool,
    done: Arc<Completion<Outcome>>,
    supervisor: OnceLock<Weak<Supervisor>>,
}

impl DriverHooks {
    pub(crate) fn new(once: bool, done: Arc<Completion<Outcome>>) -> Self {
        Self {
            once,
            done,
            supervisor: OnceLock::new(),
        }
    }

    pub(crate) fn attach(&self, supervisor: &Arc<Supervisor>) {
        let _ = self.supervisor.set(Arc::downgrade(supervisor));
    }

    fn supervisor(&self) -> Option<Arc<Supervisor>> {
        self.supervisor.get().and_then(Weak::upgrade)
    }
}

#[async_trait]
impl SessionHooks for DriverHooks {
    async fn on_failure(&self, err: ComponentError) {
        debug!(label = err.as_label(), component = err.component(), "failure, stopping session");
        if let Some(sup) = self.supervisor() {
            sup.stop().await;
        }
        if !self.done.resolve(Outcome::SupervisorFailure) {
            debug!("session outcome already resolved");
        }
    }

    async fn on_run_end(&self, outcome: Outcome) -> RunEndAction {
        let Some(sup) = self.supervisor() else {
            return RunEndAction::Stop;
        };
        if sup.is_stopped() {
            return RunEndAction::Stop;
        }
        if self.once || outcome.is_always_terminal() {
            // Resolve on a later tick so the app manager unwinds its own call first.
            let done = Arc::clone(&self.done);
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                done.resolve(outcome);
            });
            return RunEndAction::Stop;
        }
        let port = sup.regenerate_app_port();
        debug!(outcome = outcome.as_label(), port, "restarting app");
        RunEndAction::Restart
    }
}
