//! # Session driver.
//!
//! Runs one [`Supervisor`] through one session and turns its terminal
//! [`Outcome`] into an [`ExitReport`]. This is the only place that decides
//! whether an outcome is fatal or restartable.
//!
//! ```text
//! starting ──► running ──► completed
//!
//! build supervisor (hooks = DriverHooks)
//!   └─► start()  ─┐
//!                 ├─ join: start returned and a terminal outcome was resolved
//!   waiter ───────┘       (failure, run end, or signal: Interrupted then stop())
//!   └─► announce outcome
//!   └─► stop()   (always)
//!   └─► exit_report(outcome)
//! ```
//!
//! # Example
//! ```no_run
//! use devvisor::{Driver, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = SessionConfig::from_toml_str("app_dir = \".\"\nproxy_port = 3000\nonce = true\n")?;
//!     let report = Driver::new(cfg).run().await?;
//!     std::process::exit(report.code);
//! }
//! ```

mod exit;
mod hooks;

use std::future::Future;
use std::io;
use std::sync::{Arc, Weak};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::completion::{Completion, completion};
use crate::components::{ComponentFactory, ProcessComponents};
use crate::config::SessionConfig;
use crate::core::{Supervisor, wait_for_shutdown_signal};
use crate::error::SupervisorError;
use crate::outcome::{ExitReport, Outcome};
use crate::subscribers::{LogWriter, Subscribe};

pub use exit::{EXIT_INTERRUPTED, EXIT_KILLED, EXIT_RESTART_REQUIRED, exit_report};
use hooks::DriverHooks;

/// Runs a session with the process-backed children and returns its exit report.
pub async fn run(config: SessionConfig) -> Result<ExitReport, SupervisorError> {
    Driver::new(config).run().await
}

/// Configurable session driver.
pub struct Driver {
    config: SessionConfig,
    factory: Arc<dyn ComponentFactory>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    handle_signals: bool,
    interrupt: Option<CancellationToken>,
}

impl Driver {
    /// Creates a driver using [`ProcessComponents`] and OS signal handling.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            factory: Arc::new(ProcessComponents),
            subscribers: Vec::new(),
            handle_signals: true,
            interrupt: None,
        }
    }

    /// Replaces the component factory.
    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn ComponentFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Adds event subscribers next to the run log.
    #[must_use]
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers.extend(subscribers);
        self
    }

    /// Leaves SIGINT/SIGTERM to the caller.
    #[must_use]
    pub fn without_signal_handling(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Interrupts the session when `token` is cancelled, like SIGINT would.
    #[must_use]
    pub fn with_interrupt(mut self, token: CancellationToken) -> Self {
        self.interrupt = Some(token);
        self
    }

    /// Runs the session to completion.
    ///
    /// One-shot sessions are quiet and never watch sources.
    pub async fn run(self) -> Result<ExitReport, SupervisorError> {
        let mut config = self.config;
        config.quiet |= config.once;
        config.watch_for_changes &= !config.once;
        let once = config.once;
        let release = config.release.clone();

        let (done, waiter) = completion::<Outcome>();
        let hooks = Arc::new(DriverHooks::new(once, Arc::clone(&done)));

        let mut subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new(config.quiet))];
        subscribers.extend(self.subscribers);

        let sup = Supervisor::builder(config)
            .with_hooks(hooks.clone())
            .with_subscribers(subscribers)
            .build(self.factory.as_ref())?;
        hooks.attach(&sup);

        let quit = CancellationToken::new();
        if self.handle_signals {
            interrupt_on(
                wait_for_shutdown_signal(),
                Arc::clone(&done),
                Arc::downgrade(&sup),
                quit.clone(),
            );
        }
        if let Some(token) = self.interrupt {
            let trigger = async move {
                token.cancelled().await;
                Ok(())
            };
            interrupt_on(trigger, Arc::clone(&done), Arc::downgrade(&sup), quit.clone());
        }

        let ((), outcome) = tokio::join!(sup.start(), waiter.wait());
        quit.cancel();

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => {
                sup.stop().await;
                sup.wait_stopped().await;
                return Err(SupervisorError::CompletionDropped);
            }
        };
        sup.announce_outcome(&outcome);
        sup.stop().await;
        sup.wait_stopped().await;

        exit_report(&outcome, once, &release)
    }
}

/// Resolves [`Outcome::Interrupted`] and stops the session once `trigger` fires.
///
/// Cancelling `quit` ends the wait; a stop already in progress runs to completion.
fn interrupt_on<F>(
    trigger: F,
    done: Arc<Completion<Outcome>>,
    sup: Weak<Supervisor>,
    quit: CancellationToken,
) where
    F: Future<Output = io::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = quit.cancelled() => return,
            res = trigger => {
                if let Err(e) = res {
                    warn!(error = %e, "cannot listen for shutdown signals");
                    return;
                }
            }
        }
        info!("=> Interrupted, shutting down.");
        done.resolve(Outcome::Interrupted);
        if let Some(sup) = sup.upgrade() {
            sup.stop().await;
        }
    });
}
