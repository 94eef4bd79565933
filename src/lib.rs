//! # devvisor
//!
//! **Devvisor** supervises a local development session: a reverse proxy, an
//! optional secondary proxy, a database process, an update checker, the
//! application process and any number of auxiliary runners. It presents them
//! as one lifecycle with one terminal [`Outcome`] and one exit code.
//!
//! ## Architecture
//! ```text
//!                         ┌──────────────────────────────┐
//!   SessionConfig ──────► │ Driver                       │
//!                         │  - DriverHooks (policy)      │
//!                         │  - Completion<Outcome>       │◄── SIGINT/SIGTERM → Interrupted
//!                         └──────────────┬───────────────┘
//!                                        ▼
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                            │
//! │  - ordered, gated start()          - idempotent stop()                 │
//! │  - regenerate_app_port()           - Bus + SubscriberSet (run log)     │
//! └───┬─────────┬──────────┬───────────┬──────────────┬───────────┬────────┘
//!     ▼         ▼          ▼           ▼              ▼           ▼
//!   proxy   secondary   updater    database      auxiliary[]    app ──► automation
//!                                      │                         │
//!              FailureReporter ◄───────┘      on_run_end(Outcome)┘
//!                    │                                │
//!                    ▼                                ▼
//!        on_failure: stop() + SupervisorFailure   once / drift / never started → resolve
//!                                                 otherwise → new port, restart
//! ```
//!
//! ## Outcome → exit code
//! | Outcome | Exit code |
//! |---|---|
//! | environment drift, supervisor failure, never started | 254 |
//! | one-shot bundle failure | 254 |
//! | one-shot app killed by signal | 255 |
//! | one-shot app exit code | that code |
//! | interrupted | 130 |
//!
//! ## Example
//! ```no_run
//! use devvisor::SessionConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), devvisor::SupervisorError> {
//!     let mut cfg = SessionConfig::default();
//!     cfg.app_dir = "./my-app".into();
//!     cfg.proxy_port = 3000;
//!
//!     let report = devvisor::run(cfg).await?;
//!     if let Some(message) = &report.message {
//!         eprint!("{message}");
//!     }
//!     std::process::exit(report.code);
//! }
//! ```
mod completion;
mod config;
mod core;
mod driver;
mod error;
mod events;
mod outcome;
mod policies;
mod subscribers;

pub mod components;

// ---- Public re-exports ----

pub use completion::{Completion, CompletionWaiter, completion};
pub use components::{
    AppManager, AuxiliaryRunner, BuildContext, Component, ComponentFactory, Components,
    DatabaseManager, FailureReporter, ProcessComponents, ReverseProxy, RunEndAction,
    SessionHooks,
};
pub use config::{
    AppProgram, AutomationSpec, AuxiliaryRunnerSpec, BackoffConfig, BuildOptions,
    DatabaseConfig, MULTIPLE_DB_ENV, ReleaseConfig, STATE_DIR, SessionConfig,
};
pub use crate::core::{APP_PORT_RANGE, Supervisor, SupervisorBuilder, wait_for_shutdown_signal};
pub use driver::{
    Driver, EXIT_INTERRUPTED, EXIT_KILLED, EXIT_RESTART_REQUIRED, exit_report, run,
};
pub use error::{ComponentError, SupervisorError};
pub use events::{Bus, Event, EventKind};
pub use outcome::{
    BuildErrors, BuildMessage, DescriptorKind, ExitReport, Outcome, ProcessExit, display_release,
};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
