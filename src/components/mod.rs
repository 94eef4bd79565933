//! # Session children and the contracts the supervisor drives them through.
//!
//! The supervisor only ever talks to its children through the traits below.
//! Default process- and socket-backed implementations live in the submodules
//! and are wired together by [`ProcessComponents`].
//!
//! ```text
//!                 ┌──────────────┐
//!                 │  Supervisor  │── regenerate_app_port() ──┬──► ReverseProxy::set_forward_port
//!                 └──────┬───────┘                           └──► AppManager::set_port
//!                        │ start()/stop()
//!   ┌──────────┬─────────┼──────────┬───────────┬────────────┐
//!   ▼          ▼         ▼          ▼           ▼            ▼
//! proxy   secondary   updater   database   auxiliary[]   app (+ automation)
//!                                                          │
//!                                          SessionHooks::on_run_end(Outcome)
//! ```
//!
//! ## Contract
//! - `start()` returns once the child is usable (listening, accepting, spawned).
//!   An `Err` is a fatal start failure.
//! - `stop()` is idempotent and returns only after the child's background
//!   tasks and processes are gone.
//! - Failures detected after `start()` returned go through
//!   [`FailureReporter::report`], never through a panic or a return value.

mod app;
mod database;
mod factory;
mod hooks;
mod proxy;
mod runner;
mod updater;
mod watch;

use async_trait::async_trait;

use crate::error::ComponentError;

pub use app::{DatabaseUrls, ProcessApp};
pub use database::ProcessDatabase;
pub use factory::{BuildContext, ComponentFactory, Components, ProcessComponents};
pub use hooks::{FailureReporter, RunEndAction, SessionHooks};
pub use proxy::TcpReverseProxy;
pub use runner::CommandRunner;
pub use updater::{LatestReleaseFile, PeriodicUpdateChecker, UpdateSource};
pub use watch::{Revision, SourceWatcher};

/// A child with a start/stop lifecycle.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Name used in the run log and in errors.
    fn name(&self) -> &str;

    /// Brings the child up.
    async fn start(&self) -> Result<(), ComponentError>;

    /// Tears the child down. Safe to call repeatedly, before or after `start`.
    async fn stop(&self);
}

/// The public listener; forwards every connection to the current app port.
pub trait ReverseProxy: Component {
    /// Port new connections are forwarded to.
    fn forward_port(&self) -> u16;

    /// Re-points the proxy without dropping its listening socket.
    fn set_forward_port(&self, port: u16);
}

/// A database process owned by the session.
pub trait DatabaseManager: Component {
    /// URL the app connects to.
    fn connection_url(&self) -> String;

    /// Change-feed URL, if the database exposes one.
    fn change_feed_url(&self) -> Option<String>;
}

/// Builds, launches, watches and restarts the application process.
///
/// Every time the process ends, the manager calls
/// [`SessionHooks::on_run_end`] and obeys the returned [`RunEndAction`].
pub trait AppManager: Component {
    /// Port the app will listen on at its next launch.
    fn port(&self) -> u16;

    /// Changes the port used from the next launch on.
    fn set_port(&self, port: u16);
}

/// Pluggable extra participant in the session lifecycle.
#[async_trait]
pub trait AuxiliaryRunner: Send + Sync + 'static {
    /// Title of the runner's job scope.
    fn title(&self) -> &str;

    /// Optional preparation, run before anything else is started.
    async fn prestart(&self) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Brings the runner up.
    async fn start(&self) -> Result<(), ComponentError>;

    /// Tears the runner down; idempotent.
    async fn stop(&self);
}
