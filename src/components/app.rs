//! # Application process manager.
//!
//! [`ProcessApp`] runs the development loop for the app process:
//!
//! ```text
//! loop:
//!   note source revision
//!   release check        .devvisor/release ≠ current         → WrongRelease
//!   descriptor check     .devvisor/{platforms,plugins} drift  → OutdatedPlatformDescriptors
//!   build (optional)     exit 3 → ConflictingVersions, other ≠ 0 → BundleFailure
//!   launch program       spawn error → Terminated
//!   wait                 exit → SuccessExit(code | signal), source change → SourceChanged
//!   hooks.on_run_end(outcome)
//!     Stop    → leave the loop
//!     Restart → wait for a change (crash while watching) or backoff, relaunch
//! ```
//!
//! The port is re-read at every launch, so a port set through
//! [`AppManager::set_port`] between runs is honored by the next one.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use std::sync::atomic::{AtomicU16, Ordering};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use super::watch::{Revision, SourceWatcher};
use super::{AppManager, Component, RunEndAction, SessionHooks};
use crate::config::{AppProgram, BuildOptions, ReleaseConfig, STATE_DIR, SessionConfig};
use crate::error::ComponentError;
use crate::events::{Bus, Event, EventKind};
use crate::outcome::{BuildErrors, BuildMessage, DescriptorKind, Outcome, ProcessExit};
use crate::policies::BackoffPolicy;

const NAME: &str = "your app";

/// Builder exit code meaning the package constraints cannot be satisfied.
const CONFLICT_EXIT_CODE: i32 = 3;

/// Connection details handed to the app through its environment.
#[derive(Clone, Debug, Default)]
pub struct DatabaseUrls {
    /// `DATABASE_URL`.
    pub url: Option<String>,
    /// `DATABASE_CHANGE_FEED_URL`.
    pub change_feed_url: Option<String>,
}

/// Everything a launch needs besides the port.
#[derive(Clone, Debug)]
struct LaunchPlan {
    app_dir: PathBuf,
    version_dir: PathBuf,
    program: AppProgram,
    build: Option<BuildOptions>,
    settings_file: Option<PathBuf>,
    bind_ip: String,
    root_url: String,
    debug_port: Option<u16>,
    database: DatabaseUrls,
    release: ReleaseConfig,
    backoff: BackoffPolicy,
    /// Source root to watch, with its debounce period.
    watch: Option<(PathBuf, Duration)>,
}

/// Descriptor file contents captured when the session started.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Descriptors {
    platforms: Option<String>,
    plugins: Option<String>,
}

impl Descriptors {
    async fn read(version_dir: &Path) -> Self {
        Self {
            platforms: read_state_file(version_dir, DescriptorKind::Platforms.file_name()).await,
            plugins: read_state_file(version_dir, DescriptorKind::Plugins.file_name()).await,
        }
    }

    fn drift(&self, now: &Descriptors) -> Option<DescriptorKind> {
        if self.platforms != now.platforms {
            Some(DescriptorKind::Platforms)
        } else if self.plugins != now.plugins {
            Some(DescriptorKind::Plugins)
        } else {
            None
        }
    }
}

async fn read_state_file(dir: &Path, name: &str) -> Option<String> {
    tokio::fs::read_to_string(dir.join(STATE_DIR).join(name))
        .await
        .ok()
        .map(|s| s.trim().to_string())
}

/// Process-backed [`AppManager`].
pub struct ProcessApp {
    plan: Arc<LaunchPlan>,
    port: Arc<AtomicU16>,
    hooks: Arc<dyn SessionHooks>,
    bus: Bus,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessApp {
    /// Creates the manager from the session config.
    pub fn new(
        cfg: &SessionConfig,
        port: u16,
        database: DatabaseUrls,
        hooks: Arc<dyn SessionHooks>,
        bus: Bus,
    ) -> Self {
        let watch = cfg
            .watch_for_changes
            .then(|| (cfg.app_dir.clone(), cfg.watch_debounce()));
        let plan = LaunchPlan {
            app_dir: cfg.app_dir.clone(),
            version_dir: cfg.version_check_dir().to_path_buf(),
            program: cfg.program.clone(),
            build: cfg.build.clone(),
            settings_file: cfg.settings_file.clone(),
            bind_ip: cfg.app_host.clone().unwrap_or_else(|| "127.0.0.1".into()),
            root_url: cfg.root_url(),
            debug_port: cfg.debug_port,
            database,
            release: cfg.release.clone(),
            backoff: cfg.restart_backoff.into(),
            watch,
        };
        Self {
            plan: Arc::new(plan),
            port: Arc::new(AtomicU16::new(port)),
            hooks,
            bus,
            token: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }
}

struct DevLoop {
    plan: Arc<LaunchPlan>,
    port: Arc<AtomicU16>,
    hooks: Arc<dyn SessionHooks>,
    bus: Bus,
    token: CancellationToken,
    descriptors: Descriptors,
    watcher: Option<SourceWatcher>,
}

impl DevLoop {
    async fn run(self) {
        let mut crashes: u32 = 0;
        loop {
            let baseline = self.watcher.as_ref().map_or(0, SourceWatcher::revision);
            let Some(outcome) = self.run_once(baseline).await else {
                return;
            };
            debug!(outcome = outcome.as_label(), "app run ended");
            let crashed = !matches!(outcome, Outcome::SourceChanged);

            if self.hooks.on_run_end(outcome.clone()).await == RunEndAction::Stop
                || self.token.is_cancelled()
            {
                return;
            }

            if crashed {
                match &self.watcher {
                    Some(w) => {
                        self.bus.publish(Event::new(EventKind::AppWaitingForChange).with_component(NAME));
                        if w.wait_for_change(baseline, &self.token).await.is_none() {
                            return;
                        }
                        crashes = 0;
                    }
                    None => {
                        crashes += 1;
                        let delay = self.plan.backoff.delay_after(crashes);
                        tokio::select! {
                            _ = self.token.cancelled() => return,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            } else {
                crashes = 0;
            }

            self.bus.publish(
                Event::new(EventKind::AppRestarting)
                    .with_component(NAME)
                    .with_port(self.port.load(Ordering::Acquire))
                    .with_reason(outcome.as_label()),
            );
        }
    }

    /// One pass of checks, build, launch and wait. `None` means cancelled.
    async fn run_once(&self, baseline: Revision) -> Option<Outcome> {
        if let Some(needed) = read_state_file(&self.plan.version_dir, "release").await
            && !needed.is_empty()
            && needed != self.plan.release.current
        {
            return Some(Outcome::WrongRelease {
                release_needed: needed,
            });
        }
        let now = Descriptors::read(&self.plan.version_dir).await;
        if let Some(kind) = self.descriptors.drift(&now) {
            return Some(Outcome::OutdatedPlatformDescriptors(kind));
        }

        if let Some(build) = &self.plan.build
            && let Some(outcome) = self.build(build).instrument(info_span!("build")).await?
        {
            return Some(outcome);
        }

        let settings = match &self.plan.settings_file {
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(text) => Some(text),
                Err(e) => {
                    return Some(Outcome::BundleFailure(single_error(
                        Some(path),
                        format!("could not read settings file: {e}"),
                    )));
                }
            },
            None => None,
        };

        let port = self.port.load(Ordering::Acquire);
        let plan = &self.plan;
        let mut cmd = Command::new(&plan.program.command);
        cmd.args(&plan.program.args)
            .current_dir(&plan.app_dir)
            .envs(&plan.program.env)
            .env("PORT", port.to_string())
            .env("BIND_IP", &plan.bind_ip)
            .env("ROOT_URL", &plan.root_url)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(url) = &plan.database.url {
            cmd.env("DATABASE_URL", url);
        }
        if let Some(url) = &plan.database.change_feed_url {
            cmd.env("DATABASE_CHANGE_FEED_URL", url);
        }
        if let Some(settings) = settings {
            cmd.env("APP_SETTINGS", settings);
        }
        if let Some(debug_port) = plan.debug_port {
            cmd.env("DEBUG_PORT", debug_port.to_string());
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %plan.program.command, error = %e, "could not launch app");
                return Some(Outcome::Terminated);
            }
        };
        debug!(port, pid = child.id(), "app launched");

        let changed = async {
            match &self.watcher {
                Some(w) => w.wait_for_change(baseline, &self.token).await,
                None => {
                    self.token.cancelled().await;
                    None
                }
            }
        };
        tokio::select! {
            _ = self.token.cancelled() => {
                let _ = child.kill().await;
                None
            }
            status = child.wait() => Some(match status {
                Ok(status) => exit_outcome(status),
                Err(e) => {
                    warn!(error = %e, "lost track of app process");
                    Outcome::Terminated
                }
            }),
            Some(_) = changed => {
                let _ = child.kill().await;
                Some(Outcome::SourceChanged)
            }
        }
    }

    /// Runs the build step. `Ok(None)` is a successful build, `None` is cancellation.
    async fn build(&self, build: &BuildOptions) -> Option<Option<Outcome>> {
        let output = Command::new(&build.command)
            .args(&build.args)
            .current_dir(&self.plan.app_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = tokio::select! {
            _ = self.token.cancelled() => return None,
            output = output => output,
        };
        let output = match output {
            Ok(o) => o,
            Err(e) => {
                return Some(Some(Outcome::BundleFailure(single_error(
                    None,
                    format!("could not run `{}`: {e}", build.command),
                ))));
            }
        };
        if output.status.success() {
            return Some(None);
        }
        if output.status.code() == Some(CONFLICT_EXIT_CODE) {
            return Some(Some(Outcome::ConflictingVersions));
        }
        let mut errors = BuildErrors::from_output(&String::from_utf8_lossy(&output.stderr));
        if errors.is_empty() {
            errors.push(BuildMessage {
                file: None,
                line: None,
                message: format!("`{}` failed ({})", build.command, output.status),
            });
        }
        Some(Some(Outcome::BundleFailure(errors)))
    }
}

fn single_error(file: Option<&Path>, message: String) -> BuildErrors {
    let mut errors = BuildErrors::new();
    errors.push(BuildMessage {
        file: file.map(|p| p.display().to_string()),
        line: None,
        message,
    });
    errors
}

fn exit_outcome(status: ExitStatus) -> Outcome {
    if let Some(code) = status.code() {
        return Outcome::SuccessExit(ProcessExit::Code(code));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Outcome::SuccessExit(ProcessExit::Signal(signal));
        }
    }
    Outcome::Terminated
}

#[async_trait]
impl Component for ProcessApp {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<(), ComponentError> {
        let mut slot = self.task.lock().await;
        if slot.is_some() || self.token.is_cancelled() {
            return Ok(());
        }
        let watcher = match &self.plan.watch {
            Some((root, debounce)) => Some(SourceWatcher::new(root, *debounce).map_err(|e| {
                ComponentError::failed(NAME, format!("could not watch {}: {e}", root.display()))
            })?),
            None => None,
        };
        let dev = DevLoop {
            plan: Arc::clone(&self.plan),
            port: Arc::clone(&self.port),
            hooks: Arc::clone(&self.hooks),
            bus: self.bus.clone(),
            token: self.token.clone(),
            descriptors: Descriptors::read(&self.plan.version_dir).await,
            watcher,
        };
        *slot = Some(tokio::spawn(dev.run()));
        Ok(())
    }

    async fn stop(&self) {
        self.token.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
    }
}

impl AppManager for ProcessApp {
    fn port(&self) -> u16 {
        self.port.load(Ordering::Acquire)
    }

    fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::Release);
    }
}
