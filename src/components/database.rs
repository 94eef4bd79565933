//! Locally managed database process(es).
//!
//! ```text
//! start():
//!   mkdir <app>/.devvisor/db[/<n>]
//!   spawn command {port}/{dbpath}  ──►  poll TCP connect until ready (or timeout)
//!   monitor task per process:
//!     exit ──► backoff sleep ──► respawn        (at most MAX_RESTARTS in a row)
//!          └─► FailureReporter::report(Exited)  (budget exhausted)
//! ```

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Component, DatabaseManager, FailureReporter};
use crate::config::{DATABASE_REPLICAS, SessionConfig};
use crate::error::ComponentError;
use crate::policies::BackoffPolicy;

const NAME: &str = "database";

/// Consecutive crashes tolerated before the session is failed.
const MAX_RESTARTS: u32 = 3;

/// A process that stayed up this long resets the crash counter.
const STABLE_UPTIME: Duration = Duration::from_secs(30);

const READY_POLL: Duration = Duration::from_millis(100);

/// One database server process slot.
#[derive(Clone, Debug)]
struct Instance {
    port: u16,
    db_path: PathBuf,
}

/// Launches and supervises the session's database server.
pub struct ProcessDatabase {
    command: String,
    args: Vec<String>,
    instances: Vec<Instance>,
    wipe_data: bool,
    url: String,
    change_feed_url: Option<String>,
    startup_timeout: Duration,
    backoff: BackoffPolicy,
    reporter: FailureReporter,
    token: CancellationToken,
    monitors: Mutex<Vec<JoinHandle<()>>>,
}

impl ProcessDatabase {
    /// Creates the manager from the session config.
    ///
    /// With `multiple` set, three processes run on consecutive ports starting
    /// at the database port and their data directories are wiped on start.
    pub fn new(cfg: &SessionConfig, multiple: bool, reporter: FailureReporter) -> Self {
        let port = cfg.database_port();
        let base = cfg.state_dir().join("db");
        let instances = if multiple {
            (0..DATABASE_REPLICAS)
                .map(|i| Instance {
                    port: port.saturating_add(i),
                    db_path: base.join(i.to_string()),
                })
                .collect()
        } else {
            vec![Instance {
                port,
                db_path: base,
            }]
        };
        let port_text = port.to_string();
        let change_feed_url = (!cfg.disable_change_feed)
            .then(|| cfg.database.change_feed_template.replace("{port}", &port_text));

        Self {
            command: cfg.database.command.clone(),
            args: cfg.database.args.clone(),
            instances,
            wipe_data: multiple,
            url: cfg.database.url_template.replace("{port}", &port_text),
            change_feed_url,
            startup_timeout: Duration::from_secs(cfg.database.startup_timeout_secs.max(1)),
            backoff: cfg.restart_backoff.into(),
            reporter,
            token: CancellationToken::new(),
            monitors: Mutex::new(Vec::new()),
        }
    }

    /// Ports of the managed processes.
    pub fn ports(&self) -> Vec<u16> {
        self.instances.iter().map(|i| i.port).collect()
    }

    fn io_error(source: std::io::Error) -> ComponentError {
        ComponentError::Io {
            component: NAME.into(),
            source,
        }
    }

    async fn prepare(&self, inst: &Instance) -> Result<(), ComponentError> {
        if self.wipe_data && tokio::fs::metadata(&inst.db_path).await.is_ok() {
            tokio::fs::remove_dir_all(&inst.db_path)
                .await
                .map_err(Self::io_error)?;
        }
        tokio::fs::create_dir_all(&inst.db_path)
            .await
            .map_err(Self::io_error)
    }

    async fn wait_ready(&self, child: &mut Child, port: u16) -> Result<(), ComponentError> {
        let deadline = Instant::now() + self.startup_timeout;
        loop {
            if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                return Ok(());
            }
            if let Some(status) = child.try_wait().map_err(Self::io_error)? {
                return Err(ComponentError::Exited {
                    component: NAME.into(),
                    status: status.to_string(),
                });
            }
            if Instant::now() >= deadline {
                return Err(ComponentError::failed(
                    NAME,
                    format!(
                        "port {port} not accepting connections after {}s",
                        self.startup_timeout.as_secs()
                    ),
                ));
            }
            tokio::select! {
                _ = self.token.cancelled() => {
                    return Err(ComponentError::failed(NAME, "stopped while starting"));
                }
                _ = tokio::time::sleep(READY_POLL) => {}
            }
        }
    }
}

fn spawn_instance(command: &str, args: &[String], inst: &Instance) -> Result<Child, ComponentError> {
    let port = inst.port.to_string();
    let db_path = inst.db_path.display().to_string();
    Command::new(command)
        .args(
            args.iter()
                .map(|a| a.replace("{port}", &port).replace("{dbpath}", &db_path)),
        )
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ComponentError::Spawn {
            component: NAME.into(),
            command: command.to_string(),
            source,
        })
}

struct Monitor {
    command: String,
    args: Vec<String>,
    inst: Instance,
    backoff: BackoffPolicy,
    reporter: FailureReporter,
    token: CancellationToken,
}

impl Monitor {
    async fn run(self, mut child: Child) {
        let mut crashes: u32 = 0;
        let mut started = Instant::now();
        loop {
            let status = tokio::select! {
                _ = self.token.cancelled() => {
                    let _ = child.kill().await;
                    return;
                }
                status = child.wait() => status,
            };
            let status = match status {
                Ok(s) => s.to_string(),
                Err(e) => e.to_string(),
            };
            if started.elapsed() >= STABLE_UPTIME {
                crashes = 0;
            }
            crashes += 1;
            if crashes > MAX_RESTARTS {
                self.reporter.report(ComponentError::Exited {
                    component: NAME.into(),
                    status,
                });
                return;
            }

            let delay = self.backoff.delay_after(crashes);
            warn!(port = self.inst.port, %status, crashes, ?delay, "database exited, restarting");
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            child = match spawn_instance(&self.command, &self.args, &self.inst) {
                Ok(c) => c,
                Err(e) => {
                    self.reporter.report(e);
                    return;
                }
            };
            started = Instant::now();
        }
    }
}

#[async_trait]
impl Component for ProcessDatabase {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<(), ComponentError> {
        if self.token.is_cancelled() {
            return Err(ComponentError::failed(NAME, "already stopped"));
        }
        for inst in &self.instances {
            self.prepare(inst).await?;
            let mut child = spawn_instance(&self.command, &self.args, inst)?;
            self.wait_ready(&mut child, inst.port).await?;
            debug!(port = inst.port, path = %inst.db_path.display(), "database accepting connections");

            let monitor = Monitor {
                command: self.command.clone(),
                args: self.args.clone(),
                inst: inst.clone(),
                backoff: self.backoff,
                reporter: self.reporter.clone(),
                token: self.token.clone(),
            };
            self.monitors.lock().await.push(tokio::spawn(monitor.run(child)));
        }
        if self.instances.len() > 1 {
            info!(ports = ?self.ports(), "database running in multiple-process test mode");
        }
        Ok(())
    }

    async fn stop(&self) {
        self.token.cancel();
        let monitors = std::mem::take(&mut *self.monitors.lock().await);
        for handle in monitors {
            let _ = handle.await;
        }
    }
}

impl DatabaseManager for ProcessDatabase {
    fn connection_url(&self) -> String {
        self.url.clone()
    }

    fn change_feed_url(&self) -> Option<String> {
        self.change_feed_url.clone()
    }
}
