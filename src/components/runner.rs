//! Auxiliary runner backed by an external command.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{AuxiliaryRunner, FailureReporter};
use crate::error::ComponentError;

/// Runs one command for the lifetime of the session.
///
/// Output goes to `<log dir>/<title>.log` when a log directory is set
/// (created by `prestart`), otherwise it is discarded. A nonzero exit while
/// the session is running is reported as a failure.
pub struct CommandRunner {
    title: String,
    command: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    log_dir: Option<PathBuf>,
    reporter: FailureReporter,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CommandRunner {
    /// Creates a runner for `command args...`.
    pub fn new(
        title: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        reporter: FailureReporter,
    ) -> Self {
        Self {
            title: title.into(),
            command: command.into(),
            args,
            env: Vec::new(),
            log_dir: None,
            reporter,
            token: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Adds an environment variable for the command.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sends the command's output to a log file in `dir`.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    fn log_path(&self) -> Option<PathBuf> {
        let slug: String = self
            .title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        self.log_dir.as_ref().map(|d| d.join(format!("{slug}.log")))
    }

    fn output(&self) -> Result<(Stdio, Stdio), ComponentError> {
        let Some(path) = self.log_path() else {
            return Ok((Stdio::null(), Stdio::null()));
        };
        let io = |source| ComponentError::Io {
            component: self.title.clone(),
            source,
        };
        let file = std::fs::File::create(&path).map_err(io)?;
        let err = file.try_clone().map_err(io)?;
        Ok((Stdio::from(file), Stdio::from(err)))
    }
}

async fn watch(
    mut child: Child,
    title: String,
    token: CancellationToken,
    reporter: FailureReporter,
) {
    let status = tokio::select! {
        _ = token.cancelled() => {
            let _ = child.kill().await;
            return;
        }
        status = child.wait() => status,
    };
    match status {
        Ok(s) if s.success() => debug!(runner = %title, "runner finished"),
        Ok(s) => reporter.report(ComponentError::Exited {
            component: title,
            status: s.to_string(),
        }),
        Err(source) => reporter.report(ComponentError::Io {
            component: title,
            source,
        }),
    }
}

#[async_trait]
impl AuxiliaryRunner for CommandRunner {
    fn title(&self) -> &str {
        &self.title
    }

    async fn prestart(&self) -> Result<(), ComponentError> {
        if let Some(dir) = &self.log_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| ComponentError::Io {
                    component: self.title.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), ComponentError> {
        let (stdout, stderr) = self.output()?;
        let child = Command::new(&self.command)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ComponentError::Spawn {
                component: self.title.clone(),
                command: self.command.clone(),
                source,
            })?;
        *self.task.lock().await = Some(tokio::spawn(watch(
            child,
            self.title.clone(),
            self.token.clone(),
            self.reporter.clone(),
        )));
        Ok(())
    }

    async fn stop(&self) {
        self.token.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
    }
}
