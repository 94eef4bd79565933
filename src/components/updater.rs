//! Background check for newer platform releases. Purely advisory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::Component;
use crate::config::ReleaseConfig;
use crate::error::ComponentError;
use crate::events::{Bus, Event, EventKind};
use crate::outcome::display_release;

/// Where the newest advertised release is read from.
#[async_trait]
pub trait UpdateSource: Send + Sync + 'static {
    /// Newest release (`track@version`), if one is known.
    async fn latest_release(&self) -> Option<String>;
}

/// Reads the newest release name from a file (one line).
#[derive(Clone, Debug)]
pub struct LatestReleaseFile {
    path: PathBuf,
}

impl LatestReleaseFile {
    /// Creates a source backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl UpdateSource for LatestReleaseFile {
    async fn latest_release(&self) -> Option<String> {
        let text = tokio::fs::read_to_string(&self.path).await.ok()?;
        let name = text.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// Polls an [`UpdateSource`] and announces each newer release once.
pub struct PeriodicUpdateChecker {
    release: ReleaseConfig,
    interval: Duration,
    source: Arc<dyn UpdateSource>,
    bus: Bus,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicUpdateChecker {
    /// Creates a checker polling `source` every `interval`.
    pub fn new(
        release: ReleaseConfig,
        interval: Duration,
        source: Arc<dyn UpdateSource>,
        bus: Bus,
    ) -> Self {
        Self {
            release,
            interval,
            source,
            bus,
            token: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }
}

async fn poll(
    release: ReleaseConfig,
    interval: Duration,
    source: Arc<dyn UpdateSource>,
    bus: Bus,
    token: CancellationToken,
) {
    let mut announced: Option<String> = None;
    loop {
        if let Some(latest) = source.latest_release().await
            && latest != release.current
            && announced.as_deref() != Some(latest.as_str())
        {
            bus.publish(
                Event::new(EventKind::UpdateAvailable)
                    .with_component("update checker")
                    .with_detail(display_release(&latest, &release)),
            );
            announced = Some(latest);
        } else {
            trace!("no newer release");
        }
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[async_trait]
impl Component for PeriodicUpdateChecker {
    fn name(&self) -> &str {
        "update checker"
    }

    async fn start(&self) -> Result<(), ComponentError> {
        let mut slot = self.task.lock().await;
        if slot.is_none() && !self.token.is_cancelled() {
            *slot = Some(tokio::spawn(poll(
                self.release.clone(),
                self.interval,
                Arc::clone(&self.source),
                self.bus.clone(),
                self.token.clone(),
            )));
        }
        Ok(())
    }

    async fn stop(&self) {
        self.token.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
    }
}
