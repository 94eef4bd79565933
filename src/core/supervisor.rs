//! # Supervisor: owns every child of a development session.
//!
//! The [`Supervisor`] sequences startup, tears everything down exactly once,
//! and keeps the proxy and the app agreeing on the application port.
//!
//! ## Startup order
//! ```text
//! start():
//!   1. auxiliary[*].prestart()
//!   2. proxy.start()                  ──► banner, "Started proxy."
//!   3. updater.start()                (failure is only logged)
//!   4. secondary_proxy.start()        (if configured)
//!   5. job "Starting database"        (if managed locally)
//!   6. job "<title>" per auxiliary runner, in declaration order
//!   7. job "Starting your app"        ──► "App running at: <root url>"
//!   8. job "Starting automation"      (if configured)
//!
//! Every step first re-reads `stopped`: a failure reported asynchronously
//! (FailureReporter → on_failure → stop()) skips all later steps.
//! A step that fails itself calls hooks.on_failure(err) inline.
//! ```
//!
//! ## Event flow
//! ```text
//! Supervisor / children ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit
//!
//! stop():
//!   stopped.swap(true) ── already set ──► return
//!     └─► stop children (reverse start order)
//!     └─► publish SessionStopped
//!     └─► listener drains the bus, SubscriberSet::shutdown()  (once)
//! ```
//!
//! ## Port ownership
//! The supervisor is the only writer of the application port. Every write in
//! [`Supervisor::regenerate_app_port`] is immediately propagated to
//! [`ReverseProxy::set_forward_port`] and [`AppManager::set_port`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use tokio::sync::Mutex;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::builder::SupervisorBuilder;
use super::{job, ports};
use crate::components::{
    AppManager, AuxiliaryRunner, Component, Components, DatabaseManager, ReverseProxy,
    SessionHooks,
};
use crate::config::SessionConfig;
use crate::error::ComponentError;
use crate::events::{Bus, Event, EventKind};
use crate::outcome::Outcome;
use crate::subscribers::SubscriberSet;

/// Owner of one session's children.
pub struct Supervisor {
    banner: String,
    root_url: String,
    specified_app_port: Option<u16>,
    reserved_ports: Vec<u16>,
    app_port: AtomicU16,
    started: AtomicBool,
    stopped: AtomicBool,
    torn_down: CancellationToken,
    bus: Bus,
    listener: Mutex<Option<Listener>>,
    hooks: Arc<dyn SessionHooks>,

    proxy: Arc<dyn ReverseProxy>,
    secondary_proxy: Option<Arc<dyn Component>>,
    database: Option<Arc<dyn DatabaseManager>>,
    updater: Arc<dyn Component>,
    app: Arc<dyn AppManager>,
    auxiliary: Vec<Arc<dyn AuxiliaryRunner>>,
    automation: Option<Arc<dyn AuxiliaryRunner>>,
}

/// Bus → subscriber forwarding task.
struct Listener {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Listener {
    fn spawn(bus: &Bus, set: SubscriberSet) -> Self {
        let mut rx = bus.subscribe();
        let token = CancellationToken::new();
        let stop = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(n)) => warn!(skipped = n, "event listener lagged"),
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        loop {
                            match rx.try_recv() {
                                Ok(ev) => set.emit(&ev),
                                Err(TryRecvError::Lagged(_)) => continue,
                                Err(_) => break,
                            }
                        }
                        break;
                    }
                }
            }
            set.shutdown().await;
        });
        Self { token, handle }
    }

    async fn finish(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

impl Supervisor {
    /// Returns a builder for a session described by `config`.
    pub fn builder(config: SessionConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(config)
    }

    pub(crate) fn new_internal(
        config: &SessionConfig,
        app_port: u16,
        bus: Bus,
        subscribers: SubscriberSet,
        hooks: Arc<dyn SessionHooks>,
        children: Components,
    ) -> Self {
        let reserved_ports = ports::reserved_ports(config);
        let listener = (!subscribers.is_empty()).then(|| Listener::spawn(&bus, subscribers));

        Self {
            banner: config.banner(),
            root_url: config.root_url(),
            specified_app_port: config.app_port,
            reserved_ports,
            app_port: AtomicU16::new(app_port),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            torn_down: CancellationToken::new(),
            bus,
            listener: Mutex::new(listener),
            hooks,
            proxy: children.proxy,
            secondary_proxy: children.secondary_proxy,
            database: children.database,
            updater: children.updater,
            app: children.app,
            auxiliary: children.auxiliary,
            automation: children.automation,
        }
    }

    /// Starts every child in order. See the module docs for the sequence.
    ///
    /// Completion is only observable through the session hooks.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("supervisor already started");
            return;
        }

        for runner in &self.auxiliary {
            if self.is_stopped() {
                return;
            }
            if let Err(e) = runner.prestart().await {
                self.fail(e).await;
                return;
            }
        }

        if self.is_stopped() {
            return;
        }
        let proxy = self.proxy.name();
        self.bus.publish(Event::new(EventKind::ComponentStarting).with_component(proxy));
        if let Err(e) = self.proxy.start().await {
            self.fail(e).await;
            return;
        }
        if self.is_stopped() {
            return;
        }
        self.bus
            .publish(Event::new(EventKind::SessionBanner).with_detail(self.banner.as_str()));
        self.bus.publish(Event::new(EventKind::ComponentStarted).with_component(proxy));

        if let Err(e) = self.updater.start().await {
            warn!(error = %e, "update checker unavailable");
        }

        if let Some(secondary) = &self.secondary_proxy
            && !self.step(secondary.name(), None, || secondary.start()).await
        {
            return;
        }

        if let Some(db) = &self.database
            && !self
                .step(db.name(), Some("Starting database"), || db.start())
                .await
        {
            return;
        }

        for runner in &self.auxiliary {
            if !self
                .step(runner.title(), Some(runner.title()), || runner.start())
                .await
            {
                return;
            }
        }

        if !self
            .step(self.app.name(), Some("Starting your app"), || self.app.start())
            .await
        {
            return;
        }
        self.bus.publish(
            Event::new(EventKind::AppRunning)
                .with_port(self.app_port())
                .with_detail(self.root_url.as_str()),
        );

        if let Some(automation) = &self.automation {
            self.step(automation.title(), Some("Starting automation"), || {
                automation.start()
            })
            .await;
        }
    }

    /// Runs one gated start step. Returns `true` if startup may continue.
    async fn step<'a, F, Fut>(
        &'a self,
        component: &'a str,
        job_title: Option<&'a str>,
        start: F,
    ) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), ComponentError>> + 'a,
    {
        if self.is_stopped() {
            debug!(component, "skipped, session stopped");
            return false;
        }
        let mut starting = Event::new(EventKind::ComponentStarting).with_component(component);
        if let Some(title) = job_title {
            starting = starting.with_detail(title);
        }
        self.bus.publish(starting);
        let res = match job_title {
            Some(title) => job::run_job(title, start()).await,
            None => start().await,
        };
        match res {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::ComponentStarted).with_component(component));
                !self.is_stopped()
            }
            Err(e) => {
                self.fail(e).await;
                false
            }
        }
    }

    async fn fail(&self, err: ComponentError) {
        self.bus.publish(
            Event::new(EventKind::ComponentFailed)
                .with_component(err.component())
                .with_reason(err.as_message()),
        );
        self.hooks.on_failure(err).await;
    }

    /// Tears every child down. Only the first call does anything.
    ///
    /// The subscriber set is drained and shut down at the end of the first
    /// call; later calls return immediately (see [`Supervisor::wait_stopped`]).
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.bus.publish(Event::new(EventKind::ShutdownRequested));

        if let Some(automation) = &self.automation {
            automation.stop().await;
            self.stopped_event(automation.title());
        }
        self.app.stop().await;
        self.stopped_event(self.app.name());
        for runner in self.auxiliary.iter().rev() {
            runner.stop().await;
            self.stopped_event(runner.title());
        }
        if let Some(db) = &self.database {
            db.stop().await;
            self.stopped_event(db.name());
        }
        self.updater.stop().await;
        if let Some(secondary) = &self.secondary_proxy {
            secondary.stop().await;
            self.stopped_event(secondary.name());
        }
        self.proxy.stop().await;
        self.stopped_event(self.proxy.name());

        self.bus.publish(Event::new(EventKind::SessionStopped));
        if let Some(listener) = self.listener.lock().await.take() {
            listener.finish().await;
        }
        self.torn_down.cancel();
    }

    fn stopped_event(&self, component: &str) {
        self.bus
            .publish(Event::new(EventKind::ComponentStopped).with_component(component));
    }

    /// Resolves once the first [`Supervisor::stop`] call has finished tearing down.
    pub async fn wait_stopped(&self) {
        self.torn_down.cancelled().await;
    }

    /// Assigns a new application port and propagates it to the proxy and the app.
    ///
    /// A pinned port is reused verbatim. Otherwise every call draws a fresh
    /// random port different from the current one.
    pub fn regenerate_app_port(&self) -> u16 {
        let port = match self.specified_app_port {
            Some(pinned) => pinned,
            None => {
                let mut avoid = self.reserved_ports.clone();
                avoid.push(self.app_port());
                ports::random_port(&avoid)
            }
        };
        self.app_port.store(port, Ordering::Release);
        self.proxy.set_forward_port(port);
        self.app.set_port(port);
        self.bus
            .publish(Event::new(EventKind::PortRegenerated).with_port(port));
        port
    }

    /// Publishes the terminal outcome of the session.
    pub fn announce_outcome(&self, outcome: &Outcome) {
        self.bus.publish(
            Event::new(EventKind::OutcomeResolved)
                .with_reason(outcome.as_label())
                .with_detail(outcome.to_string()),
        );
    }

    /// Current application port.
    pub fn app_port(&self) -> u16 {
        self.app_port.load(Ordering::Acquire)
    }

    /// True once [`Supervisor::stop`] was called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Session event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// URL the app is served at.
    pub fn root_url(&self) -> &str {
        &self.root_url
    }
}
