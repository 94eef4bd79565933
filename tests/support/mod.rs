//! In-memory children for driving sessions without processes or sockets.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use devvisor::{
    AppManager, AuxiliaryRunner, BuildContext, Component, ComponentError, ComponentFactory,
    Components, DatabaseManager, Event, FailureReporter, Outcome, ReverseProxy, RunEndAction,
    SessionConfig, SessionHooks, Subscribe, SupervisorError,
};

/// Ordered record of lifecycle calls, e.g. `start database`, `stop proxy`.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.count(entry) > 0
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// How a fake child behaves on `start()`.
#[derive(Clone, Debug, Default)]
pub enum StartBehavior {
    #[default]
    Succeed,
    /// `start()` returns an error.
    Fail,
    /// Reports a failure through the reporter, then blocks until stopped.
    ReportAndWait,
    /// `prestart()` returns an error; `start()` would succeed.
    FailPrestart,
}

/// Generic fake child.
pub struct FakeComponent {
    name: String,
    journal: Journal,
    behavior: StartBehavior,
    reporter: FailureReporter,
    token: CancellationToken,
}

impl FakeComponent {
    pub fn new(name: &str, journal: &Journal, behavior: StartBehavior, reporter: FailureReporter) -> Self {
        Self {
            name: name.into(),
            journal: journal.clone(),
            behavior,
            reporter,
            token: CancellationToken::new(),
        }
    }

    async fn do_start(&self) -> Result<(), ComponentError> {
        self.journal.record(format!("start {}", self.name));
        match self.behavior {
            StartBehavior::Succeed | StartBehavior::FailPrestart => Ok(()),
            StartBehavior::Fail => Err(ComponentError::failed(self.name.clone(), "port busy")),
            StartBehavior::ReportAndWait => {
                self.reporter
                    .report(ComponentError::failed(self.name.clone(), "died while starting"));
                self.token.cancelled().await;
                Ok(())
            }
        }
    }

    async fn do_stop(&self) {
        self.token.cancel();
        self.journal.record(format!("stop {}", self.name));
    }
}

#[async_trait]
impl Component for FakeComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), ComponentError> {
        self.do_start().await
    }

    async fn stop(&self) {
        self.do_stop().await;
    }
}

#[async_trait]
impl AuxiliaryRunner for FakeComponent {
    fn title(&self) -> &str {
        &self.name
    }

    async fn prestart(&self) -> Result<(), ComponentError> {
        self.journal.record(format!("prestart {}", self.name));
        match self.behavior {
            StartBehavior::FailPrestart => {
                Err(ComponentError::failed(self.name.clone(), "log directory is read-only"))
            }
            _ => Ok(()),
        }
    }

    async fn start(&self) -> Result<(), ComponentError> {
        self.do_start().await
    }

    async fn stop(&self) {
        self.do_stop().await;
    }
}

impl DatabaseManager for FakeComponent {
    fn connection_url(&self) -> String {
        "mongodb://127.0.0.1:1/app".into()
    }

    fn change_feed_url(&self) -> Option<String> {
        None
    }
}

/// Fake proxy remembering its forward port.
pub struct FakeProxy {
    inner: FakeComponent,
    forward: AtomicU16,
}

#[async_trait]
impl Component for FakeProxy {
    fn name(&self) -> &str {
        "proxy"
    }

    async fn start(&self) -> Result<(), ComponentError> {
        self.inner.do_start().await
    }

    async fn stop(&self) {
        self.inner.do_stop().await;
    }
}

impl ReverseProxy for FakeProxy {
    fn forward_port(&self) -> u16 {
        self.forward.load(Ordering::SeqCst)
    }

    fn set_forward_port(&self, port: u16) {
        self.forward.store(port, Ordering::SeqCst);
    }
}

/// What the fake app does on each launch.
#[derive(Clone, Debug)]
pub enum AppStep {
    /// The process ends with this outcome.
    Exit(Outcome),
    /// A failure is reported, then the process ends with this outcome once stopped.
    FailThenExit(Outcome),
}

struct AppState {
    journal: Journal,
    port: AtomicU16,
    proxy: Arc<FakeProxy>,
    hooks: Arc<dyn SessionHooks>,
    reporter: FailureReporter,
    script: Mutex<VecDeque<AppStep>>,
    launches: Mutex<Vec<(u16, u16)>>,
    token: CancellationToken,
}

/// Fake app manager replaying a script of run outcomes.
pub struct FakeApp {
    state: Arc<AppState>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl FakeApp {
    /// `(app port, proxy forward port)` seen at each launch.
    pub fn launches(&self) -> Vec<(u16, u16)> {
        self.state.launches.lock().unwrap().clone()
    }
}

async fn replay(state: Arc<AppState>) {
    loop {
        let port = state.port.load(Ordering::SeqCst);
        state.launches.lock().unwrap().push((port, state.proxy.forward_port()));
        state.journal.record("launch app");

        let step = state.script.lock().unwrap().pop_front();
        let outcome = match step {
            None => {
                state.token.cancelled().await;
                return;
            }
            Some(AppStep::Exit(outcome)) => outcome,
            Some(AppStep::FailThenExit(outcome)) => {
                state
                    .reporter
                    .report(ComponentError::failed("your app", "debugger crashed"));
                state.token.cancelled().await;
                outcome
            }
        };
        state.journal.record(format!("app ended {}", outcome.as_label()));
        if state.hooks.on_run_end(outcome).await == RunEndAction::Stop {
            return;
        }
        if state.token.is_cancelled() {
            return;
        }
    }
}

#[async_trait]
impl Component for FakeApp {
    fn name(&self) -> &str {
        "your app"
    }

    async fn start(&self) -> Result<(), ComponentError> {
        self.state.journal.record("start your app");
        *self.task.lock().await = Some(tokio::spawn(replay(Arc::clone(&self.state))));
        Ok(())
    }

    async fn stop(&self) {
        self.state.token.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
        self.state.journal.record("stop your app");
    }
}

impl AppManager for FakeApp {
    fn port(&self) -> u16 {
        self.state.port.load(Ordering::SeqCst)
    }

    fn set_port(&self, port: u16) {
        self.state.port.store(port, Ordering::SeqCst);
    }
}

/// Shape of a fake session.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    pub proxy: StartBehavior,
    pub database: Option<StartBehavior>,
    pub secondary: Option<StartBehavior>,
    pub auxiliary: Vec<(String, StartBehavior)>,
    pub automation: bool,
    pub app: Vec<AppStep>,
}

/// Factory producing fakes and keeping handles to the built app.
pub struct FakeFactory {
    pub journal: Journal,
    plan: Plan,
    app: Mutex<Option<Arc<FakeApp>>>,
}

impl FakeFactory {
    pub fn new(plan: Plan) -> Arc<Self> {
        Arc::new(Self {
            journal: Journal::default(),
            plan,
            app: Mutex::new(None),
        })
    }

    pub fn app(&self) -> Arc<FakeApp> {
        self.app.lock().unwrap().clone().expect("app built")
    }
}

impl ComponentFactory for FakeFactory {
    fn build(&self, cx: &BuildContext<'_>) -> Result<Components, SupervisorError> {
        let j = &self.journal;
        let proxy = Arc::new(FakeProxy {
            inner: FakeComponent::new("proxy", j, self.plan.proxy.clone(), cx.reporter()),
            forward: AtomicU16::new(cx.app_port),
        });
        let app = Arc::new(FakeApp {
            state: Arc::new(AppState {
                journal: j.clone(),
                port: AtomicU16::new(cx.app_port),
                proxy: Arc::clone(&proxy),
                hooks: Arc::clone(&cx.hooks),
                reporter: cx.reporter(),
                script: Mutex::new(self.plan.app.iter().cloned().collect()),
                launches: Mutex::new(Vec::new()),
                token: CancellationToken::new(),
            }),
            task: tokio::sync::Mutex::new(None),
        });
        *self.app.lock().unwrap() = Some(Arc::clone(&app));

        let fake = |name: &str, behavior: &StartBehavior| {
            Arc::new(FakeComponent::new(name, j, behavior.clone(), cx.reporter()))
        };
        Ok(Components {
            proxy,
            secondary_proxy: self
                .plan
                .secondary
                .as_ref()
                .map(|b| fake("secondary proxy", b) as Arc<dyn Component>),
            database: self
                .plan
                .database
                .as_ref()
                .map(|b| fake("database", b) as Arc<dyn DatabaseManager>),
            updater: fake("update checker", &StartBehavior::Succeed),
            app,
            auxiliary: self
                .plan
                .auxiliary
                .iter()
                .map(|(title, b)| fake(title, b) as Arc<dyn AuxiliaryRunner>)
                .collect(),
            automation: self
                .plan
                .automation
                .then(|| fake("automation", &StartBehavior::Succeed) as Arc<dyn AuxiliaryRunner>),
        })
    }
}

/// Subscriber keeping every event it sees.
#[derive(Default)]
pub struct EventLog(pub Mutex<Vec<Event>>);

#[async_trait]
impl Subscribe for EventLog {
    async fn on_event(&self, ev: &Event) {
        self.0.lock().unwrap().push(ev.clone());
    }

    fn name(&self) -> &'static str {
        "event-log"
    }
}

/// A valid config for fake sessions.
pub fn config(once: bool) -> SessionConfig {
    SessionConfig {
        app_dir: ".".into(),
        proxy_port: 3000,
        once,
        ..SessionConfig::default()
    }
}
