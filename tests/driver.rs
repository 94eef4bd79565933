mod support;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use devvisor::{
    APP_PORT_RANGE, BuildErrors, DescriptorKind, Driver, EventKind, Outcome, ProcessExit,
    Subscribe,
};
use support::{AppStep, EventLog, FakeFactory, Plan, StartBehavior, config};

const LIMIT: Duration = Duration::from_secs(10);

async fn drive(once: bool, plan: Plan) -> (Arc<FakeFactory>, devvisor::ExitReport) {
    drive_with(config(once), plan).await
}

async fn drive_with(
    cfg: devvisor::SessionConfig,
    plan: Plan,
) -> (Arc<FakeFactory>, devvisor::ExitReport) {
    let factory = FakeFactory::new(plan);
    let report = tokio::time::timeout(
        LIMIT,
        Driver::new(cfg)
            .with_factory(factory.clone())
            .without_signal_handling()
            .run(),
    )
    .await
    .expect("session finished")
    .expect("exit report");
    (factory, report)
}

fn exit(outcome: Outcome) -> AppStep {
    AppStep::Exit(outcome)
}

#[tokio::test]
async fn one_shot_exit_code_is_returned() {
    let plan = Plan {
        app: vec![exit(Outcome::SuccessExit(ProcessExit::Code(3)))],
        ..Plan::default()
    };
    let (factory, report) = drive(true, plan).await;
    assert_eq!(report.code, 3);
    assert_eq!(report.message, None);
    assert_eq!(factory.app().launches().len(), 1);
}

#[tokio::test]
async fn one_shot_signal_is_killed() {
    let plan = Plan {
        app: vec![exit(Outcome::SuccessExit(ProcessExit::Signal(9)))],
        ..Plan::default()
    };
    let (_, report) = drive(true, plan).await;
    assert_eq!(report.code, 255);
    assert!(report.message.unwrap().contains("Killed (9)"));
}

#[tokio::test]
async fn app_that_never_started_is_fatal_even_when_continuous() {
    let plan = Plan {
        app: vec![exit(Outcome::Terminated)],
        ..Plan::default()
    };
    let (factory, report) = drive(false, plan).await;
    assert_eq!(report.code, 254);
    assert_eq!(factory.app().launches().len(), 1);
}

#[tokio::test]
async fn continuous_crash_regenerates_port_and_restarts() {
    let plan = Plan {
        app: vec![
            exit(Outcome::SuccessExit(ProcessExit::Signal(9))),
            exit(Outcome::SuccessExit(ProcessExit::Code(1))),
            exit(Outcome::WrongRelease {
                release_needed: "X@2.0".into(),
            }),
        ],
        ..Plan::default()
    };
    let (factory, report) = drive(false, plan).await;

    let launches = factory.app().launches();
    assert_eq!(launches.len(), 3);
    for (app_port, forward) in &launches {
        assert_eq!(app_port, forward);
        assert!(APP_PORT_RANGE.contains(app_port));
    }
    assert_ne!(launches[0].0, launches[1].0);
    assert_ne!(launches[1].0, launches[2].0);

    assert_eq!(report.code, 254);
    assert!(report.message.unwrap().contains("X@2.0"));
}

#[tokio::test]
async fn pinned_port_survives_restarts() {
    let mut cfg = config(false);
    cfg.app_port = Some(24_567);
    let plan = Plan {
        app: vec![
            exit(Outcome::SuccessExit(ProcessExit::Signal(9))),
            exit(Outcome::SourceChanged),
            exit(Outcome::OutdatedPlatformDescriptors(DescriptorKind::Plugins)),
        ],
        ..Plan::default()
    };
    let (factory, report) = drive_with(cfg, plan).await;
    assert_eq!(
        factory.app().launches(),
        vec![(24_567, 24_567), (24_567, 24_567), (24_567, 24_567)]
    );
    assert_eq!(report.code, 254);
    assert!(report.message.unwrap().contains("plugins"));
}

#[tokio::test]
async fn database_failure_stops_before_app() {
    let plan = Plan {
        database: Some(StartBehavior::Fail),
        auxiliary: vec![("Lint Watcher".into(), StartBehavior::Succeed)],
        app: vec![exit(Outcome::SuccessExit(ProcessExit::Code(0)))],
        ..Plan::default()
    };
    let (factory, report) = drive(true, plan).await;
    let j = &factory.journal;

    assert_eq!(report.code, 254);
    assert!(j.contains("start database"));
    assert!(!j.contains("start Lint Watcher"));
    assert!(!j.contains("start your app"));
    assert!(factory.app().launches().is_empty());
    assert_eq!(j.count("stop proxy"), 1);
    assert_eq!(j.count("stop database"), 1);
}

#[tokio::test]
async fn async_failure_mid_start_skips_later_steps() {
    let plan = Plan {
        secondary: Some(StartBehavior::ReportAndWait),
        database: Some(StartBehavior::Succeed),
        auxiliary: vec![("Lint Watcher".into(), StartBehavior::Succeed)],
        automation: true,
        app: vec![exit(Outcome::SuccessExit(ProcessExit::Code(0)))],
        ..Plan::default()
    };
    let (factory, report) = drive(false, plan).await;
    let j = &factory.journal;

    assert_eq!(report.code, 254);
    assert!(j.contains("start proxy"));
    assert!(j.contains("start secondary proxy"));
    assert!(!j.contains("start database"));
    assert!(!j.contains("start Lint Watcher"));
    assert!(!j.contains("start your app"));
    assert!(!j.contains("start automation"));

    for name in ["proxy", "secondary proxy", "database", "Lint Watcher", "your app", "automation"] {
        assert_eq!(j.count(&format!("stop {name}")), 1, "stop {name}");
    }
}

#[tokio::test]
async fn startup_order_and_prestart() {
    let plan = Plan {
        secondary: Some(StartBehavior::Succeed),
        database: Some(StartBehavior::Succeed),
        auxiliary: vec![
            ("First Runner".into(), StartBehavior::Succeed),
            ("Second Runner".into(), StartBehavior::Succeed),
        ],
        automation: true,
        app: vec![exit(Outcome::SuccessExit(ProcessExit::Code(0)))],
        ..Plan::default()
    };
    let (factory, report) = drive(true, plan).await;
    assert_eq!(report.code, 0);

    let order: Vec<String> = factory
        .journal
        .entries()
        .into_iter()
        .filter(|e| e.starts_with("start") || e.starts_with("prestart"))
        .collect();
    assert_eq!(
        order,
        [
            "prestart First Runner",
            "prestart Second Runner",
            "start proxy",
            "start update checker",
            "start secondary proxy",
            "start database",
            "start First Runner",
            "start Second Runner",
            "start your app",
            "start automation",
        ]
    );
}

#[tokio::test]
async fn run_end_after_failure_is_ignored() {
    let plan = Plan {
        app: vec![AppStep::FailThenExit(Outcome::SuccessExit(ProcessExit::Code(0)))],
        ..Plan::default()
    };
    let (factory, report) = drive(true, plan).await;
    assert_eq!(report.code, 254);
    assert!(factory.journal.contains("app ended success-exit"));
    assert_eq!(factory.journal.count("stop your app"), 1);
}

#[tokio::test]
async fn run_log_sink_is_finalized_once_with_every_event() {
    let log = Arc::new(EventLog::default());
    let factory = FakeFactory::new(Plan {
        app: vec![exit(Outcome::SuccessExit(ProcessExit::Code(0)))],
        ..Plan::default()
    });
    let report = Driver::new(config(true))
        .with_factory(factory.clone())
        .with_subscribers(vec![log.clone() as Arc<dyn Subscribe>])
        .without_signal_handling()
        .run()
        .await
        .unwrap();
    assert_eq!(report.code, 0);

    let kinds: Vec<EventKind> = log.0.lock().unwrap().iter().map(|e| e.kind).collect();
    let pos = |k: EventKind| kinds.iter().position(|x| *x == k).unwrap();
    assert!(pos(EventKind::SessionBanner) < pos(EventKind::AppRunning));
    assert!(pos(EventKind::OutcomeResolved) < pos(EventKind::ShutdownRequested));
    assert_eq!(kinds.last(), Some(&EventKind::SessionStopped));
    assert_eq!(kinds.iter().filter(|k| **k == EventKind::SessionStopped).count(), 1);
}

#[tokio::test]
async fn auxiliary_runner_failure_skips_later_runners_and_app() {
    let plan = Plan {
        database: Some(StartBehavior::Succeed),
        auxiliary: vec![
            ("First Runner".into(), StartBehavior::Fail),
            ("Second Runner".into(), StartBehavior::Succeed),
        ],
        automation: true,
        app: vec![exit(Outcome::SuccessExit(ProcessExit::Code(0)))],
        ..Plan::default()
    };
    let (factory, report) = drive(false, plan).await;
    let j = &factory.journal;

    assert_eq!(report.code, 254);
    assert_eq!(report.message, None);
    assert!(j.contains("start database"));
    assert!(j.contains("start First Runner"));
    assert!(!j.contains("start Second Runner"));
    assert!(!j.contains("start your app"));
    assert!(!j.contains("start automation"));
    for name in ["proxy", "database", "First Runner", "Second Runner", "your app", "automation"] {
        assert_eq!(j.count(&format!("stop {name}")), 1, "stop {name}");
    }
}

#[tokio::test]
async fn prestart_failure_starts_nothing() {
    let plan = Plan {
        auxiliary: vec![
            ("First Runner".into(), StartBehavior::FailPrestart),
            ("Second Runner".into(), StartBehavior::Succeed),
        ],
        app: vec![exit(Outcome::SuccessExit(ProcessExit::Code(0)))],
        ..Plan::default()
    };
    let (factory, report) = drive(true, plan).await;
    let j = &factory.journal;

    assert_eq!(report.code, 254);
    assert!(j.contains("prestart First Runner"));
    assert!(!j.contains("prestart Second Runner"));
    assert!(!j.entries().iter().any(|e| e.starts_with("start ")));
    assert_eq!(j.count("stop proxy"), 1);
    assert_eq!(j.count("stop Second Runner"), 1);
}

#[tokio::test]
async fn interrupt_resolves_and_stops_everything() {
    let factory = FakeFactory::new(Plan {
        database: Some(StartBehavior::Succeed),
        ..Plan::default()
    });
    let interrupt = CancellationToken::new();

    let trigger = {
        let factory = factory.clone();
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            while !factory.journal.contains("launch app") {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            interrupt.cancel();
        })
    };
    let report = tokio::time::timeout(
        LIMIT,
        Driver::new(config(false))
            .with_factory(factory.clone())
            .without_signal_handling()
            .with_interrupt(interrupt)
            .run(),
    )
    .await
    .expect("session finished")
    .expect("exit report");
    trigger.await.unwrap();

    assert_eq!(report.code, 130);
    assert_eq!(report.message, None);
    assert_eq!(factory.journal.count("stop your app"), 1);
    assert_eq!(factory.journal.count("stop database"), 1);
    assert_eq!(factory.journal.count("stop proxy"), 1);
}

#[tokio::test]
async fn one_shot_bundle_failure_prints_build_errors() {
    let errors = BuildErrors::from_output("client/main.js:3: Unexpected token\n");
    let plan = Plan {
        app: vec![exit(Outcome::BundleFailure(errors))],
        ..Plan::default()
    };
    let (factory, report) = drive(true, plan).await;

    assert_eq!(report.code, 254);
    let message = report.message.unwrap();
    assert!(message.starts_with("Errors prevented startup:"));
    assert!(message.contains("client/main.js:3: Unexpected token"));
    assert_eq!(factory.app().launches().len(), 1);
}

#[tokio::test]
async fn continuous_bundle_failure_restarts_without_resolving() {
    let errors = BuildErrors::from_output("client/main.js:3: Unexpected token\n");
    let plan = Plan {
        app: vec![
            exit(Outcome::BundleFailure(errors.clone())),
            exit(Outcome::BundleFailure(errors)),
            exit(Outcome::Terminated),
        ],
        ..Plan::default()
    };
    let (factory, report) = drive(false, plan).await;

    assert_eq!(factory.journal.count("app ended bundle-failure"), 2);
    let launches = factory.app().launches();
    assert_eq!(launches.len(), 3);
    assert_ne!(launches[0].0, launches[1].0);
    assert_ne!(launches[1].0, launches[2].0);
    // Only the final, always-terminal outcome reaches the exit mapping.
    assert_eq!(report.code, 254);
    assert_eq!(report.message, None);
}

#[tokio::test]
async fn no_banner_when_failure_lands_during_proxy_bind() {
    let log = Arc::new(EventLog::default());
    let factory = FakeFactory::new(Plan {
        proxy: StartBehavior::ReportAndWait,
        app: vec![exit(Outcome::SuccessExit(ProcessExit::Code(0)))],
        ..Plan::default()
    });
    let report = tokio::time::timeout(
        LIMIT,
        Driver::new(config(true))
            .with_factory(factory.clone())
            .with_subscribers(vec![log.clone() as Arc<dyn Subscribe>])
            .without_signal_handling()
            .run(),
    )
    .await
    .expect("session finished")
    .expect("exit report");

    assert_eq!(report.code, 254);
    assert!(!factory.journal.contains("start update checker"));
    let events = log.0.lock().unwrap();
    assert!(events.iter().any(|e| e.kind == EventKind::ComponentFailed));
    assert!(!events.iter().any(|e| e.kind == EventKind::SessionBanner));
    assert!(!events.iter().any(|e| {
        e.kind == EventKind::ComponentStarted && e.component.as_deref() == Some("proxy")
    }));
}
