//! Wiring of a session's children from its configuration.

use std::net::IpAddr;
use std::sync::Arc;

use super::app::DatabaseUrls;
use super::{
    AppManager, AuxiliaryRunner, CommandRunner, Component, DatabaseManager, FailureReporter,
    LatestReleaseFile, PeriodicUpdateChecker, ProcessApp, ProcessDatabase, ReverseProxy,
    SessionHooks, TcpReverseProxy,
};
use crate::config::{MULTIPLE_DB_ENV, SessionConfig};
use crate::error::SupervisorError;
use crate::events::Bus;

/// The full set of children owned by one supervisor.
pub struct Components {
    /// Public listener.
    pub proxy: Arc<dyn ReverseProxy>,
    /// Optional second listener.
    pub secondary_proxy: Option<Arc<dyn Component>>,
    /// Locally managed database; `None` when an external URL is configured.
    pub database: Option<Arc<dyn DatabaseManager>>,
    /// Release checker.
    pub updater: Arc<dyn Component>,
    /// The application process manager.
    pub app: Arc<dyn AppManager>,
    /// Extra runners, in declaration order.
    pub auxiliary: Vec<Arc<dyn AuxiliaryRunner>>,
    /// Browser automation harness, started last.
    pub automation: Option<Arc<dyn AuxiliaryRunner>>,
}

/// What a factory gets to build children with.
pub struct BuildContext<'a> {
    /// Session configuration.
    pub config: &'a SessionConfig,
    /// Initial application port.
    pub app_port: u16,
    /// Session hooks (run end and failure policy).
    pub hooks: Arc<dyn SessionHooks>,
    /// Session event bus.
    pub bus: Bus,
}

impl BuildContext<'_> {
    /// Failure reporter bound to this session.
    pub fn reporter(&self) -> FailureReporter {
        FailureReporter::new(Arc::clone(&self.hooks), self.bus.clone())
    }
}

/// Creates the children of a session.
pub trait ComponentFactory: Send + Sync {
    /// Builds every child for one session.
    fn build(&self, cx: &BuildContext<'_>) -> Result<Components, SupervisorError>;
}

/// Factory for the process- and socket-backed children.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessComponents;

impl ComponentFactory for ProcessComponents {
    fn build(&self, cx: &BuildContext<'_>) -> Result<Components, SupervisorError> {
        let cfg = cx.config;
        let target_host = cfg.app_host.clone().unwrap_or_else(|| "127.0.0.1".into());
        let proxy_host = cfg.proxy_host.clone().unwrap_or_else(|| "0.0.0.0".into());

        let proxy = Arc::new(TcpReverseProxy::new(
            "proxy",
            format!("{proxy_host}:{}", cfg.proxy_port),
            target_host,
            cx.app_port,
            cx.reporter(),
        ));
        let secondary_proxy = cfg.secondary_proxy_port.map(|port| {
            Arc::new(TcpReverseProxy::new(
                "secondary proxy",
                format!("{proxy_host}:{port}"),
                public_proxy_target(cfg.proxy_host.as_deref()),
                cfg.proxy_port,
                cx.reporter(),
            )) as Arc<dyn Component>
        });

        let (database, urls) = if cfg.database.is_managed() {
            let multiple = std::env::var_os(MULTIPLE_DB_ENV).is_some_and(|v| !v.is_empty());
            let db = Arc::new(ProcessDatabase::new(cfg, multiple, cx.reporter()));
            let urls = DatabaseUrls {
                url: Some(db.connection_url()),
                change_feed_url: db.change_feed_url(),
            };
            (Some(db as Arc<dyn DatabaseManager>), urls)
        } else {
            let urls = DatabaseUrls {
                url: cfg.database.url.clone(),
                change_feed_url: (!cfg.disable_change_feed)
                    .then(|| cfg.database.change_feed_url.clone())
                    .flatten(),
            };
            (None, urls)
        };

        let updater = Arc::new(PeriodicUpdateChecker::new(
            cfg.release.clone(),
            cfg.update_check_interval(),
            Arc::new(LatestReleaseFile::new(cfg.state_dir().join("latest-release"))),
            cx.bus.clone(),
        ));
        let app = Arc::new(ProcessApp::new(
            cfg,
            cx.app_port,
            urls,
            Arc::clone(&cx.hooks),
            cx.bus.clone(),
        ));

        let root_url = cfg.root_url();
        let logs = cfg.state_dir().join("logs");
        let auxiliary = cfg
            .auxiliary
            .iter()
            .map(|spec| {
                Arc::new(
                    CommandRunner::new(&spec.title, &spec.command, spec.args.clone(), cx.reporter())
                        .with_env("ROOT_URL", &root_url)
                        .with_log_dir(&logs),
                ) as Arc<dyn AuxiliaryRunner>
            })
            .collect();
        let automation = cfg.automation.as_ref().map(|spec| {
            Arc::new(
                CommandRunner::new("automation", &spec.command, spec.args.clone(), cx.reporter())
                    .with_env("ROOT_URL", &root_url)
                    .with_env("BROWSER", &spec.browser)
                    .with_log_dir(&logs),
            ) as Arc<dyn AuxiliaryRunner>
        });

        Ok(Components {
            proxy,
            secondary_proxy,
            database,
            updater,
            app,
            auxiliary,
            automation,
        })
    }
}

/// Host the secondary proxy dials to reach the public proxy.
///
/// A specific listen address is dialed as is; a wildcard one through loopback.
fn public_proxy_target(proxy_host: Option<&str>) -> String {
    match proxy_host.map(|h| h.trim_start_matches('[').trim_end_matches(']')) {
        Some(host)
            if !host.is_empty()
                && !host.parse::<IpAddr>().is_ok_and(|ip| ip.is_unspecified()) =>
        {
            host.to_string()
        }
        _ => "127.0.0.1".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secondary_proxy_dials_the_public_listener() {
        assert_eq!(public_proxy_target(None), "127.0.0.1");
        assert_eq!(public_proxy_target(Some("0.0.0.0")), "127.0.0.1");
        assert_eq!(public_proxy_target(Some("[::]")), "127.0.0.1");
        assert_eq!(public_proxy_target(Some("10.1.2.3")), "10.1.2.3");
        assert_eq!(public_proxy_target(Some("[::1]")), "::1");
        assert_eq!(public_proxy_target(Some("dev.local")), "dev.local");
    }
}
