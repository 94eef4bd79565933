//! # Session configuration.
//!
//! Provides [`SessionConfig`], the explicit, immutable description of one
//! development session. Every recognized field is enumerated here; config
//! files containing any other key are rejected.
//!
//! Config is used in two ways:
//! 1. **Driver**: `Driver::new(config).run()` (the driver forces `quiet` and
//!    `watch_for_changes` from `once`).
//! 2. **Component factory**: children are built from the same record.
//!
//! ## Sources
//! ```text
//! defaults ──► TOML file (optional) ──► CLI flags ──► SessionConfig::validate()
//! ```
//!
//! ## Sentinel values
//! - `app_port = None` → a random port is drawn on every regeneration
//! - `database.url = None` → the database process is managed locally
//! - `build = None` → the app is launched without a build step

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::SupervisorError;
use crate::policies::{BackoffPolicy, JitterPolicy};

/// Environment switch: run the managed database as a three-process replica
/// set (test mode, data is not preserved between runs).
pub const MULTIPLE_DB_ENV: &str = "DEVVISOR_TEST_MULTIPLE_DB_REPLSET";

/// Processes (on consecutive ports) in multiple-process database mode.
pub(crate) const DATABASE_REPLICAS: u16 = 3;

/// Directory (inside the app directory) holding session state.
pub const STATE_DIR: &str = ".devvisor";

/// Full description of a development session.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Application source directory.
    pub app_dir: PathBuf,
    /// Public port of the reverse proxy. Required, must be non-zero.
    pub proxy_port: u16,
    /// Interface the reverse proxy binds to (default: all interfaces).
    pub proxy_host: Option<String>,
    /// Pinned application port; `None` draws a random port.
    pub app_port: Option<u16>,
    /// Interface the application binds to (default: `127.0.0.1`).
    pub app_host: Option<String>,
    /// Port of the optional secondary proxy.
    pub secondary_proxy_port: Option<u16>,
    /// Database connection override or local management settings.
    pub database: DatabaseConfig,
    /// Do not hand a change-feed URL to the app.
    pub disable_change_feed: bool,
    /// Build step run before every launch.
    pub build: Option<BuildOptions>,
    /// File whose contents are passed to the app as settings.
    pub settings_file: Option<PathBuf>,
    /// Program launched as the application.
    pub program: AppProgram,
    /// Debugger port forwarded to the app.
    pub debug_port: Option<u16>,
    /// Explicit root URL; derived from the proxy address when absent.
    pub root_url: Option<String>,
    /// Banner printed on startup instead of the app path.
    pub banner: Option<String>,
    /// Suppress the run log.
    pub quiet: bool,
    /// Run the app exactly once and pass its exit code through.
    pub once: bool,
    /// Restart the app when its source tree changes.
    pub watch_for_changes: bool,
    /// Quiet period after a source change before the app is rebuilt, in milliseconds.
    pub watch_debounce_ms: u64,
    /// Extra process lifecycles started after the database.
    pub auxiliary: Vec<AuxiliaryRunnerSpec>,
    /// Browser-automation harness started last.
    pub automation: Option<AutomationSpec>,
    /// Directory checked for release/platform drift (default: `app_dir`).
    pub app_dir_for_version_check: Option<PathBuf>,
    /// Platform release information.
    pub release: ReleaseConfig,
    /// How often the update checker polls, in seconds.
    pub update_check_interval_secs: u64,
    /// Delay policy applied before relaunching crashed processes.
    pub restart_backoff: BackoffConfig,
}

impl Default for SessionConfig {
    /// Default configuration:
    ///
    /// - `app_dir = "."`
    /// - `proxy_port = 3000`
    /// - locally managed database on `proxy_port + 1`
    /// - `program = node main.js`
    /// - `watch_for_changes = true`, `watch_debounce_ms = 200`
    /// - `update_check_interval_secs = 6h`
    fn default() -> Self {
        Self {
            app_dir: PathBuf::from("."),
            proxy_port: 3000,
            proxy_host: None,
            app_port: None,
            app_host: None,
            secondary_proxy_port: None,
            database: DatabaseConfig::default(),
            disable_change_feed: false,
            build: None,
            settings_file: None,
            program: AppProgram::default(),
            debug_port: None,
            root_url: None,
            banner: None,
            quiet: false,
            once: false,
            watch_for_changes: true,
            watch_debounce_ms: 200,
            auxiliary: Vec::new(),
            automation: None,
            app_dir_for_version_check: None,
            release: ReleaseConfig::default(),
            update_check_interval_secs: 6 * 60 * 60,
            restart_backoff: BackoffConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Parses a TOML document and validates the result.
    pub fn from_toml_str(text: &str) -> Result<Self, SupervisorError> {
        let cfg: SessionConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads and parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, SupervisorError> {
        let text = std::fs::read_to_string(path).map_err(|source| SupervisorError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), SupervisorError> {
        if self.proxy_port == 0 {
            return Err(SupervisorError::Config("proxy_port is required".into()));
        }
        if self.app_port == Some(0) {
            return Err(SupervisorError::Config(
                "app_port must be non-zero when pinned".into(),
            ));
        }
        if self.app_port.is_some() && self.app_port == Some(self.proxy_port) {
            return Err(SupervisorError::Config(
                "app_port must differ from proxy_port".into(),
            ));
        }
        if self.program.command.trim().is_empty() {
            return Err(SupervisorError::Config("program.command is empty".into()));
        }
        if let Some(runner) = self.auxiliary.iter().find(|r| r.title.trim().is_empty()) {
            return Err(SupervisorError::Config(format!(
                "auxiliary runner `{}` has no title",
                runner.command
            )));
        }
        if self.restart_backoff.factor < 1.0 {
            return Err(SupervisorError::Config(
                "restart_backoff.factor must be >= 1.0".into(),
            ));
        }
        Ok(())
    }

    /// URL the app is told it is served at.
    ///
    /// Explicit `root_url`, else `http://<proxy_host>:<proxy_port>/`, else
    /// `http://localhost:<proxy_port>/`.
    pub fn root_url(&self) -> String {
        if let Some(url) = &self.root_url {
            return url.clone();
        }
        let host = self.proxy_host.as_deref().unwrap_or("localhost");
        format!("http://{host}:{}/", self.proxy_port)
    }

    /// Text shown between the banner brackets.
    pub fn banner(&self) -> String {
        self.banner
            .clone()
            .unwrap_or_else(|| self.app_dir.display().to_string())
    }

    /// Port of the (first) locally managed database process.
    pub fn database_port(&self) -> u16 {
        self.database
            .port
            .unwrap_or_else(|| self.proxy_port.saturating_add(1))
    }

    /// Directory checked for release and platform drift.
    pub fn version_check_dir(&self) -> &Path {
        self.app_dir_for_version_check
            .as_deref()
            .unwrap_or(&self.app_dir)
    }

    /// Session state directory inside the app directory.
    pub fn state_dir(&self) -> PathBuf {
        self.app_dir.join(STATE_DIR)
    }

    /// Source watcher debounce period.
    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    /// Update checker poll interval.
    pub fn update_check_interval(&self) -> Duration {
        Duration::from_secs(self.update_check_interval_secs.max(1))
    }
}

/// Database connection override, or how to run one locally.
///
/// Setting `url` switches the session to an external database; otherwise
/// the `command` is launched and managed by the session.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// External connection URL; disables local management.
    pub url: Option<String>,
    /// External change-feed URL (only meaningful with `url`).
    pub change_feed_url: Option<String>,
    /// Database server program.
    pub command: String,
    /// Arguments; `{port}` and `{dbpath}` are substituted.
    pub args: Vec<String>,
    /// Port override (default: `proxy_port + 1`).
    pub port: Option<u16>,
    /// Connection URL template for the managed process.
    pub url_template: String,
    /// Change-feed URL template for the managed process.
    pub change_feed_template: String,
    /// How long to wait for the managed process to accept connections, in seconds.
    pub startup_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            change_feed_url: None,
            command: "mongod".into(),
            args: vec![
                "--bind_ip".into(),
                "127.0.0.1".into(),
                "--port".into(),
                "{port}".into(),
                "--dbpath".into(),
                "{dbpath}".into(),
            ],
            port: None,
            url_template: "mongodb://127.0.0.1:{port}/app".into(),
            change_feed_template: "mongodb://127.0.0.1:{port}/local".into(),
            startup_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    /// True if the session launches and owns the database process.
    pub fn is_managed(&self) -> bool {
        self.url.is_none()
    }
}

/// Build step executed in the app directory before each launch.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildOptions {
    /// Builder program.
    pub command: String,
    /// Builder arguments.
    pub args: Vec<String>,
}

/// The application program.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppProgram {
    /// Program to run.
    pub command: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
}

impl Default for AppProgram {
    fn default() -> Self {
        Self {
            command: "node".into(),
            args: vec!["main.js".into()],
            env: BTreeMap::new(),
        }
    }
}

/// One auxiliary runner descriptor.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuxiliaryRunnerSpec {
    /// Human-readable title used in the run log (`Starting <title>`).
    pub title: String,
    /// Program to run.
    pub command: String,
    /// Program arguments.
    pub args: Vec<String>,
}

/// Browser-automation harness descriptor.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutomationSpec {
    /// Browser name passed as `BROWSER`.
    pub browser: String,
    /// Harness program.
    pub command: String,
    /// Harness arguments.
    pub args: Vec<String>,
}

impl Default for AutomationSpec {
    fn default() -> Self {
        Self {
            browser: "chrome".into(),
            command: "selenium-runner".into(),
            args: Vec::new(),
        }
    }
}

/// Platform release identity used for drift checks and messages.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseConfig {
    /// Release this session runs (`track@version`).
    pub current: String,
    /// Track whose releases display without the track prefix.
    pub default_track: String,
    /// Product name used in user-facing messages.
    pub product_name: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            current: format!("DEVVISOR@{}", env!("CARGO_PKG_VERSION")),
            default_track: "DEVVISOR".into(),
            product_name: "Devvisor".into(),
        }
    }
}

/// Restart delay settings (milliseconds).
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffConfig {
    /// Delay before the first relaunch.
    pub first_ms: u64,
    /// Upper bound for the delay.
    pub max_ms: u64,
    /// Growth factor per consecutive crash.
    pub factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            first_ms: 250,
            max_ms: 10_000,
            factor: 2.0,
        }
    }
}

impl From<BackoffConfig> for BackoffPolicy {
    fn from(cfg: BackoffConfig) -> Self {
        BackoffPolicy {
            first: Duration::from_millis(cfg.first_ms),
            max: Duration::from_millis(cfg.max_ms),
            factor: cfg.factor,
            jitter: JitterPolicy::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_minimal_file() {
        let cfg = SessionConfig::from_toml_str(
            r#"
            app_dir = "/srv/app"
            proxy_port = 4000
            app_port = 4100

            [database]
            url = "mongodb://db.internal/app"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.proxy_port, 4000);
        assert_eq!(cfg.app_port, Some(4100));
        assert!(!cfg.database.is_managed());
        assert_eq!(cfg.program.command, "node");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SessionConfig::from_toml_str("proxy_port = 4000\nmobile_server_url = \"x\"\n")
            .unwrap_err();
        assert_eq!(err.as_label(), "supervisor_config_parse");

        let err = SessionConfig::from_toml_str("proxy_port = 4000\n[database]\noplog = true\n")
            .unwrap_err();
        assert_eq!(err.as_label(), "supervisor_config_parse");
    }

    #[test]
    fn proxy_port_is_required() {
        let err = SessionConfig::from_toml_str("proxy_port = 0\n").unwrap_err();
        assert!(matches!(err, SupervisorError::Config(_)));
    }

    #[test]
    fn pinned_app_port_must_not_collide_with_proxy() {
        let cfg = SessionConfig {
            proxy_port: 3000,
            app_port: Some(3000),
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn root_url_derivation() {
        let mut cfg = SessionConfig {
            proxy_port: 3000,
            ..SessionConfig::default()
        };
        assert_eq!(cfg.root_url(), "http://localhost:3000/");

        cfg.proxy_host = Some("10.0.0.5".into());
        assert_eq!(cfg.root_url(), "http://10.0.0.5:3000/");

        cfg.root_url = Some("https://dev.example.com/".into());
        assert_eq!(cfg.root_url(), "https://dev.example.com/");
    }

    #[test]
    fn database_port_follows_proxy_port() {
        let cfg = SessionConfig {
            proxy_port: 3000,
            ..SessionConfig::default()
        };
        assert_eq!(cfg.database_port(), 3001);
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "proxy_port = 5000\nonce = true\nbanner = \"Tests\"").unwrap();
        let cfg = SessionConfig::from_file(file.path()).unwrap();
        assert!(cfg.once);
        assert_eq!(cfg.banner(), "Tests");

        let missing = SessionConfig::from_file(Path::new("/nonexistent/devvisor.toml"));
        assert!(matches!(missing, Err(SupervisorError::ConfigIo { .. })));
    }
}
