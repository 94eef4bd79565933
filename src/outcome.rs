//! # Terminal session outcomes.
//!
//! An [`Outcome`] is the single reason a session ended. Exactly one is
//! delivered per session (see [`Completion`](crate::Completion)); whichever
//! child detects the condition creates it, and the driver consumes it once to
//! produce an [`ExitReport`].
//!
//! ## Classification
//! ```text
//! environment drift   ConflictingVersions, WrongRelease, OutdatedPlatformDescriptors
//!                     → always terminal, restarting in place cannot fix them
//! app exit            SuccessExit(Code | Signal), SourceChanged
//!                     → terminal in one-shot mode, restart in continuous mode
//! build failure       BundleFailure
//!                     → terminal in one-shot mode, restart in continuous mode
//! never started       Terminated
//!                     → always terminal (program missing, bad program name)
//! infrastructure      SupervisorFailure
//!                     → always terminal (database, proxy, runner failed)
//! operator            Interrupted
//!                     → always terminal (Ctrl-C / SIGTERM)
//! ```

use std::fmt;

use crate::config::ReleaseConfig;

/// How the application process ended when it did actually run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessExit {
    /// Process exited on its own with a numeric code.
    Code(i32),
    /// Process was killed by a signal.
    Signal(i32),
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessExit::Code(code) => write!(f, "exit code {code}"),
            ProcessExit::Signal(signal) => write!(f, "signal {signal}"),
        }
    }
}

/// Which platform descriptor set changed underneath a running session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorKind {
    /// The set of build platforms changed.
    Platforms,
    /// The set of platform plugins changed.
    Plugins,
}

impl DescriptorKind {
    /// File name (under the app's `.devvisor/` directory) holding the descriptor set.
    pub fn file_name(self) -> &'static str {
        match self {
            DescriptorKind::Platforms => "platforms",
            DescriptorKind::Plugins => "plugins",
        }
    }
}

/// One structured build error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildMessage {
    /// Source file the error refers to, if known.
    pub file: Option<String>,
    /// 1-based line number, if known.
    pub line: Option<u32>,
    /// Error text.
    pub message: String,
}

/// Structured list of errors produced by a failed build.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildErrors {
    messages: Vec<BuildMessage>,
}

impl BuildErrors {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message.
    pub fn push(&mut self, message: BuildMessage) {
        self.messages.push(message);
    }

    /// Parses builder diagnostics, one error per non-empty line.
    ///
    /// Lines shaped like `path:line: message` keep their location.
    pub fn from_output(output: &str) -> Self {
        let messages = output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(parse_build_line)
            .collect();
        Self { messages }
    }

    /// Returns the messages in order.
    pub fn messages(&self) -> &[BuildMessage] {
        &self.messages
    }

    /// True if no message was recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Renders the list for the terminal, one error per line.
    pub fn format_messages(&self) -> String {
        let mut out = String::new();
        for m in &self.messages {
            match (&m.file, m.line) {
                (Some(file), Some(line)) => out.push_str(&format!("{file}:{line}: {}\n", m.message)),
                (Some(file), None) => out.push_str(&format!("{file}: {}\n", m.message)),
                _ => out.push_str(&format!("{}\n", m.message)),
            }
        }
        out
    }
}

fn parse_build_line(line: &str) -> BuildMessage {
    let mut parts = line.splitn(3, ':');
    if let (Some(file), Some(num), Some(rest)) = (parts.next(), parts.next(), parts.next())
        && let Ok(n) = num.trim().parse::<u32>()
        && !file.is_empty()
    {
        return BuildMessage {
            file: Some(file.to_string()),
            line: Some(n),
            message: rest.trim().to_string(),
        };
    }
    BuildMessage {
        file: None,
        line: None,
        message: line.to_string(),
    }
}

/// The terminal result of a session.
///
/// Each variant carries only the data relevant to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The application process ran and exited.
    SuccessExit(ProcessExit),
    /// The watched source tree changed and the app process was stopped for a rebuild.
    SourceChanged,
    /// Package version constraints could not be satisfied.
    ConflictingVersions,
    /// The app now requires a different platform release.
    WrongRelease {
        /// Release identifier (`track@version`) the app asks for.
        release_needed: String,
    },
    /// Platform descriptors changed since the session started.
    OutdatedPlatformDescriptors(DescriptorKind),
    /// The builder could not produce a runnable artifact.
    BundleFailure(BuildErrors),
    /// The app process never started: neither exit code nor signal.
    Terminated,
    /// A non-application subsystem could not start or died.
    SupervisorFailure,
    /// The operator interrupted the session.
    Interrupted,
}

impl Outcome {
    /// Returns a short stable label (kebab-case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use devvisor::{Outcome, ProcessExit};
    ///
    /// assert_eq!(Outcome::SuccessExit(ProcessExit::Code(0)).as_label(), "success-exit");
    /// assert_eq!(Outcome::SupervisorFailure.as_label(), "supervisor-failure");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            Outcome::SuccessExit(_) => "success-exit",
            Outcome::SourceChanged => "source-changed",
            Outcome::ConflictingVersions => "conflicting-versions",
            Outcome::WrongRelease { .. } => "wrong-release",
            Outcome::OutdatedPlatformDescriptors(DescriptorKind::Platforms) => {
                "outdated-platform-descriptors-platforms"
            }
            Outcome::OutdatedPlatformDescriptors(DescriptorKind::Plugins) => {
                "outdated-platform-descriptors-plugins"
            }
            Outcome::BundleFailure(_) => "bundle-failure",
            Outcome::Terminated => "terminated",
            Outcome::SupervisorFailure => "supervisor-failure",
            Outcome::Interrupted => "interrupted",
        }
    }

    /// True for version, platform-descriptor and dependency-constraint mismatches.
    pub fn is_environment_drift(&self) -> bool {
        matches!(
            self,
            Outcome::ConflictingVersions
                | Outcome::WrongRelease { .. }
                | Outcome::OutdatedPlatformDescriptors(_)
        )
    }

    /// True if the outcome ends the session even in continuous mode.
    pub fn is_always_terminal(&self) -> bool {
        self.is_environment_drift()
            || matches!(
                self,
                Outcome::Terminated | Outcome::SupervisorFailure | Outcome::Interrupted
            )
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::SuccessExit(exit) => write!(f, "success-exit ({exit})"),
            Outcome::WrongRelease { release_needed } => {
                write!(f, "wrong-release ({release_needed})")
            }
            other => f.write_str(other.as_label()),
        }
    }
}

/// Exit code and optional stderr message produced from an [`Outcome`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExitReport {
    /// Suggested process exit code.
    pub code: i32,
    /// Text for stderr, already newline-terminated.
    pub message: Option<String>,
}

impl ExitReport {
    /// Report with a code and no message.
    pub fn silent(code: i32) -> Self {
        Self {
            code,
            message: None,
        }
    }

    /// Report with a code and a message.
    pub fn with_message(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }
}

/// Renders a `track@version` release name for people.
///
/// Releases on the default track display as `<product> <version>`; others
/// keep the full `track@version` form.
///
/// # Example
/// ```
/// use devvisor::{display_release, ReleaseConfig};
///
/// let cfg = ReleaseConfig::default();
/// assert_eq!(display_release("X@2.0", &cfg), "X@2.0");
/// assert_eq!(display_release(&format!("{}@1.4", cfg.default_track), &cfg), "Devvisor 1.4");
/// ```
pub fn display_release(name: &str, cfg: &ReleaseConfig) -> String {
    let (track, version) = match name.split_once('@') {
        Some((track, version)) => (track, version),
        None => (cfg.default_track.as_str(), name),
    };
    if track == cfg.default_track {
        format!("{} {version}", cfg.product_name)
    } else {
        format!("{track}@{version}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_errors_keep_locations() {
        let errors = BuildErrors::from_output(
            "client/main.js:12: Unexpected token\n\n  warning without location  \n",
        );
        assert_eq!(errors.messages().len(), 2);
        assert_eq!(errors.messages()[0].file.as_deref(), Some("client/main.js"));
        assert_eq!(errors.messages()[0].line, Some(12));
        assert_eq!(errors.messages()[0].message, "Unexpected token");
        assert_eq!(errors.messages()[1].file, None);
        assert_eq!(
            errors.format_messages(),
            "client/main.js:12: Unexpected token\nwarning without location\n"
        );
    }

    #[test]
    fn drift_is_always_terminal_but_exits_are_not() {
        assert!(Outcome::ConflictingVersions.is_always_terminal());
        assert!(
            Outcome::OutdatedPlatformDescriptors(DescriptorKind::Plugins).is_always_terminal()
        );
        assert!(Outcome::Terminated.is_always_terminal());
        assert!(!Outcome::Terminated.is_environment_drift());
        assert!(!Outcome::SuccessExit(ProcessExit::Signal(9)).is_always_terminal());
        assert!(!Outcome::BundleFailure(BuildErrors::new()).is_always_terminal());
        assert!(!Outcome::SourceChanged.is_always_terminal());
    }

    #[test]
    fn release_without_track_uses_default_track() {
        let cfg = ReleaseConfig::default();
        assert_eq!(display_release("3.1", &cfg), format!("{} 3.1", cfg.product_name));
    }
}
