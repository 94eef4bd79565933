//! Outcome → process exit code.
//!
//! ```text
//! conflicting-versions                     254  constraint conflict explanation
//! outdated-platform-descriptors(plugins)   254  plugins changed, restart
//! outdated-platform-descriptors(platforms) 254  platforms changed, restart
//! wrong-release (continuous)               254  updated to <X> from <Y>, restart
//! wrong-release (one-shot)                 error
//! supervisor-failure                       254  (already logged)
//! terminated                               254  (already logged)
//! interrupted                              130
//! bundle-failure (one-shot)                254  build errors
//! success-exit signal (one-shot)           255  Killed (<signal>)
//! success-exit code (one-shot)             <code>
//! anything else                            error
//! ```

use crate::config::ReleaseConfig;
use crate::error::SupervisorError;
use crate::outcome::{DescriptorKind, ExitReport, Outcome, ProcessExit, display_release};

/// Exit code for outcomes that need a full session restart or were already reported.
pub const EXIT_RESTART_REQUIRED: i32 = 254;

/// Exit code for an app killed by a signal in one-shot mode.
pub const EXIT_KILLED: i32 = 255;

/// Exit code for an interrupted session.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Maps the terminal outcome of a session to an exit code and message.
///
/// Returns [`SupervisorError::UnexpectedOutcome`] for outcomes that cannot
/// end a session in the given mode.
///
/// # Example
/// ```
/// use devvisor::{exit_report, Outcome, ProcessExit, ReleaseConfig};
///
/// let cfg = ReleaseConfig::default();
/// let report = exit_report(&Outcome::SuccessExit(ProcessExit::Signal(9)), true, &cfg).unwrap();
/// assert_eq!(report.code, 255);
/// assert_eq!(report.message.as_deref(), Some("Killed (9)\n"));
/// ```
pub fn exit_report(
    outcome: &Outcome,
    once: bool,
    release: &ReleaseConfig,
) -> Result<ExitReport, SupervisorError> {
    let report = match outcome {
        Outcome::ConflictingVersions => ExitReport::with_message(
            EXIT_RESTART_REQUIRED,
            "The package version constraints of your app cannot be satisfied.\n\
             Fix the conflicting constraints, then restart.\n",
        ),
        Outcome::OutdatedPlatformDescriptors(DescriptorKind::Plugins) => ExitReport::with_message(
            EXIT_RESTART_REQUIRED,
            "Your app's plugins have changed.\nRestart to pick up the new plugins.\n",
        ),
        Outcome::OutdatedPlatformDescriptors(DescriptorKind::Platforms) => {
            ExitReport::with_message(
                EXIT_RESTART_REQUIRED,
                "Your app's platforms have changed.\nRestart to pick up the new platforms.\n",
            )
        }
        Outcome::WrongRelease { release_needed } if !once => ExitReport::with_message(
            EXIT_RESTART_REQUIRED,
            format!(
                "Your app has been updated to {} from {}.\nRestart to run the new release.\n",
                display_release(release_needed, release),
                display_release(&release.current, release),
            ),
        ),
        Outcome::SupervisorFailure | Outcome::Terminated => {
            ExitReport::silent(EXIT_RESTART_REQUIRED)
        }
        Outcome::Interrupted => ExitReport::silent(EXIT_INTERRUPTED),
        Outcome::BundleFailure(errors) if once => ExitReport::with_message(
            EXIT_RESTART_REQUIRED,
            format!("Errors prevented startup:\n\n{}", errors.format_messages()),
        ),
        Outcome::SuccessExit(ProcessExit::Signal(signal)) if once => {
            ExitReport::with_message(EXIT_KILLED, format!("Killed ({signal})\n"))
        }
        Outcome::SuccessExit(ProcessExit::Code(code)) if once => ExitReport::silent(*code),
        other => {
            return Err(SupervisorError::UnexpectedOutcome {
                outcome: other.clone(),
            });
        }
    };
    Ok(report)
}
