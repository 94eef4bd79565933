//! Error types used by the session supervisor and its child components.
//!
//! This module defines two main error enums:
//!
//! - [`SupervisorError`]: errors raised by the driver and supervisor themselves
//!   (configuration problems, impossible outcomes, a lost completion slot).
//! - [`ComponentError`]: errors raised by individual child components while
//!   starting or running (bind failures, missing binaries, crashed processes).
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::outcome::Outcome;

/// # Errors produced by the supervisor runtime.
///
/// These never describe *why a session ended* (that is an [`Outcome`]); they
/// describe situations where the driver cannot produce an exit code at all.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Configuration is structurally valid but semantically unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ConfigIo {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Configuration file could not be parsed (including unknown keys).
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The session ended with an outcome that the exit-code policy cannot map.
    #[error("unexpected outcome {outcome}")]
    UnexpectedOutcome {
        /// The outcome that reached the mapper.
        outcome: Outcome,
    },

    /// Every writer of the terminal result went away without resolving it.
    #[error("session ended without a terminal outcome")]
    CompletionDropped,
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use devvisor::SupervisorError;
    ///
    /// let err = SupervisorError::Config("no proxy port".into());
    /// assert_eq!(err.as_label(), "supervisor_config");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::Config(_) => "supervisor_config",
            SupervisorError::ConfigIo { .. } => "supervisor_config_io",
            SupervisorError::ConfigParse(_) => "supervisor_config_parse",
            SupervisorError::UnexpectedOutcome { .. } => "supervisor_unexpected_outcome",
            SupervisorError::CompletionDropped => "supervisor_completion_dropped",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SupervisorError::Config(reason) => format!("config: {reason}"),
            SupervisorError::ConfigIo { path, source } => {
                format!("config io: {}: {source}", path.display())
            }
            SupervisorError::ConfigParse(e) => format!("config parse: {e}"),
            SupervisorError::UnexpectedOutcome { outcome } => {
                format!("unexpected outcome: {}", outcome.as_label())
            }
            SupervisorError::CompletionDropped => "completion dropped".to_string(),
        }
    }
}

/// # Errors produced by child components.
///
/// A `ComponentError` returned from a `start()` or reported through the
/// failure hook is always fatal for the session: the driver stops the
/// supervisor and resolves [`Outcome::SupervisorFailure`].
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ComponentError {
    /// Listening socket could not be bound.
    #[error("{component}: could not listen on {addr}: {source}")]
    Bind {
        /// Component name.
        component: String,
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// External program could not be launched.
    #[error("{component}: could not run `{command}`: {source}")]
    Spawn {
        /// Component name.
        component: String,
        /// Program that failed to launch.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Managed process exited and will not be restarted.
    #[error("{component}: exited unexpectedly ({status})")]
    Exited {
        /// Component name.
        component: String,
        /// Rendered exit status.
        status: String,
    },

    /// Any other I/O failure while operating the component.
    #[error("{component}: {source}")]
    Io {
        /// Component name.
        component: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Component-specific failure with a free-form reason.
    #[error("{component}: {reason}")]
    Failed {
        /// Component name.
        component: String,
        /// Failure description.
        reason: String,
    },
}

impl ComponentError {
    /// Convenience constructor for [`ComponentError::Failed`].
    pub fn failed(component: impl Into<String>, reason: impl Into<String>) -> Self {
        ComponentError::Failed {
            component: component.into(),
            reason: reason.into(),
        }
    }

    /// Name of the component that produced the error.
    pub fn component(&self) -> &str {
        match self {
            ComponentError::Bind { component, .. }
            | ComponentError::Spawn { component, .. }
            | ComponentError::Exited { component, .. }
            | ComponentError::Io { component, .. }
            | ComponentError::Failed { component, .. } => component,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use devvisor::ComponentError;
    ///
    /// let err = ComponentError::failed("database", "disk full");
    /// assert_eq!(err.as_label(), "component_failed");
    /// assert_eq!(err.component(), "database");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ComponentError::Bind { .. } => "component_bind",
            ComponentError::Spawn { .. } => "component_spawn",
            ComponentError::Exited { .. } => "component_exited",
            ComponentError::Io { .. } => "component_io",
            ComponentError::Failed { .. } => "component_failed",
        }
    }

    /// Returns a human-readable message without the component prefix.
    pub fn as_message(&self) -> String {
        match self {
            ComponentError::Bind { addr, source, .. } => format!("bind {addr}: {source}"),
            ComponentError::Spawn {
                command, source, ..
            } => format!("spawn `{command}`: {source}"),
            ComponentError::Exited { status, .. } => format!("exited: {status}"),
            ComponentError::Io { source, .. } => format!("io: {source}"),
            ComponentError::Failed { reason, .. } => reason.clone(),
        }
    }
}
