//! Relaunch delay policies.
//!
//! Managed processes (the application and the local database) are relaunched
//! after a crash. These knobs control **how long** to wait between launches so
//! a process that dies on startup does not spin the CPU.
//!
//! ## Contents
//! - [`BackoffPolicy`] how relaunch delays grow with consecutive crashes
//! - [`JitterPolicy`]  randomization so sibling processes do not relaunch in lockstep
//!
//! ## Quick wiring
//! ```text
//! SessionConfig.restart_backoff ──► BackoffPolicy
//!      ├─► components::app::ProcessApp       (crash without a watched change)
//!      └─► components::database::ProcessDatabase (database died, bounded retries)
//! ```

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
