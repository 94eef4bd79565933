//! Session core: the supervisor and its lifecycle plumbing.
//!
//! Internal modules:
//! - [`supervisor`]: startup sequencing, idempotent stop, port regeneration;
//! - [`builder`]: validates config and wires the children through a factory;
//! - [`job`]: titled job scopes around slow start steps;
//! - [`ports`]: random application port draws;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod job;
mod ports;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use ports::APP_PORT_RANGE;
pub use shutdown::wait_for_shutdown_signal;
pub use supervisor::Supervisor;
