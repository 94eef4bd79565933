//! # Crash relaunch backoff.
//!
//! [`BackoffPolicy`] maps the number of consecutive crashes of a managed
//! process to the delay before relaunching it:
//!
//! ```text
//! crashes = 1 → first
//! crashes = n → first × factor^(n-1), capped at max, then jitter
//! ```
//!
//! A process that stays up resets its own crash counter; the policy itself is
//! stateless.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use devvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(250),
//!     max: Duration::from_secs(2),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//! assert_eq!(backoff.delay_after(1), Duration::from_millis(250));
//! assert_eq!(backoff.delay_after(3), Duration::from_secs(1));
//! assert_eq!(backoff.delay_after(30), Duration::from_secs(2));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Relaunch delay policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay after the first crash.
    pub first: Duration,
    /// Maximum delay.
    pub max: Duration,
    /// Growth factor per additional consecutive crash.
    pub factor: f64,
    /// Randomization applied to the capped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 250ms`, `max = 10s`, `factor = 2.0`, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(250),
            max: Duration::from_secs(10),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Delay before relaunching after `crashes` consecutive crashes (1-based).
    ///
    /// `0` is treated like `1`. Non-finite intermediate values clamp to `max`.
    pub fn delay_after(&self, crashes: u32) -> Duration {
        let exp = i32::try_from(crashes.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}
