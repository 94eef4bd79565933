//! # Jitter applied to relaunch delays.
//!
//! - [`JitterPolicy::None`] exact delays (tests, single process)
//! - [`JitterPolicy::Equal`] `delay/2 + random[0, delay/2]`

use rand::Rng;
use std::time::Duration;

/// Randomization applied on top of a computed delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Use the computed delay as is.
    #[default]
    None,
    /// Keep at least half of the delay, randomize the rest.
    Equal,
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    pub fn apply(self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Equal => equal_jitter(delay),
        }
    }
}

fn equal_jitter(delay: Duration) -> Duration {
    let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    let half = ms / 2;
    if half == 0 {
        return delay;
    }
    let extra = rand::rng().random_range(0..=ms - half);
    Duration::from_millis(half + extra)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_jitter_stays_within_bounds() {
        for _ in 0..200 {
            let d = JitterPolicy::Equal.apply(Duration::from_millis(1000));
            assert!(d >= Duration::from_millis(500));
            assert!(d <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn tiny_delays_pass_through() {
        assert_eq!(
            JitterPolicy::Equal.apply(Duration::from_millis(1)),
            Duration::from_millis(1)
        );
        assert_eq!(JitterPolicy::None.apply(Duration::ZERO), Duration::ZERO);
    }
}
