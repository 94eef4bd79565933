//! # Single-assignment deferred result.
//!
//! [`Completion`] is the slot the session's terminal [`Outcome`](crate::Outcome)
//! is written into. Any number of writers may race (failure hook, run-end
//! hook, signal handler); only the first [`Completion::resolve`] is delivered
//! and every later call is a no-op that returns `false`.
//!
//! ```text
//! on_failure ──┐
//! on_run_end ──┼──► Completion::resolve() ── check-and-set ──► oneshot ──► CompletionWaiter::wait()
//! signal     ──┘          (first wins)                                      (driver, once)
//! ```

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::oneshot;

/// Writer side of the deferred result. Shared behind an `Arc`.
#[derive(Debug)]
pub struct Completion<T> {
    resolved: AtomicBool,
    slot: Mutex<Option<oneshot::Sender<T>>>,
}

/// Reader side of the deferred result. Consumed by a single wait.
#[derive(Debug)]
pub struct CompletionWaiter<T> {
    rx: oneshot::Receiver<T>,
}

/// Creates a connected writer/reader pair.
///
/// # Example
/// ```
/// # tokio_test_shim::block_on(async {
/// let (done, waiter) = devvisor::completion::<u8>();
/// assert!(done.resolve(1));
/// assert!(!done.resolve(2));
/// assert_eq!(waiter.wait().await, Some(1));
/// # });
/// # mod tokio_test_shim {
/// #     pub fn block_on<F: std::future::Future>(f: F) -> F::Output {
/// #         tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// #     }
/// # }
/// ```
pub fn completion<T>() -> (Arc<Completion<T>>, CompletionWaiter<T>) {
    let (tx, rx) = oneshot::channel();
    let done = Arc::new(Completion {
        resolved: AtomicBool::new(false),
        slot: Mutex::new(Some(tx)),
    });
    (done, CompletionWaiter { rx })
}

impl<T> Completion<T> {
    /// Delivers `value` if nothing was delivered before.
    ///
    /// Returns `true` only for the call that won. The guard is a
    /// compare-and-swap, so concurrent writers never both succeed.
    pub fn resolve(&self, value: T) -> bool {
        if self
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let tx = match self.slot.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match tx {
            // A dropped waiter still counts as resolved: the slot is single-assignment.
            Some(tx) => {
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    /// True once any writer has won.
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }
}

impl<T> CompletionWaiter<T> {
    /// Waits for the first resolved value.
    ///
    /// Returns `None` if every [`Completion`] handle was dropped unresolved.
    pub async fn wait(self) -> Option<T> {
        self.rx.await.ok()
    }
}
