//! Broadcast-once signal tied to a single simulation run.
//!
//! A [`RunNotifier`] is created when a run enters `pending` and retired exactly
//! once when the run resolves. Handles are cheap to clone and stay valid after
//! retirement: anyone holding a handle, whenever they look, either sees the
//! signal immediately or is woken when it fires.
//!
//! # Invariants
//!
//! - `retire` signals at most once; later calls are no-ops
//! - A retired notifier never becomes un-retired
//! - A notifier belongs to exactly one run (`run_id`) and is never reused

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Handle to the notifier of one run.
#[derive(Debug, Clone)]
pub struct RunNotifier {
    inner: Arc<NotifierInner>,
}

#[derive(Debug)]
struct NotifierInner {
    run_id: u64,
    retired: AtomicBool,
    notify: Notify,
}

impl RunNotifier {
    /// Create an un-retired notifier for the given run.
    #[must_use]
    pub(crate) fn new(run_id: u64) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                run_id,
                retired: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// The run this notifier belongs to.
    #[must_use]
    pub fn run_id(&self) -> u64 {
        self.inner.run_id
    }

    /// Returns true once the run has resolved.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.inner.retired.load(Ordering::Acquire)
    }

    /// Signal every current and future waiter.
    ///
    /// Returns false if the notifier was already retired.
    pub(crate) fn retire(&self) -> bool {
        if self.inner.retired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.notify.notify_waiters();
        true
    }

    /// Wait until the notifier is retired.
    ///
    /// Returns immediately if it already was. The waiter is registered before
    /// the flag is checked, so a concurrent `retire` cannot be missed.
    pub async fn wait(&self) {
        let mut notified = pin!(self.inner.notify.notified());
        notified.as_mut().enable();
        if self.is_retired() {
            return;
        }
        notified.await;
    }
}
