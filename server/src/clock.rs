//! Timer abstraction for scheduling run resolution.
//!
//! This module provides a `TimerSource` trait so the simulation can use the
//! tokio timer in production and a manually fired timer in tests.

use std::time::Duration;

/// A one-shot callback handed to a [`TimerSource`].
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Abstraction over one-shot timers.
///
/// Implementations must invoke `callback` at most once, after `delay`, and
/// never synchronously from inside `schedule`.
pub trait TimerSource: Send + Sync {
    /// Arrange for `callback` to run once after `delay`.
    fn schedule(&self, delay: Duration, callback: TimerCallback);
}

/// Timer backed by the tokio runtime.
///
/// `schedule` must be called from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl TimerSource for TokioTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
    }
}
