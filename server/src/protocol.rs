//! Client notification protocols served on `/status`.
//!
//! Exactly one protocol is active per process, chosen at startup. Each one is
//! a plain function over [`Simulation`]:
//!
//! - **Short polling**: sleep the configured response latency, then report the
//!   current status. Never waits for resolution.
//! - **Long polling**: if the run is pending, wait for it to resolve, bounded
//!   by the wait timeout, then report the status (possibly still `pending`).
//! - **Server-sent events**: report the current status, and if it is pending,
//!   report the resolved status once the run resolves. At most two events.

use std::sync::Arc;

use futures::{Stream, StreamExt, future, stream};

use crate::simulation::{RunSnapshot, Simulation};
use crate::status::RunStatus;

/// The protocol used to serve `/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollingMethod {
    #[default]
    ShortPolling,
    LongPolling,
    Sse,
}

impl PollingMethod {
    /// The configuration name of this method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShortPolling => "short_polling",
            Self::LongPolling => "long_polling",
            Self::Sse => "sse",
        }
    }
}

impl std::str::FromStr for PollingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short_polling" => Ok(Self::ShortPolling),
            "long_polling" => Ok(Self::LongPolling),
            "sse" => Ok(Self::Sse),
            other => Err(format!(
                "invalid polling method '{other}' (expected short_polling, long_polling or sse)"
            )),
        }
    }
}

impl std::fmt::Display for PollingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short poll: wait out the response latency, then snapshot the status.
pub async fn short_poll(simulation: &Simulation) -> RunStatus {
    let latency = simulation.params().response_latency;
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
    simulation.poll_status()
}

/// Long poll: block until the pending run resolves or the wait timeout elapses.
pub async fn long_poll(simulation: &Simulation) -> RunStatus {
    let snapshot = simulation.watch();
    let Some(notifier) = snapshot.notifier else {
        return snapshot.status;
    };

    let wait_timeout = snapshot.params.wait_timeout;
    if tokio::time::timeout(wait_timeout, notifier.wait())
        .await
        .is_err()
    {
        tracing::debug!(
            run_id = notifier.run_id(),
            wait_timeout_ms = wait_timeout.as_millis(),
            "long poll timed out"
        );
    }
    simulation.status()
}

/// Status stream for server-sent events.
///
/// Yields the current status, then, only if that status was `pending`, the
/// status observed once the run's notifier is retired. Dropping the stream
/// (client disconnect) abandons the wait without touching the simulation.
pub fn status_stream(simulation: Arc<Simulation>) -> impl Stream<Item = RunStatus> + Send {
    let RunSnapshot {
        status: initial,
        notifier,
        ..
    } = simulation.watch();

    let resolution = stream::once(async move {
        let notifier = notifier?;
        notifier.wait().await;
        Some(simulation.status())
    })
    .filter_map(future::ready);

    stream::once(future::ready(initial)).chain(resolution)
}
