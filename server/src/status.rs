//! Status of the simulated operation.
//!
//! # Transitions
//!
//! ```text
//! init ──► pending ──► completed
//!            ▲   └───► error
//!            └──────────┘ (reset)
//! ```
//!
//! `completed` and `error` are terminal for a run. Only a reset moves the
//! simulation back to `pending`; nothing ever returns to `init`.

use serde::Serialize;

/// The status reported to clients as `{"result": "<status>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// No run has been started yet.
    Init,
    /// A run is in flight and its timer has not fired.
    Pending,
    /// The run resolved successfully.
    Completed,
    /// The run resolved to a simulated failure.
    Error,
}

impl RunStatus {
    /// The wire name of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Returns true for `completed` and `error`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Returns true if moving from `self` to `next` is a legal edge.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Init | Self::Completed | Self::Error, Self::Pending)
                | (Self::Pending, Self::Completed | Self::Error)
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
