#![cfg_attr(test, allow(clippy::disallowed_methods, clippy::unwrap_used, clippy::expect_used))]

// Life of a request:
// 1. `/reset` arrives with an optional delay, error rate and response latency
//     - Wait for any in-flight run to resolve
//     - Start a new run and arm its timer
// 2. `/status` arrives and is served by the protocol chosen at startup
//     - Short polling: report the status after the response latency
//     - Long polling: wait for resolution, bounded by the wait timeout
//     - SSE: report the status now, and again once the run resolves
// 3. The timer fires, the run resolves to `completed` or `error`, and every
//    waiter is woken through the run's notifier
//
// System components:
//  - Simulation state machine (one per process)
//  - Per-run broadcast-once notifier
//  - Protocol adapters and HTTP routes

pub mod clock;
pub mod config;
#[cfg(test)]
mod e2e_tests;
pub mod messages;
pub mod notifier;
pub mod protocol;
pub mod routes;
pub mod simulation;
pub mod status;

pub use notifier::RunNotifier;
pub use protocol::PollingMethod;
pub use simulation::{
    ErrorDistribution, RunParams, RunSnapshot, Simulation, SimulationError, SimulationOptions,
};
pub use status::RunStatus;
