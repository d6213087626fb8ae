//! The shared simulation state machine.
//!
//! One [`Simulation`] exists per process. It tracks the status of the single
//! simulated operation, the tunables of the current run, and the run's
//! [`RunNotifier`]. Protocol adapters read it; the reset endpoint restarts it.
//!
//! # Locking
//!
//! Every field lives behind one `std::sync::Mutex`. The lock is held only for
//! field reads and writes, never across an `.await`. Callers that need to wait
//! for resolution capture the notifier under the lock, release it, then wait.
//!
//! # Invariants
//!
//! - Status edges are limited to those allowed by [`RunStatus::can_transition_to`]
//! - A notifier exists exactly while the status is `pending` and is retired
//!   exactly once, by the timer callback of its own run
//! - A reset never starts a run while another is pending; it waits for the
//!   in-flight run to resolve first
//! - The timer of an earlier run can never resolve a later one

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::TimerSource;
use crate::notifier::RunNotifier;
use crate::status::RunStatus;

/// Tunables of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunParams {
    /// Time from start until the run resolves.
    pub delay: Duration,
    /// Error threshold compared against the sampled value, in [0, 1].
    pub error_rate: f64,
    /// Artificial latency added to every short-poll read.
    pub response_latency: Duration,
    /// Maximum time a long-poll read blocks before reporting `pending`.
    pub wait_timeout: Duration,
}

impl RunParams {
    /// Default time until a run resolves.
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);
    /// Default error rate.
    pub const DEFAULT_ERROR_RATE: f64 = 0.1;
    /// Default long-poll wait timeout.
    pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            delay: Self::DEFAULT_DELAY,
            error_rate: Self::DEFAULT_ERROR_RATE,
            response_latency: Duration::ZERO,
            wait_timeout: Self::DEFAULT_WAIT_TIMEOUT,
        }
    }
}

/// Distribution of the value compared against `error_rate` on resolution.
///
/// With `Uniform` the probability of `error` equals `error_rate`. With
/// `Exponential` (rate 1) it is `1 - e^(-error_rate)`, so a configured rate of
/// `1.0` fails only about 63% of the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorDistribution {
    /// Uniform sample in [0, 1).
    #[default]
    Uniform,
    /// Exponential sample with rate 1, in [0, inf).
    Exponential,
}

impl ErrorDistribution {
    /// Draw one sample.
    pub fn sample<R: Rng + ?Sized>(self, rng: &mut R) -> f64 {
        let uniform = rng.random::<f64>();
        match self {
            Self::Uniform => uniform,
            // 1 - u is in (0, 1], so the logarithm is finite
            Self::Exponential => -(1.0 - uniform).ln(),
        }
    }

    /// Probability that a run resolves to `error` for the given rate.
    #[must_use]
    pub fn error_probability(self, error_rate: f64) -> f64 {
        let rate = error_rate.max(0.0);
        match self {
            Self::Uniform => rate.min(1.0),
            Self::Exponential => 1.0 - (-rate).exp(),
        }
    }
}

impl std::str::FromStr for ErrorDistribution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniform" => Ok(Self::Uniform),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!(
                "unknown error distribution '{other}' (expected uniform or exponential)"
            )),
        }
    }
}

impl std::fmt::Display for ErrorDistribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uniform => write!(f, "uniform"),
            Self::Exponential => write!(f, "exponential"),
        }
    }
}

/// Construction options for a [`Simulation`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationOptions {
    /// Parameters reported before the first run starts.
    pub initial: RunParams,
    /// Distribution of the error draw.
    pub distribution: ErrorDistribution,
    /// Seed for the error draw. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

/// Consistent view of the simulation taken by [`Simulation::watch`].
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub status: RunStatus,
    /// Present exactly when `status` is `pending`.
    pub notifier: Option<RunNotifier>,
    pub params: RunParams,
}

/// Errors returned by simulation state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationError {
    /// `start` was called while a run is in flight.
    AlreadyPending { run_id: u64 },
    /// The requested status edge is not allowed.
    IllegalTransition { from: RunStatus, to: RunStatus },
}

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyPending { run_id } => write!(f, "run {run_id} is still pending"),
            Self::IllegalTransition { from, to } => {
                write!(f, "illegal status transition: {from} -> {to}")
            }
        }
    }
}

impl std::error::Error for SimulationError {}

/// Mutable state of the simulation, guarded by [`Simulation::state`].
struct RunState {
    status: RunStatus,
    params: RunParams,
    /// Present exactly while `status` is `pending`.
    notifier: Option<RunNotifier>,
    /// Number of the current run; 0 before the first one.
    run_id: u64,
    request_count: u64,
    rng: StdRng,
}

impl RunState {
    fn transition(&mut self, next: RunStatus) -> Result<(), SimulationError> {
        if !self.status.can_transition_to(next) {
            return Err(SimulationError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    fn live_notifier(&self) -> Option<RunNotifier> {
        match self.status {
            RunStatus::Pending => self.notifier.clone(),
            _ => None,
        }
    }
}

/// The single simulated operation shared by every request handler.
pub struct Simulation {
    state: Mutex<RunState>,
    timer: Arc<dyn TimerSource>,
    distribution: ErrorDistribution,
}

impl Simulation {
    /// Create a simulation in `init` reporting `options.initial`.
    #[must_use]
    pub fn new(timer: Arc<dyn TimerSource>, options: SimulationOptions) -> Arc<Self> {
        let rng = options
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

        Arc::new(Self {
            state: Mutex::new(RunState {
                status: RunStatus::Init,
                params: options.initial,
                notifier: None,
                run_id: 0,
                request_count: 0,
                rng,
            }),
            timer,
            distribution: options.distribution,
        })
    }

    /// Start a run with `params` and arm its timer.
    ///
    /// Returns the new run's notifier without waiting for resolution.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::AlreadyPending` if a run is in flight. Use
    /// [`reset`](Self::reset) to start a run after the current one resolves.
    pub fn start(self: &Arc<Self>, params: RunParams) -> Result<RunNotifier, SimulationError> {
        let notifier = {
            let mut state = self.lock_state();
            if state.status == RunStatus::Pending {
                return Err(SimulationError::AlreadyPending {
                    run_id: state.run_id,
                });
            }
            Self::begin_run(&mut state, params)?
        };
        self.arm_timer(&notifier, params);
        Ok(notifier)
    }

    /// Start a new run with `params`, waiting for any in-flight run first.
    ///
    /// The in-flight run is never cancelled. Its timer fires and resolves it
    /// normally, so this can block for up to the remaining `delay` of that run.
    ///
    /// # Errors
    ///
    /// Returns an error only if the state machine rejects the transition to
    /// `pending`, which cannot happen once the previous run has resolved.
    pub async fn reset(self: &Arc<Self>, params: RunParams) -> Result<RunNotifier, SimulationError> {
        loop {
            let in_flight = {
                let mut state = self.lock_state();
                let live = state.live_notifier();
                match live {
                    Some(notifier) => notifier,
                    None => {
                        let notifier = Self::begin_run(&mut state, params)?;
                        drop(state);
                        self.arm_timer(&notifier, params);
                        return Ok(notifier);
                    }
                }
            };

            tracing::debug!(
                run_id = in_flight.run_id(),
                "reset waiting for in-flight run to resolve"
            );
            in_flight.wait().await;
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.lock_state().status
    }

    /// Current status, counted as one short-poll read.
    #[must_use]
    pub fn poll_status(&self) -> RunStatus {
        let mut state = self.lock_state();
        state.request_count += 1;
        tracing::debug!(
            request_count = state.request_count,
            status = %state.status,
            "short poll"
        );
        state.status
    }

    /// Current status, run parameters and, if pending, the run's notifier.
    ///
    /// All are read under one lock acquisition, so the notifier returned is
    /// always the one whose retirement ends the reported `pending` status, and
    /// the parameters are those of that same run.
    #[must_use]
    pub fn watch(&self) -> RunSnapshot {
        let state = self.lock_state();
        RunSnapshot {
            status: state.status,
            notifier: state.live_notifier(),
            params: state.params,
        }
    }

    /// Notifier of the in-flight run, if any.
    #[must_use]
    pub fn current_notifier(&self) -> Option<RunNotifier> {
        self.lock_state().live_notifier()
    }

    /// Parameters of the current (or most recent) run.
    #[must_use]
    pub fn params(&self) -> RunParams {
        self.lock_state().params
    }

    /// Number of short-poll reads served so far.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.lock_state().request_count
    }

    /// Number of the current run; 0 before the first run.
    #[must_use]
    pub fn run_id(&self) -> u64 {
        self.lock_state().run_id
    }

    /// Distribution used for the error draw.
    #[must_use]
    pub const fn distribution(&self) -> ErrorDistribution {
        self.distribution
    }

    // A poisoned lock still holds consistent state: every critical section
    // is a handful of field writes with no panicking calls in between.
    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_run(state: &mut RunState, params: RunParams) -> Result<RunNotifier, SimulationError> {
        state.transition(RunStatus::Pending)?;
        state.run_id += 1;
        state.params = params;

        let notifier = RunNotifier::new(state.run_id);
        state.notifier = Some(notifier.clone());
        Ok(notifier)
    }

    /// Schedule resolution of the run owning `notifier`. Called without the lock.
    fn arm_timer(self: &Arc<Self>, notifier: &RunNotifier, params: RunParams) {
        let run_id = notifier.run_id();
        tracing::info!(
            run_id,
            delay_ms = params.delay.as_millis(),
            error_rate = params.error_rate,
            response_latency_ms = params.response_latency.as_millis(),
            "run started"
        );

        let simulation = Arc::downgrade(self);
        self.timer.schedule(
            params.delay,
            Box::new(move || {
                if let Some(simulation) = simulation.upgrade() {
                    simulation.resolve(run_id);
                }
            }),
        );
    }

    /// Resolve run `run_id` to a terminal status and retire its notifier.
    ///
    /// Returns the new status, or `None` if `run_id` is not the pending run.
    fn resolve(&self, run_id: u64) -> Option<RunStatus> {
        let mut state = self.lock_state();
        if state.run_id != run_id || state.status != RunStatus::Pending {
            tracing::warn!(
                run_id,
                current_run_id = state.run_id,
                status = %state.status,
                "ignoring resolution of a run that is not pending"
            );
            return None;
        }

        let sample = self.distribution.sample(&mut state.rng);
        let error_rate = state.params.error_rate;
        let outcome = if sample < error_rate {
            RunStatus::Error
        } else {
            RunStatus::Completed
        };

        if let Err(e) = state.transition(outcome) {
            tracing::warn!("failed to resolve run {run_id}: {e}");
            return None;
        }
        if let Some(notifier) = state.notifier.take() {
            notifier.retire();
        }
        drop(state);

        tracing::info!(
            run_id,
            error_rate,
            sample,
            distribution = %self.distribution,
            status = %outcome,
            "run resolved"
        );
        Some(outcome)
    }
}
