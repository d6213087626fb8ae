//! JSON bodies exchanged over HTTP.
//!
//! # Wire Format
//!
//! - `GET /status` responds `{"result": "<status>"}`
//! - `POST /reset` accepts `{"sim_time": <s>, "err_rate": <f64>, "server_wait": <ms>}`,
//!   every field optional, and responds `{"message": "Fields updated successfully"}`

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::simulation::RunParams;
use crate::status::RunStatus;

/// Confirmation message returned by a successful reset.
pub const RESET_CONFIRMATION: &str = "Fields updated successfully";

/// Body of every `/status` response and server-sent event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub result: RunStatus,
}

impl StatusResponse {
    /// Payload of one server-sent event, as written after `data: `.
    #[must_use]
    pub fn event_data(self) -> String {
        format!("{{\"result\": \"{}\"}}", self.result)
    }
}

/// Body of a successful `/reset` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    #[must_use]
    pub fn reset_confirmation() -> Self {
        Self {
            message: RESET_CONFIRMATION.to_string(),
        }
    }
}

/// Body of a `/reset` request. Omitted fields take [`ResetDefaults`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ResetRequest {
    /// Seconds until the new run resolves.
    pub sim_time: Option<u64>,
    /// Error rate of the new run, in [0, 1].
    pub err_rate: Option<f64>,
    /// Short-poll response latency in milliseconds.
    pub server_wait: Option<u64>,
}

/// Values used for fields omitted from a reset request.
///
/// These are fixed per deployment; they are never taken from the previous run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResetDefaults {
    pub sim_time: Duration,
    pub err_rate: f64,
    pub server_wait: Duration,
}

impl ResetDefaults {
    pub const DEFAULT_SIM_TIME: Duration = Duration::from_secs(5);
    pub const DEFAULT_ERR_RATE: f64 = 0.1;
}

impl Default for ResetDefaults {
    fn default() -> Self {
        Self {
            sim_time: Self::DEFAULT_SIM_TIME,
            err_rate: Self::DEFAULT_ERR_RATE,
            server_wait: Duration::ZERO,
        }
    }
}

impl ResetRequest {
    /// Parse a request body.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::InvalidJson` if the body is not a JSON object
    /// with the expected field types. An empty body is invalid.
    pub fn from_body(body: &[u8]) -> Result<Self, RequestError> {
        serde_json::from_slice(body).map_err(|e| RequestError::InvalidJson(e.to_string()))
    }

    /// Resolve omitted fields and validate the result.
    ///
    /// `wait_timeout` is process-wide and is carried into the new run as is.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::InvalidErrorRate` if `err_rate` is outside [0, 1].
    pub fn into_params(
        self,
        defaults: &ResetDefaults,
        wait_timeout: Duration,
    ) -> Result<RunParams, RequestError> {
        let error_rate = self.err_rate.unwrap_or(defaults.err_rate);
        if !(0.0..=1.0).contains(&error_rate) {
            return Err(RequestError::InvalidErrorRate(error_rate));
        }

        Ok(RunParams {
            delay: self
                .sim_time
                .map_or(defaults.sim_time, Duration::from_secs),
            error_rate,
            response_latency: self
                .server_wait
                .map_or(defaults.server_wait, Duration::from_millis),
            wait_timeout,
        })
    }
}

/// A client request that was rejected before reaching the simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestError {
    /// The body could not be decoded.
    InvalidJson(String),
    /// `err_rate` was outside [0, 1].
    InvalidErrorRate(f64),
    /// The method is not allowed on this route.
    MethodNotAllowed,
}

impl RequestError {
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidJson(_) | Self::InvalidErrorRate(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(_) => write!(f, "Invalid JSON body"),
            Self::InvalidErrorRate(rate) => {
                write!(f, "err_rate must be between 0 and 1, got {rate}")
            }
            Self::MethodNotAllowed => write!(f, "Only POST requests are allowed"),
        }
    }
}

impl std::error::Error for RequestError {}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        if let Self::InvalidJson(detail) = &self {
            tracing::warn!("rejected reset request body: {detail}");
        } else {
            tracing::warn!("rejected request: {self}");
        }
        (self.status_code(), self.to_string()).into_response()
    }
}
