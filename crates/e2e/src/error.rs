//! Error types for the session harness

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Profile switch to '{profile}' failed: {reason}")]
    ProfileSwitch { profile: String, reason: String },

    #[error("Job {job_id} did not reach a terminal state within {waited:?} (last state: {last_state})")]
    PollTimeout {
        job_id: String,
        waited: Duration,
        last_state: String,
    },

    #[error("Job {job_id} reported failure state '{state}'")]
    JobFailed { job_id: String, state: String },

    #[error("Job {job_id} left terminal state '{from}' for '{to}'")]
    JobProtocolViolation {
        job_id: String,
        from: String,
        to: String,
    },

    #[error("Fixture cleanup failed for {fixture}: {reason}")]
    FixtureCleanup { fixture: String, reason: String },

    #[error("Session is closed")]
    SessionClosed,

    #[error("No authenticated session")]
    NotAuthenticated,

    #[error("Unexpected status {status} from {method} {url}: {body}")]
    UnexpectedStatus {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Unknown scenario variable: {0}")]
    UnknownVariable(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Target API unavailable after {0} attempts")]
    TargetUnavailable(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
