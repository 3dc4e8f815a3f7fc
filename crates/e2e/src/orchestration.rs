//! Asynchronous orchestration jobs: trigger and poll to a terminal state
//!
//! Polling fails fast on a failure state, keeps waiting on pending states and
//! gives up only once the full `max_wait` has elapsed.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::error::{E2eError, E2eResult};
use crate::harness::SessionHarness;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    Queued,
    Started,
    Completed,
    Failed,
    Unknown(String),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Queued => "queued",
            JobState::Started => "started",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Unknown(raw) => raw,
        }
    }
}

impl From<&str> for JobState {
    fn from(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "queued" => JobState::Queued,
            "started" => JobState::Started,
            "completed" => JobState::Completed,
            "failed" => JobState::Failed,
            _ => JobState::Unknown(raw.to_string()),
        }
    }
}

impl From<String> for JobState {
    fn from(raw: String) -> Self {
        JobState::from(raw.as_str())
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server-accepted asynchronous task as observed by the poller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationJob {
    pub id: String,
    pub service: String,
    /// Every state observed so far, oldest first
    pub history: Vec<JobState>,
}

impl OrchestrationJob {
    pub fn new(service: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> Option<&JobState> {
        self.history.last()
    }

    /// Record an observed state. Leaving a terminal state is a protocol violation.
    pub fn observe(&mut self, state: JobState) -> E2eResult<()> {
        if let Some(last) = self.history.last() {
            if last.is_terminal() && *last != state {
                return Err(E2eError::JobProtocolViolation {
                    job_id: self.id.clone(),
                    from: last.to_string(),
                    to: state.to_string(),
                });
            }
        }
        self.history.push(state);
        Ok(())
    }

    fn last_state_label(&self) -> String {
        self.state()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none observed".to_string())
    }
}

/// When to stop polling
#[derive(Debug, Clone)]
pub struct PollCriteria {
    /// States that end the poll successfully
    pub terminal: Vec<JobState>,
    /// States that end the poll with `JobFailed`, checked before `terminal`
    pub failure: Vec<JobState>,
    pub interval: Duration,
    pub max_wait: Duration,
}

impl PollCriteria {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self {
            terminal: vec![JobState::Completed, JobState::Failed],
            failure: vec![JobState::Failed],
            interval,
            max_wait,
        }
    }

    pub fn with_terminal(mut self, terminal: Vec<JobState>) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn with_failure(mut self, failure: Vec<JobState>) -> Self {
        self.failure = failure;
        self
    }
}

impl From<&PollConfig> for PollCriteria {
    fn from(config: &PollConfig) -> Self {
        Self::new(config.interval, config.max_wait)
    }
}

/// Where job states come from
#[async_trait]
pub trait JobStatusSource: Send {
    /// Current state of `job`, or `None` when the status endpoint did not
    /// give a usable answer this time (non-2xx, missing `state`).
    async fn fetch_state(&mut self, job: &OrchestrationJob) -> E2eResult<Option<JobState>>;
}

/// Poll `source` at a fixed interval until `job` reaches a terminal state
pub async fn poll_until_terminal<S: JobStatusSource>(
    source: &mut S,
    mut job: OrchestrationJob,
    criteria: &PollCriteria,
) -> E2eResult<OrchestrationJob> {
    let start = Instant::now();

    loop {
        if let Some(state) = source.fetch_state(&job).await? {
            debug!("Job {} is {} after {:?}", job.id, state, start.elapsed());
            job.observe(state.clone())?;

            if criteria.failure.contains(&state) {
                return Err(E2eError::JobFailed {
                    job_id: job.id.clone(),
                    state: state.to_string(),
                });
            }
            if criteria.terminal.contains(&state) {
                info!("Job {} reached {} in {:?}", job.id, state, start.elapsed());
                return Ok(job);
            }
            if let JobState::Unknown(raw) = &state {
                warn!("Job {} reported unrecognised state '{}'", job.id, raw);
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= criteria.max_wait {
            return Err(E2eError::PollTimeout {
                job_id: job.id.clone(),
                waited: elapsed,
                last_state: job.last_state_label(),
            });
        }
        sleep(criteria.interval.min(criteria.max_wait - elapsed)).await;
    }
}

/// Re-check a terminal job `checks` times, failing if it ever leaves its state
pub async fn confirm_settled<S: JobStatusSource>(
    source: &mut S,
    mut job: OrchestrationJob,
    checks: u32,
    interval: Duration,
) -> E2eResult<OrchestrationJob> {
    for _ in 0..checks {
        sleep(interval).await;
        if let Some(state) = source.fetch_state(&job).await? {
            job.observe(state)?;
        }
    }
    Ok(job)
}

#[derive(Debug, Deserialize)]
struct TriggerResponse {
    status: Option<String>,
    orchestration_id: Option<String>,
}

struct HarnessJobSource<'a> {
    harness: &'a SessionHarness,
    session: &'a Session,
}

#[async_trait]
impl<'a> JobStatusSource for HarnessJobSource<'a> {
    async fn fetch_state(&mut self, job: &OrchestrationJob) -> E2eResult<Option<JobState>> {
        let path = format!("/{}/orchestrate/status/{}", job.service, job.id);
        let resp = self
            .harness
            .request(self.session, Method::GET, &path, None)
            .await?;

        if !resp.is_success() {
            warn!("Status check for job {} returned {}", job.id, resp.status);
            return Ok(None);
        }

        let state = resp
            .json_value()
            .ok()
            .and_then(|v| v.get("state").and_then(Value::as_str).map(JobState::from));
        if state.is_none() {
            warn!("Status response for job {} has no state", job.id);
        }
        Ok(state)
    }
}

impl SessionHarness {
    /// Start an orchestration job. Expects 202 with a `started`/`queued` status.
    pub async fn trigger_orchestration(
        &self,
        session: &Session,
        service: &str,
    ) -> E2eResult<OrchestrationJob> {
        let path = format!("/{}/orchestrate", service.trim_matches('/'));
        let resp = self.request(session, Method::POST, &path, None).await?;
        resp.expect_status(&[202])?;

        let body: TriggerResponse = resp.json()?;
        let id = body
            .orchestration_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                E2eError::AssertionFailed("orchestration response has no orchestration_id".into())
            })?;

        let state = JobState::from(body.status.unwrap_or_default());
        if !matches!(state, JobState::Started | JobState::Queued) {
            return Err(E2eError::AssertionFailed(format!(
                "orchestration {} was not started or queued: {}",
                id, state
            )));
        }

        let mut job = OrchestrationJob::new(service.trim_matches('/'), id);
        job.observe(state)?;
        info!("Triggered {} orchestration {}", job.service, job.id);
        Ok(job)
    }

    pub async fn poll_until_terminal(
        &self,
        session: &Session,
        job: OrchestrationJob,
        criteria: &PollCriteria,
    ) -> E2eResult<OrchestrationJob> {
        let mut source = HarnessJobSource {
            harness: self,
            session,
        };
        poll_until_terminal(&mut source, job, criteria).await
    }

    pub async fn confirm_settled(
        &self,
        session: &Session,
        job: OrchestrationJob,
        checks: u32,
        interval: Duration,
    ) -> E2eResult<OrchestrationJob> {
        let mut source = HarnessJobSource {
            harness: self,
            session,
        };
        confirm_settled(&mut source, job, checks, interval).await
    }
}
