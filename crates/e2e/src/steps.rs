//! Scenario step execution

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::PollConfig;
use crate::dashboard::check_dashboard;
use crate::error::{E2eError, E2eResult};
use crate::fixture::Fixture;
use crate::orchestration::{OrchestrationJob, PollCriteria};
use crate::scenario::{ScenarioStep, Variables};
use crate::scope::TestScope;
use crate::session::Credentials;

/// Result of executing a scenario step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Per-scenario state carried between steps
pub struct StepExecutor {
    vars: Variables,
    jobs: HashMap<String, OrchestrationJob>,
    fixtures: HashMap<String, Fixture>,
    poll: PollConfig,
}

impl StepExecutor {
    pub fn new(poll: PollConfig) -> Self {
        Self {
            vars: Variables::default(),
            jobs: HashMap::new(),
            fixtures: HashMap::new(),
            poll,
        }
    }

    pub fn vars(&self) -> &Variables {
        &self.vars
    }

    /// Run steps in order, stopping at the first failure
    pub async fn run_steps(
        &mut self,
        scope: &mut TestScope,
        steps: &[ScenarioStep],
    ) -> (Vec<StepResult>, Option<String>) {
        let mut results = Vec::with_capacity(steps.len());

        for step in steps {
            let result = self.execute_step(scope, step).await;
            let failed = result.error.clone();
            results.push(result);
            if failed.is_some() {
                return (results, failed);
            }
        }

        (results, None)
    }

    /// Execute a single step
    pub async fn execute_step(&mut self, scope: &mut TestScope, step: &ScenarioStep) -> StepResult {
        let start = Instant::now();
        let step_name = step_name(step);

        debug!("Executing step: {}", step_name);

        let result = self.dispatch(scope, step).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => StepResult {
                success: true,
                step_name,
                duration_ms,
                error: None,
            },
            Err(e) => {
                let reason = E2eError::StepFailed {
                    step: step_name.clone(),
                    reason: e.to_string(),
                }
                .to_string();
                StepResult {
                    success: false,
                    step_name,
                    duration_ms,
                    error: Some(reason),
                }
            }
        }
    }

    async fn dispatch(&mut self, scope: &mut TestScope, step: &ScenarioStep) -> E2eResult<()> {
        match step {
            ScenarioStep::CreateDemoUser { save_as } => {
                let user = scope.create_demo_user().await?;
                let email = user.credentials.identifier().as_str().to_string();
                self.vars.set(format!("{}.email", save_as), email);
                self.vars.set(format!("{}.user_id", save_as), user.fixture.id.clone());
                self.vars.set(format!("{}.password", save_as), user.credentials.password());
                self.fixtures.insert(save_as.clone(), user.fixture);
                Ok(())
            }

            ScenarioStep::Login {
                email,
                username,
                password,
                expect_profiles,
            } => {
                let password = self.vars.interpolate(password)?;
                let credentials = match (email, username) {
                    (Some(email), _) => Credentials::email(self.vars.interpolate(email)?, password),
                    (None, Some(username)) => {
                        Credentials::username(self.vars.interpolate(username)?, password)
                    }
                    (None, None) => {
                        return Err(E2eError::ScenarioParse(
                            "login needs an email or a username".to_string(),
                        ))
                    }
                };

                let session = scope.login(&credentials).await?;
                let missing: Vec<String> = expect_profiles
                    .iter()
                    .filter(|p| !session.holds(**p))
                    .map(|p| p.to_string())
                    .collect();
                if !missing.is_empty() {
                    return Err(E2eError::AssertionFailed(format!(
                        "login profiles {:?} lack {}",
                        session.profiles(),
                        missing.join(", ")
                    )));
                }
                Ok(())
            }

            ScenarioStep::SwitchProfile {
                profile,
                expect_redirect_suffix,
                follow,
            } => {
                let redirect = scope.switch_profile(*profile).await?;
                if let Some(suffix) = expect_redirect_suffix {
                    if !redirect.ends_with(suffix.as_str()) {
                        return Err(E2eError::AssertionFailed(format!(
                            "redirect '{}' does not end with '{}'",
                            redirect, suffix
                        )));
                    }
                }
                if *follow {
                    let resp = scope.harness().follow(scope.session()?, &redirect).await?;
                    resp.expect_status(&[200])?;
                }
                self.vars.set("redirect_url", redirect);
                Ok(())
            }

            ScenarioStep::Request {
                method,
                path,
                body,
                authenticated,
                expect_status,
                expect_json,
                max_response_ms,
                save,
            } => {
                let method = Method::from_bytes(method.to_uppercase().as_bytes())
                    .map_err(|e| E2eError::ScenarioParse(format!("bad method '{}': {}", method, e)))?;
                let path = self.vars.interpolate(path)?;
                let body = body
                    .as_ref()
                    .map(|b| self.vars.interpolate_value(b))
                    .transpose()?;

                let resp = if *authenticated {
                    scope.request(method, &path, body.as_ref()).await?
                } else {
                    scope
                        .harness()
                        .request_anonymous(method, &path, body.as_ref())
                        .await?
                };

                match expect_status {
                    Some(expected) => {
                        resp.expect_status(&expected.codes())?;
                    }
                    None if !resp.is_success() => return Err(resp.unexpected()),
                    None => {}
                }

                if let Some(limit) = max_response_ms {
                    if resp.elapsed > Duration::from_millis(*limit) {
                        return Err(E2eError::AssertionFailed(format!(
                            "{} {} took {} ms (limit {} ms)",
                            resp.method,
                            resp.url,
                            resp.elapsed.as_millis(),
                            limit
                        )));
                    }
                }

                if !expect_json.is_empty() || !save.is_empty() {
                    let json = resp.json_value()?;
                    for expectation in expect_json {
                        expectation.check(&json).map_err(E2eError::AssertionFailed)?;
                    }
                    for (name, pointer) in save {
                        let value = json.pointer(pointer).ok_or_else(|| {
                            E2eError::AssertionFailed(format!(
                                "cannot save {}: {} is missing",
                                name, pointer
                            ))
                        })?;
                        self.vars.set(name.clone(), value_text(value));
                    }
                }
                Ok(())
            }

            ScenarioStep::CreateFixture {
                path,
                body,
                id_pointer,
                save_as,
            } => {
                let path = self.vars.interpolate(path)?;
                let body = self.vars.interpolate_value(body)?;
                let (fixture, _) = scope.create_fixture(&path, &body, id_pointer).await?;
                if let Some(name) = save_as {
                    self.vars.set(format!("{}.id", name), fixture.id.clone());
                    self.fixtures.insert(name.clone(), fixture);
                }
                Ok(())
            }

            ScenarioStep::DeleteFixture { fixture } => {
                let target = self.fixtures.get(fixture).cloned().ok_or_else(|| {
                    E2eError::UnknownVariable(fixture.clone())
                })?;
                let outcome = scope.delete_fixture(&target).await;
                debug!("Delete {}: {:?}", target, outcome);
                Ok(())
            }

            ScenarioStep::Orchestrate { service, save_as } => {
                let service = self.vars.interpolate(service)?;
                let job = scope
                    .harness()
                    .trigger_orchestration(scope.session()?, &service)
                    .await?;
                self.vars.set(format!("{}.id", save_as), job.id.clone());
                self.jobs.insert(save_as.clone(), job);
                Ok(())
            }

            ScenarioStep::Poll {
                job,
                interval_ms,
                max_wait_ms,
                settle_checks,
            } => {
                let tracked = self
                    .jobs
                    .get(job)
                    .cloned()
                    .ok_or_else(|| E2eError::UnknownVariable(job.clone()))?;

                let mut criteria = PollCriteria::from(&self.poll);
                if let Some(ms) = interval_ms {
                    criteria.interval = Duration::from_millis(*ms);
                }
                if let Some(ms) = max_wait_ms {
                    criteria.max_wait = Duration::from_millis(*ms);
                }
                let settle_checks = settle_checks.unwrap_or(self.poll.settle_checks);

                let harness = scope.harness();
                let session = scope.session()?;
                let mut finished = harness.poll_until_terminal(session, tracked, &criteria).await?;
                if settle_checks > 0 {
                    finished = harness
                        .confirm_settled(session, finished, settle_checks, criteria.interval)
                        .await?;
                }

                if let Some(state) = finished.state() {
                    self.vars.set(format!("{}.state", job), state.to_string());
                }
                self.jobs.insert(job.clone(), finished);
                Ok(())
            }

            ScenarioStep::CheckDashboard { profile } => {
                let body = scope
                    .harness()
                    .fetch_dashboard(scope.session()?, *profile)
                    .await?;
                check_dashboard(*profile, &body)
            }

            ScenarioStep::Log { message } => {
                info!("[scenario] {}", self.vars.interpolate(message)?);
                Ok(())
            }
        }
    }
}

/// Strings are saved raw, everything else as JSON text
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Get a human-readable name for a step
pub fn step_name(step: &ScenarioStep) -> String {
    match step {
        ScenarioStep::CreateDemoUser { save_as } => format!("create_demo_user({})", save_as),
        ScenarioStep::Login { email, username, .. } => format!(
            "login({})",
            email.as_deref().or(username.as_deref()).unwrap_or("?")
        ),
        ScenarioStep::SwitchProfile { profile, .. } => format!("switch_profile({})", profile),
        ScenarioStep::Request { method, path, .. } => format!("request({} {})", method, path),
        ScenarioStep::CreateFixture { path, .. } => format!("create_fixture({})", path),
        ScenarioStep::DeleteFixture { fixture } => format!("delete_fixture({})", fixture),
        ScenarioStep::Orchestrate { service, .. } => format!("orchestrate({})", service),
        ScenarioStep::Poll { job, .. } => format!("poll({})", job),
        ScenarioStep::CheckDashboard { profile } => format!("check_dashboard({})", profile),
        ScenarioStep::Log { message } => format!("log({})", message),
    }
}
