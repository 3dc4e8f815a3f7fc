//! Test fixtures: resources created only to support a test
//!
//! Creation propagates errors. Deletion never does: failures are logged and
//! reported as a [`CleanupOutcome`] so they cannot mask the test's own result.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::harness::SessionHarness;
use crate::session::{Credentials, Session};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    /// Resource kind, e.g. "users" or "telemedicine/sessions"
    pub kind: String,
    pub id: String,
    /// Path the DELETE is sent to
    pub delete_path: String,
}

impl Fixture {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        let kind = kind.into().trim_matches('/').to_string();
        let id = id.into();
        let delete_path = format!("/{}/{}", kind, id);
        Self {
            kind,
            id,
            delete_path,
        }
    }
}

impl std::fmt::Display for Fixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CleanupOutcome {
    Deleted { fixture: String },
    AlreadyAbsent { fixture: String },
    Failed { fixture: String, reason: String },
}

impl CleanupOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CleanupOutcome::Failed { .. })
    }
}

/// Demo user provisioned through the platform's edge function
#[derive(Debug, Clone)]
pub struct DemoUser {
    pub credentials: Credentials,
    pub fixture: Fixture,
}

#[derive(Debug, Deserialize)]
struct DemoUserResponse {
    email: Option<String>,
    password: Option<String>,
    user_id: Option<Value>,
}

/// Fixtures owned by one test, deleted newest first
#[derive(Debug, Default)]
pub struct FixtureRegistry {
    fixtures: Vec<Fixture>,
}

impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, fixture: Fixture) {
        debug!("Registered fixture {}", fixture);
        self.fixtures.push(fixture);
    }

    /// Stop tracking a fixture; returns whether it was tracked
    pub fn remove(&mut self, fixture: &Fixture) -> bool {
        match self.fixtures.iter().position(|f| f == fixture) {
            Some(pos) => {
                self.fixtures.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fixture> {
        self.fixtures.iter()
    }

    /// Take every fixture in deletion order (reverse of creation)
    pub fn drain(&mut self) -> Vec<Fixture> {
        let mut drained: Vec<Fixture> = self.fixtures.drain(..).collect();
        drained.reverse();
        drained
    }
}

/// Render a JSON id (string or number) as text
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl SessionHarness {
    /// POST `body` to `path` and return the created resource's fixture.
    ///
    /// The id is read from `id_pointer` in the response (usually `/id`).
    pub async fn create_fixture(
        &self,
        session: &Session,
        path: &str,
        body: &Value,
        id_pointer: &str,
    ) -> E2eResult<(Fixture, Value)> {
        let resp = self.request(session, Method::POST, path, Some(body)).await?;
        resp.expect_status(&[200, 201])?;

        let created = resp.json_value()?;
        let id = created
            .pointer(id_pointer)
            .and_then(id_text)
            .ok_or_else(|| {
                E2eError::AssertionFailed(format!(
                    "created resource at {} has no id at {}",
                    path, id_pointer
                ))
            })?;

        let fixture = Fixture::new(path, id);
        info!("Created fixture {}", fixture);
        Ok((fixture, created))
    }

    /// Delete a fixture. Never fails; a 404 counts as already deleted.
    pub async fn delete_fixture(&self, session: &Session, fixture: &Fixture) -> CleanupOutcome {
        let label = fixture.to_string();

        match self
            .request(session, Method::DELETE, &fixture.delete_path, None)
            .await
        {
            Ok(resp) if resp.is_success() => {
                debug!("Deleted fixture {}", label);
                CleanupOutcome::Deleted { fixture: label }
            }
            Ok(resp) if resp.status == 404 || resp.status == 410 => {
                debug!("Fixture {} already absent", label);
                CleanupOutcome::AlreadyAbsent { fixture: label }
            }
            Ok(resp) => cleanup_failed(label, format!("server returned {}", resp.status)),
            Err(e) => cleanup_failed(label, e.to_string()),
        }
    }

    /// Provision a demo user holding every profile
    pub async fn create_demo_user(&self) -> E2eResult<DemoUser> {
        let resp = self
            .request_anonymous(Method::POST, "/edge-functions/create-demo-user", None)
            .await?;
        resp.expect_status(&[200, 201])?;

        let body: DemoUserResponse = resp.json()?;
        let missing = |field: &str| {
            E2eError::AssertionFailed(format!("demo user response has no {}", field))
        };

        let email = body.email.filter(|e| !e.is_empty()).ok_or_else(|| missing("email"))?;
        let password = body
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| missing("password"))?;
        let user_id = body
            .user_id
            .as_ref()
            .and_then(id_text)
            .ok_or_else(|| missing("user_id"))?;

        info!("Created demo user {} ({})", email, user_id);
        Ok(DemoUser {
            credentials: Credentials::email(email, password),
            fixture: Fixture::new("users", user_id),
        })
    }
}

pub(crate) fn cleanup_failed(fixture: String, reason: String) -> CleanupOutcome {
    let err = E2eError::FixtureCleanup {
        fixture: fixture.clone(),
        reason: reason.clone(),
    };
    warn!("{}", err);
    CleanupOutcome::Failed { fixture, reason }
}
