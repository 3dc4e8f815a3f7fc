//! Guaranteed-release wrapper around a test body
//!
//! A [`TestScope`] owns the harness, the current session and every fixture
//! the test creates. [`TestScope::run`] always tears down after the body,
//! whether it returned `Ok`, `Err` or panicked.

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Method;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};
use crate::fixture::{cleanup_failed, CleanupOutcome, DemoUser, Fixture, FixtureRegistry};
use crate::harness::SessionHarness;
use crate::profile::Profile;
use crate::session::{ApiResponse, Credentials, Session};

pub struct TestScope {
    harness: SessionHarness,
    session: Option<Session>,
    fixtures: FixtureRegistry,
    cleanup: Vec<CleanupOutcome>,
}

impl TestScope {
    pub fn new(harness: SessionHarness) -> Self {
        Self {
            harness,
            session: None,
            fixtures: FixtureRegistry::new(),
            cleanup: Vec::new(),
        }
    }

    pub fn harness(&self) -> &SessionHarness {
        &self.harness
    }

    /// Log in, replacing (and logging out) any previous session.
    ///
    /// Fixtures are deleted at teardown with whichever session is current.
    pub async fn login(&mut self, credentials: &Credentials) -> E2eResult<&Session> {
        let session = self.harness.authenticate(credentials).await?;
        if let Some(mut previous) = self.session.replace(session) {
            self.harness.logout(&mut previous).await;
        }
        self.session()
    }

    pub fn session(&self) -> E2eResult<&Session> {
        self.session.as_ref().ok_or(E2eError::NotAuthenticated)
    }

    pub async fn switch_profile(&mut self, profile: Profile) -> E2eResult<String> {
        let session = self.session.as_mut().ok_or(E2eError::NotAuthenticated)?;
        self.harness.switch_profile(session, profile).await
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> E2eResult<ApiResponse> {
        self.harness.request(self.session()?, method, path, body).await
    }

    /// Provision a demo user and track it for deletion
    pub async fn create_demo_user(&mut self) -> E2eResult<DemoUser> {
        let user = self.harness.create_demo_user().await?;
        self.fixtures.register(user.fixture.clone());
        Ok(user)
    }

    /// Create a resource and track it for deletion
    pub async fn create_fixture(
        &mut self,
        path: &str,
        body: &Value,
        id_pointer: &str,
    ) -> E2eResult<(Fixture, Value)> {
        let session = self.session()?;
        let (fixture, created) = self
            .harness
            .create_fixture(session, path, body, id_pointer)
            .await?;
        self.fixtures.register(fixture.clone());
        Ok((fixture, created))
    }

    /// Track a fixture created outside the scope
    pub fn track(&mut self, fixture: Fixture) {
        self.fixtures.register(fixture);
    }

    pub fn fixtures(&self) -> &FixtureRegistry {
        &self.fixtures
    }

    /// Delete a fixture now instead of at teardown
    pub async fn delete_fixture(&mut self, fixture: &Fixture) -> CleanupOutcome {
        self.fixtures.remove(fixture);
        let outcome = match self.session.as_ref() {
            Some(session) if !session.is_closed() => {
                self.harness.delete_fixture(session, fixture).await
            }
            _ => cleanup_failed(fixture.to_string(), "no authenticated session".to_string()),
        };
        self.cleanup.push(outcome.clone());
        outcome
    }

    /// Outcomes of every deletion attempted so far
    pub fn cleanup_report(&self) -> &[CleanupOutcome] {
        &self.cleanup
    }

    /// Delete all tracked fixtures (newest first), then log out. Never fails.
    pub async fn teardown(&mut self) {
        let pending = self.fixtures.drain();
        if !pending.is_empty() {
            debug!("Tearing down {} fixture(s)", pending.len());
        }

        for fixture in pending {
            let outcome = match self.session.as_ref() {
                Some(session) if !session.is_closed() => {
                    self.harness.delete_fixture(session, &fixture).await
                }
                _ => cleanup_failed(fixture.to_string(), "no authenticated session".to_string()),
            };
            self.cleanup.push(outcome);
        }

        if let Some(session) = self.session.as_mut() {
            self.harness.logout(session).await;
        }
    }

    /// Run `body`, then tear down unconditionally.
    ///
    /// A panic inside `body` is resumed after teardown has finished.
    pub async fn run<T, F>(&mut self, body: F) -> E2eResult<T>
    where
        F: for<'s> FnOnce(&'s mut TestScope) -> BoxFuture<'s, E2eResult<T>>,
    {
        let outcome = AssertUnwindSafe(body(&mut *self)).catch_unwind().await;
        self.teardown().await;

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl Drop for TestScope {
    fn drop(&mut self) {
        if !self.fixtures.is_empty() {
            let leaked: Vec<String> = self.fixtures.iter().map(|f| f.to_string()).collect();
            warn!(
                "Test scope dropped without teardown; leaked fixtures: {}",
                leaked.join(", ")
            );
        }
    }
}
