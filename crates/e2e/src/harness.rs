//! Authenticated HTTP session against the platform API

use reqwest::header::ACCEPT;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::error::{E2eError, E2eResult};
use crate::profile::Profile;
use crate::session::{jwt_expiry, ApiResponse, Credentials, Session};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: Option<String>,
    #[serde(default)]
    profiles: Vec<String>,
    expires_in: Option<i64>,
}

/// Client side of the platform API.
///
/// Holds only immutable configuration; all per-test state lives in
/// [`Session`] values passed explicitly.
#[derive(Clone)]
pub struct SessionHarness {
    client: reqwest::Client,
    config: Arc<HarnessConfig>,
}

impl SessionHarness {
    pub fn new(config: HarnessConfig) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Log in and return an authenticated session
    pub async fn authenticate(&self, credentials: &Credentials) -> E2eResult<Session> {
        let url = self.config.api_url("/auth/login");
        let body = serde_json::to_value(credentials)?;

        let resp = self
            .send(None, Method::POST, url, Some(&body))
            .await
            .map_err(|e| E2eError::Authentication(e.to_string()))?;

        if !resp.is_success() {
            return Err(E2eError::Authentication(format!(
                "login returned status {}",
                resp.status
            )));
        }

        let login: LoginResponse = resp
            .json()
            .map_err(|e| E2eError::Authentication(format!("malformed login response: {}", e)))?;

        let token = login
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                E2eError::Authentication("login response has no access_token".to_string())
            })?;

        // An out-of-range expires_in falls back to the token's own exp claim
        let expires_at = login
            .expires_in
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| chrono::Utc::now().checked_add_signed(ttl))
            .or_else(|| jwt_expiry(&token));

        info!(
            "Authenticated {} ({} profile(s))",
            credentials.identifier().as_str(),
            login.profiles.len()
        );

        Ok(Session::new(
            credentials.identifier().as_str().to_string(),
            token,
            login.profiles,
            expires_at,
        ))
    }

    /// Switch the active profile, returning the redirect target
    pub async fn switch_profile(&self, session: &mut Session, profile: Profile) -> E2eResult<String> {
        let token = session.token()?.to_string();
        let url = self.config.api_url("/auth/switch-profile");
        let body = json!({ "profile": profile });

        let switch_err = |reason: String| E2eError::ProfileSwitch {
            profile: profile.to_string(),
            reason,
        };

        let resp = self
            .send(Some(&token), Method::POST, url, Some(&body))
            .await
            .map_err(|e| switch_err(e.to_string()))?;

        if !resp.is_success() {
            return Err(switch_err(format!(
                "server returned {}: {}",
                resp.status, resp.body
            )));
        }

        let redirect = resp
            .json_value()
            .ok()
            .and_then(|v| v.get("redirect_url").and_then(Value::as_str).map(str::to_string))
            .filter(|r| !r.is_empty())
            .ok_or_else(|| switch_err("response has no redirect_url".to_string()))?;

        session.activate(profile);
        info!("Switched to profile {} -> {}", profile, redirect);
        Ok(redirect)
    }

    /// Issue an authenticated API call. Never retries.
    pub async fn request(
        &self,
        session: &Session,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> E2eResult<ApiResponse> {
        let token = session.token()?;
        let url = self.config.api_url(path);
        self.send(Some(token), method, url, body).await
    }

    /// Issue an API call without a bearer token
    pub async fn request_anonymous(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> E2eResult<ApiResponse> {
        let url = self.config.api_url(path);
        self.send(None, method, url, body).await
    }

    /// Fetch a redirect target returned by [`switch_profile`](Self::switch_profile).
    ///
    /// Relative targets resolve against the base URL without the API prefix.
    pub async fn follow(&self, session: &Session, target: &str) -> E2eResult<ApiResponse> {
        let token = session.token()?;
        let url = self.config.url(target);
        self.send(Some(token), Method::GET, url, None).await
    }

    /// Best-effort logout. Always leaves the session closed.
    pub async fn logout(&self, session: &mut Session) {
        if session.is_closed() {
            return;
        }
        if let Ok(token) = session.token() {
            let url = self.config.api_url("/auth/logout");
            match self.send(Some(token), Method::POST, url, None).await {
                Ok(resp) if resp.is_success() || resp.status == 404 => {
                    debug!("Logged out {}", session.identity());
                }
                Ok(resp) => warn!("Logout returned {}", resp.status),
                Err(e) => warn!("Logout failed: {}", e),
            }
        }
        session.close();
    }

    /// Wait for the target's health endpoint to answer 2xx
    pub async fn wait_until_ready(&self) -> E2eResult<()> {
        let Some(health_path) = self.config.health_path.as_deref() else {
            return Ok(());
        };
        let health_url = self.config.api_url(health_path);
        let probe = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;

            match probe.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!("Target is ready at {}", self.config.base_url);
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for target at {}...", self.config.base_url);
                    }
                    // Connection refused is expected while the target is starting
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            if start.elapsed() >= self.config.startup_timeout {
                return Err(E2eError::TargetUnavailable(attempts));
            }
            sleep(Duration::from_millis(250)).await;
        }
    }

    async fn send(
        &self,
        token: Option<&str>,
        method: Method,
        url: String,
        body: Option<&Value>,
    ) -> E2eResult<ApiResponse> {
        let start = Instant::now();

        let mut req = self
            .client
            .request(method.clone(), &url)
            .header(ACCEPT, "application/json");
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        let elapsed = start.elapsed();

        debug!("{} {} -> {} ({} ms)", method, url, status, elapsed.as_millis());

        Ok(ApiResponse {
            method: method.to_string(),
            url,
            status,
            body: text,
            elapsed,
        })
    }
}
