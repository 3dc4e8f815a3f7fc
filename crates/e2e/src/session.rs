//! Session state, credentials and raw API responses

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{E2eError, E2eResult};
use crate::profile::Profile;

/// Login identifier accepted by the platform
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identifier {
    Email(String),
    Username(String),
}

impl Identifier {
    pub fn as_str(&self) -> &str {
        match self {
            Identifier::Email(v) | Identifier::Username(v) => v,
        }
    }
}

/// Immutable login credentials.
///
/// Serializes to the login body: `{"email": ..., "password": ...}` or
/// `{"username": ..., "password": ...}`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(flatten)]
    identifier: Identifier,
    password: String,
}

impl Credentials {
    pub fn email(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: Identifier::Email(email.into()),
            password: password.into(),
        }
    }

    pub fn username(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: Identifier::Username(username.into()),
            password: password.into(),
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier.as_str())
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Email(v) => write!(f, "Email({})", v),
            Identifier::Username(v) => write!(f, "Username({})", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Authenticated,
    ProfileSwitched,
    Closed,
}

/// An authenticated session.
///
/// Headers are derived from this value on every call; nothing is shared
/// between sessions.
#[derive(Debug, Clone)]
pub struct Session {
    identity: String,
    token: Option<String>,
    state: SessionState,
    profiles: Vec<String>,
    active_profile: Option<Profile>,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub(crate) fn new(
        identity: String,
        token: String,
        profiles: Vec<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            identity,
            token: Some(token),
            state: SessionState::Authenticated,
            profiles,
            active_profile: None,
            expires_at,
        }
    }

    /// Bearer token, unless the session was closed
    pub fn token(&self) -> E2eResult<&str> {
        match (&self.state, &self.token) {
            (SessionState::Closed, _) | (_, None) => Err(E2eError::SessionClosed),
            (_, Some(token)) => Ok(token),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Profile labels reported by the login response
    pub fn profiles(&self) -> &[String] {
        &self.profiles
    }

    pub fn holds(&self, profile: Profile) -> bool {
        self.profiles
            .iter()
            .any(|p| p.parse::<Profile>().map(|p| p == profile).unwrap_or(false))
    }

    pub fn active_profile(&self) -> Option<Profile> {
        self.active_profile
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| exp <= Utc::now()).unwrap_or(false)
    }

    pub(crate) fn activate(&mut self, profile: Profile) {
        self.active_profile = Some(profile);
        self.state = SessionState::ProfileSwitched;
    }

    pub(crate) fn close(&mut self) {
        self.token = None;
        self.active_profile = None;
        self.state = SessionState::Closed;
    }
}

/// Read the `exp` claim from a JWT without verifying it
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

/// Raw response surfaced to the caller for assertion
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> E2eResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    pub fn json_value(&self) -> E2eResult<serde_json::Value> {
        self.json()
    }

    /// Look up a JSON pointer (e.g. `/bedManagement/totalBeds`) in the body
    pub fn pointer(&self, pointer: &str) -> Option<serde_json::Value> {
        self.json_value().ok()?.pointer(pointer).cloned()
    }

    /// Fail unless the status is one of `expected`
    pub fn expect_status(&self, expected: &[u16]) -> E2eResult<&Self> {
        if expected.contains(&self.status) {
            Ok(self)
        } else {
            Err(self.unexpected())
        }
    }

    pub(crate) fn unexpected(&self) -> E2eError {
        E2eError::UnexpectedStatus {
            method: self.method.clone(),
            url: self.url.clone(),
            status: self.status,
            body: truncate(&self.body, 512),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
