//! In-process mock of the platform API used by the integration tests

#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use vidasegura_e2e::{HarnessConfig, PollConfig, SessionHarness};

pub const ALL_PROFILES: [&str; 4] = ["Gestor", "Hospital", "Médico", "Paciente"];

/// `exp` claim of tokens issued to jwt@test.com (2100-01-01T00:00:00Z)
pub const JWT_EXP: i64 = 4_102_444_800;

/// Unsigned JWT with an `exp` claim; the signature slot carries `sig`
fn jwt(exp: i64, sig: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({ "sub": "6", "exp": exp }).to_string());
    format!("{}.{}.{}", header, payload, sig)
}

#[derive(Clone)]
struct MockUser {
    id: String,
    password: String,
    profiles: Vec<String>,
    /// Login succeeds but the response carries no token
    omit_token: bool,
    /// Profile switch succeeds but the response carries no redirect
    omit_redirect: bool,
    /// `expires_in` sent with the token; omitted when None
    expires_in: Option<i64>,
    /// Issue a JWT carrying this `exp` claim instead of an opaque token
    jwt_exp: Option<i64>,
}

impl MockUser {
    fn new(id: &str, password: &str, profiles: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            password: password.to_string(),
            profiles: profiles.iter().map(|p| p.to_string()).collect(),
            omit_token: false,
            omit_redirect: false,
            expires_in: Some(3600),
            jwt_exp: None,
        }
    }
}

pub struct MockState {
    base_url: String,
    users: Mutex<HashMap<String, MockUser>>,
    tokens: Mutex<HashMap<String, String>>,
    /// Script for the next triggered job; "503" answers the status check with 503
    next_job_script: Mutex<Vec<String>>,
    jobs: Mutex<HashMap<String, VecDeque<String>>>,
    records: Mutex<HashMap<String, Value>>,
    deleted: Mutex<Vec<String>>,
    status_checks: AtomicUsize,
    logouts: AtomicUsize,
    next_id: AtomicU64,
}

impl MockState {
    fn new(base_url: String) -> Self {
        let mut users = HashMap::new();
        users.insert(
            "demo@test.com".to_string(),
            MockUser::new("1", "Demo123!", &ALL_PROFILES),
        );
        users.insert(
            "hospital_admin".to_string(),
            MockUser::new("2", "securepassword123", &["Hospital"]),
        );
        users.insert(
            "notoken@test.com".to_string(),
            MockUser {
                omit_token: true,
                ..MockUser::new("3", "x", &[])
            },
        );
        users.insert(
            "noredirect@test.com".to_string(),
            MockUser {
                omit_redirect: true,
                ..MockUser::new("4", "x", &["Gestor"])
            },
        );
        users.insert(
            "overflow@test.com".to_string(),
            MockUser {
                expires_in: Some(i64::MAX),
                ..MockUser::new("5", "x", &["Paciente"])
            },
        );
        users.insert(
            "jwt@test.com".to_string(),
            MockUser {
                expires_in: None,
                jwt_exp: Some(JWT_EXP),
                ..MockUser::new("6", "x", &["Paciente"])
            },
        );

        Self {
            base_url,
            users: Mutex::new(users),
            tokens: Mutex::new(HashMap::new()),
            next_job_script: Mutex::new(vec!["queued".into(), "started".into(), "completed".into()]),
            jobs: Mutex::new(HashMap::new()),
            records: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
            status_checks: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            next_id: AtomicU64::new(100),
        }
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Identity behind the request's bearer token
    fn caller(&self, headers: &HeaderMap) -> Option<String> {
        let token = headers
            .get("authorization")?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        self.tokens.lock().unwrap().get(token).cloned()
    }

    fn user(&self, identity: &str) -> Option<MockUser> {
        self.users.lock().unwrap().get(identity).cloned()
    }

    /// States the next triggered job will report, in order
    pub fn script_next_job(&self, states: &[&str]) {
        *self.next_job_script.lock().unwrap() = states.iter().map(|s| s.to_string()).collect();
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn status_checks(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    pub fn user_exists(&self, id: &str) -> bool {
        self.users.lock().unwrap().values().any(|u| u.id == id)
    }

    pub fn record_exists(&self, key: &str) -> bool {
        self.records.lock().unwrap().contains_key(key)
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))).into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({ "database": "ok" }))
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    let identity = body
        .get("email")
        .or_else(|| body.get("username"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();

    let Some(user) = state.user(&identity).filter(|u| u.password == password) else {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid credentials" }))).into_response();
    };
    if user.omit_token {
        return Json(json!({ "profiles": user.profiles })).into_response();
    }

    let opaque = format!("tok-{}", state.next_id());
    let token = match user.jwt_exp {
        Some(exp) => jwt(exp, &opaque),
        None => opaque,
    };
    state.tokens.lock().unwrap().insert(token.clone(), identity);

    let mut body = json!({
        "access_token": token,
        "refresh_token": "unused",
        "profiles": user.profiles,
    });
    if let Some(ttl) = user.expires_in {
        body["expires_in"] = json!(ttl);
    }
    Json(body).into_response()
}

async fn switch_profile(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(identity) = state.caller(&headers) else {
        return unauthorized();
    };
    let Some(user) = state.user(&identity) else {
        return unauthorized();
    };
    let profile = body.get("profile").and_then(Value::as_str).unwrap_or_default();
    if !user.profiles.iter().any(|p| p == profile) {
        return (StatusCode::FORBIDDEN, Json(json!({ "error": "profile not held" }))).into_response();
    }
    if user.omit_redirect {
        return Json(json!({ "ok": true })).into_response();
    }

    let slug = match profile {
        "Médico" => "medico".to_string(),
        other => other.to_lowercase(),
    };
    Json(json!({ "redirect_url": format!("{}/dashboard/{}", state.base_url, slug) })).into_response()
}

async fn logout(State(state): State<Arc<MockState>>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        state.tokens.lock().unwrap().remove(token);
    }
    state.logouts.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn dashboard(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Response {
    if state.caller(&headers).is_none() {
        return unauthorized();
    }
    let body = match slug.as_str() {
        "hospital" => json!({
            "bedManagement": { "totalBeds": 120, "occupiedBeds": 87 },
            "sidebar": [{ "label": "Leitos" }, { "label": "Faturamento" }],
            "navbar": { "title": "Hospital" }
        }),
        "gestor" => json!({
            "kpis": { "coverage_rate": 0.82, "indicators_sus": { "immunization_index": 91 } },
            "layout": { "columns": 3 }
        }),
        "medico" => json!({ "agenda": [] }),
        "paciente" => json!({ "appointments": [] }),
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    Json(body).into_response()
}

async fn orchestrate(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if state.caller(&headers).is_none() {
        return unauthorized();
    }
    let id = format!("orch-{}", state.next_id());
    let script: VecDeque<String> = state.next_job_script.lock().unwrap().clone().into();
    state.jobs.lock().unwrap().insert(id.clone(), script);
    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "queued", "orchestration_id": id })),
    )
        .into_response()
}

async fn orchestrate_status(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if state.caller(&headers).is_none() {
        return unauthorized();
    }
    state.status_checks.fetch_add(1, Ordering::SeqCst);

    let mut jobs = state.jobs.lock().unwrap();
    let Some(script) = jobs.get_mut(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let current = if script.len() > 1 {
        script.pop_front().unwrap_or_default()
    } else {
        script.front().cloned().unwrap_or_default()
    };
    if current == "503" {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(json!({ "state": current })).into_response()
}

async fn create_demo_user(State(state): State<Arc<MockState>>) -> Response {
    let id = state.next_id();
    let email = format!("demo-{}@test.com", id);
    state.users.lock().unwrap().insert(
        email.clone(),
        MockUser::new(&id, "Demo123!", &ALL_PROFILES),
    );
    Json(json!({ "email": email, "password": "Demo123!", "user_id": id })).into_response()
}

async fn delete_user(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if state.caller(&headers).is_none() {
        return unauthorized();
    }
    let mut users = state.users.lock().unwrap();
    let before = users.len();
    users.retain(|_, u| u.id != id);
    if users.len() == before {
        return StatusCode::NOT_FOUND.into_response();
    }
    state.deleted.lock().unwrap().push(format!("users/{}", id));
    StatusCode::NO_CONTENT.into_response()
}

async fn create_session(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Response {
    if state.caller(&headers).is_none() {
        return unauthorized();
    }
    let id = state.next_id();
    body["id"] = json!(id);
    state
        .records
        .lock()
        .unwrap()
        .insert(format!("telemedicine/sessions/{}", id), body.clone());
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn get_session(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if state.caller(&headers).is_none() {
        return unauthorized();
    }
    match state
        .records
        .lock()
        .unwrap()
        .get(&format!("telemedicine/sessions/{}", id))
    {
        Some(record) => Json(record.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_session(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if state.caller(&headers).is_none() {
        return unauthorized();
    }
    let key = format!("telemedicine/sessions/{}", id);
    if state.records.lock().unwrap().remove(&key).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }
    state.deleted.lock().unwrap().push(key);
    StatusCode::NO_CONTENT.into_response()
}

async fn create_locked(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if state.caller(&headers).is_none() {
        return unauthorized();
    }
    (StatusCode::CREATED, Json(json!({ "id": state.next_id() }))).into_response()
}

/// Locked records can never be deleted
async fn delete_locked() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

/// A running mock API bound to an ephemeral port
pub struct MockApi {
    pub base_url: String,
    pub state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockApi {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://127.0.0.1:{}", addr.port());
        let state = Arc::new(MockState::new(base_url.clone()));

        let app = Router::new()
            .route("/health", get(health))
            .route("/auth/login", post(login))
            .route("/auth/switch-profile", post(switch_profile))
            .route("/auth/logout", post(logout))
            .route("/dashboard/:slug", get(dashboard))
            .route("/mcp-server/orchestrate", post(orchestrate))
            .route("/mcp-server/orchestrate/status/:id", get(orchestrate_status))
            .route("/edge-functions/create-demo-user", post(create_demo_user))
            .route("/users/:id", delete(delete_user))
            .route("/telemedicine/sessions", post(create_session))
            .route("/telemedicine/sessions/:id", get(get_session).delete(delete_session))
            .route("/locked-records", post(create_locked))
            .route("/locked-records/:id", delete(delete_locked))
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            state,
            handle,
        }
    }

    pub fn config(&self) -> HarnessConfig {
        HarnessConfig {
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_secs(5),
            startup_timeout: Duration::from_secs(5),
            poll: PollConfig {
                interval: Duration::from_millis(20),
                max_wait: Duration::from_secs(2),
                settle_checks: 0,
            },
            ..Default::default()
        }
    }

    pub fn harness(&self) -> SessionHarness {
        SessionHarness::new(self.config()).unwrap()
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
