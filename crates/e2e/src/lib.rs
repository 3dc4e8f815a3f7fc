//! Vida Segura API E2E Harness
//!
//! This crate provides a stateful, authenticated-session harness for
//! end-to-end tests of the Vida Segura / Angra Saúde platform API:
//! - Authenticates and tracks bearer tokens per session
//! - Switches the active profile (Gestor, Hospital, Médico, Paciente)
//! - Polls asynchronous orchestration jobs to a terminal state
//! - Deletes every test fixture at the end of a test, whatever its outcome
//! - Runs declarative YAML scenarios built from those operations
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Scenario Runner (Rust)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SessionHarness                                              │
//! │    ├── authenticate(credentials) -> Session                  │
//! │    ├── switch_profile(session, profile) -> redirect          │
//! │    ├── request(session, method, path, body?) -> ApiResponse  │
//! │    ├── trigger_orchestration / poll_until_terminal           │
//! │    └── create_fixture / delete_fixture                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestScope::run(body)                                        │
//! │    └── body -> teardown (fixtures newest first, logout)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                             │
//! │    ├── name, description, tags                               │
//! │    └── steps: login, switch_profile, request, orchestrate,   │
//! │              poll, create_fixture, check_dashboard, ...      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod fixture;
pub mod harness;
pub mod orchestration;
pub mod profile;
pub mod runner;
pub mod scenario;
pub mod scope;
pub mod session;
pub mod steps;

pub use config::{HarnessConfig, PollConfig, RunnerConfig};
pub use error::{E2eError, E2eResult};
pub use harness::SessionHarness;
pub use orchestration::{JobState, OrchestrationJob, PollCriteria};
pub use profile::Profile;
pub use runner::TestRunner;
pub use scenario::{Scenario, ScenarioStep};
pub use scope::TestScope;
pub use session::{ApiResponse, Credentials, Session, SessionState};

pub use reqwest::Method;
