//! Declarative YAML scenarios

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::{E2eError, E2eResult};
use crate::profile::Profile;

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Steps to execute in order
    pub steps: Vec<ScenarioStep>,
}

/// A single step in a scenario.
///
/// String fields may reference variables saved by earlier steps as `${name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Provision a demo user; saves `<save_as>.email`, `.password`, `.user_id`
    CreateDemoUser {
        #[serde(default = "default_demo_var")]
        save_as: String,
    },

    /// Authenticate with email or username
    Login {
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        username: Option<String>,
        password: String,
        /// Profiles the login response must include
        #[serde(default)]
        expect_profiles: Vec<Profile>,
    },

    /// Switch the active profile; saves `redirect_url`
    SwitchProfile {
        profile: Profile,
        #[serde(default)]
        expect_redirect_suffix: Option<String>,
        /// GET the redirect target and require 200
        #[serde(default)]
        follow: bool,
    },

    /// Issue an API call and assert on the response
    Request {
        #[serde(default = "default_method")]
        method: String,
        path: String,
        #[serde(default)]
        body: Option<Value>,
        #[serde(default = "default_true")]
        authenticated: bool,
        /// Accepted statuses; any 2xx when omitted
        #[serde(default)]
        expect_status: Option<StatusExpectation>,
        #[serde(default)]
        expect_json: Vec<JsonExpectation>,
        #[serde(default)]
        max_response_ms: Option<u64>,
        /// Variables to save: name -> JSON pointer into the response
        #[serde(default)]
        save: BTreeMap<String, String>,
    },

    /// Create a resource tracked for cleanup; saves `<save_as>.id`
    CreateFixture {
        path: String,
        body: Value,
        #[serde(default = "default_id_pointer")]
        id_pointer: String,
        #[serde(default)]
        save_as: Option<String>,
    },

    /// Delete a fixture saved earlier (best-effort, never fails)
    DeleteFixture {
        fixture: String,
    },

    /// Trigger an orchestration job; saves `<save_as>.id`
    Orchestrate {
        service: String,
        #[serde(default = "default_job_var")]
        save_as: String,
    },

    /// Poll a job to a terminal state; saves `<job>.state`
    Poll {
        #[serde(default = "default_job_var")]
        job: String,
        #[serde(default)]
        interval_ms: Option<u64>,
        #[serde(default)]
        max_wait_ms: Option<u64>,
        #[serde(default)]
        settle_checks: Option<u32>,
    },

    /// Fetch the profile's dashboard and validate its shape
    CheckDashboard {
        profile: Profile,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

fn default_demo_var() -> String {
    "demo".to_string()
}

fn default_job_var() -> String {
    "job".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_id_pointer() -> String {
    "/id".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusExpectation {
    One(u16),
    AnyOf(Vec<u16>),
}

impl StatusExpectation {
    pub fn codes(&self) -> Vec<u16> {
        match self {
            StatusExpectation::One(code) => vec![*code],
            StatusExpectation::AnyOf(codes) => codes.clone(),
        }
    }
}

/// Assertion on one value in a JSON response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonExpectation {
    pub pointer: String,
    #[serde(default)]
    pub equals: Option<Value>,
    #[serde(default)]
    pub exists: Option<bool>,
    #[serde(default)]
    pub ends_with: Option<String>,
    #[serde(default)]
    pub non_empty: bool,
}

impl JsonExpectation {
    pub fn check(&self, body: &Value) -> Result<(), String> {
        let found = body.pointer(&self.pointer);

        match (self.exists, found) {
            (Some(false), Some(v)) => {
                return Err(format!("{} should be absent, found {}", self.pointer, v))
            }
            (Some(false), None) => return Ok(()),
            (_, None) => return Err(format!("{} is missing", self.pointer)),
            _ => {}
        }
        let Some(value) = found else {
            return Ok(());
        };

        if let Some(expected) = &self.equals {
            if value != expected {
                return Err(format!(
                    "{} is {}, expected {}",
                    self.pointer, value, expected
                ));
            }
        }
        if let Some(suffix) = &self.ends_with {
            match value.as_str() {
                Some(s) if s.ends_with(suffix.as_str()) => {}
                _ => {
                    return Err(format!(
                        "{} is {}, expected suffix '{}'",
                        self.pointer, value, suffix
                    ))
                }
            }
        }
        if self.non_empty {
            let empty = match value {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                Value::Array(a) => a.is_empty(),
                Value::Object(o) => o.is_empty(),
                _ => false,
            };
            if empty {
                return Err(format!("{} is empty", self.pointer));
            }
        }
        Ok(())
    }
}

static VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_.\-]+)\}").expect("variable pattern is valid")
});

/// Values saved by earlier steps
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: HashMap<String, String>,
}

impl Variables {
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Replace every `${name}` in `input`; unknown names are an error
    pub fn interpolate(&self, input: &str) -> E2eResult<String> {
        let mut out = String::with_capacity(input.len());
        let mut last = 0;

        for caps in VARIABLE.captures_iter(input) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let name = &caps[1];
            let value = self
                .get(name)
                .ok_or_else(|| E2eError::UnknownVariable(name.to_string()))?;
            out.push_str(&input[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&input[last..]);
        Ok(out)
    }

    /// Interpolate every string inside a JSON value
    pub fn interpolate_value(&self, value: &Value) -> E2eResult<Value> {
        Ok(match value {
            Value::String(s) => Value::String(self.interpolate(s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.interpolate_value(v))
                    .collect::<E2eResult<_>>()?,
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.interpolate_value(v)?)))
                    .collect::<E2eResult<_>>()?,
            ),
            other => other.clone(),
        })
    }
}

impl Scenario {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::ScenarioParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, in file name order
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            scenarios.push(Self::from_file(entry.path())?);
        }

        Ok(scenarios)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Keep only scenarios carrying `tag`, preserving order
    pub fn filter_by_tag(scenarios: Vec<Self>, tag: &str) -> Vec<Self> {
        scenarios.into_iter().filter(|s| s.has_tag(tag)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_login_scenario() {
        let yaml = r#"
name: multi-profile-login
tags: [auth, smoke]
steps:
  - action: create_demo_user
  - action: login
    email: ${demo.email}
    password: ${demo.password}
    expect_profiles: [Gestor, Hospital, Médico, Paciente]
  - action: switch_profile
    profile: Hospital
    expect_redirect_suffix: /dashboard/hospital
    follow: true
  - action: request
    path: /esus-aps/configuration/general_settings
    authenticated: false
    expect_status: 401
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.name, "multi-profile-login");
        assert_eq!(scenario.steps.len(), 4);
        assert!(scenario.has_tag("smoke"));

        match &scenario.steps[1] {
            ScenarioStep::Login { expect_profiles, .. } => assert_eq!(expect_profiles.len(), 4),
            other => panic!("unexpected step {:?}", other),
        }
        match &scenario.steps[3] {
            ScenarioStep::Request { method, authenticated, expect_status, .. } => {
                assert_eq!(method, "GET");
                assert!(!authenticated);
                assert_eq!(expect_status.as_ref().unwrap().codes(), vec![401]);
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_parse_orchestration_scenario() {
        let yaml = r#"
name: esus-orchestration
steps:
  - action: orchestrate
    service: mcp-server
  - action: poll
    interval_ms: 2000
    max_wait_ms: 60000
    settle_checks: 2
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        match &scenario.steps[1] {
            ScenarioStep::Poll { job, max_wait_ms, .. } => {
                assert_eq!(job, "job");
                assert_eq!(*max_wait_ms, Some(60_000));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_filter_by_tag() {
        let scenarios = ["a: [smoke]", "b: [dashboard]", "c: [smoke, hospital]"]
            .iter()
            .map(|line| {
                let (name, tags) = line.split_once(": ").unwrap();
                Scenario::from_yaml(&format!("name: {}\ntags: {}\nsteps: []\n", name, tags))
                    .unwrap()
            })
            .collect();

        let smoke = Scenario::filter_by_tag(scenarios, "smoke");
        let names: Vec<&str> = smoke.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_interpolation() {
        let mut vars = Variables::default();
        vars.set("job.id", "abc-123");
        vars.set("demo.email", "demo@test.com");

        assert_eq!(
            vars.interpolate("/mcp-server/orchestrate/status/${job.id}").unwrap(),
            "/mcp-server/orchestrate/status/abc-123"
        );
        assert!(matches!(
            vars.interpolate("${missing}"),
            Err(E2eError::UnknownVariable(ref name)) if name == "missing"
        ));

        let body = vars
            .interpolate_value(&json!({ "owner": "${demo.email}", "ids": ["${job.id}", 7] }))
            .unwrap();
        assert_eq!(body, json!({ "owner": "demo@test.com", "ids": ["abc-123", 7] }));
    }

    #[test]
    fn test_json_expectations() {
        let body = json!({ "redirect_url": "http://x/dashboard/hospital", "profiles": [], "ok": true });

        let suffix = JsonExpectation {
            pointer: "/redirect_url".into(),
            equals: None,
            exists: None,
            ends_with: Some("/dashboard/hospital".into()),
            non_empty: false,
        };
        assert!(suffix.check(&body).is_ok());

        let non_empty = JsonExpectation {
            pointer: "/profiles".into(),
            non_empty: true,
            ..suffix.clone()
        };
        assert!(non_empty.check(&json!({ "profiles": [] })).is_err());

        let absent = JsonExpectation {
            pointer: "/error".into(),
            exists: Some(false),
            ends_with: None,
            ..suffix.clone()
        };
        assert!(absent.check(&body).is_ok());

        let equals = JsonExpectation {
            pointer: "/ok".into(),
            equals: Some(json!(true)),
            ends_with: None,
            ..suffix
        };
        assert!(equals.check(&body).is_ok());
    }
}
