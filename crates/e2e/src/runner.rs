//! Scenario runner: loads scenarios, runs each inside its own test scope, and
//! reports results

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::error::{E2eError, E2eResult};
use crate::fixture::CleanupOutcome;
use crate::harness::SessionHarness;
use crate::scenario::Scenario;
use crate::scope::TestScope;
use crate::steps::{StepExecutor, StepResult};

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub cleanup: Vec<CleanupOutcome>,
    pub error: Option<String>,
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

/// Runs declarative scenarios against the platform API
pub struct TestRunner {
    config: RunnerConfig,
    harness: SessionHarness,
}

impl TestRunner {
    pub fn new(config: RunnerConfig) -> E2eResult<Self> {
        let harness = SessionHarness::new(config.harness.clone())?;
        Ok(Self { config, harness })
    }

    pub fn harness(&self) -> &SessionHarness {
        &self.harness
    }

    /// Run all scenarios in the scenarios directory
    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        self.run_scenarios(&scenarios).await
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<TestSuiteResult> {
        let all = Scenario::load_all(&self.config.scenarios_dir)?;
        let scenarios = Scenario::filter_by_tag(all, tag);
        self.run_scenarios(&scenarios).await
    }

    /// Run a specific scenario by name
    pub async fn run_named(&self, name: &str) -> E2eResult<TestSuiteResult> {
        let scenario = Scenario::load_all(&self.config.scenarios_dir)?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::ScenarioParse(format!("Scenario not found: {}", name)))?;
        self.run_scenarios(std::slice::from_ref(&scenario)).await
    }

    /// Run a list of scenarios, one test scope each
    pub async fn run_scenarios(&self, scenarios: &[Scenario]) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());
        let mut passed = 0;
        let mut failed = 0;

        if !scenarios.is_empty() {
            self.harness.wait_until_ready().await?;
        }

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let result = self.run_scenario(scenario).await;
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            for outcome in result.cleanup.iter().filter(|o| o.is_failure()) {
                warn!("{}: cleanup incomplete: {:?}", result.name, outcome);
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Scenario Results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        Ok(TestSuiteResult {
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            results,
        })
    }

    /// Run a single scenario. Failures are reported in the result, not raised.
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name);

        let steps = scenario.steps.clone();
        let poll = self.config.harness.poll.clone();
        let mut scope = TestScope::new(self.harness.clone());

        let outcome = scope
            .run(move |scope| {
                async move {
                    let mut executor = StepExecutor::new(poll);
                    Ok::<_, E2eError>(executor.run_steps(scope, &steps).await)
                }
                .boxed()
            })
            .await;

        let (steps, error) = match outcome {
            Ok(run) => run,
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        ScenarioResult {
            name: scenario.name.clone(),
            success: error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            steps,
            cleanup: scope.cleanup_report().to_vec(),
            error,
        }
    }

    /// Write results to `test-results.json` in the output directory
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
