//! Command-line arguments of the scenario runner binary

use clap::error::ErrorKind;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::config::{HarnessConfig, RunnerConfig};

#[derive(Parser, Debug, Clone)]
#[command(name = "vidasegura-e2e")]
#[command(about = "Scenario runner for the Vida Segura platform API")]
pub struct RunArgs {
    /// Path to scenarios directory
    #[arg(short, long, default_value = concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios"))]
    pub scenarios: PathBuf,

    /// Run only scenarios matching this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Run only a specific scenario by name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Base URL of the platform under test
    #[arg(long, env = "VIDASEGURA_E2E_BASE_URL")]
    pub base_url: Option<String>,

    /// Prefix prepended to every API path (e.g. /api)
    #[arg(long, env = "VIDASEGURA_E2E_API_PREFIX")]
    pub api_prefix: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "VIDASEGURA_E2E_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Output directory for results
    #[arg(short, long, default_value = "test-results")]
    pub output: PathBuf,
}

impl RunArgs {
    /// Parse `argv`, tolerating flags meant for libtest.
    ///
    /// Unknown arguments (`--nocapture`, `--test-threads=1`, ...) fall back to
    /// defaults plus environment. Any other error, such as a bad value, is
    /// returned.
    pub fn parse_lenient<I, T>(argv: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Self::try_parse_from(argv) {
            Err(e) if e.kind() == ErrorKind::UnknownArgument => {
                warn!("Ignoring unrecognised arguments: {}", e);
                Self::try_parse_from(["vidasegura-e2e"])
            }
            other => other,
        }
    }

    /// Runner configuration: environment defaults overridden by flags
    pub fn runner_config(&self) -> RunnerConfig {
        let mut harness = HarnessConfig::from_env();
        if let Some(base_url) = &self.base_url {
            harness.base_url = base_url.clone();
        }
        if let Some(prefix) = &self.api_prefix {
            harness.api_prefix = prefix.clone();
        }
        if let Some(secs) = self.timeout_secs {
            harness.request_timeout = Duration::from_secs(secs);
        }

        RunnerConfig {
            harness,
            scenarios_dir: self.scenarios.clone(),
            output_dir: self.output.clone(),
        }
    }
}
