//! Verdict, failure capture, and the JSON run report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::driver::PageDriver;
use crate::error::{FailureKind, SmokeError, SmokeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    Skipped,
    Failed,
}

/// Result of a single scenario step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub outcome: StepOutcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Terminal outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ScenarioResult {
    Passed,
    Failed {
        cause: String,
        kind: FailureKind,
        artifact: Option<PathBuf>,
    },
}

impl ScenarioResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ScenarioResult::Passed)
    }

    /// Process exit status: 0 on success, 1 on any failure
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Everything written to `app-smoke.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub base_url: String,
    pub task_title: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: Vec<StepRecord>,
    pub result: ScenarioResult,
}

impl ScenarioReport {
    pub fn write(&self, path: &Path) -> SmokeResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Run report written to: {}", path.display());
        Ok(())
    }
}

/// Turns the scenario outcome into the final verdict line (and, on failure, a screenshot)
pub struct FailureReporter {
    screenshot_path: PathBuf,
}

impl FailureReporter {
    pub fn new(screenshot_path: impl Into<PathBuf>) -> Self {
        Self {
            screenshot_path: screenshot_path.into(),
        }
    }

    pub fn screenshot_path(&self) -> &Path {
        &self.screenshot_path
    }

    pub async fn conclude(
        &self,
        page: Option<&dyn PageDriver>,
        base_url: &str,
        title: &str,
        outcome: &SmokeResult<()>,
    ) -> ScenarioResult {
        match outcome {
            Ok(()) => {
                println!(
                    "App smoke passed against {} (created and persisted '{}')",
                    base_url, title
                );
                ScenarioResult::Passed
            }
            Err(e) => self.failed(page, e).await,
        }
    }

    /// Report `cause` and capture the page. A capture failure is logged and never
    /// replaces the original cause.
    pub async fn failed(&self, page: Option<&dyn PageDriver>, cause: &SmokeError) -> ScenarioResult {
        error!(kind = ?cause.kind(), "{}", cause);
        eprintln!("App smoke failed: {}", cause);

        let artifact = match page {
            Some(page) => match page.screenshot(&self.screenshot_path).await {
                Ok(()) => {
                    eprintln!(
                        "Saved failure screenshot to {}",
                        self.screenshot_path.display()
                    );
                    Some(self.screenshot_path.clone())
                }
                Err(e) => {
                    warn!("Screenshot capture failed: {}", e);
                    eprintln!("Unable to capture screenshot");
                    None
                }
            },
            None => None,
        };

        ScenarioResult::Failed {
            cause: cause.to_string(),
            kind: cause.kind(),
            artifact,
        }
    }
}
