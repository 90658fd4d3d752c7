//! External code validators.
//!
//! Each validator (test runner, type checker, security linter) is an
//! external command run against the code artifact. Validators are optional
//! collaborators: one that is not installed reports `skipped` and does not
//! fail validation. The aggregate `all_passed` drives the debug/fix branch.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tokio::process::Command;

use crate::error::CoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidatorStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Clone, Debug, Serialize)]
pub struct ValidatorResult {
    pub name: String,
    pub status: ValidatorStatus,
    pub output: String,
}

/// Aggregated outcome of one validation stage.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationReport {
    pub results: Vec<ValidatorResult>,
    pub all_passed: bool,
}

impl ValidationReport {
    pub fn from_results(results: Vec<ValidatorResult>) -> Self {
        // skipped validators do not fail validation
        let all_passed = results
            .iter()
            .all(|r| r.status != ValidatorStatus::Failed);
        Self {
            results,
            all_passed,
        }
    }

    /// Joined output of every failing validator, for the debug stage.
    pub fn failure_output(&self) -> String {
        self.results
            .iter()
            .filter(|r| r.status == ValidatorStatus::Failed)
            .map(|r| format!("[{}]\n{}", r.name, r.output))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn to_value(&self) -> serde_json::Value {
        json!({
            "all_passed": self.all_passed,
            "results": self.results,
        })
    }
}

#[async_trait]
pub trait CodeValidator: Send + Sync {
    fn name(&self) -> &str;

    /// Validates the code artifact; the file argument points at a temp file
    /// holding the artifact.
    async fn validate(&self, code_file: &std::path::Path) -> ValidatorResult;
}

/// Validator that runs `program args... <code_file>` and passes on exit 0.
/// A missing program yields `skipped`.
pub struct CommandValidator {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandValidator {
    pub fn new(
        name: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl CodeValidator for CommandValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, code_file: &std::path::Path) -> ValidatorResult {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(code_file)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let spawned = match command.spawn() {
            Ok(child) => child,
            Err(_) => {
                return ValidatorResult {
                    name: self.name.clone(),
                    status: ValidatorStatus::Skipped,
                    output: format!("{} is not available", self.program),
                }
            }
        };

        match tokio::time::timeout(self.timeout, spawned.wait_with_output()).await {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).to_string();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                ValidatorResult {
                    name: self.name.clone(),
                    status: if output.status.success() {
                        ValidatorStatus::Passed
                    } else {
                        ValidatorStatus::Failed
                    },
                    output: text.chars().take(4000).collect(),
                }
            }
            Ok(Err(e)) => ValidatorResult {
                name: self.name.clone(),
                status: ValidatorStatus::Failed,
                output: format!("validator error: {}", e),
            },
            Err(_) => ValidatorResult {
                name: self.name.clone(),
                status: ValidatorStatus::Failed,
                output: format!("validator timed out after {:?}", self.timeout),
            },
        }
    }
}

/// Runs every configured validator against the code artifact.
pub async fn run_validators(
    validators: &[Box<dyn CodeValidator>],
    code: &str,
    file_name: &str,
) -> Result<ValidationReport, CoreError> {
    if validators.is_empty() {
        return Ok(ValidationReport::from_results(Vec::new()));
    }
    let dir = tempfile_dir()?;
    let code_file: PathBuf = dir.join(file_name);
    tokio::fs::write(&code_file, code).await?;

    let mut results = Vec::new();
    for validator in validators {
        results.push(validator.validate(&code_file).await);
    }
    let _ = tokio::fs::remove_file(&code_file).await;
    Ok(ValidationReport::from_results(results))
}

fn tempfile_dir() -> Result<PathBuf, CoreError> {
    let dir = std::env::temp_dir().join("forge-validate");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// A scripted validator for tests: passes or fails per construction.
pub struct ScriptedValidator {
    pub name: String,
    pub outcomes: std::sync::Mutex<std::collections::VecDeque<bool>>,
}

impl ScriptedValidator {
    /// Each call pops the next outcome; when exhausted, passes.
    pub fn new(name: impl Into<String>, outcomes: Vec<bool>) -> Self {
        Self {
            name: name.into(),
            outcomes: std::sync::Mutex::new(outcomes.into()),
        }
    }
}

#[async_trait]
impl CodeValidator for ScriptedValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, _code_file: &std::path::Path) -> ValidatorResult {
        let passed = self
            .outcomes
            .lock()
            .expect("scripted validator lock poisoned")
            .pop_front()
            .unwrap_or(true);
        ValidatorResult {
            name: self.name.clone(),
            status: if passed {
                ValidatorStatus::Passed
            } else {
                ValidatorStatus::Failed
            },
            output: if passed {
                "ok".to_string()
            } else {
                "assertion failed: expected 2, got 3".to_string()
            },
        }
    }
}
