//! Workflow orchestration
//!
//! A [`Workflow`] is a named, ordered table of [`StepDescriptor`]s. The
//! [`Orchestrator`] brackets one run with a [`Session`], executes the steps
//! strictly in order, and folds their results into a [`WorkflowResult`].
//!
//! Progress is tracked as a linear [`Stage`] machine. A fatal step failure
//! stops the run at its phase. A best-effort step that times out or finds
//! nothing is recorded as tolerated and the run continues unconfirmed; an
//! element it found but could not act on still aborts the run.

pub mod definitions;

use crate::clipboard::{self, ClipboardSink};
use crate::diagnostics::{self, PageControl};
use crate::driver::{BrowserDriver, SessionFactory};
use crate::error::{AutomationError, Result};
use crate::session::Session;
use crate::step::{self, FailurePolicy, StepDescriptor, StepResult};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How far a run has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    LoggedIn,
    OnTargetPage,
    ModalOpen,
    DetailsRevealed,
    ValueExtracted,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "phase")]
pub enum WorkflowStatus {
    Completed,
    /// Aborted by a fatal failure in the named phase
    FailedAtStep(String),
}

/// Which kind of value a workflow produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    CredentialValue,
    AuthUrl,
}

impl PayloadKind {
    fn wrap(self, value: String) -> Payload {
        match self {
            PayloadKind::CredentialValue => Payload::CredentialValue(value),
            PayloadKind::AuthUrl => Payload::AuthUrl(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Payload {
    CredentialValue(String),
    AuthUrl(String),
}

impl Payload {
    pub fn value(&self) -> &str {
        match self {
            Payload::CredentialValue(value) | Payload::AuthUrl(value) => value,
        }
    }
}

/// A named step table.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    pub steps: Vec<StepDescriptor>,
    pub payload: PayloadKind,
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow: String,
    pub status: WorkflowStatus,
    pub stage: Stage,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    /// Address of the working window when the run ended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    /// Visible controls, collected only when the run aborted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<PageControl>,
    pub succeeded: usize,
    pub failed: usize,
    pub tolerated: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl WorkflowResult {
    fn new(workflow: &str) -> Self {
        Self {
            workflow: workflow.to_string(),
            status: WorkflowStatus::Completed,
            stage: Stage::Init,
            steps: Vec::new(),
            payload: None,
            final_url: None,
            controls: Vec::new(),
            succeeded: 0,
            failed: 0,
            tolerated: 0,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Append a step result and update the counters
    pub fn add_result(&mut self, result: StepResult) {
        if result.is_success() {
            self.succeeded += 1;
        } else if result.tolerated {
            self.tolerated += 1;
        } else {
            self.failed += 1;
        }
        self.steps.push(result);
    }

    pub fn is_completed(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }

    /// The step that aborted the run, if any.
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps
            .iter()
            .rev()
            .find(|step| !step.is_success() && !step.tolerated)
    }

    pub fn payload_value(&self) -> Option<&str> {
        self.payload.as_ref().map(Payload::value)
    }
}

/// Runs workflows, one fresh session per run.
pub struct Orchestrator<F: SessionFactory> {
    factory: F,
    grace: Duration,
    clipboard: Option<Arc<dyn ClipboardSink>>,
}

impl<F: SessionFactory> Orchestrator<F> {
    pub fn new(factory: F, grace: Duration) -> Self {
        Self {
            factory,
            grace,
            clipboard: None,
        }
    }

    /// Copy each run's payload (credential value or sign-in URL) to `sink`.
    pub fn with_clipboard(mut self, sink: Arc<dyn ClipboardSink>) -> Self {
        self.clipboard = Some(sink);
        self
    }

    /// Execute `workflow` to completion or abort.
    ///
    /// Step failures are reported inside the returned result. `Err` means the
    /// session could not be opened or the run panicked; in the latter case the
    /// browser has still been torn down.
    pub async fn run(&self, workflow: &Workflow) -> Result<WorkflowResult> {
        let started = Instant::now();
        let mut result = WorkflowResult::new(&workflow.name);
        log::info!("Starting workflow {}", workflow.name);

        let session = Session::open(&self.factory, self.grace).await?;
        let driver = session.driver();

        let driven = AssertUnwindSafe(drive(driver, workflow, &mut result))
            .catch_unwind()
            .await;

        let fault = match driven {
            Ok(status) => {
                result.status = status;
                None
            }
            Err(panic) => Some(panic_message(panic)),
        };

        if fault.is_none() {
            if !result.is_completed() {
                result.controls = diagnostics::collect_controls(driver).await;
            }
            result.final_url = driver.current_url().await.ok();

            if let (Some(sink), Some(payload)) = (&self.clipboard, &result.payload) {
                clipboard::publish(sink.as_ref(), payload.value());
            }
        }

        if let Err(e) = session.close().await {
            log::warn!("Teardown error ignored: {}", e);
        }
        result.duration_ms = started.elapsed().as_millis() as u64;

        if let Some(message) = fault {
            log::error!("Workflow {} faulted: {}", workflow.name, message);
            return Err(AutomationError::Fault(message));
        }

        match &result.status {
            WorkflowStatus::Completed => log::info!(
                "Workflow {} completed in {}ms",
                workflow.name,
                result.duration_ms
            ),
            WorkflowStatus::FailedAtStep(phase) => {
                log::error!("Workflow {} aborted at {}", workflow.name, phase)
            }
        }

        Ok(result)
    }
}

async fn drive<D: BrowserDriver>(
    driver: &D,
    workflow: &Workflow,
    result: &mut WorkflowResult,
) -> WorkflowStatus {
    for descriptor in &workflow.steps {
        let mut outcome = step::execute(driver, descriptor).await;

        if outcome.is_success() {
            if let Some(value) = &outcome.value {
                result.payload = Some(workflow.payload.wrap(value.clone()));
            }
            if let Some(stage) = descriptor.advances_to {
                result.stage = stage;
            }
            result.add_result(outcome);
            continue;
        }

        match descriptor.policy {
            FailurePolicy::BestEffort if outcome.outcome.is_inconclusive() => {
                log::warn!(
                    "[{}] {} not confirmed ({:?}), continuing anyway",
                    descriptor.phase,
                    descriptor.name,
                    outcome.outcome
                );
                outcome.tolerated = true;
                if let Some(stage) = descriptor.advances_to {
                    result.stage = stage;
                }
                result.add_result(outcome);
            }
            _ => {
                log::error!(
                    "[{}] {} failed ({:?})",
                    descriptor.phase,
                    descriptor.name,
                    outcome.outcome
                );
                result.add_result(outcome);
                return WorkflowStatus::FailedAtStep(descriptor.phase.as_str().to_string());
            }
        }
    }

    result.stage = Stage::Done;
    WorkflowStatus::Completed
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{Phase, StepOutcome};

    fn step_result(outcome: StepOutcome, tolerated: bool) -> StepResult {
        StepResult {
            step: "step".to_string(),
            phase: Phase::Login,
            outcome,
            value: None,
            diagnostics: None,
            tolerated,
            elapsed_ms: 1,
        }
    }

    #[test]
    fn test_add_result_counts_by_outcome() {
        let mut result = WorkflowResult::new("counting");
        result.add_result(step_result(StepOutcome::Success, false));
        result.add_result(step_result(StepOutcome::Timeout, true));
        result.add_result(step_result(StepOutcome::NotFound, false));

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.tolerated, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(
            result.failed_step().map(|s| s.outcome),
            Some(StepOutcome::NotFound)
        );
    }

    #[test]
    fn test_status_serialization() {
        let status = WorkflowStatus::FailedAtStep("login".to_string());
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({ "state": "failed_at_step", "phase": "login" })
        );
        assert_eq!(
            serde_json::to_value(WorkflowStatus::Completed).unwrap(),
            serde_json::json!({ "state": "completed" })
        );
    }

    #[test]
    fn test_payload_kind_wraps_value() {
        let payload = PayloadKind::AuthUrl.wrap("https://accounts.example.com".to_string());
        assert_eq!(payload.value(), "https://accounts.example.com");
        assert!(matches!(payload, Payload::AuthUrl(_)));
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("owned".to_string())), "owned");
        assert_eq!(panic_message(Box::new(7_u8)), "unknown panic");
    }
}
