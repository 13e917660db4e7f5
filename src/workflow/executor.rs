// Weaver — Workflow executor (top-level run driver)

use crate::config::Config;
use crate::token::ResultsById;
use crate::workflow::action;
use crate::workflow::context::{Collaborators, Notice, NoticeLevel, RunScope, WorkflowOutput};
use crate::workflow::graph::DependencyResolver;
use crate::workflow::*;
use std::sync::Arc;
use std::time::Instant;

/// Where a run currently is. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    ResolvingDependencies,
    ExecutingActions,
    Completed,
    Aborted,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No workflow with the requested id is configured.
    NotFound { workflow_id: String },
    /// The workflow has no actions; nothing ran.
    NoActions,
    /// A dependency could not be resolved or one of its actions failed.
    DependencyFailed { error: String },
    /// An action of the workflow itself failed; later actions never ran.
    ActionFailed { action_id: String, error: String },
    /// Every action succeeded but the output sink rejected the result.
    OutputFailed { error: String },
    Completed { output: WorkflowOutput },
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub workflow_id: String,
    pub phase: RunPhase,
    pub outcome: RunOutcome,
    /// Results of the workflow's own actions, in execution order.
    pub results: Vec<ExecutionResult>,
    /// Folded results of dependency workflows, by workflow id.
    pub dependencies: ResultsById,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed { .. })
    }

    pub fn output(&self) -> Option<&WorkflowOutput> {
        match &self.outcome {
            RunOutcome::Completed { output } => Some(output),
            _ => None,
        }
    }

    pub fn result(&self, action_id: &str) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.entity_id() == action_id)
    }
}

/// Results of running an action list in order until the first failure.
#[derive(Debug, Clone, Default)]
pub struct ActionSequence {
    pub results: Vec<ExecutionResult>,
}

impl ActionSequence {
    pub fn failure(&self) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| !r.is_success())
    }

    pub fn terminal(&self) -> Option<&ExecutionResult> {
        self.results.last()
    }
}

/// Run `actions` strictly in order, threading finished results forward.
/// Stops at the first failure.
pub async fn run_actions(
    actions: &[ActionDefinition],
    run: &RunScope<'_>,
    dependencies: &ResultsById,
) -> ActionSequence {
    let mut local = ResultsById::new();
    let mut sequence = ActionSequence::default();

    for action in actions {
        let result = action::execute(action, run, &local, dependencies).await;
        let failed = !result.is_success();
        if !failed {
            local.insert(result.entity_id().to_string(), result.tokens().clone());
        }
        sequence.results.push(result);
        if failed {
            break;
        }
    }
    sequence
}

/// Collapse a dependency workflow's action results into one result.
///
/// Tokens are the terminal action's tokens plus `output`.
pub fn fold_workflow(workflow: &WorkflowDefinition, sequence: &ActionSequence) -> ExecutionResult {
    if let Some(failed) = sequence.failure() {
        return ExecutionResult::failed(
            workflow.id.clone(),
            EntityKind::Workflow,
            format!(
                "workflow '{}', action '{}': {}",
                workflow.id,
                failed.entity_id(),
                failed.error().unwrap_or("unknown error")
            ),
        );
    }
    let Some(terminal) = sequence.terminal() else {
        return ExecutionResult::failed(
            workflow.id.clone(),
            EntityKind::Workflow,
            format!("workflow '{}' produced no results", workflow.id),
        );
    };

    let mut tokens = terminal.tokens().clone();
    tokens.insert(TOKEN_OUTPUT.to_string(), derive_output_text(terminal));
    ExecutionResult::succeeded(workflow.id.clone(), EntityKind::Workflow, tokens)
}

pub struct WorkflowExecutor {
    config: Arc<Config>,
    collaborators: Collaborators,
}

impl WorkflowExecutor {
    pub fn new(config: Arc<Config>, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    /// Run the workflow with the given id.
    pub async fn run_by_id(&self, workflow_id: &str) -> RunReport {
        match self.config.workflow(workflow_id) {
            Some(workflow) => self.run(workflow).await,
            None => {
                tracing::error!(workflow = %workflow_id, "Workflow not found");
                self.notify(
                    NoticeLevel::Error,
                    format!("Workflow '{}' not found", workflow_id),
                );
                RunReport {
                    workflow_id: workflow_id.to_string(),
                    phase: RunPhase::Aborted,
                    outcome: RunOutcome::NotFound {
                        workflow_id: workflow_id.to_string(),
                    },
                    results: Vec::new(),
                    dependencies: ResultsById::new(),
                }
            }
        }
    }

    /// Run one workflow end to end. Never fails: every problem ends up in
    /// the report, with exactly one notice emitted.
    pub async fn run(&self, workflow: &WorkflowDefinition) -> RunReport {
        let start = Instant::now();
        let mut report = RunReport {
            workflow_id: workflow.id.clone(),
            phase: RunPhase::Idle,
            outcome: RunOutcome::NoActions,
            results: Vec::new(),
            dependencies: ResultsById::new(),
        };

        if workflow.actions.is_empty() {
            tracing::warn!(workflow = %workflow.id, "Workflow has no actions");
            self.notify(
                NoticeLevel::Error,
                format!("Workflow '{}' has no actions", workflow.name),
            );
            advance(&mut report, RunPhase::Aborted);
            return report;
        }

        let run = RunScope::new(&self.config, &self.collaborators);

        advance(&mut report, RunPhase::ResolvingDependencies);
        let dependencies = match DependencyResolver::new(&run).resolve(workflow).await {
            Ok(deps) => deps,
            Err(failed) => {
                let error = failed.error().unwrap_or("dependency failed").to_string();
                self.notify(
                    NoticeLevel::Error,
                    format!("Workflow '{}' aborted: {}", workflow.name, error),
                );
                report.outcome = RunOutcome::DependencyFailed { error };
                advance(&mut report, RunPhase::Aborted);
                return report;
            }
        };
        report.dependencies = dependencies;

        advance(&mut report, RunPhase::ExecutingActions);
        let sequence = run_actions(&workflow.actions, &run, &report.dependencies).await;
        report.results = sequence.results.clone();

        if let Some(failed) = sequence.failure() {
            let error = failed.error().unwrap_or("unknown error").to_string();
            self.notify(
                NoticeLevel::Error,
                format!(
                    "Workflow '{}' stopped at action '{}': {}",
                    workflow.name,
                    failed.entity_id(),
                    error
                ),
            );
            report.outcome = RunOutcome::ActionFailed {
                action_id: failed.entity_id().to_string(),
                error,
            };
            advance(&mut report, RunPhase::Aborted);
            return report;
        }

        // Non-empty action list and no failure, so there is a terminal result.
        let Some(terminal) = sequence.terminal() else {
            advance(&mut report, RunPhase::Aborted);
            return report;
        };

        let output = WorkflowOutput {
            workflow_id: workflow.id.clone(),
            title: self.derive_title(workflow, terminal),
            text: derive_output_text(terminal),
            kind: workflow.output.kind,
            folder: workflow
                .output
                .folder
                .clone()
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| self.config.defaults.output_folder.clone()),
        };

        if let Err(e) = self.collaborators.output.deliver(&output).await {
            tracing::error!(workflow = %workflow.id, error = %e, "Output delivery failed");
            self.notify(
                NoticeLevel::Error,
                format!("Workflow '{}' could not write output: {}", workflow.name, e),
            );
            report.outcome = RunOutcome::OutputFailed {
                error: e.to_string(),
            };
            advance(&mut report, RunPhase::Aborted);
            return report;
        }

        tracing::info!(
            workflow = %workflow.id,
            actions = report.results.len(),
            duration_ms = %start.elapsed().as_millis(),
            "Workflow completed"
        );
        self.notify(
            NoticeLevel::Info,
            format!("Workflow '{}' completed: {}", workflow.name, output.title),
        );
        report.outcome = RunOutcome::Completed { output };
        advance(&mut report, RunPhase::Completed);
        report
    }

    fn derive_title(&self, workflow: &WorkflowDefinition, terminal: &ExecutionResult) -> String {
        let has_source = terminal
            .token(TOKEN_SOURCE_URL)
            .is_some_and(|u| !u.trim().is_empty());
        if has_source {
            let title = self.collaborators.titles.derive(terminal);
            if !title.trim().is_empty() {
                return title;
            }
        }
        format!(
            "{} - {}",
            workflow.name,
            chrono::Local::now().format("%Y-%m-%d %H-%M-%S")
        )
    }

    fn notify(&self, level: NoticeLevel, message: String) {
        self.collaborators.notifier.notify(Notice { level, message });
    }
}

fn advance(report: &mut RunReport, next: RunPhase) {
    tracing::debug!(workflow = %report.workflow_id, from = ?report.phase, to = ?next, "Run phase");
    report.phase = next;
}
