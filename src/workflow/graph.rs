// Weaver — Dependency graph resolution
//
// Dependency workflows run depth-first, leaves before dependents, and each
// runs at most once per top-level run. The whole graph is checked for
// cycles and unknown ids before anything executes.

use crate::config::Config;
use crate::error::GraphError;
use crate::token::ResultsById;
use crate::workflow::context::{DependencySource, RunScope};
use crate::workflow::executor::{fold_workflow, run_actions};
use crate::workflow::{EntityKind, ExecutionResult, WorkflowDefinition};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

/// Walk the dependency graph from `root` without executing anything.
pub fn check_graph(
    root: &WorkflowDefinition,
    config: &Config,
    source: &dyn DependencySource,
) -> Result<(), GraphError> {
    let mut stack = vec![root.id.clone()];
    let mut done = HashSet::new();
    visit(root, config, source, &mut stack, &mut done)
}

fn visit(
    workflow: &WorkflowDefinition,
    config: &Config,
    source: &dyn DependencySource,
    stack: &mut Vec<String>,
    done: &mut HashSet<String>,
) -> Result<(), GraphError> {
    for dep_id in source.dependencies(workflow, config) {
        if let Some(pos) = stack.iter().position(|id| *id == dep_id) {
            let mut path = stack[pos..].to_vec();
            path.push(dep_id);
            return Err(GraphError::Cycle { path });
        }
        if done.contains(&dep_id) {
            continue;
        }
        let dep = config.workflow(&dep_id).ok_or_else(|| GraphError::NotFound {
            id: dep_id.clone(),
            referenced_by: workflow.id.clone(),
        })?;

        stack.push(dep_id.clone());
        visit(dep, config, source, stack, done)?;
        stack.pop();
        done.insert(dep_id);
    }
    Ok(())
}

type ResolveFuture<'s> = Pin<Box<dyn Future<Output = Result<(), ExecutionResult>> + Send + 's>>;

/// Executes the dependency workflows of one root workflow.
pub struct DependencyResolver<'r, 'a> {
    run: &'r RunScope<'a>,
    /// Ids currently being resolved, in resolution order.
    executing: Vec<String>,
    resolved: ResultsById,
}

impl<'r, 'a> DependencyResolver<'r, 'a> {
    pub fn new(run: &'r RunScope<'a>) -> Self {
        Self {
            run,
            executing: Vec::new(),
            resolved: ResultsById::new(),
        }
    }

    /// Resolve every dependency of `root`.
    ///
    /// Returns the folded token maps of all dependency workflows, keyed by
    /// workflow id, or the first failure as a failed result.
    pub async fn resolve(
        mut self,
        root: &WorkflowDefinition,
    ) -> Result<ResultsById, ExecutionResult> {
        let source = self.run.collaborators.dependencies.as_ref();
        if let Err(e) = check_graph(root, self.run.config, source) {
            tracing::error!(workflow = %root.id, error = %e, "Dependency graph rejected");
            return Err(ExecutionResult::failed(
                root.id.clone(),
                EntityKind::Workflow,
                crate::error::WeaveError::from(e).to_string(),
            ));
        }

        self.executing.push(root.id.clone());
        self.resolve_dependencies_of(root).await?;
        self.executing.pop();
        Ok(self.resolved)
    }

    fn resolve_dependencies_of<'s>(&'s mut self, workflow: &'s WorkflowDefinition) -> ResolveFuture<'s> {
        Box::pin(async move {
            let config = self.run.config;
            let deps = self
                .run
                .collaborators
                .dependencies
                .dependencies(workflow, config);

            for dep_id in deps {
                if self.resolved.contains_key(&dep_id) {
                    continue;
                }
                if let Some(pos) = self.executing.iter().position(|id| *id == dep_id) {
                    let mut path = self.executing[pos..].to_vec();
                    path.push(dep_id.clone());
                    return Err(graph_failure(&workflow.id, GraphError::Cycle { path }));
                }
                let Some(dep) = config.workflow(&dep_id) else {
                    return Err(graph_failure(
                        &workflow.id,
                        GraphError::NotFound {
                            id: dep_id,
                            referenced_by: workflow.id.clone(),
                        },
                    ));
                };

                self.executing.push(dep_id.clone());
                self.resolve_dependencies_of(dep).await?;
                let result = self.execute_dependency(dep).await;
                self.executing.pop();

                if !result.is_success() {
                    return Err(result);
                }
                self.resolved.insert(dep_id, result.tokens().clone());
            }
            Ok(())
        })
    }

    async fn execute_dependency(&self, workflow: &WorkflowDefinition) -> ExecutionResult {
        tracing::info!(workflow = %workflow.id, "Running dependency workflow");
        if workflow.actions.is_empty() {
            return ExecutionResult::failed(
                workflow.id.clone(),
                EntityKind::Workflow,
                format!("dependency workflow '{}' has no actions", workflow.name),
            );
        }
        let sequence = run_actions(&workflow.actions, self.run, &self.resolved).await;
        fold_workflow(workflow, &sequence)
    }
}

fn graph_failure(workflow_id: &str, error: GraphError) -> ExecutionResult {
    ExecutionResult::failed(
        workflow_id,
        EntityKind::Workflow,
        crate::error::WeaveError::from(error).to_string(),
    )
}
