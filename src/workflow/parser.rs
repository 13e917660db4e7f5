use crate::workflow::WorkflowDefinition;
use std::path::Path;

/// Parse a single YAML workflow file.
pub fn parse_workflow(path: &Path) -> anyhow::Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)?;
    let workflow: WorkflowDefinition = serde_yaml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
    Ok(workflow)
}

/// Load every `*.yaml` / `*.yml` workflow in `dir`, sorted by file name.
pub fn load_dir(dir: &Path) -> anyhow::Result<Vec<WorkflowDefinition>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml")
        })
        .collect();
    paths.sort();

    let mut workflows = Vec::with_capacity(paths.len());
    for path in paths {
        let wf = parse_workflow(&path)?;
        tracing::debug!(workflow = %wf.id, file = %path.display(), "Loaded workflow file");
        workflows.push(wf);
    }
    Ok(workflows)
}
