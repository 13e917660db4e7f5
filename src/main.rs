// Weaver — CLI entry point

use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use weaver::config::Config;
use weaver::host::{self, HostOptions};
use weaver::token::ContextSnapshot;
use weaver::workflow::context::{
    DeclaredDependencies, DependencySource, NoDependencies, PromptReferencedDependencies,
};
use weaver::workflow::executor::WorkflowExecutor;
use weaver::workflow::graph;

const LOGO: &str = "🧶";

#[derive(Parser)]
#[command(
    name = "weaver",
    about = "Weaver — token-linked LLM workflows",
    version
)]
struct Cli {
    /// Config file path (default: ~/.weaver/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// How workflow dependencies are discovered
    #[arg(long, value_enum, default_value = "declared", global = true)]
    deps: DepsMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DepsMode {
    /// Use each workflow's `dependencies` list
    Declared,
    /// Infer from `{{workflow.token}}` references in prompts
    Inferred,
    /// Ignore dependencies
    Ignore,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow
    Run {
        /// Workflow id
        workflow: String,
        /// Selected text (`-` reads stdin)
        #[arg(long)]
        selection: Option<String>,
        /// Clipboard text (`-` reads stdin)
        #[arg(long)]
        clipboard: Option<String>,
        /// Active document; its content and name become context tokens
        #[arg(long)]
        document: Option<PathBuf>,
        /// Directory that prompt files and output folders are relative to
        #[arg(long, default_value = ".")]
        base_dir: PathBuf,
    },
    /// List configured workflows
    List,
    /// Validate configuration and dependency graphs without calling providers
    Check {
        /// Only check this workflow
        workflow: Option<String>,
    },
    /// Show version information
    Version,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    weaver::logger::init();

    let cli = Cli::parse();
    let dependencies: Arc<dyn DependencySource> = match cli.deps {
        DepsMode::Declared => Arc::new(DeclaredDependencies),
        DepsMode::Inferred => Arc::new(PromptReferencedDependencies),
        DepsMode::Ignore => Arc::new(NoDependencies),
    };

    match cli.command {
        Commands::Run {
            workflow,
            selection,
            clipboard,
            document,
            base_dir,
        } => {
            let cfg = load_config(cli.config.as_ref());
            let code = run_cmd(
                cfg,
                &workflow,
                selection,
                clipboard,
                document,
                base_dir,
                dependencies,
            )
            .await;
            std::process::exit(code);
        }
        Commands::List => list_cmd(&load_config(cli.config.as_ref())),
        Commands::Check { workflow } => {
            let code = check_cmd(&load_config(cli.config.as_ref()), workflow, dependencies);
            std::process::exit(code);
        }
        Commands::Version => {
            println!("{} weaver v{}", LOGO, weaver::VERSION);
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Config {
    let path = match path {
        Some(p) => p.clone(),
        None => match Config::default_path() {
            Ok(p) => p,
            Err(e) => {
                eprintln!("{} Error: {}", LOGO, e);
                std::process::exit(1);
            }
        },
    };

    let mut cfg = match Config::load(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} Configuration Error: {}", LOGO, e);
            std::process::exit(1);
        }
    };

    match cfg.load_workflow_dir() {
        Ok(0) => {}
        Ok(n) => tracing::debug!(count = n, "Loaded workflow files"),
        Err(e) => {
            eprintln!("{} Failed to load workflow files: {}", LOGO, e);
            std::process::exit(1);
        }
    }
    cfg
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn run_cmd(
    cfg: Config,
    workflow: &str,
    selection: Option<String>,
    clipboard: Option<String>,
    document: Option<PathBuf>,
    base_dir: PathBuf,
    dependencies: Arc<dyn DependencySource>,
) -> i32 {
    let snapshot = match build_snapshot(selection, clipboard, document.as_ref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{} Error: {}", LOGO, e);
            return 1;
        }
    };

    let collaborators = host::collaborators(HostOptions {
        base_dir,
        snapshot,
        document,
        audio_extractor: cfg.defaults.audio_extractor.clone(),
        dependencies,
    });

    let executor = WorkflowExecutor::new(Arc::new(cfg), collaborators);
    let report = executor.run_by_id(workflow).await;
    if report.is_success() {
        0
    } else {
        1
    }
}

fn build_snapshot(
    selection: Option<String>,
    clipboard: Option<String>,
    document: Option<&PathBuf>,
) -> anyhow::Result<ContextSnapshot> {
    let mut stdin_used = false;
    let mut read = |value: Option<String>| -> anyhow::Result<Option<String>> {
        match value.as_deref() {
            Some("-") => {
                if stdin_used {
                    anyhow::bail!("only one context flag can read from stdin");
                }
                stdin_used = true;
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                Ok(Some(buf))
            }
            _ => Ok(value),
        }
    };

    let selection = read(selection)?;
    let clipboard = read(clipboard)?;

    let (document_content, document_name) = match document {
        Some(path) if path.exists() => (
            Some(std::fs::read_to_string(path)?),
            path.file_stem().map(|s| s.to_string_lossy().to_string()),
        ),
        Some(path) => (None, path.file_stem().map(|s| s.to_string_lossy().to_string())),
        None => (None, None),
    };

    Ok(ContextSnapshot {
        selection,
        document_content,
        document_name,
        clipboard,
    })
}

fn list_cmd(cfg: &Config) {
    if cfg.workflows.is_empty() {
        println!("No workflows configured.");
        return;
    }
    for wf in &cfg.workflows {
        println!("{} {} — {} ({} actions)", LOGO, wf.id, wf.name, wf.actions.len());
        for action in &wf.actions {
            println!(
                "    {} [{}] {} via {}/{}",
                action.id(),
                action.kind(),
                action.name(),
                action.provider().provider,
                action.provider().model
            );
        }
        if !wf.dependencies.is_empty() {
            println!("    depends on: {}", wf.dependencies.join(", "));
        }
    }
}

fn check_cmd(cfg: &Config, workflow: Option<String>, dependencies: Arc<dyn DependencySource>) -> i32 {
    let mut failed = false;

    if let Err(e) = cfg.validate() {
        eprintln!("{} Configuration Error:\n{}", LOGO, e);
        failed = true;
    }

    let targets: Vec<_> = match &workflow {
        Some(id) => match cfg.workflow(id) {
            Some(wf) => vec![wf],
            None => {
                eprintln!("{} Workflow '{}' not found", LOGO, id);
                return 1;
            }
        },
        None => cfg.workflows.iter().collect(),
    };

    for wf in targets {
        match graph::check_graph(wf, cfg, dependencies.as_ref()) {
            Ok(()) => println!("✓ {}", wf.id),
            Err(e) => {
                println!("✗ {}: {}", wf.id, e);
                failed = true;
            }
        }
    }

    if failed {
        1
    } else {
        0
    }
}
