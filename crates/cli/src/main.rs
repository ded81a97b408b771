use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use stepflow_core::template::{sample_workflow, sample_workflows};
use stepflow_core::workflow::EdgeKind;
use stepflow_core::{
    DataContext, EngineConfig, ExecutionStatus, ProcessorRegistry, Workflow, WorkflowDefinition,
    WorkflowEngine, WorkflowGraph,
};

#[derive(Parser, Debug)]
#[command(name = "stepflow")]
#[command(about = "Workflow orchestration engine", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "stepflow.toml", env = "STEPFLOW_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the built-in sample workflows as JSON
    Samples,

    /// Print the step graph and any warnings for a workflow definition file
    Inspect {
        /// Workflow definition (JSON)
        definition: PathBuf,
    },

    /// Run a workflow to completion and print the execution record
    Run {
        /// Workflow definition file, or the name of a sample workflow
        workflow: String,

        /// Input document (a JSON object)
        #[arg(short, long, default_value = "{}")]
        input: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stepflow=info,stepflow_core=info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Samples => {
            let samples = sample_workflows();
            println!("{}", serde_json::to_string_pretty(&samples)?);
        }
        Command::Inspect { definition } => {
            let workflow = load_definition(&definition)?;
            for line in inspect(&workflow, &ProcessorRegistry::with_builtin()) {
                println!("{}", line);
            }
        }
        Command::Run { workflow, input } => {
            let config = EngineConfig::load(&args.config)?;
            let workflow = resolve_workflow(&workflow)?;
            let input = parse_input(&input)?;
            run(config, workflow, input).await?;
        }
    }

    Ok(())
}

async fn run(config: EngineConfig, workflow: Workflow, input: DataContext) -> Result<()> {
    let engine = WorkflowEngine::new(config);
    let name = workflow.name.clone();
    let workflow_id = engine.register_workflow(workflow).await;

    let execution = engine
        .execute_workflow(workflow_id, input)
        .await
        .with_context(|| format!("Failed to start workflow '{}'", name))?;
    tracing::info!("Started execution {}", execution.execution_id);

    let execution = engine.wait_for_execution(execution.execution_id).await?;
    engine.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&execution)?);

    if execution.status != ExecutionStatus::Completed {
        anyhow::bail!(
            "Execution {} ended {:?}: {}",
            execution.execution_id,
            execution.status,
            execution.error_message.as_deref().unwrap_or("no error recorded")
        );
    }
    Ok(())
}

/// Edges of the step graph followed by lint warnings
fn inspect(workflow: &Workflow, registry: &ProcessorRegistry) -> Vec<String> {
    let graph = WorkflowGraph::from_workflow(workflow);
    let mut lines = Vec::new();

    for step in workflow.steps.values() {
        for (target, kind) in graph.successors(&step.id) {
            let label = match kind {
                EdgeKind::Successor => "next",
                EdgeKind::Branch => "branch",
            };
            lines.push(format!("{} -> {} ({})", step.id, target, label));
        }
    }

    let mut warnings = graph.warnings();
    for step in workflow.steps.values() {
        if !registry.contains(step.step_type) {
            warnings.push(format!(
                "step '{}' has type '{}', which no processor handles",
                step.id, step.step_type
            ));
        }
    }

    if warnings.is_empty() {
        lines.push(format!("{}: no warnings", workflow.name));
    }
    lines.extend(warnings.into_iter().map(|w| format!("warning: {}", w)));
    lines
}

/// A path to a definition file wins over a sample of the same name
fn resolve_workflow(target: &str) -> Result<Workflow> {
    let path = Path::new(target);
    if path.is_file() {
        return load_definition(path);
    }

    sample_workflow(target).with_context(|| {
        format!(
            "'{}' is neither a definition file nor a sample workflow",
            target
        )
    })
}

fn load_definition(path: &Path) -> Result<Workflow> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let definition: WorkflowDefinition = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Workflow::from_definition(definition)?)
}

fn parse_input(raw: &str) -> Result<DataContext> {
    let value: Value = serde_json::from_str(raw).context("Input is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("Input must be a JSON object, got {}", other),
    }
}
