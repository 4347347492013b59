// crates/relaycli/src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use relaycore::{
    ExecutionEvent, FlowGraph, FlowScope, Message, NodeRecord, SharedContext, DEFAULT_INGEST_KIND,
};
use relayruntime::{FlowRuntime, HandlerRegistry, RuntimeConfig};
use relaystate::{MemoryContextStore, RedisConfig, RedisContextStore};
use relaywire::{ActionConfig, ActionInvoker, SocketConfig, SocketInvoker};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Flow orchestrator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow file
    Run {
        /// Path to flow definition JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Initial message as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Tenant the execution runs under
        #[arg(long, default_value = "default")]
        tenant: String,

        /// Flow id for scoping and events
        #[arg(long, default_value = "cli")]
        flow_id: String,

        /// Node type marking ingestion nodes
        #[arg(long, default_value = DEFAULT_INGEST_KIND)]
        ingest: String,

        /// Invoke nodes as platform actions at this base URL instead of
        /// over sockets
        #[arg(long)]
        action_url: Option<String>,

        /// Basic-auth credentials for the action platform, user:key form
        #[arg(long)]
        action_auth: Option<String>,

        /// Back node contexts with this Redis instance instead of memory
        #[arg(long)]
        redis_url: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a flow file
    Validate {
        /// Path to flow definition JSON file
        file: PathBuf,

        /// Node type marking ingestion nodes
        #[arg(long, default_value = DEFAULT_INGEST_KIND)]
        ingest: String,
    },

    /// Show the parsed graph of a flow file
    Inspect {
        file: PathBuf,

        #[arg(long, default_value = DEFAULT_INGEST_KIND)]
        ingest: String,
    },

    /// Create a new example flow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            tenant,
            flow_id,
            ingest,
            action_url,
            action_auth,
            redis_url,
            verbose,
        } => {
            if verbose {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::DEBUG)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::INFO)
                    .init();
            }

            run_flow(
                file, input, tenant, flow_id, ingest, action_url, action_auth, redis_url,
            )
            .await?;
        }

        Commands::Validate { file, ingest } => {
            validate_flow(file, &ingest)?;
        }

        Commands::Inspect { file, ingest } => {
            inspect_flow(file, &ingest)?;
        }

        Commands::Init { output } => {
            create_example_flow(output)?;
        }
    }

    Ok(())
}

fn load_records(file: &PathBuf) -> Result<Vec<NodeRecord>> {
    let raw = std::fs::read_to_string(file)?;
    Ok(serde_json::from_str(&raw)?)
}

async fn run_flow(
    file: PathBuf,
    input: Option<String>,
    tenant: String,
    flow_id: String,
    ingest: String,
    action_url: Option<String>,
    action_auth: Option<String>,
    redis_url: Option<String>,
) -> Result<()> {
    println!("🚀 Loading flow from: {}", file.display());

    let records = load_records(&file)?;
    let graph = FlowGraph::parse(&records, &ingest)?;

    println!("📋 Flow: {}", flow_id);
    println!("   Nodes: {}", graph.len());
    println!("   Heads: {}", graph.heads().len());
    println!("   Tails: {}", graph.tails().len());
    println!();

    let initial: Message = match input {
        Some(input_str) => {
            let json: serde_json::Value = serde_json::from_str(&input_str)?;
            Message::from_value(json)
                .ok_or_else(|| anyhow::anyhow!("Input must be a JSON object"))?
        }
        None => Message::new(),
    };

    // Transport: sockets by default, platform actions when a URL is given.
    let mut registry = HandlerRegistry::new();
    match action_url {
        Some(url) => {
            let mut config = ActionConfig::new(url);
            if let Some(auth) = action_auth {
                let (user, key) = auth
                    .split_once(':')
                    .ok_or_else(|| anyhow::anyhow!("--action-auth must be user:key"))?;
                config = config.with_auth(user, key);
            }
            registry.set_default(Arc::new(ActionInvoker::new(config)));
        }
        None => {
            registry.set_default(Arc::new(SocketInvoker::new(SocketConfig::default())));
        }
    }

    let context: Arc<dyn SharedContext> = match redis_url {
        Some(url) => Arc::new(RedisContextStore::connect(RedisConfig::new(url)).await?),
        None => Arc::new(MemoryContextStore::new()),
    };

    let runtime = FlowRuntime::new(
        Arc::new(registry),
        context,
        RuntimeConfig {
            ingest_kind: ingest,
            ..RuntimeConfig::default()
        },
    );

    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::FlowStarted { .. } => {
                    println!("▶️  Flow started");
                }
                ExecutionEvent::NodeInvoked { node_id, kind, .. } => {
                    println!("  ⚡ Invoking node: {} ({})", node_id, kind);
                }
                ExecutionEvent::NodeCompleted {
                    node_id,
                    duration_ms,
                    ..
                } => {
                    println!("  ✅ Node {} completed in {}ms", node_id, duration_ms);
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    println!("  ❌ Node {} failed: {}", node_id, error);
                }
                ExecutionEvent::BranchSkipped { from, target, .. } => {
                    println!("  ⚠️  Branch from {} skipped: {} not found", from, target);
                }
                ExecutionEvent::FlowCompleted {
                    success,
                    duration_ms,
                    ..
                } => {
                    if success {
                        println!("✨ Flow completed successfully in {}ms", duration_ms);
                    } else {
                        println!("💥 Flow failed after {}ms", duration_ms);
                    }
                }
            }
        }
    });

    let scope = FlowScope::new(tenant, flow_id);
    let result = runtime.execute(&graph, &scope, initial).await;

    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    let report = result?;

    println!();
    println!("📊 Traversal Summary:");
    println!("   Execution ID: {}", report.execution_id);
    println!("   Invoked: {} nodes", report.invoked);
    if !report.skipped.is_empty() {
        println!("   Skipped branches:");
        for branch in &report.skipped {
            println!("     {} → {} (missing)", branch.from, branch.target);
        }
    }
    println!();
    println!("📤 Final message:");
    println!("{}", serde_json::to_string_pretty(&report.message)?);

    Ok(())
}

fn validate_flow(file: PathBuf, ingest: &str) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());

    let records = load_records(&file)?;
    let graph = FlowGraph::parse(&records, ingest)?;

    // Dangling wires are legal at parse time but worth surfacing here.
    let mut dangling = Vec::new();
    for node in graph.nodes() {
        for wire in &node.wires {
            if graph.node(wire).is_none() {
                dangling.push((node.id.clone(), wire.clone()));
            }
        }
    }

    // Cycles are a runtime concern for the traversal, but a validated flow
    // should not contain any.
    let mut dag = DiGraph::<&str, ()>::new();
    let mut indices = HashMap::new();
    for node in graph.nodes() {
        let idx = dag.add_node(node.id.as_str());
        indices.insert(node.id.as_str(), idx);
    }
    for node in graph.nodes() {
        for wire in &node.wires {
            if let Some(to) = indices.get(wire.as_str()) {
                dag.add_edge(indices[node.id.as_str()], *to, ());
            }
        }
    }
    let cyclic = toposort(&dag, None).is_err();

    println!("✅ Flow parses:");
    println!("   Nodes: {}", graph.len());
    println!("   Heads: {}", graph.heads().join(", "));
    println!("   Tails: {}", graph.tails().join(", "));

    if graph.heads().is_empty() {
        println!("⚠️  No ingestion node of type '{}' — nothing will run", ingest);
    }
    for (from, target) in &dangling {
        println!("⚠️  Dangling wire: {} → {} (no such node)", from, target);
    }
    if cyclic {
        println!("⚠️  Flow contains a cycle; traversal of it will not terminate");
    }

    Ok(())
}

fn inspect_flow(file: PathBuf, ingest: &str) -> Result<()> {
    let records = load_records(&file)?;
    let graph = FlowGraph::parse(&records, ingest)?;

    println!("📦 {} nodes", graph.len());
    for node in graph.nodes() {
        let role = if graph.heads().contains(&node.id) {
            " [head]"
        } else if node.is_tail() {
            " [tail]"
        } else {
            ""
        };
        println!("  • {} ({}){}", node.id, node.kind, role);
        if !node.wires.is_empty() {
            println!("    → {}", node.wires.join(", "));
        }
    }

    Ok(())
}

fn create_example_flow(output: PathBuf) -> Result<()> {
    let flow = serde_json::json!([
        {
            "id": "ingest",
            "type": DEFAULT_INGEST_KIND,
            "wires": ["to-kelvin"]
        },
        {
            "id": "to-kelvin",
            "type": "kelvin",
            "wires": []
        },
        {
            "id": "editor-tab",
            "type": "tab",
            "label": "Temperature pipeline"
        }
    ]);

    let json = serde_json::to_string_pretty(&flow)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  relay run --file {} --input '{{\"temp\": 0}}'",
        output.display()
    );

    Ok(())
}
