use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use jarvis::agent::{resolve_node_name, CommandRequest};
use jarvis::config::{AgentConfig, DispatchConfig, DispatchMode, ExecutionConfig};
use jarvis::controller::{
    ClusterState, CommandReconciler, Event, EventKind, EventSink, MemoryEventSink, StaticCluster,
    Trigger,
};
use jarvis::dispatch::{AgentConnector, DispatchReport, RequestIdGenerator};
use jarvis::error::JarvisError;
use jarvis::grpc::{AgentServer, GrpcAgentConnector};
use jarvis::shutdown::install_shutdown_handler;
use jarvis::targets::DispatchTarget;

#[derive(Parser, Debug)]
#[command(name = "jarvis")]
#[command(version)]
#[command(about = "Run shell commands on selected cluster nodes")]
#[command(propagate_version = true)]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the per-node command agent
    Agent(AgentArgs),

    /// Send one command to one agent
    Exec(ExecArgs),

    /// Reconcile commands from an inventory file and print the resulting events
    Dispatch(DispatchArgs),
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct AgentArgs {
    /// Port to listen on for gRPC
    #[arg(long, default_value = "50051")]
    port: u16,

    /// Name reported by this agent (defaults to the host name)
    #[arg(long, env = "NODE_NAME")]
    node_name: Option<String>,

    /// Run commands inside this filesystem root, e.g. the host filesystem
    /// mounted at /host
    #[arg(long)]
    execution_root: Option<PathBuf>,

    /// Shell interpreter used to run commands
    #[arg(long, default_value = "sh")]
    shell: String,
}

#[derive(Parser, Debug)]
struct ExecArgs {
    /// Agent address (host, host:port or ip:port)
    #[arg(long, short = 'a', default_value = "127.0.0.1:50051")]
    addr: String,

    /// Use the Session stream instead of the unary call
    #[arg(short, long)]
    stream: bool,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,

    /// The command to execute (e.g., "uname -a")
    command: String,
}

#[derive(Parser, Debug)]
struct DispatchArgs {
    /// JSON inventory with nodes, agent endpoints and commands
    #[arg(long, short = 'i')]
    inventory: PathBuf,

    /// Command to reconcile (all commands when omitted)
    #[arg(long, short = 'c')]
    command: Option<String>,

    /// Port for agent addresses that do not carry one
    #[arg(long)]
    agent_port: Option<u16>,

    /// Use the Session stream instead of the unary call
    #[arg(short, long)]
    stream: bool,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn dispatch_mode(stream: bool) -> DispatchMode {
    if stream {
        DispatchMode::Stream
    } else {
        DispatchMode::Unary
    }
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct ExecOutput {
    request_id: String,
    exit_code: i32,
    output: String,
}

#[derive(Serialize)]
struct RoundOutput {
    round_id: String,
    command: String,
    succeeded: usize,
    failed: usize,
    cancelled: usize,
}

#[derive(Serialize)]
struct DispatchOutput {
    rounds: Vec<RoundOutput>,
    events: Vec<Event>,
}

// =============================================================================
// Logging
// =============================================================================

/// Logs go to stderr so that command output on stdout stays parseable.
fn init_logging(json: bool, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

// =============================================================================
// Agent
// =============================================================================

async fn run_agent(args: AgentArgs) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = install_shutdown_handler()?;

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let node_name = resolve_node_name(args.node_name.as_deref());

    let mut execution = ExecutionConfig::default().with_shell(args.shell);
    if let Some(root) = args.execution_root {
        execution = execution.with_execution_root(root);
    }
    let config = AgentConfig::new(listen_addr, node_name).with_execution(execution);

    tracing::info!(
        node_name = %config.node_name,
        listen_addr = %config.listen_addr,
        shell = %config.execution.shell,
        "Starting jarvis agent"
    );
    tracing::warn!("Agent transport is plaintext; restrict access to port {}", args.port);

    AgentServer::new(config).run(shutdown).await?;
    Ok(())
}

// =============================================================================
// Exec
// =============================================================================

async fn handle_exec(args: ExecArgs) -> Result<(), Box<dyn std::error::Error>> {
    let address = args
        .addr
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string();
    let connector =
        GrpcAgentConnector::new(DispatchConfig::default().with_mode(dispatch_mode(args.stream)));
    let request_ids = RequestIdGenerator::new();
    let request = CommandRequest::new(request_ids.next_id(), args.command);

    let target = DispatchTarget::new(address.clone(), address);
    let result = match connector.execute(&target, request).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match args.output {
        OutputFormat::Json => {
            let output = ExecOutput {
                request_id: result.request_id.clone(),
                exit_code: result.exit_code,
                output: result.output_lossy().into_owned(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            print!("{}", result.output_lossy());
            if !result.succeeded() {
                eprintln!("Exit Code: {}", result.exit_code);
            }
        }
    }

    if !result.succeeded() {
        std::process::exit(result.exit_code.clamp(1, 255));
    }
    Ok(())
}

// =============================================================================
// Dispatch
// =============================================================================

fn round_output(round_id: String, command: String, report: &DispatchReport) -> RoundOutput {
    RoundOutput {
        round_id,
        command,
        succeeded: report.success_count(),
        failed: report.failure_count(),
        cancelled: report.cancelled_count(),
    }
}

async fn handle_dispatch(args: DispatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = install_shutdown_handler()?;

    let cluster = Arc::new(StaticCluster::from_file(&args.inventory).await?);
    let config = DispatchConfig {
        agent_port: args.agent_port,
        mode: dispatch_mode(args.stream),
    };

    let events = Arc::new(MemoryEventSink::new());
    let reconciler = CommandReconciler::new(
        cluster as Arc<dyn ClusterState>,
        Arc::new(GrpcAgentConnector::new(config)) as Arc<dyn AgentConnector>,
        events.clone() as Arc<dyn EventSink>,
    );

    let jobs = match args.command {
        Some(command_id) => {
            let job = reconciler
                .reconcile_command(&command_id)
                .await?
                .ok_or(JarvisError::CommandNotFound(command_id))?;
            vec![job]
        }
        None => reconciler.reconcile(Trigger::AgentEndpointsChanged).await?,
    };

    let tokens: Vec<_> = jobs.iter().map(|job| job.cancel_token()).collect();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        for token in tokens {
            token.cancel();
        }
    });

    let mut rounds = Vec::with_capacity(jobs.len());
    for job in jobs {
        let round_id = job.round_id().to_string();
        let command = job.command_id().to_string();
        let report = job.wait().await?;
        rounds.push(round_output(round_id, command, &report));
    }

    match args.output {
        OutputFormat::Json => {
            let output = DispatchOutput {
                rounds,
                events: events.events(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            for event in events.events() {
                let marker = match event.kind {
                    EventKind::Normal => "[+]",
                    EventKind::Warning => "[-]",
                };
                println!("{} {:<8} {}", marker, event.kind, event.reason);
                for line in event.message.lines() {
                    println!("    {}", line);
                }
            }
            println!();
            println!(
                "{:<38} {:<20} {:>9} {:>7} {:>10}",
                "ROUND", "COMMAND", "SUCCEEDED", "FAILED", "CANCELLED"
            );
            println!("{}", "-".repeat(88));
            for round in &rounds {
                println!(
                    "{:<38} {:<20} {:>9} {:>7} {:>10}",
                    round.round_id, round.command, round.succeeded, round.failed, round.cancelled
                );
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Agent(agent_args) => {
            init_logging(args.log_json, "info");
            run_agent(agent_args).await?;
        }
        Commands::Exec(exec_args) => {
            init_logging(args.log_json, "warn");
            handle_exec(exec_args).await?;
        }
        Commands::Dispatch(dispatch_args) => {
            init_logging(args.log_json, "warn");
            handle_dispatch(dispatch_args).await?;
        }
    }

    Ok(())
}
