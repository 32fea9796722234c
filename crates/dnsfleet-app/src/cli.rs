//! Command-line surface of the `dnsfleet` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use dnsfleet_core::{EntityId, EntityKind, NodeId, SyncLogId, SyncLogType, SyncStatus};
use tracing::debug;

use crate::bootstrap::{self, App};
use crate::commands::{entities, nodes, serve, sync};
use crate::error::AppResult;

/// Parses CLI arguments, executes the requested command and returns the
/// process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    if let Err(err) = bootstrap::init_logging(cli.command.log_level()) {
        eprintln!("error: {}", err.display_message());
        return err.exit_code();
    }

    let result = match App::from_env().await {
        Ok(app) => {
            let result = dispatch(&app, cli.command, cli.output).await;
            app.shutdown().await;
            result
        }
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => 0,
        Err(err) => {
            debug!(error = ?err, "command failed");
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

pub(crate) async fn dispatch(app: &App, command: Command, output: OutputFormat) -> AppResult<()> {
    match command {
        Command::Serve => serve::run(app).await,
        Command::Node(NodeCommand::List) => nodes::list(app, output).await,
        Command::Node(NodeCommand::Add(args)) => nodes::add(app, args, output).await,
        Command::Node(NodeCommand::Remove(args)) => nodes::remove(app, args.id).await,
        Command::Apply(args) => entities::apply(app, args, output).await,
        Command::Remove(args) => entities::remove(app, args, output).await,
        Command::Resync(args) => sync::resync(app, args.node, output).await,
        Command::Retry(args) => sync::retry(app, args.log, output).await,
        Command::Logs(args) => sync::logs(app, args, output).await,
        Command::Stats => sync::stats(app, output).await,
        Command::Health => sync::health(app, output).await,
    }
}

#[derive(Parser)]
#[command(
    name = "dnsfleet",
    about = "Keep a fleet of SmartDNS resolvers in sync with the control plane"
)]
pub(crate) struct Cli {
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    pub(crate) output: OutputFormat,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Recover interrupted attempts and probe node health until Ctrl-C.
    Serve,
    #[command(subcommand)]
    Node(NodeCommand),
    /// Save an entity from a JSON file and push it to its nodes.
    Apply(ApplyArgs),
    /// Delete an entity and remove it from its nodes.
    Remove(RemoveArgs),
    /// Rebuild one node's configuration from the store.
    Resync(ResyncArgs),
    /// Replay a failed sync log entry.
    Retry(RetryArgs),
    /// List sync log entries, newest first.
    Logs(LogsArgs),
    /// Sync log counts by status.
    Stats,
    /// Probe every node once.
    Health,
}

impl Command {
    /// Long-running commands log at `info`; one-shot commands keep stdout
    /// for their output.
    const fn log_level(&self) -> &'static str {
        match self {
            Self::Serve => "info",
            _ => "warn",
        }
    }
}

/// Manage registered nodes.
#[derive(Subcommand)]
pub(crate) enum NodeCommand {
    /// List registered nodes.
    List,
    /// Register a node.
    Add(NodeAddArgs),
    /// Unregister a node. Its sync history is kept.
    Remove(NodeRemoveArgs),
}

#[derive(Args)]
pub(crate) struct NodeAddArgs {
    #[arg(long)]
    pub(crate) name: String,
    #[arg(long)]
    pub(crate) host: String,
    #[arg(long, default_value_t = 22)]
    pub(crate) port: u16,
    #[arg(long, default_value = "root")]
    pub(crate) user: String,
    #[arg(long, help = "Private key used instead of the ssh agent")]
    pub(crate) key_file: Option<PathBuf>,
    #[arg(long, help = "Bastion hop as user@host:port")]
    pub(crate) jump_host: Option<String>,
    #[arg(long, help = "Remote configuration file (defaults to the fleet setting)")]
    pub(crate) config_path: Option<PathBuf>,
}

#[derive(Args)]
pub(crate) struct NodeRemoveArgs {
    #[arg(long)]
    pub(crate) id: NodeId,
}

#[derive(Args)]
pub(crate) struct ApplyArgs {
    #[arg(short = 'f', long = "file", help = "Entity JSON, tagged with \"kind\"")]
    pub(crate) file: PathBuf,
    #[arg(long, help = "Replace a domain set's items with a domain list file")]
    pub(crate) domains: Option<PathBuf>,
}

#[derive(Args)]
pub(crate) struct RemoveArgs {
    #[arg(long, value_parser = parse_kind)]
    pub(crate) kind: EntityKind,
    #[arg(long)]
    pub(crate) id: EntityId,
}

#[derive(Args)]
pub(crate) struct ResyncArgs {
    #[arg(long)]
    pub(crate) node: NodeId,
}

#[derive(Args)]
pub(crate) struct RetryArgs {
    #[arg(long)]
    pub(crate) log: SyncLogId,
}

#[derive(Args, Default)]
pub(crate) struct LogsArgs {
    #[arg(long)]
    pub(crate) node: Option<NodeId>,
    #[arg(long, value_parser = parse_status)]
    pub(crate) status: Option<SyncStatus>,
    #[arg(long = "type", value_parser = parse_log_type)]
    pub(crate) log_type: Option<SyncLogType>,
    #[arg(long)]
    pub(crate) limit: Option<u32>,
    #[arg(long, default_value_t = 0)]
    pub(crate) offset: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

fn normalise(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace('-', "_")
}

fn parse_kind(raw: &str) -> Result<EntityKind, String> {
    EntityKind::from_label(&normalise(raw)).ok_or_else(|| {
        let known: Vec<&str> = EntityKind::ALL.iter().map(|kind| kind.as_str()).collect();
        format!("unknown entity kind; expected one of {}", known.join(", "))
    })
}

fn parse_status(raw: &str) -> Result<SyncStatus, String> {
    SyncStatus::from_label(&normalise(raw))
        .ok_or_else(|| "unknown status; expected pending, success or failed".to_string())
}

fn parse_log_type(raw: &str) -> Result<SyncLogType, String> {
    SyncLogType::from_label(&normalise(raw)).ok_or_else(|| "unknown sync log type".to_string())
}
