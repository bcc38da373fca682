//! Ripple - change propagation across dependent repositories
//!
//! ## Commands
//!
//! - `dispatch`: triage one change event and act on the outcomes
//! - `listen`: accept newline-delimited change events from stdin
//! - `analyze`: triage one configured edge without acting
//! - `deps`: show a repository's dependents and dependencies
//! - `add-relationship`: add or update an edge and persist the config

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn, Level};

use ripple_core::config::edge_from_policy_json;
use ripple_core::{
    Actuator, AnthropicGenerator, ChangeEvent, ContextFetcher, DisabledNotifier, EdgeKind,
    EngineConfig, GitHubClient, LlmOracle, Notifier, Orchestrator, RelationshipStore,
    TriagePipeline, WebhookNotifier,
};

#[derive(Parser)]
#[command(name = "ripple")]
#[command(author = "Stevedores Org")]
#[command(version = ripple_core::VERSION)]
#[command(about = "Propagate repository changes to their dependents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Relationship config document
    #[arg(
        long,
        global = true,
        env = "RIPPLE_CONFIG",
        default_value = "config/relationships.json"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Consumer,
    Derivative,
}

impl From<KindArg> for EdgeKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Consumer => EdgeKind::Consumer,
            KindArg::Derivative => EdgeKind::Derivative,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Triage a change event against every dependent and wait for the results
    Dispatch {
        /// Change event JSON file
        #[arg(short, long)]
        event: PathBuf,

        /// Log issues and notifications instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Read newline-delimited change events from stdin, ack each immediately
    Listen {
        /// Log issues and notifications instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Triage a single configured edge without creating issues
    Analyze {
        /// Change event JSON file
        #[arg(short, long)]
        event: PathBuf,

        /// Dependent repository
        #[arg(short, long)]
        target: String,

        /// Relationship kind
        #[arg(short, long, value_enum)]
        kind: KindArg,
    },

    /// Show dependents and upstream dependencies of a repository
    Deps {
        /// Repository, e.g. org/name
        repo: String,

        /// Include edge policy in the output
        #[arg(long)]
        metadata: bool,
    },

    /// Add or update a relationship and save the config
    AddRelationship {
        /// Source repository
        #[arg(long)]
        source: String,

        /// Dependent repository
        #[arg(long)]
        target: String,

        /// Relationship kind
        #[arg(long, value_enum)]
        kind: KindArg,

        /// Policy JSON, e.g. '{"change_triggers": ["api_contract"]}'
        #[arg(long, default_value = "{}")]
        policy: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    ripple_core::init_tracing(cli.json, level);

    let store = RelationshipStore::open(&cli.config)
        .with_context(|| format!("Failed to load relationship config {}", cli.config.display()))?;

    match cli.command {
        Commands::Dispatch { event, dry_run } => cmd_dispatch(&store, &event, dry_run).await,
        Commands::Listen { dry_run } => cmd_listen(&store, dry_run).await,
        Commands::Analyze {
            event,
            target,
            kind,
        } => cmd_analyze(&store, &event, &target, kind.into()).await,
        Commands::Deps { repo, metadata } => cmd_deps(&store, &repo, metadata),
        Commands::AddRelationship {
            source,
            target,
            kind,
            policy,
        } => cmd_add_relationship(&store, &source, &target, kind.into(), &policy),
    }
}

/// Wire the production adapters around the store's graph.
fn build_orchestrator(store: &RelationshipStore, config: &EngineConfig, dry_run: bool) -> Orchestrator {
    let github = Arc::new(GitHubClient::new(config.github.clone()));
    let fetcher = ContextFetcher::new(github.clone()).with_limits(config.context_limits());
    let oracle = LlmOracle::new(
        AnthropicGenerator::new(config.anthropic.clone()),
        config.oracle_timeout,
    );
    let pipeline = TriagePipeline::new(fetcher, Arc::new(oracle));

    let actuator = if dry_run {
        Actuator::dry_run()
    } else {
        let notifier: Arc<dyn Notifier> = match &config.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
            None => {
                warn!("WEBHOOK_URL not set, notifications will be skipped");
                Arc::new(DisabledNotifier)
            }
        };
        Actuator::new(github, notifier)
    };
    let actuator = actuator.with_policy(store.document().decision_policy());

    Orchestrator::new(store.graph(), pipeline, actuator)
}

fn read_event(path: &Path) -> Result<ChangeEvent> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read event file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid change event in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Triage one event synchronously
async fn cmd_dispatch(store: &RelationshipStore, event_path: &Path, dry_run: bool) -> Result<()> {
    let event = read_event(event_path)?;
    let config = EngineConfig::from_env();
    let orchestrator = build_orchestrator(store, &config, dry_run);

    let report = orchestrator.dispatch(event).await?;
    info!(
        dispatch_id = %report.dispatch_id,
        outcomes = report.outcomes.len(),
        "dispatch complete"
    );
    print_json(&report)?;
    ripple_core::metrics::METRICS.flush();
    Ok(())
}

/// Serve change events from stdin until EOF, then drain
async fn cmd_listen(store: &RelationshipStore, dry_run: bool) -> Result<()> {
    let config = EngineConfig::from_env();
    let orchestrator = build_orchestrator(store, &config, dry_run);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ChangeEvent>(&line) {
            Ok(event) => match orchestrator.accept(event) {
                Ok(ack) => serde_json::to_value(&ack)?,
                Err(e) => serde_json::json!({"status": "rejected", "error": e.to_string()}),
            },
            Err(e) => serde_json::json!({"status": "rejected", "error": format!("invalid change event: {e}")}),
        };
        stdout
            .write_all(format!("{}\n", serde_json::to_string(&response)?).as_bytes())
            .await?;
        stdout.flush().await?;
    }

    info!(
        in_flight = orchestrator.in_flight(),
        grace_secs = config.shutdown_grace.as_secs(),
        "input closed, draining"
    );
    let report = orchestrator.shutdown(config.shutdown_grace).await;
    info!(finished = report.finished, abandoned = report.abandoned, "listener stopped");
    Ok(())
}

/// Triage one configured edge and print the outcome
async fn cmd_analyze(
    store: &RelationshipStore,
    event_path: &Path,
    target: &str,
    kind: EdgeKind,
) -> Result<()> {
    let event = read_event(event_path)?;
    let config = EngineConfig::from_env();
    let orchestrator = build_orchestrator(store, &config, true);
    let outcome = orchestrator.analyze_edge(event, target, kind).await?;
    print_json(&outcome)
}

/// Print dependency summary
fn cmd_deps(store: &RelationshipStore, repo: &str, metadata: bool) -> Result<()> {
    let summary = store.graph().dependencies(repo, metadata);
    print_json(&summary)
}

/// Add or update one relationship
fn cmd_add_relationship(
    store: &RelationshipStore,
    source: &str,
    target: &str,
    kind: EdgeKind,
    policy: &str,
) -> Result<()> {
    if source.trim().is_empty() {
        bail!("--source must not be empty");
    }
    let edge = edge_from_policy_json(target, kind, policy).context("Invalid --policy JSON")?;
    let outcome = store.add_dependency_relationship(source, edge)?;
    print_json(&serde_json::json!({
        "source_repo": source,
        "target_repo": target,
        "kind": kind,
        "outcome": outcome,
    }))
}
