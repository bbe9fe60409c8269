//! Feedloader Ingest - vendor feed snapshot loader

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feedloader_common::logging::{init_logging, LogConfig};
use feedloader_ingest::{
    config::LoaderConfig,
    db::{create_pool, DbConfig, PgMetadataStore, PgTableSink},
    orchestrator::{LoadDecision, LoadOrchestrator},
    remote::{FtpConfig, FtpRemoteStore, LocalRemoteStore, RemoteStore},
    MetadataStore,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "feedloader-ingest")]
#[command(author, version, about = "Load vendor feed snapshots into Postgres")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Read the feed from a local mirror instead of FTP
    #[arg(long, env = "FEED_LOCAL_ROOT", global = true)]
    local_root: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load every configured package
    Run,

    /// Show what a run would do without changing anything
    Plan,

    /// Show stored versions for every configured package
    Status {
        /// Print stored records as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env()?;
    log_config.log_file_prefix = "feedloader-ingest".to_string();
    if cli.verbose {
        log_config = log_config.with_level(Level::DEBUG);
    }
    let _guard = init_logging(&log_config)?;

    let config = LoaderConfig::from_env().context("Failed to load loader configuration")?;
    let db_config = DbConfig::from_env()?;
    let pool = create_pool(&db_config)
        .await
        .context("Failed to connect to database")?;

    let remote: Arc<dyn RemoteStore> = match &cli.local_root {
        Some(root) => {
            info!(root = %root.display(), "Using local feed mirror");
            Arc::new(LocalRemoteStore::new(root))
        },
        None => {
            let ftp = FtpConfig::from_env()?;
            info!(host = %ftp.host, port = ftp.port, "Using FTP feed");
            Arc::new(FtpRemoteStore::new(ftp))
        },
    };
    let metadata = Arc::new(PgMetadataStore::new(pool.clone()));
    let sink = Arc::new(PgTableSink::new(pool));

    let orchestrator = LoadOrchestrator::new(config, remote, metadata.clone(), sink);

    match cli.command {
        Command::Run => {
            let report = orchestrator.load_packages().await?;

            for outcome in &report.outcomes {
                println!(
                    "✓ {}: {} (schema {}, data {}, {} tables)",
                    outcome.identity,
                    outcome.decision,
                    outcome.schema_version,
                    outcome.data_version,
                    outcome.tables.len()
                );
            }
            for failure in &report.failures {
                println!("✗ {}", failure);
            }
            println!("{}", report.summary());

            if !report.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::Plan => {
            metadata.ensure_schema().await?;

            for identity in &orchestrator.config().packages {
                match orchestrator.plan_package(identity).await {
                    Ok(plan) => {
                        let stored = plan.stored.as_ref().map_or_else(
                            || "none".to_string(),
                            |m| format!("schema {}, data {}", m.schema_version, m.data_version),
                        );
                        let decision = plan.decision();
                        println!(
                            "{}: stored [{}], observed [schema {}, archive {}] -> {}",
                            identity, stored, plan.schema_version, plan.archive_version, decision
                        );
                        if decision != LoadDecision::UpToDate {
                            println!("    would load {}", plan.archive.path);
                        }
                    },
                    Err(failure) => println!("cannot plan: {}", failure),
                }
            }
        },
        Command::Status { json } => {
            metadata.ensure_schema().await?;

            if json {
                let mut records = Vec::new();
                for identity in &orchestrator.config().packages {
                    records.extend(metadata.get(identity).await?);
                }
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(ExitCode::SUCCESS);
            }

            for identity in &orchestrator.config().packages {
                match metadata.get(identity).await? {
                    Some(m) => println!(
                        "{}: schema {} (loaded {}), data {} (loaded {})",
                        identity,
                        m.schema_version,
                        m.schema_loaded_at.format("%Y-%m-%d %H:%M:%S"),
                        m.data_version,
                        m.data_loaded_at.format("%Y-%m-%d %H:%M:%S")
                    ),
                    None => println!("{}: never loaded", identity),
                }
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}
