use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use gpu_ops::{
    client::{ClientError, GputlClient},
    config::write_default_config,
    ledger::{DEFAULT_POOL, Registration},
    util::{DEFAULT_DAEMON_URL, GPUTL_DAEMON_URL},
};
use tracing::{level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line client for the GPU health daemon
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Daemon base URL
    #[arg(long, global = true, env = GPUTL_DAEMON_URL, default_value = DEFAULT_DAEMON_URL)]
    daemon_url: String,

    /// Log requests to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show all GPUs, or one GPU in detail
    Status { gpu_id: Option<u32> },

    /// Enroll a GPU
    Register {
        gpu_id: u32,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value = DEFAULT_POOL)]
        pool: String,

        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Remove a GPU from the ledger
    Unregister { gpu_id: u32 },

    /// List configured health checks
    HealthChecks,

    /// Latest result of every check
    Results,

    /// Daemon liveness
    Health,

    /// Write the default daemon configuration
    InitConfig { path: PathBuf },
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::WARN
    };
    let filter = filter::Targets::new().with_targets(vec![("gpu_ops", level), ("gputl", level)]);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    if let Command::InitConfig { path } = &args.command {
        write_default_config(path)?;
        println!("wrote default configuration to {}", path.display());
        return Ok(());
    }

    let client = GputlClient::new(&args.daemon_url)?;

    match args.command {
        Command::Status { gpu_id: Some(gpu_id) } => print_json(&client.get_gpu(gpu_id).await?)?,

        Command::Status { gpu_id: None } => {
            let response = client.list_gpus().await?;
            println!("{:<4} {:<32} {:<8} {:<11} POOL", "ID", "NAME", "ONLINE", "REGISTERED");
            for gpu in response.gpus {
                println!(
                    "{:<4} {:<32} {:<8} {:<11} {}",
                    gpu.id,
                    gpu.name,
                    gpu.online,
                    gpu.registered,
                    gpu.pool.as_deref().unwrap_or("-")
                );
            }
        }

        Command::Register {
            gpu_id,
            name,
            pool,
            tags,
        } => {
            let request = Registration {
                gpu_id,
                name: name.unwrap_or_default(),
                pool,
                tags: tags
                    .into_iter()
                    .map(|tag| tag.trim().to_string())
                    .filter(|tag| !tag.is_empty())
                    .collect::<BTreeSet<_>>(),
                ..Default::default()
            };
            let record = client.register(&request).await?;
            println!("registered GPU {} in pool {}", record.gpu_id, record.pool);
        }

        Command::Unregister { gpu_id } => {
            let record = client.unregister(gpu_id).await?;
            println!("unregistered GPU {}", record.gpu_id);
        }

        Command::HealthChecks => {
            let response = client.list_checks().await?;
            println!(
                "{:<24} {:<12} {:<8} {:>9} {:>9} {:>9}",
                "NAME", "TYPE", "ENABLED", "INTERVAL", "WARNING", "CRITICAL"
            );
            for check in response.checks {
                println!(
                    "{:<24} {:<12} {:<8} {:>8}s {:>9.1} {:>9.1}",
                    check.name,
                    check.check_type.to_string(),
                    check.enabled,
                    check.interval_secs,
                    check.warning_threshold,
                    check.critical_threshold
                );
            }
        }

        Command::Results => {
            let response = client.list_results().await?;
            for result in response.results {
                println!(
                    "GPU {:<3} {:<24} {:<10} {}",
                    result.gpu_id,
                    result.check_name,
                    result.status.to_string(),
                    result.message
                );
            }
        }

        Command::Health => print_json(&client.health().await?)?,

        Command::InitConfig { .. } => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ClientError>() {
                Some(ClientError::Api { message, .. }) => eprintln!("error: {message}"),
                _ => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
