use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gpu_ops::{
    CheckRegistry, DeviceLedger, DeviceSource, HealthEngine, InMemoryDeviceSource, MetricsSink,
    NoopSink, PrometheusSink, ResultStore,
    actors::{
        alert::AlertHandle,
        scheduler::{LedgerPolicy, SchedulerHandle},
    },
    alerts::AlertManager,
    api::{self, ApiConfig, ApiState},
    config::{Config, LogFormat, LoggingConfig, load_config},
};
use tokio::sync::broadcast;
use tracing::{error, info, trace, warn};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

/// GPU health daemon
#[derive(Debug, Clone, Parser)]
#[command(version)]
struct Args {
    /// Config file (JSON or TOML); searched in /etc/gputl, ~/.config/gputl and ./ when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init(logging: &LoggingConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt: Box<dyn Layer<Registry> + Send + Sync> = match logging.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_ansi(false)
            .boxed(),
    };

    tracing_subscriber::registry().with(fmt).with(filter).init();
}

fn open_ledger(config: &Config) -> anyhow::Result<DeviceLedger> {
    let path = &config.health.registry_path;
    match DeviceLedger::load(path) {
        Ok(ledger) => Ok(ledger),
        Err(e) if config.health.strict_ledger => {
            Err(e).with_context(|| format!("refusing to start without ledger {}", path.display()))
        }
        Err(e) => {
            warn!("{e}; starting with an empty ledger");
            Ok(DeviceLedger::new())
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("failed to install SIGTERM handler: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

async fn shutdown_signal() {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("failed to listen for ctrl-c: {e}");
            }
        }
        _ = terminate() => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    init(&config.logging);
    trace!("started with args: {args:?}");
    trace!("effective config: {config:?}");

    let ledger = Arc::new(open_ledger(&config)?);
    info!("{} devices in ledger", ledger.len());

    let registry = Arc::new(CheckRegistry::from_configs(config.checks()));
    let store = Arc::new(ResultStore::new());

    let source = Arc::new(InMemoryDeviceSource::mock_fleet());
    for record in ledger.list() {
        if let Err(e) = source.set_registered(record.gpu_id, true).await {
            trace!("ledger GPU {} not present: {e}", record.gpu_id);
        }
    }

    let prometheus = if config.metrics.enabled {
        Some(Arc::new(
            PrometheusSink::new().context("failed to register metrics")?,
        ))
    } else {
        None
    };
    let metrics: Arc<dyn MetricsSink> = match &prometheus {
        Some(sink) => sink.clone(),
        None => Arc::new(NoopSink),
    };
    for record in ledger.list() {
        metrics.observe_registration(&record, true);
    }

    let (result_tx, result_rx) = broadcast::channel(256);
    let engine = Arc::new(
        HealthEngine::new(registry, store, source, metrics)
            .with_result_channel(result_tx)
            .with_probe_timeout(config.health.probe_timeout()),
    );

    let (alerts, alerts_task) = AlertHandle::spawn(
        AlertManager::new(config.alerts.webhook.clone()),
        config.alerts.grace,
        result_rx,
    );

    let policy = LedgerPolicy {
        failed_threshold: config.health.failed_threshold,
        auto_unregister: config.health.auto_unregister,
        persist_path: Some(config.health.registry_path.clone()),
    };
    let (scheduler, scheduler_task) = SchedulerHandle::spawn(
        engine.clone(),
        Some(ledger.clone()),
        policy,
        config.health.check_interval(),
    );
    info!(
        "running {} checks every {:?}",
        engine.registry().list_enabled().len(),
        config.health.check_interval()
    );

    let state = ApiState::new(engine, ledger.clone())
        .with_ledger_path(config.health.registry_path.clone());
    let api_server = api::spawn_api_server(
        ApiConfig {
            bind_addr: config.server.bind_addr(),
            enable_cors: config.server.enable_cors,
        },
        state,
    )
    .await
    .context("failed to start API server")?;

    let metrics_server = match prometheus {
        Some(sink) => Some(
            api::spawn_metrics_server(config.metrics.bind_addr(), &config.metrics.path, sink)
                .await
                .context("failed to start metrics server")?,
        ),
        None => None,
    };

    shutdown_signal().await;
    info!("shutting down");

    if let Err(e) = scheduler.shutdown().await {
        warn!("{e:#}");
    }
    if let Err(e) = scheduler_task.await {
        error!("scheduler task failed: {e}");
    }

    if let Err(e) = alerts.shutdown().await {
        warn!("{e:#}");
    }
    if let Err(e) = alerts_task.await {
        error!("alert task failed: {e}");
    }

    // queued behind any background write still in flight
    if let Err(e) = ledger.save_async(config.health.registry_path.clone()).await {
        error!("{e}");
    }

    api_server.shutdown().await;
    if let Some(server) = metrics_server {
        server.shutdown().await;
    }

    info!("stopped");
    Ok(())
}
