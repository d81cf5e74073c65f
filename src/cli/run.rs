use crate::config::{load_config, Config, ConfigError, SinkConfig};
use crate::pipeline::{HarvestJob, JobError, JobOptions};
use crate::sink::{FileSink, Sink, SinkError, SyslogSink};
use crate::source::object::TransportError;
use crate::source::LocalBlobStore;
use crate::web::run_server;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("could not reach syslog collector: {0}")]
    Transport(#[from] TransportError),

    #[error("harvest run failed: {0}")]
    Job(#[from] JobError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("web server error: {0}")]
    WebServer(#[from] std::io::Error),
}

pub async fn run(config_path: Option<PathBuf>, once: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = require_config_path(config_path);
    run_harvester(&config_path, once).await.map_err(|e| e.into())
}

/// Exit with a hint when no config file was found.
pub(crate) fn require_config_path(config_path: Option<PathBuf>) -> PathBuf {
    match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/nsg-harvester/config.yml");
            eprintln!("  /etc/nsg-harvester/config.yml");
            eprintln!("\nUse --config <path> to specify a config file, or run 'nsg-harvester config init' to generate one.");
            std::process::exit(1);
        }
    }
}

/// Build the sink named by the config. A syslog sink connects immediately.
pub async fn build_sink(config: &SinkConfig) -> Result<Arc<dyn Sink>, RunError> {
    let sink: Arc<dyn Sink> = match config {
        SinkConfig::File { path } => Arc::new(FileSink::new(path.clone())?),
        SinkConfig::Syslog {
            protocol,
            host,
            port,
        } => Arc::new(SyslogSink::dial(*protocol, host, *port).await?),
    };
    Ok(sink)
}

pub fn job_options(config: &Config) -> JobOptions {
    JobOptions {
        name: config.harvest.name.clone(),
        record_kind: config.source.kind,
        prefix: config.source.prefix.clone(),
        concurrency: config.harvest.concurrency,
        begin_time: config.harvest.begin_time,
        data_dir: config.storage.data_dir.clone(),
    }
}

pub async fn build_job(config: &Config) -> Result<HarvestJob, RunError> {
    let store = Arc::new(LocalBlobStore::new(config.source.root.clone()));
    let sink = build_sink(&config.sink).await?;
    Ok(HarvestJob::new(job_options(config), store, sink))
}

async fn run_harvester(config_path: &Path, once: bool) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    info!(
        job = %config.harvest.name,
        kind = %config.source.kind,
        root = %config.source.root.display(),
        "Building harvest job"
    );
    let job = Arc::new(build_job(&config).await?);

    if once {
        let report = job.run().await?;
        if report.failed > 0 {
            warn!(failed = report.failed, "Some objects failed and will be retried on the next run");
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let web_handle = config.web.clone().map(|web_config| {
        info!(listen = %web_config.listen, "Starting web server");
        let web_job = Arc::clone(&job);
        tokio::spawn(async move { run_server(web_job, web_config, shutdown_rx).await })
    });

    info!(
        poll_interval = ?config.harvest.poll_interval,
        "Harvester started, press Ctrl+C to shutdown"
    );

    let mut ticker = tokio::time::interval(config.harvest.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut shutdown = std::pin::pin!(signal::ctrl_c());
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                // A fatal run is reported and retried on the next tick.
                if let Err(e) = job.run().await {
                    error!(job = %job.name(), error = %e, "Harvest run failed");
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = web_handle {
        handle.await??;
    }

    info!("Harvester stopped");
    Ok(())
}
