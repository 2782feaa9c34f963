use anyhow::{Context, Result};
use clap::Parser;
use jagereye_resmgr::{Backends, Config, ResourceManager};
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "jagereye-res-mgr")]
#[command(author, version, about, long_about = None)]
pub struct DaemonArgs {
    /// Configuration file (default: system and user res_mgr.toml).
    #[arg(long, env = "JAGEREYE_CONFIG")]
    pub config: Option<PathBuf>,

    /// NATS server URL, overriding the configuration.
    #[arg(long)]
    pub bus_url: Option<String>,

    /// Log level, overriding the configuration.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Run on in-process backends instead of NATS, Redis and Docker.
    #[arg(long)]
    pub in_memory: bool,

    /// Worker images known to the in-process backends.
    #[arg(long = "image", requires = "in_memory")]
    pub images: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = DaemonArgs::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };
    if let Some(url) = &args.bus_url {
        config.bus.url.clone_from(url);
    }
    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }

    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("jagereye_resmgr={level},jagereye_bus={level},jagereye_worker={level},jagereye_res_mgr={level}")
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    run(args, config).await
}

async fn run(args: DaemonArgs, config: Config) -> Result<()> {
    info!("Starting jagereye resource manager...");

    let backends = if args.in_memory {
        warn!(images = ?args.images, "running on in-process backends");
        Backends::in_memory(args.images)
    } else {
        Backends::connect(&config)
            .await
            .context("Failed to connect backends")?
    };

    let manager = ResourceManager::new(&config, backends);
    info!(
        bus = %config.bus.url,
        command_subject = %config.bus.command_subject,
        reply_subject = %config.bus.reply_subject,
        shared_root = %config.shared_root().display(),
        capabilities = ?config.capabilities,
        max_workers = ?config.admission.max_workers,
        "Resource manager initialized"
    );

    manager
        .run(shutdown_signal())
        .await
        .context("Resource manager failed")?;

    info!("jagereye resource manager stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
