use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use checkmate::{
    CheckerRegistry, Monitor, MonitorOptions, NotifierSet, UnitResources,
    config::read_config_file,
    metrics::TracingMetrics,
    util::{get_config_path, get_log_level},
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Host and service availability monitor")]
struct Args {
    /// Config file (defaults to $CHECKMATE_CONFIG or config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the registered protocols and exit
    #[arg(long)]
    list_protocols: bool,
}

fn init() {
    dotenv::dotenv().ok();

    let level = get_log_level();
    let filter = filter::Targets::new().with_targets(vec![("checkmate", level)]);
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let registry = CheckerRegistry::with_defaults();
    if args.list_protocols {
        for protocol in registry.protocols() {
            println!("{protocol}");
        }
        return Ok(());
    }

    let path = args.config.unwrap_or_else(get_config_path);
    let config = read_config_file(&path)?;

    let notifiers = NotifierSet::from_config(&config.notifications)
        .context("failed to set up notifiers")?;
    if notifiers.is_empty() {
        warn!("no notifiers configured, rule notifications will be dropped");
    }

    let resources = UnitResources {
        monitor_site: config.monitor_site.clone(),
        registry,
        rules: config.rules.clone().into(),
        notifiers: Arc::new(notifiers),
        metrics: Arc::new(TracingMetrics),
        options: MonitorOptions::from_config(&config)?,
    };

    let monitor = Monitor::build(&config, &resources);
    info!(
        "monitoring {} checks from site {} ({} skipped)",
        monitor.units().len(),
        config.monitor_site,
        monitor.skipped().len()
    );

    let cancel = CancellationToken::new();
    let handle = monitor.spawn(&cancel);

    shutdown_signal().await?;
    info!("shutting down");
    handle.shutdown().await;

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
