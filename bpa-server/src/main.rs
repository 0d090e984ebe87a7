mod settings;

use anyhow::Context;
use hardy_bpv6::prelude as bpv6;
use hardy_bpv6_agent::{cla, daemon::Daemon, link, registration, router, store, timer};
use std::sync::Arc;
use trace_err::*;
use tracing::{info, warn};

fn init_logger(log_level: &str) -> anyhow::Result<()> {
    let log_level = if log_level.is_empty() { "info" } else { log_level }
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .context("Invalid 'log_level' value in configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(
            log_level > tracing_subscriber::filter::LevelFilter::from_level(tracing::Level::INFO),
        )
        .init();
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    let mut term_handler =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .trace_expect("Failed to register signal handlers");

    #[cfg(unix)]
    let terminated = term_handler.recv();

    #[cfg(not(unix))]
    let terminated = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = terminated => info!("Received terminate signal, stopping..."),
        _ = tokio::signal::ctrl_c() => info!("Received CTRL+C, stopping..."),
    }
}

fn add_links(daemon: &Daemon, links: Vec<link::Config>) {
    for config in links {
        let name = config.name.clone();
        let cla = Arc::new(cla::NullConvergenceLayer::new(daemon.output_queue().clone()));
        if daemon.links().add(link::Link::new(config, cla)) {
            info!("Added link '{name}'");
        } else {
            warn!("Ignoring duplicate link '{name}' in configuration");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some((config, config_source)) = settings::init()? else {
        return Ok(());
    };

    init_logger(&config.log_level)?;
    info!(
        "{} version {} starting...",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    info!("{config_source}");

    if config.agent.status_reports {
        info!("Bundle status reports are enabled");
    }

    let timers = Arc::new(timer::ThreadTimers::new().context("Failed to start timer thread")?);
    let router = router::StaticRouter::new(config.routes, config.agent.custody_timer);
    let daemon = Daemon::new(
        config.agent,
        Arc::new(router),
        Arc::new(store::MemoryStore::default()),
        timers.clone(),
    );

    add_links(&daemon, config.links);
    for pattern in config.registrations {
        daemon
            .registrations()
            .add(Arc::new(registration::LoggingRegistration::new(pattern)));
    }

    daemon.start().context("Failed to start the bundle daemon")?;
    info!("Started successfully");

    wait_for_shutdown().await;

    // Joining the stage threads blocks
    tokio::task::spawn_blocking({
        let daemon = daemon.clone();
        move || daemon.shutdown()
    })
    .await
    .context("Bundle daemon failed to shutdown")?;
    timers.shutdown();

    info!("Stopped");
    Ok(())
}
