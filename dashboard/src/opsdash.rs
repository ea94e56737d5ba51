use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use dashboard::dash_logic::{config::Config, render};
use lib_opsdash::Dashboard;
use lib_opsdash::loggers::loggerlocal::setup_logging;

#[derive(Parser, Debug)]
#[clap(about = "Headless opsdash: keeps a live view of the monitored host and logs it", version)]
struct Cli {
    #[clap(flatten)]
    config: Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();
    let _ = dotenvy::dotenv();

    let config = Config::load(Cli::parse().config).context("failed to load configuration")?;
    setup_logging("opsdash", config.log_dir.as_deref(), config.log_level())?;
    let settings = config.resolve().context("invalid endpoint configuration")?;

    let dashboard = Dashboard::new(settings);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let notes_handle = tokio::spawn(log_notifications(dashboard.clone(), shutdown_tx.subscribe()));
    dashboard.start();
    let summary_handle = tokio::spawn(log_summaries(
        dashboard.clone(),
        config.summary_interval(),
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("SIGTERM handler unavailable: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());
    dashboard.shutdown().await;

    // Wait for components to shut down
    let _ = tokio::try_join!(notes_handle, summary_handle);

    log::info!("Shutdown complete.");
    Ok(())
}

async fn log_summaries(
    dashboard: Arc<Dashboard>,
    every: std::time::Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                let caches = dashboard.caches();
                log::info!(
                    "{}",
                    render::summary_line(
                        &caches.system.snapshot(),
                        &caches.services.snapshot(),
                        &caches.containers.snapshot(),
                        &dashboard.stream_state(),
                        dashboard.safe_mode().status(),
                    )
                );
            }
        }
    }
}

async fn log_notifications(dashboard: Arc<Dashboard>, mut shutdown: broadcast::Receiver<()>) {
    let mut notes = dashboard.notifier().subscribe();
    let colour = std::io::stdout().is_terminal();
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            note = notes.recv() => match note {
                Ok(note) => log::info!("{}", render::notification_line(&note, colour)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Skipped {} notifications", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
