use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use dashboard::dash_logic::{config::Config, render};
use lib_opsdash::Dashboard;
use lib_opsdash::core::registry::RegistryInputs;
use lib_opsdash::core::{ItemKind, QueueItem, RunStatus};
use lib_opsdash::loggers::loggerlocal::setup_logging;

/// How long `plan` and `safe-mode` wait for the first inventory.
const INVENTORY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[clap(about = "One-shot operator commands against the opsdash backend", version)]
struct Cli {
    #[clap(flatten)]
    config: Config,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Host metrics, services, containers and open issues.
    Status,
    /// Backend health and its link to the monitored host.
    Health,
    /// Restart one service or container.
    Restart {
        /// `service` or `container`.
        kind: ItemKind,
        name: String,
    },
    /// Apply the backend's automatic fix for a diagnosed issue.
    Resolve { issue_id: String },
    /// Print the recommended dependency-ordered restart plan.
    Plan,
    /// Run a guided restart plan in safe mode. Ctrl-C cancels the run.
    SafeMode {
        /// Plan steps as `kind:name`, in order. Defaults to the recommended plan.
        #[clap(long = "item")]
        items: Vec<QueueItem>,
    },
    /// List palette commands, optionally filtered.
    Commands { query: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load(cli.config).context("failed to load configuration")?;
    setup_logging("opsctl", config.log_dir.as_deref(), config.log_level())?;
    let settings = config.resolve().context("invalid endpoint configuration")?;

    let dashboard = Dashboard::new(settings);
    match cli.command {
        Command::Status => status(&dashboard).await,
        Command::Health => health(&dashboard).await,
        Command::Restart { kind, name } => {
            let outcome = dashboard.restart(QueueItem { kind, name }).await?;
            println!("{}", outcome.message);
            Ok(())
        }
        Command::Resolve { issue_id } => {
            let outcome = dashboard.resolve(&issue_id).await?;
            println!("{}", outcome.message);
            for action in &outcome.actions_taken {
                println!("  - {action}");
            }
            Ok(())
        }
        Command::Plan => {
            load_inventory(&dashboard).await?;
            for line in render::plan_lines(&dashboard.recommended_plan()) {
                println!("{line}");
            }
            Ok(())
        }
        Command::SafeMode { items } => safe_mode(&dashboard, items).await,
        Command::Commands { query } => commands(&dashboard, query.as_deref().unwrap_or_default()).await,
    }
}

async fn status(dashboard: &Dashboard) -> Result<()> {
    let caches = dashboard.caches();
    let (system, services, containers, diagnostics) = tokio::join!(
        caches.system.refresh(),
        caches.services.refresh(),
        caches.containers.refresh(),
        caches.diagnostics.refresh(),
    );

    println!("{}", render::resource_part(&system, render::system_line, "system"));
    println!("{}", render::resource_part(&services, render::services_line, "services"));
    println!("{}", render::resource_part(&containers, render::containers_line, "containers"));
    match (&diagnostics.data, &diagnostics.error) {
        (Some(report), _) => render::diagnostics_lines(report).iter().for_each(|l| println!("{l}")),
        (None, Some(e)) => println!("diagnostics: {e}"),
        (None, None) => {}
    }
    Ok(())
}

async fn health(dashboard: &Dashboard) -> Result<()> {
    let state = dashboard.caches().health.refresh().await;
    match (state.data, state.error) {
        (Some(report), _) => {
            println!("{}", render::health_line(&report));
            if !report.is_healthy() {
                bail!("backend reports unhealthy");
            }
            Ok(())
        }
        (None, Some(e)) => bail!("health check failed: {e}"),
        (None, None) => bail!("health check returned nothing"),
    }
}

async fn load_inventory(dashboard: &Dashboard) -> Result<()> {
    let caches = dashboard.caches();
    caches.services.refetch();
    caches.containers.refetch();
    if !dashboard.wait_for_inventory(INVENTORY_TIMEOUT).await {
        let services = caches.services.snapshot().error;
        let containers = caches.containers.snapshot().error;
        bail!(
            "could not load services and containers (services: {}, containers: {})",
            services.map_or("ok".to_string(), |e| e.to_string()),
            containers.map_or("ok".to_string(), |e| e.to_string()),
        );
    }
    Ok(())
}

/// # Safe Mode
///
/// Starts the run, echoes its log as it grows and waits for the terminal
/// status. The first Ctrl-C cancels the run; the exit notification is still
/// sent by the orchestrator before this returns.
async fn safe_mode(dashboard: &Arc<Dashboard>, items: Vec<QueueItem>) -> Result<()> {
    let plan = if items.is_empty() {
        load_inventory(dashboard).await?;
        dashboard.recommended_plan()
    } else {
        items
    };
    if plan.is_empty() {
        println!("Nothing to restart.");
        return Ok(());
    }

    let orchestrator = dashboard.safe_mode();
    let mut run_rx = orchestrator.watch_run();
    orchestrator.start(plan)?;

    let mut printed = 0;
    let mut cancel_requested = false;
    loop {
        {
            let run = run_rx.borrow_and_update();
            for line in run.log.iter().skip(printed) {
                println!("{line}");
            }
            printed = run.log.len();
            if run.status != RunStatus::Running {
                break;
            }
        }

        tokio::select! {
            changed = run_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = signal::ctrl_c(), if !cancel_requested => {
                log::warn!("Ctrl-C received, cancelling the safe-mode run.");
                cancel_requested = orchestrator.cancel();
            }
        }
    }

    let status = orchestrator.wait().await;
    if let Err(e) = orchestrator.close() {
        log::warn!("Could not leave safe mode: {}", e);
    }
    if status == RunStatus::Failed {
        bail!("safe-mode run failed");
    }
    Ok(())
}

async fn commands(dashboard: &Dashboard, query: &str) -> Result<()> {
    let caches = dashboard.caches();
    let (services, containers, diagnostics) = tokio::join!(
        caches.services.refresh(),
        caches.containers.refresh(),
        caches.diagnostics.refresh(),
    );
    let safe_mode = dashboard.safe_mode();
    dashboard.registry().rebuild(RegistryInputs {
        services: services.data.as_deref(),
        containers: containers.data.as_deref(),
        diagnostics: diagnostics.data.as_deref(),
        safe_mode_active: safe_mode.is_active(),
        run_status: safe_mode.status(),
    });

    for entry in dashboard.commands(query) {
        println!("{}", render::command_line(&entry));
    }
    Ok(())
}
