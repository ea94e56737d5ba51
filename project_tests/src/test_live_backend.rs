//! # Live Backend Smoke Runner
//!
//! Exercises `lib_opsdash` against a running backend: every polled resource,
//! the realtime channel, the command registry and, when asked for, one real
//! restart. Nothing is mutated unless `--restart` is passed.
//!
//! ```text
//! cargo run -p project_tests --bin test_live_backend -- --origin http://10.0.0.5:3001
//! ```

#![forbid(unsafe_code)]

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use lib_opsdash::core::QueueItem;
use lib_opsdash::ingestors::ConnectionStatus;
use lib_opsdash::loggers::setup_logging;
use lib_opsdash::{Dashboard, DashboardSettings, Endpoints};

#[derive(Parser, Debug)]
#[clap(about = "Smoke test against a live opsdash backend")]
struct Args {
    #[clap(long, env = "OPSDASH_ORIGIN", default_value = "http://localhost:3001")]
    origin: String,

    /// Seconds to listen on the realtime channel.
    #[clap(long, default_value_t = 15)]
    listen_seconds: u64,

    /// Restart one item, e.g. `container:guacamole-db`.
    #[clap(long)]
    restart: Option<QueueItem>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    setup_logging("test_live_backend", None, "info")?;
    let args = Args::parse();

    let endpoints = Endpoints::resolve(&args.origin, "", "").context("bad origin")?;
    let dashboard = Dashboard::new(DashboardSettings::with_endpoints(endpoints));
    let caches = dashboard.caches();

    println!("--- Starting live backend checks against {} ---", args.origin);

    // --- TEST 1: Health ---
    println!("\n[Test 1] GET /health...");
    let health = caches.health.refresh().await;
    match (&health.data, &health.error) {
        (Some(h), _) => println!("✅ status={} ssh={:?}", h.status, h.ssh_connection),
        (None, Some(e)) => bail!("health failed: {e}"),
        (None, None) => bail!("health returned nothing"),
    }

    // --- TEST 2: Every polled resource ---
    println!("\n[Test 2] Polled resources...");
    let mut failures = 0;
    macro_rules! check {
        ($cache:expr, $summary:expr) => {{
            let state = $cache.refresh().await;
            match (&state.data, &state.error) {
                (Some(data), None) => println!("✅ {}: {}", $cache.kind(), $summary(data.as_ref())),
                (_, Some(e)) => {
                    failures += 1;
                    println!("❌ {}: {}", $cache.kind(), e);
                }
                (None, None) => println!("⚠️ {}: empty", $cache.kind()),
            }
        }};
    }
    check!(caches.system, |s: &lib_opsdash::models::system::SystemSnapshot| format!(
        "cpu {:.1}%, mem {:.1}%",
        s.cpu_usage, s.memory.percent
    ));
    check!(caches.services, |s: &lib_opsdash::models::services::ServicesReport| format!(
        "{} services",
        s.services.len()
    ));
    check!(caches.containers, |c: &lib_opsdash::models::containers::ContainersReport| format!(
        "{} containers, {} running",
        c.total, c.running
    ));
    check!(caches.applications, |a: &lib_opsdash::models::applications::ApplicationsReport| {
        format!("{} applications", a.applications.len())
    });
    check!(caches.security, |s: &lib_opsdash::models::security::SecurityReport| format!(
        "{} failed logins",
        s.failed_logins.total_failed
    ));
    check!(caches.diagnostics, |d: &lib_opsdash::models::diagnostics::DiagnosticsReport| {
        format!("score {}, {} issues", d.health_score, d.issues.len())
    });
    check!(caches.history, |h: &lib_opsdash::models::history::HistoryReport| format!(
        "{} metric samples",
        h.metrics.len()
    ));

    // --- TEST 3: Realtime channel ---
    println!("\n[Test 3] Realtime channel for {}s...", args.listen_seconds);
    dashboard.start();
    let mut stream = dashboard.stream().watch();
    tokio::time::timeout(
        Duration::from_secs(10),
        stream.wait_for(|s| s.status == ConnectionStatus::Connected),
    )
    .await
    .context("realtime channel did not connect within 10s")??;
    println!("✅ Connected to {}", dashboard.settings().endpoints.ws_url);

    tokio::time::sleep(Duration::from_secs(args.listen_seconds)).await;
    let points = dashboard.points();
    println!("✅ {} system_update frame(s) buffered", points.len());
    if let Some(last) = points.last() {
        println!("   latest: cpu {:.1}% at {}", last.cpu, last.timestamp);
    }

    // --- TEST 4: Commands and plan ---
    println!("\n[Test 4] Command registry...");
    println!("✅ {} commands, {} restart entries", dashboard.commands("").len(), dashboard.commands("restart").len());
    println!("✅ Recommended plan: {:?}", dashboard.recommended_plan().iter().map(ToString::to_string).collect::<Vec<_>>());

    // --- TEST 5: Optional restart ---
    if let Some(item) = args.restart {
        println!("\n[Test 5] Restarting {}...", item);
        match dashboard.restart(item).await {
            Ok(outcome) => println!("✅ {}", outcome.message),
            Err(e) => {
                failures += 1;
                println!("❌ {}", e);
            }
        }
    }

    dashboard.shutdown().await;
    println!("\n--- Live backend checks finished with {} failure(s) ---", failures);
    if failures > 0 {
        bail!("{failures} check(s) failed");
    }
    Ok(())
}
