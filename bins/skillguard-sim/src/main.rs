//! Skillguard match simulator.
//!
//! Plays a seeded match on a manual clock, feeding every risk hook, then
//! runs a cashout for each player and prints the dashboard. With `--serve`
//! the dashboard stays up over HTTP until Ctrl+C.

mod routes;
mod world;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use skillguard_core::traits::RiskSink;
use skillguard_core::types::join_codes;
use skillguard_mpc::{ArciumRiskEngine, LoopbackGateway, MpcClient, SelectedEngine, create_engine};
use skillguard_service::clock::{Clock, SystemClock};
use skillguard_service::{CashoutGate, ManualClock, MemorySink, RestSink, RiskService, ServiceConfig};

use crate::world::{Role, World};

#[derive(Parser, Debug)]
#[command(
    name = "skillguard-sim",
    version,
    about = "Simulate a match through the Skillguard risk service"
)]
struct Args {
    /// TOML file layered over the built-in tunables
    #[arg(long)]
    config: Option<PathBuf>,

    /// RNG seed for the match and cashout delays
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Honest players, in addition to the two colluders and the aimbot
    #[arg(long, default_value_t = 12)]
    players: usize,

    /// Simulated match length in seconds
    #[arg(long, default_value_t = 180)]
    duration: u64,

    /// Score pairs through an in-process MPC emulator instead of the
    /// configured engine
    #[arg(long)]
    loopback_mpc: bool,

    /// Serve the dashboard on this address after the match (e.g. 127.0.0.1:8088)
    #[arg(long)]
    serve: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    let config = match &args.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    }
    .with_env()?;

    let engine = if args.loopback_mpc {
        let gateway = Arc::new(LoopbackGateway::new(&config.risk.pair_weights));
        let client = MpcClient::new("loopback", config.mpc_or_default().finalize_timeout_ms, gateway);
        SelectedEngine::arcium(ArciumRiskEngine::new(config.risk.clone(), client))
    } else {
        create_engine(&config.risk, &config.mpc_or_default())
    };

    let (sink, writer): (Arc<dyn RiskSink>, _) = match &config.sink {
        Some(sink_cfg) => {
            let (sink, handle) = RestSink::spawn(sink_cfg).context("starting rest sink")?;
            (Arc::new(sink), Some(handle))
        }
        None => (Arc::new(MemorySink::new()), None),
    };

    let clock = Arc::new(ManualClock::new(SystemClock.now_ms()));
    let mut world = World::new(args.seed, args.players);
    let payout = config.risk.payout;
    let service = Arc::new(
        RiskService::new(config, world.directory(), engine, Some(sink), clock.clone())?
            .with_gate(CashoutGate::seeded(payout, args.seed)),
    );

    info!(seed = args.seed, players = world.agents().len(), duration_s = args.duration,
        engine = service.engine_name(), "sim: match starting");
    world.connect_all(&service);
    world.run(&service, &clock, args.duration * 1_000);
    service.flush_encounters(clock.now_ms());

    audit_colluders(&service, &world).await;
    print_cashouts(&service, &world);
    println!("{}", serde_json::to_string_pretty(&service.dashboard())?);

    if let Some(addr) = args.serve {
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("sim: dashboard on http://{addr}/api/risk/dashboard");
        axum::serve(listener, routes::router(service.clone()))
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "sim: ctrl-c handler failed");
                }
            })
            .await?;
    }

    // The writer exits once the last sink handle is gone.
    drop(service);
    if let Some(handle) = writer {
        handle.await.context("sink writer panicked")?;
    }
    Ok(())
}

/// Score the colluding pair through the configured engine, as an audit.
async fn audit_colluders(service: &RiskService, world: &World) {
    let colluders = world.find(Role::Colluder);
    let [a, b] = colluders[..] else {
        return;
    };
    match service.engine_score_pair(&a.id, &b.id).await {
        Some(result) => info!(engine = service.engine_name(), score = result.score,
            reasons = %join_codes(&result.reasons), "sim: colluder audit"),
        None => warn!("sim: colluder pair not tracked"),
    }
}

fn print_cashouts(service: &RiskService, world: &World) {
    println!("{:<12} {:<10} {:>7} {:>7} {:>8}  reasons", "player", "action", "player", "pair", "delay");
    for agent in world.agents() {
        let verdict = service.cashout_gate(&agent.id);
        let delay = verdict
            .delay_ms()
            .map(|d| format!("{d}ms"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<12} {:<10} {:>7.3} {:>7.3} {:>8}  {}",
            agent.id.as_str(),
            verdict.action().as_str(),
            verdict.player_score(),
            verdict.max_pair_score(),
            delay,
            join_codes(verdict.reasons()),
        );
    }
}

/// Initialize tracing with the given level and output format.
///
/// `format = "json"` emits one JSON object per line; anything else is
/// human-readable text. `RUST_LOG` overrides the level.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
