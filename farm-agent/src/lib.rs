//! Farm Agent
//!
//! Runs one planning cycle against a live world: loads configuration and the
//! session, opens the farm assistant, plans, prints the plan as JSON and
//! optionally sends the commands.

use anyhow::{bail, Context};
use clap::Parser;
use farm_common::GameSession;
use farm_engine::{
    Aggregator, Collector, Dispatcher, Executor, FarmConfig, FarmCycle, MarkupParser, PlanReport,
    ServerClock, TriggerResult,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub mod client;
pub mod logging;

use client::{HttpContextHost, ReqwestTransport};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the session JSON (cookies, CSRF token, world URL)
    #[arg(long)]
    pub session: PathBuf,

    /// Send the planned commands instead of only printing the plan
    #[arg(long, default_value_t = false)]
    pub execute: bool,

    /// Upper bound on commands sent in this run
    #[arg(long)]
    pub max_commands: Option<usize>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<FarmConfig> {
    let config = match path {
        Some(path) => FarmConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let mut config = FarmConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            config
        }
    };
    Ok(config)
}

/// Read a session file; an empty world URL falls back to the configured one
pub fn load_session(path: &Path, config: &FarmConfig) -> anyhow::Result<GameSession> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session {}", path.display()))?;
    let mut session: GameSession = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse session {}", path.display()))?;

    if session.world_url.is_empty() {
        session.world_url = config.world.base_url.trim_end_matches('/').to_string();
    }
    if !session.is_valid() {
        bail!("Session in {} is expired or incomplete", path.display());
    }
    Ok(session)
}

pub async fn run_agent(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let _log_guard = logging::init_logging(&config.logging)?;
    let session = load_session(&args.session, &config)?;

    tracing::info!("Starting Farm Agent...");
    tracing::info!("  World:  {}", session.world_url);
    tracing::info!("  Groups: {}", config.policy.groups.len());

    let transport = Arc::new(ReqwestTransport::new(&config.http, &session)?);
    let clock = Arc::new(ServerClock::new());
    let dispatcher = Dispatcher::new(&config.dispatcher, transport.clone())
        .with_clock(clock.clone())
        .with_context_host(Arc::new(HttpContextHost::new(transport)));

    let farm_screen = session.game_url(session.village_id, "screen=am_farm");
    dispatcher
        .open_context(farm_screen)
        .await
        .context("Farm assistant did not open")?;

    let aggregator = Aggregator::new(
        Collector::new(dispatcher.clone(), config.listings.max_pages),
        Arc::new(MarkupParser::new()),
        clock.clone(),
        session.clone(),
        config.world.clone(),
        config.listings.clone(),
    );
    let cycle = FarmCycle::new(aggregator, clock);
    let report = cycle.plan(&config.policy).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.execute {
        execute_plan(&dispatcher, session, &config, &report, args.max_commands).await;
    }

    let stats = dispatcher.stats();
    tracing::info!(
        submitted = stats.submitted,
        succeeded = stats.succeeded,
        failed = stats.failed,
        retried = stats.retried,
        peak_in_flight = stats.peak_in_flight,
        "Dispatcher totals"
    );
    Ok(())
}

async fn execute_plan(
    dispatcher: &Dispatcher,
    session: GameSession,
    config: &FarmConfig,
    report: &PlanReport,
    max_commands: Option<usize>,
) {
    let mut executor = Executor::new(dispatcher.clone(), session, &config.executor);
    executor.load(&report.plan);

    let limit = max_commands.unwrap_or(usize::MAX);
    let interval = Duration::from_millis(config.executor.trigger_interval_ms);
    let mut sent = 0usize;

    while sent < limit {
        match executor.trigger().await {
            TriggerResult::Executed(_) => sent += 1,
            TriggerResult::Debounced => {}
            TriggerResult::Idle => break,
        }
        tokio::time::sleep(interval).await;
    }

    tracing::info!(
        "Executed {} commands, {} succeeded, {} left unsent",
        sent,
        executor.done(),
        executor.pending()
    );
}
