mod cli;
mod commands;
mod config;

use anyhow::Context as _;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pilot_observe::{LoggerLevel, init_local_offset, init_logger};

use crate::cli::{Cli, Commands};
use crate::commands::Context;
use crate::config::AgentConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The local offset can only be read safely while the process is single-threaded.
    init_local_offset();

    let mut config = AgentConfig::load(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.logger = config.logger.with_level(LoggerLevel::new(level.as_str())?);
    }
    init_logger(&config.logger)?;
    debug!(config = ?cli.config, "configuration loaded");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start runtime")?;
    let output = runtime.block_on(dispatch(cli.command, config))?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn dispatch(command: Commands, config: AgentConfig) -> anyhow::Result<serde_json::Value> {
    let ctx = Context::connect(config)?;
    match command {
        Commands::Init => ctx.init().await,
        Commands::Enqueue(args) => ctx.enqueue(&args).await,
        Commands::Submit {
            cluster,
            max,
            force,
        } => ctx.submit(&cluster, max, force).await,
        Commands::Status => ctx.status().await,
        Commands::List { view, limit, skip } => ctx.list(&view, limit, skip).await,
        Commands::Get { id } => ctx.get(&id).await,
        Commands::Run(args) => {
            let shutdown = CancellationToken::new();
            tokio::spawn(forward_signals(shutdown.clone()));
            ctx.run(&args, shutdown).await
        }
        Commands::Scrub { older_than_secs } => ctx.scrub(older_than_secs).await,
        Commands::Cancel { job } => ctx.cancel(&job).await,
        Commands::Check { dry_run } => ctx.check(dry_run).await,
        Commands::Delete { ids, view } => ctx.delete(&ids, view.as_deref()).await,
    }
}

/// Ctrl-C or SIGTERM (sent by batch schedulers ahead of the walltime kill) stops the
/// runner at the next task boundary.
async fn forward_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("interrupted"),
                    _ = term.recv() => info!("terminated"),
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                info!("interrupted");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("interrupted");
    }
    shutdown.cancel();
}
