//! Farm Agent Binary Entry Point

use clap::Parser;
use farm_agent::{run_agent, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tokio::select! {
        result = run_agent(args) => {
            if let Err(e) = result {
                tracing::error!("Farm agent failed: {:#}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, stopping farm agent...");
        }
    }

    Ok(())
}
