//! Analysis RPC Server - standalone process serving analysis operations.
//!
//! Binds a TCP port, registers the built-in operations, and prints
//! `RPC_PORT=<port>` on stdout so a parent process can connect.

mod operations;

use analysis_rpc::{init_spill_config, RpcConfig, RpcServer, SpillConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "analysis-rpc-server")]
#[command(about = "RPC server for analysis operations")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = RpcConfig::DEFAULT_HOST)]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Directory for spilled binary payloads (overrides ANALYSIS_RPC_SPILL_DIR)
    #[arg(long)]
    spill_dir: Option<PathBuf>,

    /// Largest binary payload sent inline, in bytes (overrides ANALYSIS_RPC_INLINE_THRESHOLD)
    #[arg(long)]
    inline_threshold: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("Starting Analysis RPC Server");

    let mut spill = SpillConfig::from_env()?;
    if let Some(dir) = args.spill_dir {
        spill.dir = dir;
    }
    if let Some(threshold) = args.inline_threshold {
        spill.inline_threshold = threshold;
    }
    std::fs::create_dir_all(&spill.dir)
        .with_context(|| format!("failed to create spill dir {}", spill.dir.display()))?;
    info!(
        "Spill dir: {} (inline threshold {} bytes)",
        spill.dir.display(),
        spill.inline_threshold
    );
    init_spill_config(spill)?;

    let mut server = RpcServer::new()?;
    let addr = server.bind(&args.host, args.port).await?;
    operations::register_all(&mut server)?;
    let handle = server.start()?;

    // Port announcement for the parent process (intentional stdout)
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining in-flight requests");
    handle.stop().await?;

    Ok(())
}
