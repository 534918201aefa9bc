//! ableton-copilot MCP server binary.
//!
//! Serves the tool set over stdio. Logs go to stderr and to a daily file
//! under `<data_dir>/logs/`; stdout carries the MCP protocol.
//!
//! The Live set is the in-process `MemoryLive` demo set. Clients are told so
//! in the server instructions.
//!
//! Usage:
//!   cargo run -p ableton-copilot-mcp
//!   cargo run -p ableton-copilot-mcp -- --data-dir /tmp/copilot --reconcile-pending
//!
//! Test with MCP inspector:
//!   npx @modelcontextprotocol/inspector cargo run -p ableton-copilot-mcp

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rmcp::{ServiceExt, transport::stdio};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ableton_copilot_kernel::MemoryLive;
use ableton_copilot_mcp::AbletonCopilotMcp;
use ableton_copilot_mcp::config::{ServerConfig, default_data_dir};

/// How often the in-process transport advances the playhead.
const TRANSPORT_TICK: Duration = Duration::from_millis(50);

const BACKEND_NOTE: &str = "This server is attached to a simulated in-memory Live set with demo content, \
    not to a running Ableton Live; changes do not reach any Live session.";

/// MCP server for Ableton Live with operation history and rollback.
#[derive(Parser, Debug)]
#[command(name = "ableton-copilot-mcp")]
#[command(about = "MCP server for Ableton Live with operation history and rollback")]
#[command(long_about = "MCP server for Ableton Live with operation history and rollback.\n\n\
    This build serves a simulated in-memory Live set with demo content; \
    no running Ableton Live is attached. Edits, history and rollback all act on that set.")]
struct Args {
    /// Directory holding the history database and logs
    #[arg(long, env = "ABLETON_COPILOT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "ABLETON_COPILOT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Tool calls slower than this are logged as warnings
    #[arg(long, env = "ABLETON_COPILOT_SLOW_MS", default_value_t = 500)]
    slow_threshold_ms: u64,

    /// Mark history rows left PENDING by a previous run as FAILED
    #[arg(long)]
    reconcile_pending: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            data_dir: self.data_dir.unwrap_or_else(default_data_dir),
            log_level: self.log_level,
            slow_threshold: Duration::from_millis(self.slow_threshold_ms),
            reconcile_pending: self.reconcile_pending,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config();

    std::fs::create_dir_all(config.log_dir())?;
    let file_appender = tracing_appender::rolling::daily(config.log_dir(), "ableton-copilot-mcp.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .init();

    std::panic::set_hook(Box::new(|info| {
        tracing::error!(panic = %info, "panic");
    }));

    tracing::info!(
        data_dir = %config.data_dir.display(),
        slow_threshold_ms = config.slow_threshold.as_millis() as u64,
        "starting ableton-copilot-mcp"
    );

    tracing::warn!("serving the simulated in-memory Live set; no Ableton Live is attached");
    let live = Arc::new(MemoryLive::demo());
    let _transport = live.spawn_transport(TRANSPORT_TICK);

    let ctx = config.build_context(live).await?;
    let _record_watch = ctx.recorder.watch_record_mode().await?;

    let mcp = AbletonCopilotMcp::new(ctx)?.with_backend_note(BACKEND_NOTE);
    let pipeline = mcp.pipeline().clone();
    tracing::info!(tools = pipeline.registry().len(), "tools registered");

    let service = mcp.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("MCP server error: {:?}", e);
    })?;

    tracing::info!("ableton-copilot-mcp server ready");
    service.waiting().await?;

    pipeline.context().perf.log_summary();
    tracing::info!("ableton-copilot-mcp server shutting down");
    Ok(())
}
