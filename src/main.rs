use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use analyticsd::cache::PersistentCache;
use analyticsd::config::{EngineConfig, DEFAULT_CACHE_MAX_AGE_DAYS, DEFAULT_CACHE_MAX_ENTRIES};
use analyticsd::coordinator::Coordinator;
use analyticsd::ipc;
use analyticsd::model::Dataset;
use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

/// School analytics sidecar: newline-delimited JSON requests on stdin, replies on stdout.
#[derive(Parser, Debug)]
#[command(name = "analyticsd", version, about)]
struct Cli {
    /// Workspace directory to open at startup.
    #[arg(long, env = "ANALYTICSD_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Maximum number of persisted results.
    #[arg(long, env = "ANALYTICSD_CACHE_MAX_ENTRIES", default_value_t = DEFAULT_CACHE_MAX_ENTRIES)]
    cache_max_entries: usize,

    /// Persisted results older than this are discarded.
    #[arg(long, env = "ANALYTICSD_CACHE_MAX_AGE_DAYS", default_value_t = DEFAULT_CACHE_MAX_AGE_DAYS)]
    cache_max_age_days: u64,

    /// Skip the idle precompute sweep.
    #[arg(long, env = "ANALYTICSD_NO_PRECOMPUTE")]
    no_precompute: bool,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cache_max_entries: self.cache_max_entries,
            cache_max_age: Duration::from_secs(self.cache_max_age_days * 24 * 60 * 60),
            precompute: !self.no_precompute,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.engine_config();

    let cache = match &cli.workspace {
        Some(path) => PersistentCache::open(path, &config),
        None => PersistentCache::unavailable(&config),
    };
    let mut state = ipc::AppState {
        workspace: cli.workspace.clone(),
        coordinator: Coordinator::new(&config, cache)?,
        data: Arc::new(Dataset::default()),
        config,
    };
    info!(workspace = ?state.workspace, "analyticsd ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req).await,
            // Can't reply without an id.
            Err(e) => json!({
                "ok": false,
                "error": { "code": "bad_json", "message": e.to_string() }
            }),
        };

        let mut out = serde_json::to_string(&resp)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }

    state.coordinator.shutdown();
    info!("stdin closed, exiting");
    Ok(())
}
