//! `ntxd`: the long-running daemon. Wires the sync worker (§4.D) to a
//! `Store` and an `OrchestratingScraper`, serves the RPC surface (§4.H)
//! alongside it, and shuts both down cleanly on SIGINT/SIGTERM. A thin
//! `main` over `ntx_core`, same as the other two binaries, just
//! long-running instead of one-shot.

use clap::Parser;
use ntx_core::adapter::{FallbackScraper, OrchestratingScraper, PrimaryScraper, Scraper};
use ntx_core::clock::MarketClock;
use ntx_core::config::NtxConfig;
use ntx_core::rpc::market::spawn_index_feed;
use ntx_core::rpc::{server, AppState};
use ntx_core::storage::Store;
use ntx_core::worker;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "ntxd", about = "NTX sync worker and RPC daemon")]
struct Args {
    /// Path to the TOML config file. Falls back to built-in defaults if
    /// it does not exist.
    #[arg(long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Overrides `rpc.bind_addr` from the config file.
    #[arg(long)]
    bind: Option<String>,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("ntx").join("ntx.toml")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = NtxConfig::load(&args.config)?;
    if let Some(bind) = args.bind {
        config.rpc.bind_addr = bind;
    }

    let lock_path = config.backups_dir().join(".backfill.lock");
    if lock_path.exists() {
        anyhow::bail!(
            "backfill lock {} is held; a backfill run appears to be in progress. \
             Refusing to start the daemon against a database it is not writing.",
            lock_path.display()
        );
    }

    let store = Store::open(&config.db_path)?;

    let primary = PrimaryScraper::new(config.adapter.primary_base_url.clone())?;
    let fallback = match &config.adapter.fallback_base_url {
        Some(url) => Some(Box::new(FallbackScraper::new(url.clone())?) as Box<dyn Scraper>),
        None => None,
    };
    let scraper: Arc<dyn Scraper> = Arc::new(OrchestratingScraper::new(Box::new(primary), fallback));

    let clock = MarketClock::new(config.worker.open_hour, config.worker.close_hour, config.worker.holiday_set());

    let worker_handle = worker::spawn(
        store.clone(),
        scraper.clone(),
        clock.clone(),
        config.worker.clone(),
        config.adapter.canary_symbol.clone(),
        config.backups_dir(),
        config.backup.clone(),
    );

    let state = AppState::new(store, clock, config.rpc.clone());
    let bind_addr = config.rpc.bind_addr.clone();

    let index_feed_cancel = CancellationToken::new();
    let index_feed = spawn_index_feed(
        scraper.clone(),
        state.index_cache.clone(),
        Duration::from_secs(config.rpc.index_refresh_secs),
        index_feed_cancel.clone(),
    );

    let serve_result = server::serve(state, &bind_addr, shutdown_signal()).await;

    log::info!("RPC server stopped, shutting down sync worker");
    worker_handle.shutdown();

    index_feed_cancel.cancel();
    let _ = index_feed.await;

    serve_result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("installing Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("received SIGINT"),
        _ = terminate => log::info!("received SIGTERM"),
    }
}
