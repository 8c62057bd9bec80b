//! Sync worker (§4.D): a long-running single-writer that decides what
//! to fetch based on clock state, running on one dedicated
//! `std::thread` rather than a tokio task. `rusqlite::Connection`
//! access stays synchronous and never crosses an `.await`, matching the
//! teacher's pattern of keeping database calls off the async runtime
//! used for HTTP (there, Tauri's command dispatch pool; here, the RPC
//! server and the backfill pipeline). Within the thread, a
//! single-threaded `tokio::runtime` drives the adapter's async calls
//! via `Handle::block_on`.

use crate::adapter::Scraper;
use crate::clock::MarketClock;
use crate::config::{BackupConfig, WorkerConfig};
use crate::storage::{backup, queries, Store};
use chrono::{NaiveDate, TimeZone, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct WorkerHandle {
    thread: Option<std::thread::JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WorkerHandle {
    pub fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct WorkerState {
    current_day: NaiveDate,
    company_synced: bool,
    snapshot_done: bool,
}

impl WorkerState {
    fn new(today: NaiveDate) -> Self {
        Self {
            current_day: today,
            company_synced: false,
            snapshot_done: false,
        }
    }

    /// Returns true the first time `today` differs from the tracked
    /// current day, signalling callers to run once-per-day work (the
    /// upstream canary check).
    fn reset_if_new_day(&mut self, today: NaiveDate) -> bool {
        if today != self.current_day {
            log::info!("new trading day {today}, resetting daily flags");
            self.current_day = today;
            self.company_synced = false;
            self.snapshot_done = false;
            true
        } else {
            false
        }
    }
}

/// Spawns the worker thread and returns a handle the caller can use to
/// request a clean shutdown. `canary_symbol` is re-checked once per
/// daily reset (spec §9 "canary"). `backups_dir`/`backup_config` drive a
/// backup-and-prune pass once the end-of-day snapshot completes.
pub fn spawn(
    store: Store,
    scraper: Arc<dyn Scraper>,
    clock: MarketClock,
    config: WorkerConfig,
    canary_symbol: String,
    backups_dir: PathBuf,
    backup_config: BackupConfig,
) -> WorkerHandle {
    let cancel = CancellationToken::new();
    let thread_cancel = cancel.clone();
    let thread = std::thread::Builder::new()
        .name("ntx-sync-worker".into())
        .spawn(move || run(store, scraper, clock, config, canary_symbol, backups_dir, backup_config, thread_cancel))
        .expect("spawning the sync worker thread");

    WorkerHandle {
        thread: Some(thread),
        cancel,
    }
}

fn run(
    store: Store,
    scraper: Arc<dyn Scraper>,
    clock: MarketClock,
    config: WorkerConfig,
    canary_symbol: String,
    backups_dir: PathBuf,
    backup_config: BackupConfig,
    cancel: CancellationToken,
) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("building the worker's single-threaded tokio runtime");

    let mut state = WorkerState::new(crate::clock::NPT.from_utc_datetime(&Utc::now().naive_utc()).date_naive());

    while !cancel.is_cancelled() {
        let now = crate::clock::NPT.from_utc_datetime(&Utc::now().naive_utc());
        if state.reset_if_new_day(now.date_naive()) {
            runtime.block_on(crate::adapter::canary::run_canary_check(scraper.as_ref(), &canary_symbol));
        }

        let sleep_for = tick(
            &runtime,
            &store,
            scraper.as_ref(),
            &clock,
            &config,
            &mut state,
            now,
            &backups_dir,
            &backup_config,
        );

        if cancel_sleep(&cancel, sleep_for) {
            break;
        }
    }
}

/// Blocks for `duration` or until cancelled, whichever comes first.
/// Returns true if cancellation interrupted the sleep.
fn cancel_sleep(cancel: &CancellationToken, duration: Duration) -> bool {
    let deadline = std::time::Instant::now() + duration;
    while std::time::Instant::now() < deadline {
        if cancel.is_cancelled() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(200).min(deadline - std::time::Instant::now()));
    }
    false
}

fn tick(
    runtime: &tokio::runtime::Runtime,
    store: &Store,
    scraper: &dyn Scraper,
    clock: &MarketClock,
    config: &WorkerConfig,
    state: &mut WorkerState,
    now: chrono::DateTime<chrono_tz::Tz>,
    backups_dir: &std::path::Path,
    backup_config: &BackupConfig,
) -> Duration {
    use chrono::Timelike;

    if !state.company_synced {
        runtime.block_on(sync_companies(store, scraper));
        state.company_synced = true;
        return Duration::from_secs(1);
    }

    if clock.is_open(now) {
        runtime.block_on(sync_prices(store, scraper));
        return Duration::from_secs(config.intraday_poll_secs);
    }

    if clock.is_trading_day(now) && now.hour() >= clock.close_hour && !state.snapshot_done {
        runtime.block_on(final_snapshot(store, scraper, now.date_naive()));
        run_backup(store, backups_dir, backup_config, now);
        state.snapshot_done = true;
        return Duration::from_secs(config.close_snapshot_poll_secs);
    }

    let next_open = clock.next_open_from(now);
    let wait = (next_open - now).to_std().unwrap_or(Duration::from_secs(1));
    wait.min(Duration::from_secs(config.next_open_cap_secs))
}

async fn sync_companies(store: &Store, scraper: &dyn Scraper) {
    match scraper.companies().await {
        Ok(companies) => {
            let conn = store.writer();
            for company in &companies {
                if let Err(e) = queries::upsert_company(&conn, company) {
                    log::warn!("failed to upsert company {}: {e}", company.symbol);
                }
            }
            log::info!("synced {} companies", companies.len());
        }
        Err(e) => log::warn!("syncCompanies failed: {e}"),
    }
}

async fn sync_prices(store: &Store, scraper: &dyn Scraper) {
    let prices = match scraper.live_prices().await {
        Ok(p) => p,
        Err(e) => {
            log::warn!("syncPrices failed: {e}");
            return;
        }
    };

    let conn = store.writer();
    for mut price in prices {
        price.is_complete = false;
        if let Err(e) = queries::upsert_price(&conn, &price) {
            log::warn!("failed to upsert price for {}: {e}", price.symbol);
        }
    }
}

async fn final_snapshot(store: &Store, scraper: &dyn Scraper, today: NaiveDate) {
    sync_prices(store, scraper).await;

    let conn = store.writer();
    let dates = match queries::get_latest_price_dates(&conn) {
        Ok(d) => d,
        Err(e) => {
            log::error!("finalSnapshot could not read latest price dates: {e}");
            return;
        }
    };
    for (symbol, latest) in &dates {
        if *latest == Some(today) {
            if let Err(e) = queries::mark_price_complete(&conn, symbol, today) {
                log::warn!("failed to mark {symbol} complete for {today}: {e}");
            }
        }
    }
    if let Err(e) = queries::record_trading_day(&conn, today, crate::domain::TradingDayState::Completed) {
        log::error!("failed to record trading day {today}: {e}");
    }
    drop(conn);

    sync_fundamentals(store, scraper, today).await;
}

/// Copies the database into `backups_dir` and prunes old copies per
/// `backup_config`. Runs once per trading day, right after the
/// end-of-day snapshot, on the worker's own thread — `rusqlite`'s
/// backup API steps through the source connection synchronously, so
/// this needs no `.await` and no separate scheduler.
fn run_backup(store: &Store, backups_dir: &std::path::Path, backup_config: &BackupConfig, now: chrono::DateTime<chrono_tz::Tz>) {
    let conn = store.writer();
    let now_utc = now.with_timezone(&Utc);
    if let Err(e) = backup::create_backup(&conn, backups_dir, now_utc) {
        log::error!("daily backup failed: {e}");
        return;
    }
    drop(conn);
    if let Err(e) = backup::enforce_retention(backups_dir, backup_config, now_utc) {
        log::warn!("backup retention pass failed: {e}");
    }
}

/// For each company with a price recorded today, fetch its latest
/// report and dividend history and derive PE/PB/dividend yield/ROE.
async fn sync_fundamentals(store: &Store, scraper: &dyn Scraper, today: NaiveDate) {
    let symbols_with_price: Vec<String> = {
        let conn = store.writer();
        match queries::get_latest_price_dates(&conn) {
            Ok(dates) => dates
                .into_iter()
                .filter(|(_, date)| *date == Some(today))
                .map(|(symbol, _)| symbol)
                .collect(),
            Err(e) => {
                log::error!("syncFundamentals could not enumerate companies: {e}");
                return;
            }
        }
    };

    for symbol in symbols_with_price {
        let reports = match scraper.reports(&symbol).await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("syncFundamentals: reports fetch failed for {symbol}: {e}");
                continue;
            }
        };
        let dividends = match scraper.dividends(&symbol).await {
            Ok(d) => d,
            Err(e) => {
                log::warn!("syncFundamentals: dividends fetch failed for {symbol}: {e}");
                continue;
            }
        };

        let latest_report = reports.iter().max_by_key(|r| (r.fiscal_year, r.quarter.unwrap_or(0)));
        let latest_dividend = dividends.iter().max_by_key(|d| d.fiscal_year);

        let conn = store.writer();
        let close = match queries::get_latest_price(&conn, &symbol) {
            Ok(Some(p)) => p.close,
            _ => continue,
        };
        let close_rupees = close as f64 / 100.0;

        let fundamentals = derive_fundamentals(&symbol, close_rupees, latest_report, latest_dividend);
        if let Err(e) = queries::upsert_fundamentals(&conn, &fundamentals) {
            log::warn!("failed to upsert fundamentals for {symbol}: {e}");
        }
    }
}

fn derive_fundamentals(
    symbol: &str,
    close_rupees: f64,
    report: Option<&crate::domain::Report>,
    dividend: Option<&crate::domain::Dividend>,
) -> crate::domain::Fundamentals {
    let eps = report.and_then(|r| r.eps);
    let book_value = report.and_then(|r| r.book_value);

    let pe = eps.filter(|e| *e > 0.0).map(|e| close_rupees / e);
    let pb = book_value.filter(|b| *b > 0.0).map(|b| close_rupees / b);
    let roe = match (eps, book_value) {
        (Some(e), Some(b)) if b > 0.0 => Some(e / b * 100.0),
        _ => None,
    };

    // Face value is a fixed Rs 100 per NEPSE share; cash_percent is
    // announced as a percentage of face value.
    const FACE_VALUE: f64 = 100.0;
    let dividend_yield = dividend
        .filter(|d| close_rupees > 0.0)
        .map(|d| (d.cash_percent / 100.0 * FACE_VALUE) / close_rupees * 100.0);

    crate::domain::Fundamentals {
        symbol: symbol.to_string(),
        pe,
        pb,
        eps,
        book_value,
        market_cap: None,
        dividend_yield,
        roe,
        shares_outstanding: None,
    }
}
