//! Backfill pipeline (§4.E): a bounded-parallel, rate-limited one-shot
//! ingester. Four jobs (prices, reports, dividends, profiles) share one
//! generic worker-pool driver built around `tokio::sync::Semaphore` for
//! the concurrency cap, `async_channel` for the ordered single-consumer
//! progress stream, and `tokio_util::sync::CancellationToken` for
//! cooperative shutdown.

use crate::adapter::Scraper;
use crate::domain::Company;
use crate::storage::{queries, Store};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum Outcome {
    Processed,
    Skipped(String),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct ProgressLine {
    pub symbol: String,
    pub outcome: Outcome,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub processed: AtomicU64,
    pub skipped: AtomicU64,
    pub errors: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct BackfillReport {
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
}

pub struct JobConfig {
    pub concurrency: usize,
    pub rate_limit: Duration,
}

/// Runs `task` once per entry in `symbols`, bounded to `config.concurrency`
/// concurrent tasks, pacing each task's completion by `config.rate_limit`.
/// `on_progress` is called on a single consumer task, in the order
/// results arrive on the internal channel — the channel's bounded
/// capacity back-pressures workers once the consumer falls behind.
pub async fn run_job<S, F, Fut>(
    symbols: Vec<S>,
    config: JobConfig,
    cancel: CancellationToken,
    task: F,
    mut on_progress: impl FnMut(&ProgressLine) + Send + 'static,
) -> BackfillReport
where
    S: Into<String> + Send + 'static,
    F: Fn(String, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Outcome> + Send,
{
    let (tx, rx) = async_channel::bounded::<ProgressLine>(256);
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let task = Arc::new(task);
    let counters = Arc::new(Counters::default());

    let consumer_counters = counters.clone();
    let consumer = tokio::spawn(async move {
        while let Ok(line) = rx.recv().await {
            match &line.outcome {
                Outcome::Processed => {
                    consumer_counters.processed.fetch_add(1, Ordering::Relaxed);
                }
                Outcome::Skipped(_) => {
                    consumer_counters.skipped.fetch_add(1, Ordering::Relaxed);
                }
                Outcome::Error(_) => {
                    consumer_counters.errors.fetch_add(1, Ordering::Relaxed);
                }
            }
            on_progress(&line);
        }
    });

    let mut handles = Vec::new();
    for symbol in symbols {
        let symbol = symbol.into();
        if cancel.is_cancelled() {
            break;
        }
        let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
        let task = task.clone();
        let tx = tx.clone();
        let rate_limit = config.rate_limit;
        let task_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            let outcome = task(symbol.clone(), task_cancel).await;
            tokio::time::sleep(rate_limit).await;
            let _ = tx.send(ProgressLine { symbol, outcome }).await;
        }));
    }
    drop(tx);

    for handle in handles {
        let _ = handle.await;
    }
    let _ = consumer.await;

    BackfillReport {
        processed: counters.processed.load(Ordering::Relaxed),
        skipped: counters.skipped.load(Ordering::Relaxed),
        errors: counters.errors.load(Ordering::Relaxed),
    }
}

/// Price backfill: per symbol, `from = latest_stored_date + 1`, skipping
/// symbols already at `to`. Each symbol's inserts land in one
/// transaction so a partial failure rolls back only that symbol's batch.
pub async fn backfill_prices(
    store: Store,
    scraper: Arc<dyn Scraper>,
    to: chrono::NaiveDate,
    config: JobConfig,
    cancel: CancellationToken,
    on_progress: impl FnMut(&ProgressLine) + Send + 'static,
) -> BackfillReport {
    let latest_dates = {
        let conn = store.writer();
        queries::get_latest_price_dates(&conn).unwrap_or_default()
    };

    // Encodes the latest stored date alongside the symbol as
    // `SYMBOL|YYYY-MM-DD` so the generic `run_job` driver doesn't need a
    // price-specific item type; parsed back apart in
    // `backfill_one_symbol_prices`.
    let items: Vec<String> = latest_dates
        .into_iter()
        .map(|(symbol, latest)| match latest {
            Some(date) => format!("{symbol}|{date}"),
            None => symbol,
        })
        .collect();

    run_job(
        items,
        config,
        cancel,
        move |symbol_with_marker, task_cancel| {
            let store = store.clone();
            let scraper = scraper.clone();
            async move { backfill_one_symbol_prices(&store, scraper.as_ref(), &symbol_with_marker, to, task_cancel).await }
        },
        on_progress,
    )
    .await
}

async fn backfill_one_symbol_prices(
    store: &Store,
    scraper: &dyn Scraper,
    symbol_with_marker: &str,
    to: chrono::NaiveDate,
    cancel: CancellationToken,
) -> Outcome {
    let (symbol, from) = match symbol_with_marker.split_once('|') {
        Some((symbol, date)) => (
            symbol.to_string(),
            chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map(|d| d.succ_opt().unwrap_or(d))
                .unwrap_or(to),
        ),
        None => (symbol_with_marker.to_string(), to - chrono::Duration::days(365 * 5)),
    };

    if from > to {
        return Outcome::Skipped(format!("{symbol} already up to date"));
    }

    let prices = match scraper.price_history(&symbol, from, to).await {
        Ok(p) => p,
        Err(e) => return Outcome::Error(e.to_string()),
    };

    if cancel.is_cancelled() {
        return Outcome::Skipped(format!("{symbol} cancelled before write"));
    }

    let mut conn = store.writer();
    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => return Outcome::Error(e.to_string()),
    };
    for price in &prices {
        if let Err(e) = queries::upsert_price(&tx, price) {
            return Outcome::Error(e.to_string());
        }
    }
    if let Err(e) = tx.commit() {
        return Outcome::Error(e.to_string());
    }
    Outcome::Processed
}

pub async fn backfill_reports(
    store: Store,
    scraper: Arc<dyn Scraper>,
    symbols: Vec<String>,
    config: JobConfig,
    cancel: CancellationToken,
    on_progress: impl FnMut(&ProgressLine) + Send + 'static,
) -> BackfillReport {
    run_job(
        symbols,
        config,
        cancel,
        move |symbol, task_cancel| {
            let store = store.clone();
            let scraper = scraper.clone();
            async move {
                let reports = match scraper.reports(&symbol).await {
                    Ok(r) => r,
                    Err(e) => return Outcome::Error(e.to_string()),
                };
                if task_cancel.is_cancelled() {
                    return Outcome::Skipped(format!("{symbol} cancelled before write"));
                }
                let conn = store.writer();
                for report in &reports {
                    if let Err(e) = queries::insert_report(&conn, report) {
                        return Outcome::Error(e.to_string());
                    }
                }
                Outcome::Processed
            }
        },
        on_progress,
    )
    .await
}

pub async fn backfill_dividends(
    store: Store,
    scraper: Arc<dyn Scraper>,
    symbols: Vec<String>,
    config: JobConfig,
    cancel: CancellationToken,
    on_progress: impl FnMut(&ProgressLine) + Send + 'static,
) -> BackfillReport {
    run_job(
        symbols,
        config,
        cancel,
        move |symbol, task_cancel| {
            let store = store.clone();
            let scraper = scraper.clone();
            async move {
                let dividends = match scraper.dividends(&symbol).await {
                    Ok(d) => d,
                    Err(e) => return Outcome::Error(e.to_string()),
                };
                if task_cancel.is_cancelled() {
                    return Outcome::Skipped(format!("{symbol} cancelled before write"));
                }
                let conn = store.writer();
                for dividend in &dividends {
                    if let Err(e) = queries::upsert_dividend(&conn, dividend) {
                        return Outcome::Error(e.to_string());
                    }
                }
                Outcome::Processed
            }
        },
        on_progress,
    )
    .await
}

/// Profile backfill skips symbols whose description is already populated.
pub async fn backfill_profiles(
    store: Store,
    scraper: Arc<dyn Scraper>,
    companies: Vec<Company>,
    config: JobConfig,
    cancel: CancellationToken,
    on_progress: impl FnMut(&ProgressLine) + Send + 'static,
) -> BackfillReport {
    let symbols: Vec<String> = companies
        .into_iter()
        .filter(|c| c.description.is_none())
        .map(|c| c.symbol)
        .collect();

    run_job(
        symbols,
        config,
        cancel,
        move |symbol, task_cancel| {
            let store = store.clone();
            let scraper = scraper.clone();
            async move {
                let description = match scraper.company_profile(&symbol).await {
                    Ok(d) => d,
                    Err(e) => return Outcome::Error(e.to_string()),
                };
                if description.is_empty() {
                    return Outcome::Skipped(format!("{symbol} has no profile upstream"));
                }
                if task_cancel.is_cancelled() {
                    return Outcome::Skipped(format!("{symbol} cancelled before write"));
                }
                let conn = store.writer();
                if let Err(e) = queries::update_company_description(&conn, &symbol, &description) {
                    return Outcome::Error(e.to_string());
                }
                Outcome::Processed
            }
        },
        on_progress,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn run_job_respects_concurrency_cap_and_counts_outcomes() {
        let in_flight = Arc::new(AtomicU64::new(0));
        let max_observed = Arc::new(AtomicU64::new(0));
        let in_flight2 = in_flight.clone();
        let max_observed2 = max_observed.clone();

        let report = run_job(
            vec!["A".to_string(), "B".to_string(), "C".to_string(), "D".to_string()],
            JobConfig {
                concurrency: 2,
                rate_limit: Duration::from_millis(1),
            },
            CancellationToken::new(),
            move |symbol, _cancel| {
                let in_flight = in_flight2.clone();
                let max_observed = max_observed2.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_observed.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    if symbol == "C" {
                        Outcome::Error("boom".into())
                    } else {
                        Outcome::Processed
                    }
                }
            },
            |_line| {},
        )
        .await;

        assert!(max_observed.load(Ordering::SeqCst) <= 2);
        assert_eq!(report.processed, 3);
        assert_eq!(report.errors, 1);
    }

    #[tokio::test]
    async fn progress_consumer_receives_every_line() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        run_job(
            vec!["A".to_string(), "B".to_string()],
            JobConfig {
                concurrency: 4,
                rate_limit: Duration::from_millis(1),
            },
            CancellationToken::new(),
            |_symbol, _cancel| async { Outcome::Processed },
            move |line| seen2.lock().unwrap().push(line.symbol.clone()),
        )
        .await;
        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["A".to_string(), "B".to_string()]);
    }
}
