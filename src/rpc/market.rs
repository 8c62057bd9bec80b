//! `MarketService` (§4.H): current market state, the main index plus
//! sub-indices, per-sector aggregates, and per-date trading-day records.
//! Clock state and sectors are derived on read from `clock::MarketClock`
//! and the storage engine; indices come from a background feed (below)
//! since they reflect a live upstream value the RPC handler itself must
//! never block on fetching.

use super::{AppState, RpcResult};
use crate::adapter::Scraper;
use crate::domain::{IndexPoint, SectorSummary, TradingDay};
use crate::error::RpcError;
use crate::storage::queries;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockResponse {
    pub is_open: bool,
    pub state: &'static str,
    pub as_of: String,
    pub is_trading_day: bool,
    pub next_open: String,
}

pub async fn get_clock_state(State(state): State<AppState>) -> RpcResult<ClockResponse> {
    let now = crate::clock::NPT.from_utc_datetime(&Utc::now().naive_utc());
    let market_state = match state.clock.state(now) {
        crate::clock::MarketState::Open => "open",
        crate::clock::MarketState::PreOpen => "pre_open",
        crate::clock::MarketState::Closed => "closed",
    };
    let response = ClockResponse {
        is_open: state.clock.is_open(now),
        state: market_state,
        as_of: now.to_rfc3339(),
        is_trading_day: state.clock.is_trading_day(now),
        next_open: state.clock.next_open_from(now).to_rfc3339(),
    };
    Ok(Json(response))
}

/// Per-sector `{stock_count, turnover}` (spec §4.H `ListSectors`).
pub async fn list_sectors(State(state): State<AppState>) -> RpcResult<Vec<SectorSummary>> {
    let sectors = state.store.read(queries::get_sector_summaries).map_err(RpcError::from)?;
    Ok(Json(sectors))
}

/// Main index + sub-indices (spec §4.H `ListIndices`), served from
/// whatever the background feed last wrote — never fetched inline, so a
/// slow or down upstream never stalls this handler.
pub async fn list_indices(State(state): State<AppState>) -> RpcResult<Vec<IndexPoint>> {
    let snapshot = state.index_cache.snapshot();
    let mut points = Vec::with_capacity(1 + snapshot.sub_indices.len());
    points.extend(snapshot.main);
    points.extend(snapshot.sub_indices);
    Ok(Json(points))
}

/// Last known main index + sub-indices. Starts empty until the feed's
/// first successful fetch.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    pub main: Option<IndexPoint>,
    pub sub_indices: Vec<IndexPoint>,
}

/// Shared, cheaply-cloned handle onto the latest `IndexSnapshot`.
/// Separate from `AppState` itself so route handlers and the background
/// feed task can each hold a clone without reaching through the rest of
/// the app's dependencies.
#[derive(Clone)]
pub struct IndexCache {
    inner: Arc<RwLock<IndexSnapshot>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(IndexSnapshot::default())),
        }
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        self.inner.read().expect("index cache lock poisoned").clone()
    }

    fn store(&self, snapshot: IndexSnapshot) {
        *self.inner.write().expect("index cache lock poisoned") = snapshot;
    }
}

impl Default for IndexCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the market index update path (spec §5: "uses a buffered
/// request channel; if full, a new update is dropped with a warning —
/// back-pressure over queuing unbounded work"). One producer task polls
/// the scraper every `interval` and tries to hand the result to a
/// single-slot channel; if the consumer hasn't drained the previous
/// update yet, `try_send` fails and the new one is dropped rather than
/// queued. The consumer task is the only writer to the cache.
pub fn spawn_index_feed(
    scraper: Arc<dyn Scraper>,
    cache: IndexCache,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<IndexSnapshot>(1);

    let consumer_cancel = cancel.clone();
    let consumer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = consumer_cancel.cancelled() => break,
                update = rx.recv() => match update {
                    Some(snapshot) => cache.store(snapshot),
                    None => break,
                },
            }
        }
    });

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            if cancel.is_cancelled() {
                break;
            }

            let main = scraper.nepse_index().await.ok();
            let sub_indices = scraper.sub_indices().await.unwrap_or_default();
            if main.is_none() && sub_indices.is_empty() {
                log::warn!("market index feed: upstream returned nothing this cycle");
                continue;
            }

            if tx.try_send(IndexSnapshot { main, sub_indices }).is_err() {
                log::warn!("market index update dropped: consumer has not drained the previous one yet");
            }
        }
        drop(tx);
        let _ = consumer.await;
    })
}

pub async fn get_trading_day(State(state): State<AppState>, Path(date): Path<String>) -> RpcResult<TradingDay> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|e| RpcError::InvalidArgument(format!("date {date:?} is not YYYY-MM-DD: {e}")))?;
    let record = state
        .store
        .read(|conn| queries::get_trading_day(conn, date))
        .map_err(RpcError::from)?
        .ok_or_else(|| RpcError::NotFound(format!("no trading day record for {date}")))?;
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Company, Dividend, Price, Report};
    use crate::error::NtxResult;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingScraper {
        calls: AtomicU64,
    }

    #[async_trait::async_trait]
    impl Scraper for CountingScraper {
        async fn companies(&self) -> NtxResult<Vec<Company>> {
            Ok(vec![])
        }
        async fn securities(&self) -> NtxResult<Vec<Company>> {
            Ok(vec![])
        }
        async fn live_prices(&self) -> NtxResult<Vec<Price>> {
            Ok(vec![])
        }
        async fn price_history(&self, _symbol: &str, _from: NaiveDate, _to: NaiveDate) -> NtxResult<Vec<Price>> {
            Ok(vec![])
        }
        async fn reports(&self, _symbol: &str) -> NtxResult<Vec<Report>> {
            Ok(vec![])
        }
        async fn dividends(&self, _symbol: &str) -> NtxResult<Vec<Dividend>> {
            Ok(vec![])
        }
        async fn company_profile(&self, _symbol: &str) -> NtxResult<String> {
            Ok(String::new())
        }
        async fn nepse_index(&self) -> NtxResult<IndexPoint> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(IndexPoint {
                name: "NEPSE".into(),
                value: 2000.0 + n as f64,
                change_percent: 0.5,
                as_of: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            })
        }
        async fn sub_indices(&self) -> NtxResult<Vec<IndexPoint>> {
            Ok(vec![])
        }
        async fn health_status(&self) -> NtxResult<crate::adapter::HealthStatus> {
            Ok(crate::adapter::HealthStatus {
                reachable: true,
                latency_ms: Some(1),
                message: None,
            })
        }
    }

    #[tokio::test]
    async fn index_feed_populates_cache_and_stops_on_cancel() {
        let scraper: Arc<dyn Scraper> = Arc::new(CountingScraper { calls: AtomicU64::new(0) });
        let cache = IndexCache::new();
        let cancel = CancellationToken::new();

        assert!(cache.snapshot().main.is_none());

        let handle = spawn_index_feed(scraper, cache.clone(), Duration::from_millis(5), cancel.clone());

        tokio::time::sleep(Duration::from_millis(40)).await;
        let snapshot = cache.snapshot();
        assert!(snapshot.main.is_some());
        assert_eq!(snapshot.main.unwrap().name, "NEPSE");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.expect("feed task joins promptly after cancel").unwrap();
    }

    #[tokio::test]
    async fn index_cache_starts_empty_and_clones_share_state() {
        let cache = IndexCache::new();
        let other = cache.clone();
        assert!(other.snapshot().main.is_none());
    }
}
