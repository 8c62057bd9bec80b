//! `PriceService` (§4.H): candle history, latest price, 52-week range.

use super::{AppState, RpcResult};
use crate::domain::Price;
use crate::error::RpcError;
use crate::storage::queries;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

const DEFAULT_CANDLE_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct CandleRangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub timeframe: Option<String>,
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, RpcError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| RpcError::InvalidArgument(format!("{field} {raw:?} is not YYYY-MM-DD: {e}")))
}

/// `ListCandles(symbol, from?, to?, timeframe=daily)` (spec §4.H). An
/// unspecified `to` anchors on the symbol's latest stored price date (not
/// wall-clock now, matching `get_52week_high_low`'s anchoring) so a
/// symbol whose data ends mid-backfill still gets a meaningful window;
/// an unspecified `from` is 30 days before `to`.
pub async fn list_candles(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(range): Query<CandleRangeQuery>,
) -> RpcResult<Vec<Price>> {
    let symbol = symbol.to_uppercase();
    if let Some(timeframe) = &range.timeframe {
        if timeframe != "daily" {
            return Err(RpcError::InvalidArgument(format!("unsupported timeframe {timeframe:?}, only \"daily\" is available")));
        }
    }

    let to = match &range.to {
        Some(raw) => parse_date(raw, "to")?,
        None => {
            let latest = state
                .store
                .read(|conn| queries::get_latest_price(conn, &symbol))
                .map_err(RpcError::from)?;
            latest
                .map(|p| p.date)
                .unwrap_or_else(|| crate::clock::NPT.from_utc_datetime(&chrono::Utc::now().naive_utc()).date_naive())
        }
    };
    let from = match &range.from {
        Some(raw) => parse_date(raw, "from")?,
        None => to - chrono::Duration::days(DEFAULT_CANDLE_WINDOW_DAYS),
    };

    let candles = state
        .store
        .read(|conn| queries::list_candles(conn, &symbol, from, to))
        .map_err(RpcError::from)?;
    Ok(Json(candles))
}

pub async fn get_latest_price(State(state): State<AppState>, Path(symbol): Path<String>) -> RpcResult<Price> {
    let symbol = symbol.to_uppercase();
    let price = state
        .store
        .read(|conn| queries::get_latest_price(conn, &symbol))
        .map_err(RpcError::from)?
        .ok_or_else(|| RpcError::NotFound(format!("no price recorded for {symbol}")))?;
    Ok(Json(price))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Week52Response {
    pub high: Option<i64>,
    pub low: Option<i64>,
}

pub async fn get_52week_high_low(State(state): State<AppState>, Path(symbol): Path<String>) -> RpcResult<Week52Response> {
    let symbol = symbol.to_uppercase();
    let (high, low) = state
        .store
        .read(|conn| queries::get_52week_high_low(conn, &symbol))
        .map_err(RpcError::from)?;
    Ok(Json(Week52Response { high, low }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MarketClock;
    use crate::config::RpcConfig;
    use crate::domain::{Company, Sector};
    use crate::storage::Store;

    fn test_state() -> AppState {
        let store = Store::open_in_memory().unwrap();
        let conn = store.writer();
        queries::upsert_company(
            &conn,
            &Company {
                symbol: "NABIL".into(),
                name: "Nabil Bank".into(),
                sector: Sector::CommercialBank,
                description: None,
                logo: None,
            },
        )
        .unwrap();
        for (day, close) in [(1, 100_00), (10, 110_00), (20, 120_00)] {
            queries::upsert_price(
                &conn,
                &Price {
                    symbol: "NABIL".into(),
                    date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    previous_close: None,
                    volume: 100,
                    turnover: Some(close * 100),
                    is_complete: true,
                    week52_high: None,
                    week52_low: None,
                },
            )
            .unwrap();
        }
        drop(conn);
        AppState::new(store, MarketClock::new(11, 15, Default::default()), RpcConfig::default())
    }

    #[tokio::test]
    async fn list_candles_with_no_range_defaults_to_30_days_before_the_latest_stored_date() {
        let state = test_state();
        let result = list_candles(
            State(state),
            Path("NABIL".into()),
            Query(CandleRangeQuery {
                from: None,
                to: None,
                timeframe: None,
            }),
        )
        .await
        .unwrap();
        let dates: Vec<_> = result.0.iter().map(|p| p.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn list_candles_honors_an_explicit_narrower_range() {
        let state = test_state();
        let result = list_candles(
            State(state),
            Path("NABIL".into()),
            Query(CandleRangeQuery {
                from: Some("2026-01-05".into()),
                to: Some("2026-01-15".into()),
                timeframe: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(result.0.len(), 1);
        assert_eq!(result.0[0].date, NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
    }

    #[tokio::test]
    async fn list_candles_rejects_a_non_daily_timeframe() {
        let state = test_state();
        let result = list_candles(
            State(state),
            Path("NABIL".into()),
            Query(CandleRangeQuery {
                from: None,
                to: None,
                timeframe: Some("weekly".into()),
            }),
        )
        .await;
        assert!(matches!(result, Err(RpcError::InvalidArgument(_))));
    }
}
