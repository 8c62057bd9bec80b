//! `ScreenerService` (§4.H): filtered/sorted company screener plus top
//! gainers/losers. Filtering and sorting happen in Rust inside
//! `storage::queries::get_screener_data`, not SQL, so null/NaN-last
//! ordering is exact — this module only translates the wire request
//! into that function's typed parameters.

use super::{AppState, RpcResult};
use crate::domain::Sector;
use crate::error::RpcError;
use crate::storage::queries::{self, ScreenerFilters, ScreenerRow, SortDirection, SortKey};
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScreenerRequest {
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub min_pe: Option<f64>,
    pub max_pe: Option<f64>,
    pub min_pb: Option<f64>,
    pub max_pb: Option<f64>,
    pub min_percent_change: Option<f64>,
    pub max_percent_change: Option<f64>,
    pub min_market_cap: Option<i64>,
    pub max_market_cap: Option<i64>,
    pub min_volume: Option<i64>,
    #[serde(default)]
    pub near_52w_high: bool,
    #[serde(default)]
    pub near_52w_low: bool,
    pub sector: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    #[serde(default)]
    pub offset: u32,
    pub limit: Option<u32>,
}

fn parse_sort_key(raw: Option<&str>) -> SortKey {
    match raw {
        Some("price") => SortKey::Price,
        Some("percent_change") => SortKey::PercentChange,
        Some("volume") => SortKey::Volume,
        Some("turnover") => SortKey::Turnover,
        Some("market_cap") => SortKey::MarketCap,
        Some("pe") => SortKey::Pe,
        _ => SortKey::Symbol,
    }
}

fn parse_direction(raw: Option<&str>) -> SortDirection {
    match raw {
        Some("desc") => SortDirection::Desc,
        _ => SortDirection::Asc,
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ScreenerResponse {
    pub rows: Vec<ScreenerRow>,
    pub total: usize,
}

pub async fn query_screener(
    State(state): State<AppState>,
    Query(req): Query<ScreenerRequest>,
) -> RpcResult<ScreenerResponse> {
    let limit = req
        .limit
        .unwrap_or(state.config.default_page_limit)
        .min(state.config.max_page_limit);
    let filters = ScreenerFilters {
        min_price: req.min_price,
        max_price: req.max_price,
        min_pe: req.min_pe,
        max_pe: req.max_pe,
        min_pb: req.min_pb,
        max_pb: req.max_pb,
        min_percent_change: req.min_percent_change,
        max_percent_change: req.max_percent_change,
        min_market_cap: req.min_market_cap,
        max_market_cap: req.max_market_cap,
        min_volume: req.min_volume,
        near_52w_high: req.near_52w_high,
        near_52w_low: req.near_52w_low,
        sector: req.sector.as_deref().map(Sector::from_str),
    };
    let sort = parse_sort_key(req.sort.as_deref());
    let direction = parse_direction(req.direction.as_deref());

    let (rows, total) = state
        .store
        .read(|conn| queries::get_screener_data(conn, &filters, sort, direction, req.offset, limit))
        .map_err(RpcError::from)?;
    Ok(Json(ScreenerResponse { rows, total }))
}

#[derive(Debug, Deserialize)]
pub struct MoversQuery {
    pub limit: Option<u32>,
    pub sector: Option<String>,
}

pub async fn top_gainers(State(state): State<AppState>, Query(q): Query<MoversQuery>) -> RpcResult<Vec<ScreenerRow>> {
    let limit = q.limit.unwrap_or(state.config.default_page_limit);
    let sector = q.sector.as_deref().map(Sector::from_str);
    let rows = state
        .store
        .read(|conn| queries::get_top_gainers(conn, limit, sector))
        .map_err(RpcError::from)?;
    Ok(Json(rows))
}

pub async fn top_losers(State(state): State<AppState>, Query(q): Query<MoversQuery>) -> RpcResult<Vec<ScreenerRow>> {
    let limit = q.limit.unwrap_or(state.config.default_page_limit);
    let sector = q.sector.as_deref().map(Sector::from_str);
    let rows = state
        .store
        .read(|conn| queries::get_top_losers(conn, limit, sector))
        .map_err(RpcError::from)?;
    Ok(Json(rows))
}
