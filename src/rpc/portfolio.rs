//! `PortfolioService` (§4.H): portfolio CRUD, transaction entry (with
//! validation and FIFO replay), summaries, and realized-gain history.
//! Mutating handlers take the per-portfolio-id lock from `AppState`
//! (spec §5) before touching the writer connection.

use super::{AppState, RpcResult};
use crate::domain::{Portfolio, RealizedGain, Sector, Transaction, TransactionType};
use crate::error::RpcError;
use crate::portfolio::analytics::{self, HoldingView, PortfolioSummary, SectorAllocation};
use crate::portfolio::{holdings_from_result, replay_portfolio};
use crate::storage::queries;
use crate::validation::{self, TransactionCheck, ValidationOutcome};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub async fn list_portfolios(State(state): State<AppState>) -> RpcResult<Vec<Portfolio>> {
    let portfolios = state.store.read(queries::list_portfolios).map_err(RpcError::from)?;
    Ok(Json(portfolios))
}

#[derive(Debug, Deserialize)]
pub struct CreatePortfolioRequest {
    pub name: String,
    pub owner: String,
}

pub async fn create_portfolio(
    State(state): State<AppState>,
    Json(req): Json<CreatePortfolioRequest>,
) -> RpcResult<Portfolio> {
    if req.name.trim().is_empty() {
        return Err(RpcError::InvalidArgument("portfolio name must not be empty".into()));
    }
    let portfolio = {
        let conn = state.store.writer();
        queries::create_portfolio(&conn, &req.name, &req.owner)
    }
    .map_err(RpcError::from)?;
    Ok(Json(portfolio))
}

pub async fn get_portfolio(State(state): State<AppState>, Path(id): Path<i64>) -> RpcResult<Portfolio> {
    let portfolio = state
        .store
        .read(|conn| queries::get_portfolio(conn, id))
        .map_err(RpcError::from)?
        .ok_or_else(|| RpcError::NotFound(format!("no portfolio {id}")))?;
    Ok(Json(portfolio))
}

#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    pub symbol: Option<String>,
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<ListTransactionsQuery>,
) -> RpcResult<Vec<Transaction>> {
    let symbol = q.symbol.as_deref();
    let transactions = state
        .store
        .read(|conn| queries::list_transactions(conn, id, symbol))
        .map_err(RpcError::from)?;
    Ok(Json(transactions))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    pub holdings: Vec<HoldingView>,
    pub summary: PortfolioSummary,
    pub allocation: Vec<SectorAllocation>,
    pub movers: Vec<HoldingView>,
    pub health_tips: Vec<analytics::HealthTip>,
}

pub async fn get_summary(State(state): State<AppState>, Path(id): Path<i64>) -> RpcResult<PortfolioSnapshot> {
    let snapshot = build_snapshot(&state, id).map_err(RpcError::from)?;
    Ok(Json(snapshot))
}

fn build_snapshot(state: &AppState, portfolio_id: i64) -> anyhow::Result<PortfolioSnapshot> {
    let conn = state.store.writer();
    let transactions = queries::list_transactions(&conn, portfolio_id, None)?;
    let result = replay_portfolio(&transactions);
    for err in &result.errors {
        log::warn!("portfolio {portfolio_id} replay: {err}");
    }
    let holdings = holdings_from_result(portfolio_id, &result);

    let mut views = Vec::with_capacity(holdings.len());
    for holding in &holdings {
        let company = queries::get_company(&conn, &holding.symbol)?;
        let sector = company.map(|c| c.sector).unwrap_or(Sector::Unspecified);
        let price = queries::get_latest_price(&conn, &holding.symbol)?;
        views.push(analytics::build_holding_view(holding, sector, price.as_ref()));
    }

    let total_realized_pl: i64 = result.realized_gains.iter().map(|g| g.gain).sum();
    let summary = analytics::summarize(&views, total_realized_pl);
    let allocation = analytics::sector_allocation(&views);
    let movers = analytics::daily_movers(&views, 5);
    let health_tips = analytics::health_tips(&views, &allocation);

    Ok(PortfolioSnapshot {
        holdings: views,
        summary,
        allocation,
        movers,
        health_tips,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTransactionRequest {
    pub symbol: String,
    pub transaction_type: String,
    pub date: NaiveDate,
    pub quantity: i64,
    pub unit_price: i64,
    pub commission: Option<i64>,
    pub tax: Option<i64>,
    pub note: Option<String>,
    #[serde(default)]
    pub lenient: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTransactionResponse {
    pub transaction: Transaction,
    pub warnings: Vec<ValidationOutcome>,
}

pub async fn add_transaction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<AddTransactionRequest>,
) -> RpcResult<AddTransactionResponse> {
    let symbol = req.symbol.to_uppercase();
    let transaction_type = TransactionType::from_str(&req.transaction_type)
        .ok_or_else(|| RpcError::InvalidArgument(format!("unknown transaction type {:?}", req.transaction_type)))?;

    let _guard = state.lock_portfolio(id).await;

    let (sector, last_close) = {
        let conn = state.store.writer();
        if queries::get_portfolio(&conn, id)?.is_none() {
            return Err(RpcError::NotFound(format!("no portfolio {id}")));
        }
        let sector = queries::get_company(&conn, &symbol)?
            .map(|c| c.sector)
            .unwrap_or(Sector::Unspecified);
        let last_close = queries::get_latest_price(&conn, &symbol)?.map(|p| p.close);
        (sector, last_close)
    };

    let now_npt = crate::clock::NPT.from_utc_datetime(&Utc::now().naive_utc());
    let check = TransactionCheck {
        symbol: symbol.clone(),
        transaction_type,
        quantity: req.quantity,
        unit_price: req.unit_price,
        sector,
        last_close,
        entry_time: Some(now_npt),
    };
    let outcomes = validation::validate_transaction(&check, &state.clock, !req.lenient);
    if validation::any_errors(&outcomes) {
        let message = outcomes
            .iter()
            .filter(|o| o.is_error())
            .map(|o| match o {
                ValidationOutcome::Error(payload) => payload.message.clone(),
                _ => unreachable!(),
            })
            .collect::<Vec<_>>()
            .join("; ");
        return Err(RpcError::InvalidArgument(message));
    }

    let transaction = Transaction {
        id: 0,
        portfolio_id: id,
        symbol,
        transaction_type,
        date: req.date,
        quantity: req.quantity,
        unit_price: req.unit_price,
        commission: req.commission,
        tax: req.tax,
        note: req.note,
    };

    let inserted = {
        let conn = state.store.writer();
        let inserted = queries::insert_transaction(&conn, &transaction)?;
        let all = queries::list_transactions(&conn, id, None)?;
        let result = replay_portfolio(&all);
        queries::replace_realized_gains_for_portfolio(&conn, id, &result.realized_gains)?;
        inserted
    };

    let warnings = outcomes.into_iter().filter(|o| !o.is_ok()).collect();
    Ok(Json(AddTransactionResponse {
        transaction: inserted,
        warnings,
    }))
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    Path((portfolio_id, tx_id)): Path<(i64, i64)>,
) -> RpcResult<()> {
    let _guard = state.lock_portfolio(portfolio_id).await;

    let conn = state.store.writer();
    let existing = queries::get_transaction(&conn, tx_id)?;
    match existing {
        Some(tx) if tx.portfolio_id == portfolio_id => {}
        _ => return Err(RpcError::NotFound(format!("no transaction {tx_id} in portfolio {portfolio_id}"))),
    }

    queries::delete_transaction(&conn, tx_id)?;
    let remaining = queries::list_transactions(&conn, portfolio_id, None)?;
    let result = replay_portfolio(&remaining);
    queries::replace_realized_gains_for_portfolio(&conn, portfolio_id, &result.realized_gains)?;

    Ok(Json(()))
}

#[derive(Debug, Deserialize)]
pub struct ListGainsQuery {
    pub symbol: Option<String>,
}

pub async fn list_realized_gains(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<ListGainsQuery>,
) -> RpcResult<Vec<RealizedGain>> {
    let symbol = q.symbol.as_deref();
    let gains = state
        .store
        .read(|conn| queries::list_realized_gains(conn, id, symbol))
        .map_err(RpcError::from)?;
    Ok(Json(gains))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MarketClock;
    use crate::config::RpcConfig;
    use crate::domain::Company;
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
        drop(conn);
        AppState::new(store, MarketClock::new(11, 15, Default::default()), RpcConfig::default())
    }

    fn insert_buy(state: &AppState, portfolio_id: i64, symbol: &str, quantity: i64, unit_price: i64) -> Transaction {
        let conn = state.store.writer();
        queries::insert_transaction(
            &conn,
            &Transaction {
                id: 0,
                portfolio_id,
                symbol: symbol.to_string(),
                transaction_type: TransactionType::Buy,
                date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                quantity,
                unit_price,
                commission: None,
                tax: None,
                note: None,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn delete_transaction_removes_it_and_replays_realized_gains() {
        let state = test_state();
        let portfolio = {
            let conn = state.store.writer();
            queries::create_portfolio(&conn, "Main", "ram").unwrap()
        };
        let buy = insert_buy(&state, portfolio.id, "NABIL", 100, 500_00);
        let sell = {
            let conn = state.store.writer();
            queries::insert_transaction(
                &conn,
                &Transaction {
                    id: 0,
                    portfolio_id: portfolio.id,
                    symbol: "NABIL".into(),
                    transaction_type: TransactionType::Sell,
                    date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
                    quantity: 50,
                    unit_price: 600_00,
                    commission: None,
                    tax: None,
                    note: None,
                },
            )
            .unwrap()
        };

        delete_transaction(State(state.clone()), Path((portfolio.id, sell.id))).await.unwrap();

        let remaining = state
            .store
            .read(|conn| queries::list_transactions(conn, portfolio.id, None))
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, buy.id);

        let gains = state
            .store
            .read(|conn| queries::list_realized_gains(conn, portfolio.id, None))
            .unwrap();
        assert!(gains.is_empty(), "deleting the sale should clear the realized gain it produced");
    }

    #[tokio::test]
    async fn delete_transaction_rejects_a_transaction_from_another_portfolio() {
        let state = test_state();
        let (a, b) = {
            let conn = state.store.writer();
            (
                queries::create_portfolio(&conn, "A", "ram").unwrap(),
                queries::create_portfolio(&conn, "B", "hari").unwrap(),
            )
        };
        let tx = insert_buy(&state, a.id, "NABIL", 100, 500_00);

        let result = delete_transaction(State(state.clone()), Path((b.id, tx.id))).await;
        assert!(matches!(result, Err(RpcError::NotFound(_))));

        let still_there = state
            .store
            .read(|conn| queries::list_transactions(conn, a.id, None))
            .unwrap();
        assert_eq!(still_there.len(), 1);
    }

    #[tokio::test]
    async fn delete_transaction_rejects_unknown_id() {
        let state = test_state();
        let portfolio = {
            let conn = state.store.writer();
            queries::create_portfolio(&conn, "Main", "ram").unwrap()
        };
        let result = delete_transaction(State(state.clone()), Path((portfolio.id, 999))).await;
        assert!(matches!(result, Err(RpcError::NotFound(_))));
    }
}
