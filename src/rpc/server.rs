//! Route wiring for the RPC surface (§4.H). One `axum::Router` serving
//! JSON over localhost HTTP, with the whole service surface mounted
//! under `/v1`.

use super::{company, market, portfolio, price, screener, AppState};
use axum::routing::get;
use axum::Router;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/companies", get(company::list_companies))
        .route("/v1/companies/{symbol}", get(company::get_company))
        .route("/v1/companies/{symbol}/fundamentals", get(company::get_fundamentals))
        .route("/v1/companies/{symbol}/reports", get(company::list_reports))
        .route("/v1/prices/{symbol}/latest", get(price::get_latest_price))
        .route("/v1/prices/{symbol}/candles", get(price::list_candles))
        .route("/v1/prices/{symbol}/52week", get(price::get_52week_high_low))
        .route("/v1/market/clock", get(market::get_clock_state))
        .route("/v1/market/indices", get(market::list_indices))
        .route("/v1/market/sectors", get(market::list_sectors))
        .route("/v1/market/trading-days/{date}", get(market::get_trading_day))
        .route("/v1/screener", get(screener::query_screener))
        .route("/v1/screener/gainers", get(screener::top_gainers))
        .route("/v1/screener/losers", get(screener::top_losers))
        .route("/v1/portfolios", get(portfolio::list_portfolios).post(portfolio::create_portfolio))
        .route("/v1/portfolios/{id}", get(portfolio::get_portfolio))
        .route("/v1/portfolios/{id}/summary", get(portfolio::get_summary))
        .route(
            "/v1/portfolios/{id}/transactions",
            get(portfolio::list_transactions).post(portfolio::add_transaction),
        )
        .route(
            "/v1/portfolios/{id}/transactions/{tx_id}",
            axum::routing::delete(portfolio::delete_transaction),
        )
        .route("/v1/portfolios/{id}/realized-gains", get(portfolio::list_realized_gains))
        .with_state(state)
}

/// Binds and serves the router until cancelled. `ntxd` drives this
/// alongside the sync worker, shutting both down on SIGINT/SIGTERM.
pub async fn serve(state: AppState, bind_addr: &str, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    log::info!("RPC server listening on {bind_addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
