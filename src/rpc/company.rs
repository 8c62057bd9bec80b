//! `CompanyService` (§4.H): read-only company directory lookups, plus
//! per-symbol fundamentals and disclosure reports.

use super::{AppState, RpcResult};
use crate::domain::{Company, Fundamentals, Report, ReportType, Sector};
use crate::error::RpcError;
use crate::storage::queries;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ListCompaniesQuery {
    pub sector: Option<String>,
    pub query: Option<String>,
}

pub async fn list_companies(
    State(state): State<AppState>,
    Query(q): Query<ListCompaniesQuery>,
) -> RpcResult<Vec<Company>> {
    let sector = q.sector.as_deref().map(Sector::from_str);
    let companies = state
        .store
        .read(|conn| queries::list_companies(conn, sector, q.query.as_deref()))
        .map_err(RpcError::from)?;
    Ok(Json(companies))
}

pub async fn get_company(State(state): State<AppState>, Path(symbol): Path<String>) -> RpcResult<Company> {
    let symbol = symbol.to_uppercase();
    let company = state
        .store
        .read(|conn| queries::get_company(conn, &symbol))
        .map_err(RpcError::from)?
        .ok_or_else(|| RpcError::NotFound(format!("no company {symbol}")))?;
    Ok(Json(company))
}

pub async fn get_fundamentals(State(state): State<AppState>, Path(symbol): Path<String>) -> RpcResult<Fundamentals> {
    let symbol = symbol.to_uppercase();
    let fundamentals = state
        .store
        .read(|conn| queries::get_fundamentals(conn, &symbol))
        .map_err(RpcError::from)?
        .ok_or_else(|| RpcError::NotFound(format!("no fundamentals recorded for {symbol}")))?;
    Ok(Json(fundamentals))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListReportsQuery {
    pub report_type: Option<String>,
    pub limit: Option<u32>,
}

pub async fn list_reports(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(q): Query<ListReportsQuery>,
) -> RpcResult<Vec<Report>> {
    let symbol = symbol.to_uppercase();
    let report_type = q
        .report_type
        .as_deref()
        .map(|raw| ReportType::from_str(raw).ok_or_else(|| RpcError::InvalidArgument(format!("unknown report type {raw:?}"))))
        .transpose()?;
    let limit = q.limit.unwrap_or(state.config.default_page_limit).min(state.config.max_page_limit);
    let reports = state
        .store
        .read(|conn| queries::list_reports(conn, &symbol, report_type, limit))
        .map_err(RpcError::from)?;
    Ok(Json(reports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MarketClock;
    use crate::config::RpcConfig;
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

    #[tokio::test]
    async fn get_fundamentals_returns_not_found_before_any_are_recorded() {
        let state = test_state();
        let result = get_fundamentals(State(state), Path("NABIL".into())).await;
        assert!(matches!(result, Err(RpcError::NotFound(_))));
    }

    #[tokio::test]
    async fn get_fundamentals_returns_what_was_upserted() {
        let state = test_state();
        {
            let conn = state.store.writer();
            queries::upsert_fundamentals(
                &conn,
                &Fundamentals {
                    symbol: "NABIL".into(),
                    pe: Some(15.2),
                    pb: Some(2.1),
                    ..Default::default()
                },
            )
            .unwrap();
        }
        let result = get_fundamentals(State(state), Path("nabil".into())).await.unwrap();
        assert_eq!(result.0.pe, Some(15.2));
        assert_eq!(result.0.pb, Some(2.1));
    }

    #[tokio::test]
    async fn list_reports_filters_by_type_and_respects_limit() {
        let state = test_state();
        {
            let conn = state.store.writer();
            for (fiscal_year, report_type) in [(2023, ReportType::Annual), (2024, ReportType::Quarterly), (2024, ReportType::Annual)] {
                queries::insert_report(
                    &conn,
                    &Report {
                        symbol: "NABIL".into(),
                        report_type,
                        fiscal_year,
                        quarter: None,
                        eps: None,
                        book_value: None,
                        net_income: None,
                        published_at: None,
                    },
                )
                .unwrap();
            }
        }

        let annual = list_reports(
            State(state.clone()),
            Path("NABIL".into()),
            Query(ListReportsQuery {
                report_type: Some("annual".into()),
                limit: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(annual.0.len(), 2);

        let capped = list_reports(
            State(state),
            Path("NABIL".into()),
            Query(ListReportsQuery {
                report_type: None,
                limit: Some(1),
            }),
        )
        .await
        .unwrap();
        assert_eq!(capped.0.len(), 1);
    }

    #[tokio::test]
    async fn list_reports_rejects_an_unknown_report_type() {
        let state = test_state();
        let result = list_reports(
            State(state),
            Path("NABIL".into()),
            Query(ListReportsQuery {
                report_type: Some("semiannual".into()),
                limit: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(RpcError::InvalidArgument(_))));
    }
}
