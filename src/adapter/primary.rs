//! Structured JSON API client (spec §4.B.1): cookie/token bootstrap,
//! retry-with-backoff, 200ms politeness delay between calls.
//!
//! Response DTOs here are private — only the normalized
//! [`Company`](crate::domain::Company)/[`Price`](crate::domain::Price)/etc
//! records returned by the `Scraper` impl cross the module boundary,
//! directly generalizing `quotes/yahoo.rs`'s `create_client()` +
//! `parse_latest_quote` split.

use super::retry::retry_with_backoff;
use super::{HealthStatus, IndexPoint, PolitenessDelay, Scraper};
use crate::domain::{Company, Dividend, Price, Report, ReportType, Sector};
use crate::error::{AdapterError, NtxError, NtxResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;

const RETRY_BASE: Duration = Duration::from_secs(30);
const POLITENESS_INTERVAL: Duration = Duration::from_millis(200);

pub struct PrimaryScraper {
    client: reqwest::Client,
    base_url: String,
    delay: PolitenessDelay,
}

impl PrimaryScraper {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            ),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            delay: PolitenessDelay::new(POLITENESS_INTERVAL),
        })
    }

    /// Establishes the session cookie/token the structured API requires
    /// before any data endpoint will answer. Cheap to call repeatedly:
    /// the cookie jar makes subsequent bootstrap calls no-ops server-side.
    async fn bootstrap(&self) -> NtxResult<()> {
        self.delay.wait().await;
        let url = format!("{}/authenticate/prove", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| NtxError::Adapter(AdapterError::Transient(e.to_string())))?;
        if !response.status().is_success() {
            return Err(NtxError::Adapter(AdapterError::Upstream(format!(
                "bootstrap failed: {}",
                response.status()
            ))));
        }
        Ok(())
    }

    async fn get_json(&self, path: &str) -> NtxResult<serde_json::Value> {
        retry_with_backoff(RETRY_BASE, || async {
            self.delay.wait().await;
            let url = format!("{}{}", self.base_url, path);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| NtxError::Adapter(AdapterError::Transient(e.to_string())))?;

            match response.status() {
                status if status.is_success() => response
                    .json::<serde_json::Value>()
                    .await
                    .map_err(|e| NtxError::Adapter(AdapterError::Upstream(e.to_string()))),
                status if status == reqwest::StatusCode::NOT_FOUND => {
                    Err(NtxError::Adapter(AdapterError::UnknownSymbol(path.to_string())))
                }
                status if status.is_client_error() => {
                    Err(NtxError::Adapter(AdapterError::Upstream(format!("client error: {status}"))))
                }
                status => Err(NtxError::Adapter(AdapterError::Transient(format!("server error: {status}")))),
            }
        })
        .await
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompanyDto {
    symbol: String,
    security_name: String,
    sector_name: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceDto {
    symbol: String,
    business_date: String,
    open_price: f64,
    high_price: f64,
    low_price: f64,
    close_price: f64,
    previous_close_price: Option<f64>,
    total_traded_quantity: i64,
    total_traded_value: Option<f64>,
}

impl PriceDto {
    fn into_price(self) -> anyhow::Result<Price> {
        let date = NaiveDate::parse_from_str(&self.business_date, "%Y-%m-%d")?;
        Ok(Price {
            symbol: self.symbol,
            date,
            open: to_paisa(self.open_price),
            high: to_paisa(self.high_price),
            low: to_paisa(self.low_price),
            close: to_paisa(self.close_price),
            previous_close: self.previous_close_price.map(to_paisa),
            volume: self.total_traded_quantity,
            turnover: self.total_traded_value.map(to_paisa),
            is_complete: false,
            week52_high: None,
            week52_low: None,
        })
    }
}

fn to_paisa(rupees: f64) -> i64 {
    (rupees * 100.0).round() as i64
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportDto {
    fiscal_year: i32,
    quarter: Option<i32>,
    report_type: String,
    eps: Option<f64>,
    net_worth_per_share: Option<f64>,
    net_profit: Option<i64>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct DividendDto {
    fiscal_year: i32,
    bonus_percent: Option<f64>,
    cash_percent: Option<f64>,
    headline: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexDto {
    index: String,
    current_value: f64,
    percent_change: f64,
}

#[async_trait]
impl Scraper for PrimaryScraper {
    async fn companies(&self) -> NtxResult<Vec<Company>> {
        self.bootstrap().await?;
        let data = self.get_json("/company/list").await?;
        let dtos: Vec<CompanyDto> = serde_json::from_value(data)
            .map_err(|e| NtxError::Adapter(AdapterError::Upstream(e.to_string())))?;
        Ok(dtos
            .into_iter()
            .map(|d| Company {
                symbol: d.symbol,
                name: d.security_name,
                sector: d.sector_name.as_deref().map(Sector::from_str).unwrap_or(Sector::Unspecified),
                description: None,
                logo: None,
            })
            .collect())
    }

    async fn securities(&self) -> NtxResult<Vec<Company>> {
        self.bootstrap().await?;
        let data = self.get_json("/security/list").await?;
        let dtos: Vec<CompanyDto> = serde_json::from_value(data)
            .map_err(|e| NtxError::Adapter(AdapterError::Upstream(e.to_string())))?;
        Ok(dtos
            .into_iter()
            .map(|d| Company {
                symbol: d.symbol,
                name: d.security_name,
                sector: d.sector_name.as_deref().map(Sector::from_str).unwrap_or(Sector::Unspecified),
                description: None,
                logo: None,
            })
            .collect())
    }

    async fn live_prices(&self) -> NtxResult<Vec<Price>> {
        self.bootstrap().await?;
        let data = self.get_json("/live-market").await?;
        let dtos: Vec<PriceDto> = serde_json::from_value(data)
            .map_err(|e| NtxError::Adapter(AdapterError::Upstream(e.to_string())))?;
        dtos.into_iter()
            .map(|d| d.into_price().map_err(|e| NtxError::Adapter(AdapterError::Upstream(e.to_string()))))
            .collect()
    }

    async fn price_history(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> NtxResult<Vec<Price>> {
        self.bootstrap().await?;
        let path = format!(
            "/price/history/{}?start={}&end={}",
            urlencoding::encode(symbol),
            from,
            to
        );
        let data = self.get_json(&path).await?;
        let dtos: Vec<PriceDto> = serde_json::from_value(data)
            .map_err(|e| NtxError::Adapter(AdapterError::Upstream(e.to_string())))?;
        dtos.into_iter()
            .map(|d| d.into_price().map_err(|e| NtxError::Adapter(AdapterError::Upstream(e.to_string()))))
            .collect()
    }

    async fn reports(&self, symbol: &str) -> NtxResult<Vec<Report>> {
        self.bootstrap().await?;
        let path = format!("/company/{}/reports", urlencoding::encode(symbol));
        let data = self.get_json(&path).await?;
        let dtos: Vec<ReportDto> = serde_json::from_value(data)
            .map_err(|e| NtxError::Adapter(AdapterError::Upstream(e.to_string())))?;
        Ok(dtos
            .into_iter()
            .map(|d| Report {
                symbol: symbol.to_string(),
                report_type: ReportType::from_str(&d.report_type).unwrap_or(ReportType::Quarterly),
                fiscal_year: d.fiscal_year,
                quarter: d.quarter,
                eps: d.eps,
                book_value: d.net_worth_per_share,
                net_income: d.net_profit,
                published_at: None,
            })
            .collect())
    }

    async fn dividends(&self, symbol: &str) -> NtxResult<Vec<Dividend>> {
        self.bootstrap().await?;
        let path = format!("/company/{}/dividends", urlencoding::encode(symbol));
        let data = self.get_json(&path).await?;
        let dtos: Vec<DividendDto> = serde_json::from_value(data)
            .map_err(|e| NtxError::Adapter(AdapterError::Upstream(e.to_string())))?;
        Ok(dtos
            .into_iter()
            .map(|d| Dividend {
                symbol: symbol.to_string(),
                fiscal_year: d.fiscal_year,
                cash_percent: d.cash_percent.unwrap_or(0.0),
                bonus_percent: d.bonus_percent.unwrap_or(0.0),
                headline: d.headline,
                published_at: None,
            })
            .collect())
    }

    async fn company_profile(&self, symbol: &str) -> NtxResult<String> {
        self.bootstrap().await?;
        let path = format!("/company/{}/profile", urlencoding::encode(symbol));
        let data = self.get_json(&path).await?;
        Ok(data
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn nepse_index(&self) -> NtxResult<IndexPoint> {
        self.bootstrap().await?;
        let data = self.get_json("/nepse-index").await?;
        let dto: IndexDto = serde_json::from_value(data)
            .map_err(|e| NtxError::Adapter(AdapterError::Upstream(e.to_string())))?;
        Ok(IndexPoint {
            name: dto.index,
            value: dto.current_value,
            change_percent: dto.percent_change,
            as_of: chrono::Utc::now().date_naive(),
        })
    }

    async fn sub_indices(&self) -> NtxResult<Vec<IndexPoint>> {
        self.bootstrap().await?;
        let data = self.get_json("/sub-indices").await?;
        let dtos: Vec<IndexDto> = serde_json::from_value(data)
            .map_err(|e| NtxError::Adapter(AdapterError::Upstream(e.to_string())))?;
        let today = chrono::Utc::now().date_naive();
        Ok(dtos
            .into_iter()
            .map(|d| IndexPoint {
                name: d.index,
                value: d.current_value,
                change_percent: d.percent_change,
                as_of: today,
            })
            .collect())
    }

    async fn health_status(&self) -> NtxResult<HealthStatus> {
        let start = std::time::Instant::now();
        match self.get_json("/health").await {
            Ok(_) => Ok(HealthStatus {
                reachable: true,
                latency_ms: Some(start.elapsed().as_millis() as u64),
                message: None,
            }),
            Err(e) => Ok(HealthStatus {
                reachable: false,
                latency_ms: None,
                message: Some(e.to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_dto_converts_rupees_to_paisa() {
        let dto = PriceDto {
            symbol: "NABIL".into(),
            business_date: "2024-06-16".into(),
            open_price: 500.0,
            high_price: 510.5,
            low_price: 495.25,
            close_price: 505.0,
            previous_close_price: Some(498.0),
            total_traded_quantity: 1000,
            total_traded_value: Some(505000.0),
        };
        let price = dto.into_price().unwrap();
        assert_eq!(price.open, 50000);
        assert_eq!(price.high, 51050);
        assert_eq!(price.low, 49525);
        assert_eq!(price.previous_close, Some(49800));
    }
}
