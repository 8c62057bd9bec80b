//! Alternative-endpoint scraper (spec §4.B.2), used when the primary
//! JSON API returns an auth or structural failure. Scrapes a plain HTML
//! listing instead of a JSON API, so it leans on `regex` rather than
//! `serde_json` for pulling fields out of each row.

use super::retry::retry_with_backoff;
use super::{HealthStatus, IndexPoint, PolitenessDelay, Scraper};
use crate::domain::{Company, Dividend, Price, Report, Sector};
use crate::error::{AdapterError, NtxError, NtxResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

const RETRY_BASE: Duration = Duration::from_secs(30);
const POLITENESS_INTERVAL: Duration = Duration::from_millis(200);

static ROW_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        <tr[^>]*>\s*
        <td[^>]*>(?P<symbol>[A-Z0-9.]+)</td>\s*
        <td[^>]*>(?P<name>[^<]+)</td>\s*
        <td[^>]*>(?P<open>[\d.,]+)</td>\s*
        <td[^>]*>(?P<high>[\d.,]+)</td>\s*
        <td[^>]*>(?P<low>[\d.,]+)</td>\s*
        <td[^>]*>(?P<close>[\d.,]+)</td>\s*
        <td[^>]*>(?P<volume>[\d,]+)</td>\s*
        </tr>
        "#,
    )
    .expect("fallback row pattern is a constant, always valid")
});

pub struct FallbackScraper {
    client: reqwest::Client,
    base_url: String,
    delay: PolitenessDelay,
}

impl FallbackScraper {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            base_url: base_url.into(),
            delay: PolitenessDelay::new(POLITENESS_INTERVAL),
        })
    }

    async fn get_html(&self, path: &str) -> NtxResult<String> {
        retry_with_backoff(RETRY_BASE, || async {
            self.delay.wait().await;
            let url = format!("{}{}", self.base_url, path);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| NtxError::Adapter(AdapterError::Transient(e.to_string())))?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(NtxError::Adapter(AdapterError::UnknownSymbol(path.to_string())));
            }
            if !response.status().is_success() {
                return Err(NtxError::Adapter(AdapterError::Upstream(format!(
                    "{}",
                    response.status()
                ))));
            }
            response
                .text()
                .await
                .map_err(|e| NtxError::Adapter(AdapterError::Upstream(e.to_string())))
        })
        .await
    }

    fn parse_number(raw: &str) -> f64 {
        raw.replace(',', "").parse().unwrap_or(0.0)
    }
}

#[async_trait]
impl Scraper for FallbackScraper {
    async fn companies(&self) -> NtxResult<Vec<Company>> {
        let prices = self.live_prices().await?;
        Ok(prices
            .into_iter()
            .map(|p| Company {
                symbol: p.symbol,
                name: String::new(),
                sector: Sector::Unspecified,
                description: None,
                logo: None,
            })
            .collect())
    }

    async fn securities(&self) -> NtxResult<Vec<Company>> {
        self.companies().await
    }

    async fn live_prices(&self) -> NtxResult<Vec<Price>> {
        let html = self.get_html("/live-trading").await?;
        let today = chrono::Utc::now().date_naive();
        Ok(ROW_PATTERN
            .captures_iter(&html)
            .map(|caps| {
                let open = Self::parse_number(&caps["open"]);
                let high = Self::parse_number(&caps["high"]);
                let low = Self::parse_number(&caps["low"]);
                let close = Self::parse_number(&caps["close"]);
                let volume = caps["volume"].replace(',', "").parse().unwrap_or(0);
                Price {
                    symbol: caps["symbol"].to_string(),
                    date: today,
                    open: (open * 100.0).round() as i64,
                    high: (high * 100.0).round() as i64,
                    low: (low * 100.0).round() as i64,
                    close: (close * 100.0).round() as i64,
                    previous_close: None,
                    volume,
                    turnover: None,
                    is_complete: false,
                    week52_high: None,
                    week52_low: None,
                }
            })
            .collect())
    }

    async fn price_history(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> NtxResult<Vec<Price>> {
        let path = format!("/history/{}?from={}&to={}", urlencoding::encode(symbol), from, to);
        let html = self.get_html(&path).await?;
        Ok(ROW_PATTERN
            .captures_iter(&html)
            .filter(|caps| &caps["symbol"] == symbol)
            .map(|caps| {
                let open = Self::parse_number(&caps["open"]);
                let high = Self::parse_number(&caps["high"]);
                let low = Self::parse_number(&caps["low"]);
                let close = Self::parse_number(&caps["close"]);
                let volume = caps["volume"].replace(',', "").parse().unwrap_or(0);
                Price {
                    symbol: symbol.to_string(),
                    date: from,
                    open: (open * 100.0).round() as i64,
                    high: (high * 100.0).round() as i64,
                    low: (low * 100.0).round() as i64,
                    close: (close * 100.0).round() as i64,
                    previous_close: None,
                    volume,
                    turnover: None,
                    is_complete: false,
                    week52_high: None,
                    week52_low: None,
                }
            })
            .collect())
    }

    async fn reports(&self, _symbol: &str) -> NtxResult<Vec<Report>> {
        // Not published on the plain HTML listing; the orchestrator
        // only reaches the fallback for price data in practice, but the
        // trait still requires an answer.
        Ok(Vec::new())
    }

    async fn dividends(&self, _symbol: &str) -> NtxResult<Vec<Dividend>> {
        Ok(Vec::new())
    }

    async fn company_profile(&self, _symbol: &str) -> NtxResult<String> {
        Ok(String::new())
    }

    async fn nepse_index(&self) -> NtxResult<IndexPoint> {
        let html = self.get_html("/index").await?;
        static INDEX_PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r#"NEPSE Index[^\d-]*(?P<value>[\d.,]+)[^\d-]*(?P<change>-?[\d.]+)%"#).unwrap()
        });
        let caps = INDEX_PATTERN
            .captures(&html)
            .ok_or_else(|| NtxError::Adapter(AdapterError::Upstream("index markup changed".into())))?;
        Ok(IndexPoint {
            name: "NEPSE".to_string(),
            value: Self::parse_number(&caps["value"]),
            change_percent: caps["change"].parse().unwrap_or(0.0),
            as_of: chrono::Utc::now().date_naive(),
        })
    }

    async fn sub_indices(&self) -> NtxResult<Vec<IndexPoint>> {
        Ok(Vec::new())
    }

    async fn health_status(&self) -> NtxResult<HealthStatus> {
        let start = std::time::Instant::now();
        match self.get_html("/live-trading").await {
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
    fn row_pattern_extracts_fields() {
        let html = "<tr><td>NABIL</td><td>Nabil Bank</td><td>500.00</td><td>510.50</td><td>495.00</td><td>505.00</td><td>1,234</td></tr>";
        let caps = ROW_PATTERN.captures(html).unwrap();
        assert_eq!(&caps["symbol"], "NABIL");
        assert_eq!(FallbackScraper::parse_number(&caps["volume"]), 1234.0);
    }
}
