//! Canary job (spec §9 "Design notes"): periodically fetches a reference
//! symbol and logs a warning if the response shape no longer parses,
//! catching upstream drift before it surfaces as silent data gaps.
//! Grounded on `quotes::yahoo::search`'s smoke-test shape, run instead as
//! a scheduled check rather than a `#[test]`.

use super::Scraper;

/// Runs once; the sync worker calls this on its daily reset tick.
pub async fn run_canary_check(scraper: &dyn Scraper, reference_symbol: &str) {
    match scraper.live_prices().await {
        Ok(prices) if prices.iter().any(|p| p.symbol == reference_symbol) => {
            log::debug!("canary check passed for {reference_symbol}");
        }
        Ok(_) => {
            log::warn!("canary check: reference symbol {reference_symbol} missing from live prices response");
        }
        Err(e) => {
            log::warn!("canary check failed: upstream response shape may have drifted: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{HealthStatus, IndexPoint};
    use crate::domain::{Company, Dividend, Price, Report};
    use crate::error::NtxResult;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    struct StubScraper {
        prices: Vec<Price>,
    }

    #[async_trait]
    impl Scraper for StubScraper {
        async fn companies(&self) -> NtxResult<Vec<Company>> {
            Ok(vec![])
        }
        async fn securities(&self) -> NtxResult<Vec<Company>> {
            Ok(vec![])
        }
        async fn live_prices(&self) -> NtxResult<Vec<Price>> {
            Ok(self.prices.clone())
        }
        async fn price_history(&self, _: &str, _: NaiveDate, _: NaiveDate) -> NtxResult<Vec<Price>> {
            Ok(vec![])
        }
        async fn reports(&self, _: &str) -> NtxResult<Vec<Report>> {
            Ok(vec![])
        }
        async fn dividends(&self, _: &str) -> NtxResult<Vec<Dividend>> {
            Ok(vec![])
        }
        async fn company_profile(&self, _: &str) -> NtxResult<String> {
            Ok(String::new())
        }
        async fn nepse_index(&self) -> NtxResult<IndexPoint> {
            unimplemented!()
        }
        async fn sub_indices(&self) -> NtxResult<Vec<IndexPoint>> {
            unimplemented!()
        }
        async fn health_status(&self) -> NtxResult<HealthStatus> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn canary_does_not_panic_when_reference_symbol_missing() {
        let scraper = StubScraper { prices: vec![] };
        run_canary_check(&scraper, "NABIL").await;
    }
}
