//! Upstream adapter (§4.B): one `Scraper` abstraction, two
//! implementations (primary JSON API, fallback scraper), and an
//! orchestrator that tries primary first and classifies failures the
//! way the rest of the codebase expects them.
//!
//! Response shapes from the exchange never cross this module boundary —
//! only the normalized records in [`Company`](crate::domain::Company),
//! [`Price`](crate::domain::Price), etc.

mod canary;
mod fallback;
mod primary;
mod rate_limit;
mod retry;

pub use canary::run_canary_check;
pub use fallback::FallbackScraper;
pub use primary::PrimaryScraper;
pub use rate_limit::PolitenessDelay;

use crate::domain::{Company, Dividend, IndexPoint, Price, Report};
use crate::error::{AdapterError, NtxError, NtxResult};
use async_trait::async_trait;
use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub reachable: bool,
    pub latency_ms: Option<u64>,
    pub message: Option<String>,
}

#[async_trait]
pub trait Scraper: Send + Sync {
    async fn companies(&self) -> NtxResult<Vec<Company>>;
    async fn securities(&self) -> NtxResult<Vec<Company>>;
    async fn live_prices(&self) -> NtxResult<Vec<Price>>;
    async fn price_history(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> NtxResult<Vec<Price>>;
    async fn reports(&self, symbol: &str) -> NtxResult<Vec<Report>>;
    async fn dividends(&self, symbol: &str) -> NtxResult<Vec<Dividend>>;
    async fn company_profile(&self, symbol: &str) -> NtxResult<String>;
    async fn nepse_index(&self) -> NtxResult<IndexPoint>;
    async fn sub_indices(&self) -> NtxResult<Vec<IndexPoint>>;
    async fn health_status(&self) -> NtxResult<HealthStatus>;
}

/// Calls primary first. `UnknownSymbol` propagates immediately (it is
/// not a transport failure, retrying elsewhere can't fix it). Anything
/// else falls through to the fallback scraper, if one is configured; if
/// both fail the error is reclassified as `Transient` so callers (the
/// sync worker, the backfill pipeline) know it's worth retrying on the
/// next tick rather than giving up on the symbol.
pub struct OrchestratingScraper {
    primary: Box<dyn Scraper>,
    fallback: Option<Box<dyn Scraper>>,
}

impl OrchestratingScraper {
    pub fn new(primary: Box<dyn Scraper>, fallback: Option<Box<dyn Scraper>>) -> Self {
        Self { primary, fallback }
    }

    async fn orchestrate<T, F, G>(&self, call_primary: F, call_fallback: G) -> NtxResult<T>
    where
        F: for<'a> Fn(&'a dyn Scraper) -> std::pin::Pin<Box<dyn std::future::Future<Output = NtxResult<T>> + Send + 'a>>,
        G: for<'a> Fn(&'a dyn Scraper) -> std::pin::Pin<Box<dyn std::future::Future<Output = NtxResult<T>> + Send + 'a>>,
    {
        match call_primary(self.primary.as_ref()).await {
            Ok(v) => Ok(v),
            Err(NtxError::Adapter(AdapterError::UnknownSymbol(sym))) => {
                Err(NtxError::Adapter(AdapterError::UnknownSymbol(sym)))
            }
            Err(primary_err) => {
                let Some(fallback) = &self.fallback else {
                    return Err(classify_as_transient(primary_err));
                };
                match call_fallback(fallback.as_ref()).await {
                    Ok(v) => Ok(v),
                    Err(fallback_err) => {
                        log::warn!("primary and fallback both failed: {primary_err} / {fallback_err}");
                        Err(classify_as_transient(fallback_err))
                    }
                }
            }
        }
    }
}

fn classify_as_transient(err: NtxError) -> NtxError {
    match err {
        NtxError::Adapter(AdapterError::UnknownSymbol(s)) => {
            NtxError::Adapter(AdapterError::UnknownSymbol(s))
        }
        other => NtxError::Adapter(AdapterError::Transient(other.to_string())),
    }
}

#[async_trait]
impl Scraper for OrchestratingScraper {
    async fn companies(&self) -> NtxResult<Vec<Company>> {
        self.orchestrate(
            |s| Box::pin(s.companies()),
            |s| Box::pin(s.companies()),
        )
        .await
    }

    async fn securities(&self) -> NtxResult<Vec<Company>> {
        self.orchestrate(
            |s| Box::pin(s.securities()),
            |s| Box::pin(s.securities()),
        )
        .await
    }

    async fn live_prices(&self) -> NtxResult<Vec<Price>> {
        self.orchestrate(
            |s| Box::pin(s.live_prices()),
            |s| Box::pin(s.live_prices()),
        )
        .await
    }

    async fn price_history(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> NtxResult<Vec<Price>> {
        self.orchestrate(
            |s| Box::pin(s.price_history(symbol, from, to)),
            |s| Box::pin(s.price_history(symbol, from, to)),
        )
        .await
    }

    async fn reports(&self, symbol: &str) -> NtxResult<Vec<Report>> {
        self.orchestrate(|s| Box::pin(s.reports(symbol)), |s| Box::pin(s.reports(symbol)))
            .await
    }

    async fn dividends(&self, symbol: &str) -> NtxResult<Vec<Dividend>> {
        self.orchestrate(
            |s| Box::pin(s.dividends(symbol)),
            |s| Box::pin(s.dividends(symbol)),
        )
        .await
    }

    async fn company_profile(&self, symbol: &str) -> NtxResult<String> {
        self.orchestrate(
            |s| Box::pin(s.company_profile(symbol)),
            |s| Box::pin(s.company_profile(symbol)),
        )
        .await
    }

    async fn nepse_index(&self) -> NtxResult<IndexPoint> {
        self.orchestrate(
            |s| Box::pin(s.nepse_index()),
            |s| Box::pin(s.nepse_index()),
        )
        .await
    }

    async fn sub_indices(&self) -> NtxResult<Vec<IndexPoint>> {
        self.orchestrate(
            |s| Box::pin(s.sub_indices()),
            |s| Box::pin(s.sub_indices()),
        )
        .await
    }

    async fn health_status(&self) -> NtxResult<HealthStatus> {
        self.orchestrate(
            |s| Box::pin(s.health_status()),
            |s| Box::pin(s.health_status()),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FlakyPrimary {
        calls: Arc<AtomicUsize>,
        fail_with: fn() -> NtxError,
    }

    #[async_trait]
    impl Scraper for FlakyPrimary {
        async fn companies(&self) -> NtxResult<Vec<Company>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.fail_with)())
        }
        async fn securities(&self) -> NtxResult<Vec<Company>> {
            unimplemented!()
        }
        async fn live_prices(&self) -> NtxResult<Vec<Price>> {
            unimplemented!()
        }
        async fn price_history(&self, _: &str, _: NaiveDate, _: NaiveDate) -> NtxResult<Vec<Price>> {
            unimplemented!()
        }
        async fn reports(&self, _: &str) -> NtxResult<Vec<Report>> {
            unimplemented!()
        }
        async fn dividends(&self, _: &str) -> NtxResult<Vec<Dividend>> {
            unimplemented!()
        }
        async fn company_profile(&self, _: &str) -> NtxResult<String> {
            unimplemented!()
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

    struct WorkingFallback;

    #[async_trait]
    impl Scraper for WorkingFallback {
        async fn companies(&self) -> NtxResult<Vec<Company>> {
            Ok(vec![])
        }
        async fn securities(&self) -> NtxResult<Vec<Company>> {
            Ok(vec![])
        }
        async fn live_prices(&self) -> NtxResult<Vec<Price>> {
            Ok(vec![])
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
    async fn unknown_symbol_never_falls_back() {
        let calls = Arc::new(AtomicUsize::new(0));
        let primary = FlakyPrimary {
            calls: calls.clone(),
            fail_with: || NtxError::Adapter(AdapterError::UnknownSymbol("XYZ".into())),
        };
        let orchestrator = OrchestratingScraper::new(Box::new(primary), Some(Box::new(WorkingFallback)));
        let result = orchestrator.companies().await;
        assert!(matches!(result, Err(NtxError::Adapter(AdapterError::UnknownSymbol(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_failure_falls_back() {
        let calls = Arc::new(AtomicUsize::new(0));
        let primary = FlakyPrimary {
            calls: calls.clone(),
            fail_with: || NtxError::Adapter(AdapterError::Upstream("auth expired".into())),
        };
        let orchestrator = OrchestratingScraper::new(Box::new(primary), Some(Box::new(WorkingFallback)));
        let result = orchestrator.companies().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn failure_with_no_fallback_is_classified_transient() {
        let calls = Arc::new(AtomicUsize::new(0));
        let primary = FlakyPrimary {
            calls,
            fail_with: || NtxError::Adapter(AdapterError::Upstream("503".into())),
        };
        let orchestrator = OrchestratingScraper::new(Box::new(primary), None);
        let result = orchestrator.companies().await;
        assert!(matches!(result, Err(NtxError::Adapter(AdapterError::Transient(_)))));
    }
}
