//! Retry-with-backoff wrapper for adapter HTTP calls (spec §4.B: "max 3
//! attempts, 30 s base"). Backoff sequence is base/4, base/2, base —
//! three attempts total, so a call that keeps failing gives up after
//! `30/4 + 30/2 + 30 = 52.5s` of sleeping, not 90s.

use crate::error::{AdapterError, NtxError, NtxResult};
use std::future::Future;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;

pub async fn retry_with_backoff<T, F, Fut>(base: Duration, mut attempt: F) -> NtxResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = NtxResult<T>>,
{
    let mut last_err = None;
    for n in 0..MAX_ATTEMPTS {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(NtxError::Adapter(AdapterError::UnknownSymbol(s))) => {
                // Not retryable: retrying can't make a symbol exist.
                return Err(NtxError::Adapter(AdapterError::UnknownSymbol(s)));
            }
            Err(e) => {
                last_err = Some(e);
                if n + 1 < MAX_ATTEMPTS {
                    let sleep_for = base / (1 << (MAX_ATTEMPTS - n - 1));
                    tokio::time::sleep(sleep_for).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| NtxError::Adapter(AdapterError::Transient("retry loop produced no error".into()))))
}
