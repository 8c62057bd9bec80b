//! RPC surface (§4.H): one module per service (`company`, `price`,
//! `market`, `screener`, `portfolio`), each exposing plain async
//! functions over a typed request/response pair: one function per verb,
//! `Result<T, RpcError>` returned to the caller so the error carries a
//! stable classification instead of free text. `server.rs` wires these
//! onto `axum` routes.

pub mod company;
pub mod market;
pub mod portfolio;
pub mod price;
pub mod screener;
pub mod server;

use crate::clock::MarketClock;
use crate::config::RpcConfig;
use crate::error::RpcError;
use crate::rpc::market::IndexCache;
use crate::storage::Store;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Shared dependencies every handler reaches for. Cheap to clone (the
/// lock table and the store are both `Arc`-backed internally).
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub clock: Arc<MarketClock>,
    pub config: RpcConfig,
    pub index_cache: IndexCache,
    portfolio_locks: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl AppState {
    pub fn new(store: Store, clock: MarketClock, config: RpcConfig) -> Self {
        Self {
            store,
            clock: Arc::new(clock),
            config,
            index_cache: IndexCache::new(),
            portfolio_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Serializes mutation handlers per portfolio id (spec §5: "portfolio
    /// mutations which acquire a per-portfolio-id lock"). Two concurrent
    /// callers mutating different portfolios never block each other.
    pub async fn lock_portfolio(&self, portfolio_id: i64) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.portfolio_locks.lock().expect("portfolio lock table poisoned");
            locks
                .entry(portfolio_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = match &self {
            RpcError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            RpcError::NotFound(_) => StatusCode::NOT_FOUND,
            RpcError::Internal(e) => {
                log::error!("internal RPC error: {e:#}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            code: status_code_name(&self),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn status_code_name(e: &RpcError) -> &'static str {
    match e {
        RpcError::InvalidArgument(_) => "invalid_argument",
        RpcError::NotFound(_) => "not_found",
        RpcError::Internal(_) => "internal",
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

pub type RpcResult<T> = Result<Json<T>, RpcError>;
