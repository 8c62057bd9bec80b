//! `ntx_core`: storage, upstream adapters, the market clock, the sync
//! worker, backfill, Meroshare/TMS ingestion, portfolio accounting,
//! validation, and the RPC surface. The three binaries under `src/bin`
//! (`ntxd`, `backfill`, `import`) are thin wiring over this library.

pub mod adapter;
pub mod backfill;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod meroshare;
pub mod portfolio;
pub mod rpc;
pub mod storage;
pub mod validation;
pub mod worker;
