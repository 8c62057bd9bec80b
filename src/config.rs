//! Runtime configuration.
//!
//! Config *bootstrapping* (interactive first-run wizards) is out of
//! scope — this module only loads a struct from a path the caller
//! supplies, falling back to documented defaults for anything the file
//! omits.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NtxConfig {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub worker: WorkerConfig,
    pub backfill: BackfillConfig,
    pub backup: BackupConfig,
    pub rpc: RpcConfig,
    pub adapter: AdapterConfig,
}

impl Default for NtxConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            db_path: data_dir.join("ntx.db"),
            data_dir,
            worker: WorkerConfig::default(),
            backfill: BackfillConfig::default(),
            backup: BackupConfig::default(),
            rpc: RpcConfig::default(),
            adapter: AdapterConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ntx")
}

impl NtxConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)?;
        Ok(cfg)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }
}

/// Market clock + sync worker hours (spec §4.C default 11–15 NPT).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub open_hour: u32,
    pub close_hour: u32,
    pub intraday_poll_secs: u64,
    pub close_snapshot_poll_secs: u64,
    pub next_open_cap_secs: u64,
    /// Declared non-trading days (festivals, ad-hoc exchange closures)
    /// on top of the standing Friday/Saturday weekend. Empty until the
    /// operator fills in the published NEPSE holiday calendar.
    pub holidays: Vec<NaiveDate>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            open_hour: 11,
            close_hour: 15,
            intraday_poll_secs: 60,
            close_snapshot_poll_secs: 30,
            next_open_cap_secs: 3600,
            holidays: Vec::new(),
        }
    }
}

impl WorkerConfig {
    pub fn holiday_set(&self) -> HashSet<NaiveDate> {
        self.holidays.iter().copied().collect()
    }
}

/// Backfill pipeline worker-pool defaults (spec §4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    pub concurrency: usize,
    pub rate_limit_ms: u64,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            rate_limit_ms: 200,
        }
    }
}

/// Backup retention (spec §6: newest N or by age, whichever is stricter).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub retain_count: usize,
    pub retain_days: i64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            retain_count: 30,
            retain_days: 30,
        }
    }
}

/// Upstream base URLs (spec §4.B). Both point at placeholder hosts by
/// default; a real deployment overrides these in its config file rather
/// than the binary hardcoding a reverse-engineered endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub primary_base_url: String,
    pub fallback_base_url: Option<String>,
    pub canary_symbol: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            primary_base_url: "https://api.nepalstock.example".to_string(),
            fallback_base_url: Some("https://fallback.nepalstock.example".to_string()),
            canary_symbol: "NABIL".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub bind_addr: String,
    pub default_page_limit: u32,
    pub max_page_limit: u32,
    /// How often the market index feed (§4.H `ListIndices`, §5 "market
    /// service update path") polls the scraper for a fresh NEPSE index
    /// and sub-indices snapshot.
    pub index_refresh_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
            default_page_limit: 20,
            max_page_limit: 200,
            index_refresh_secs: 30,
        }
    }
}
