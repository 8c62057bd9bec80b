//! Core data model (spec §3). Names here are concept-level entities, not
//! table names — the storage layer (`src/storage`) is free to shape rows
//! however it needs to.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Fixed 13-value sector domain plus `Unspecified`, append-only per the
/// storage engine's invariant (§4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sector {
    CommercialBank,
    DevelopmentBank,
    Finance,
    MicrofinanceLaghubitta,
    LifeInsurance,
    NonLifeInsurance,
    Hydropower,
    Hotel,
    Manufacturing,
    TradingCompany,
    Investment,
    MutualFund,
    Others,
    Unspecified,
}

impl Sector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommercialBank => "COMMERCIAL_BANK",
            Self::DevelopmentBank => "DEVELOPMENT_BANK",
            Self::Finance => "FINANCE",
            Self::MicrofinanceLaghubitta => "MICROFINANCE_LAGHUBITTA",
            Self::LifeInsurance => "LIFE_INSURANCE",
            Self::NonLifeInsurance => "NON_LIFE_INSURANCE",
            Self::Hydropower => "HYDROPOWER",
            Self::Hotel => "HOTEL",
            Self::Manufacturing => "MANUFACTURING",
            Self::TradingCompany => "TRADING_COMPANY",
            Self::Investment => "INVESTMENT",
            Self::MutualFund => "MUTUAL_FUND",
            Self::Others => "OTHERS",
            Self::Unspecified => "UNSPECIFIED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "COMMERCIAL_BANK" => Self::CommercialBank,
            "DEVELOPMENT_BANK" => Self::DevelopmentBank,
            "FINANCE" => Self::Finance,
            "MICROFINANCE_LAGHUBITTA" => Self::MicrofinanceLaghubitta,
            "LIFE_INSURANCE" => Self::LifeInsurance,
            "NON_LIFE_INSURANCE" => Self::NonLifeInsurance,
            "HYDROPOWER" => Self::Hydropower,
            "HOTEL" => Self::Hotel,
            "MANUFACTURING" => Self::Manufacturing,
            "TRADING_COMPANY" => Self::TradingCompany,
            "INVESTMENT" => Self::Investment,
            "MUTUAL_FUND" => Self::MutualFund,
            "OTHERS" => Self::Others,
            _ => Self::Unspecified,
        }
    }

    /// Lot size multiple for quantity validation (§4.I).
    pub fn lot_size(&self) -> i64 {
        match self {
            Self::CommercialBank | Self::DevelopmentBank | Self::Finance => 10,
            Self::LifeInsurance | Self::NonLifeInsurance => 100,
            _ => 10,
        }
    }

    /// Every sector value, `Unspecified` included — used to enumerate
    /// per-sector aggregates (spec §4.H `ListSectors`) without relying on
    /// which sectors happen to have a company row yet.
    pub const ALL: [Sector; 14] = [
        Self::CommercialBank,
        Self::DevelopmentBank,
        Self::Finance,
        Self::MicrofinanceLaghubitta,
        Self::LifeInsurance,
        Self::NonLifeInsurance,
        Self::Hydropower,
        Self::Hotel,
        Self::Manufacturing,
        Self::TradingCompany,
        Self::Investment,
        Self::MutualFund,
        Self::Others,
        Self::Unspecified,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub symbol: String,
    pub name: String,
    pub sector: Sector,
    pub description: Option<String>,
    pub logo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub previous_close: Option<i64>,
    pub volume: i64,
    pub turnover: Option<i64>,
    pub is_complete: bool,
    pub week52_high: Option<i64>,
    pub week52_low: Option<i64>,
}

impl Price {
    /// `0 ≤ low ≤ open,close ≤ high` and `volume ≥ 0` (§4.A invariants).
    pub fn satisfies_ohlc_invariant(&self) -> bool {
        self.volume >= 0
            && self.low >= 0
            && self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Quarterly,
    Annual,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "quarterly" => Some(Self::Quarterly),
            "annual" => Some(Self::Annual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub symbol: String,
    pub report_type: ReportType,
    pub fiscal_year: i32,
    pub quarter: Option<i32>,
    pub eps: Option<f64>,
    pub book_value: Option<f64>,
    pub net_income: Option<i64>,
    pub published_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dividend {
    pub symbol: String,
    pub fiscal_year: i32,
    pub cash_percent: f64,
    pub bonus_percent: f64,
    pub headline: Option<String>,
    pub published_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fundamentals {
    pub symbol: String,
    pub pe: Option<f64>,
    pub pb: Option<f64>,
    pub eps: Option<f64>,
    pub book_value: Option<f64>,
    pub market_cap: Option<i64>,
    pub dividend_yield: Option<f64>,
    pub roe: Option<f64>,
    pub shares_outstanding: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub id: i64,
    pub name: String,
    pub owner: String,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl Portfolio {
    pub fn currency_default() -> String {
        "NPR".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Buy,
    Sell,
    Bonus,
    Rights,
    MergerCr,
    MergerDr,
    Ipo,
    Other,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Bonus => "BONUS",
            Self::Rights => "RIGHTS",
            Self::MergerCr => "MERGER_CR",
            Self::MergerDr => "MERGER_DR",
            Self::Ipo => "IPO",
            Self::Other => "OTHER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            "BONUS" => Some(Self::Bonus),
            "RIGHTS" => Some(Self::Rights),
            "MERGER_CR" => Some(Self::MergerCr),
            "MERGER_DR" => Some(Self::MergerDr),
            "IPO" => Some(Self::Ipo),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }

    /// Does this transaction type create a new FIFO lot?
    pub fn creates_lot(&self) -> bool {
        matches!(self, Self::Buy | Self::Rights | Self::Ipo | Self::Bonus | Self::MergerCr)
    }

    /// Does this transaction type consume existing lots?
    pub fn consumes_lots(&self) -> bool {
        matches!(self, Self::Sell | Self::MergerDr)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub portfolio_id: i64,
    pub symbol: String,
    pub transaction_type: TransactionType,
    pub date: NaiveDate,
    pub quantity: i64,
    /// Paisa-exact: 1/100 of a rupee.
    pub unit_price: i64,
    pub commission: Option<i64>,
    pub tax: Option<i64>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub portfolio_id: i64,
    pub symbol: String,
    pub quantity: i64,
    /// Paisa-exact weighted average cost per share.
    pub weighted_avg_cost: i64,
    pub realized_pl_to_date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealizedGain {
    pub portfolio_id: i64,
    pub symbol: String,
    pub sale_tx_id: i64,
    pub quantity: i64,
    pub sale_price: i64,
    pub cost_basis: i64,
    pub gain: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingDayState {
    Pending,
    Completed,
}

impl TradingDayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingDay {
    pub date: NaiveDate,
    pub is_trading_day: bool,
    pub state: TradingDayState,
}

/// A snapshot of the main index or one sub-index (spec §4.H
/// `ListIndices`). `name` is `"NEPSE"` for the main index, or the
/// sub-index's own name (e.g. `"BANKING"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexPoint {
    pub name: String,
    pub value: f64,
    pub change_percent: f64,
    pub as_of: NaiveDate,
}

/// Per-sector aggregate (spec §4.H `ListSectors`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorSummary {
    pub sector: Sector,
    pub stock_count: u32,
    pub turnover: i64,
}
