//! Read-only portfolio analytics (§4.G "Allocation & health
//! heuristics"): unrealized P&L, day change, summary aggregates, sector
//! allocation, daily movers, health tips. Grounded on
//! `performance/mod.rs`'s `CashFlow`/`PortfolioValue` computation style
//! — pure functions over already-fetched rows, `f64` only at the
//! presentation edge, paisa integers internally.

use crate::domain::{Holding, Price, Sector};
use std::collections::HashMap;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingView {
    pub symbol: String,
    pub sector: Sector,
    pub quantity: i64,
    pub weighted_avg_cost: i64,
    pub current_price: i64,
    pub market_value: i64,
    pub unrealized_pl: i64,
    pub day_change: i64,
    pub day_change_percent: Option<f64>,
}

/// `price` is the holding's latest stored row, if any — a holding with
/// no price yet (freshly listed, or upstream outage) values at zero
/// rather than erroring.
pub fn build_holding_view(holding: &Holding, sector: Sector, price: Option<&Price>) -> HoldingView {
    let (current_price, day_change, day_change_percent) = match price {
        Some(p) => {
            let previous = p.previous_close.unwrap_or(p.close);
            let change = (p.close - previous) * holding.quantity;
            let percent = if previous != 0 {
                Some((p.close - previous) as f64 / previous as f64 * 100.0)
            } else {
                None
            };
            (p.close, change, percent)
        }
        None => (0, 0, None),
    };

    HoldingView {
        symbol: holding.symbol.clone(),
        sector,
        quantity: holding.quantity,
        weighted_avg_cost: holding.weighted_avg_cost,
        current_price,
        market_value: current_price * holding.quantity,
        unrealized_pl: (current_price - holding.weighted_avg_cost) * holding.quantity,
        day_change,
        day_change_percent,
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub total_market_value: i64,
    pub total_cost_basis: i64,
    pub total_unrealized_pl: i64,
    pub total_day_change: i64,
    pub total_realized_pl: i64,
}

pub fn summarize(holdings: &[HoldingView], total_realized_pl: i64) -> PortfolioSummary {
    let mut summary = PortfolioSummary {
        total_realized_pl,
        ..Default::default()
    };
    for h in holdings {
        summary.total_market_value += h.market_value;
        summary.total_cost_basis += h.weighted_avg_cost * h.quantity;
        summary.total_unrealized_pl += h.unrealized_pl;
        summary.total_day_change += h.day_change;
    }
    summary
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorAllocation {
    pub sector: Sector,
    pub market_value: i64,
    pub percent_of_portfolio: f64,
}

pub fn sector_allocation(holdings: &[HoldingView]) -> Vec<SectorAllocation> {
    let total: i64 = holdings.iter().map(|h| h.market_value).sum();
    let mut by_sector: HashMap<Sector, i64> = HashMap::new();
    for h in holdings {
        *by_sector.entry(h.sector).or_insert(0) += h.market_value;
    }

    let mut rows: Vec<SectorAllocation> = by_sector
        .into_iter()
        .map(|(sector, market_value)| SectorAllocation {
            sector,
            market_value,
            percent_of_portfolio: if total != 0 {
                market_value as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        })
        .collect();
    rows.sort_by(|a, b| b.market_value.cmp(&a.market_value));
    rows
}

/// Top-`k` holdings by `|day_change_percent|`, largest mover first.
/// Holdings with no price (and so no day-change percent) sort last.
pub fn daily_movers(holdings: &[HoldingView], k: usize) -> Vec<HoldingView> {
    let mut sorted = holdings.to_vec();
    sorted.sort_by(|a, b| {
        let a_abs = a.day_change_percent.map(f64::abs).unwrap_or(-1.0);
        let b_abs = b.day_change_percent.map(f64::abs).unwrap_or(-1.0);
        b_abs.partial_cmp(&a_abs).unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.truncate(k);
    sorted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthTipLevel {
    Warning,
    Info,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthTip {
    pub level: HealthTipLevel,
    pub message: String,
}

const SINGLE_HOLDING_WARNING_PERCENT: f64 = 30.0;
const SECTOR_CONCENTRATION_INFO_PERCENT: f64 = 40.0;

/// WARNING if a single holding exceeds 30% of portfolio market value;
/// INFO if a sector exceeds 40% (spec §4.G).
pub fn health_tips(holdings: &[HoldingView], allocation: &[SectorAllocation]) -> Vec<HealthTip> {
    let total: i64 = holdings.iter().map(|h| h.market_value).sum();
    let mut tips = Vec::new();

    if total > 0 {
        for h in holdings {
            let percent = h.market_value as f64 / total as f64 * 100.0;
            if percent > SINGLE_HOLDING_WARNING_PERCENT {
                tips.push(HealthTip {
                    level: HealthTipLevel::Warning,
                    message: format!(
                        "{} is {percent:.1}% of the portfolio, above the {SINGLE_HOLDING_WARNING_PERCENT:.0}% concentration threshold",
                        h.symbol
                    ),
                });
            }
        }
    }

    for sector in allocation {
        if sector.percent_of_portfolio > SECTOR_CONCENTRATION_INFO_PERCENT {
            tips.push(HealthTip {
                level: HealthTipLevel::Info,
                message: format!(
                    "{} sector is {:.1}% of the portfolio",
                    sector.sector.as_str(),
                    sector.percent_of_portfolio
                ),
            });
        }
    }

    tips
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn price(close: i64, previous_close: i64) -> Price {
        Price {
            symbol: "NABIL".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            previous_close: Some(previous_close),
            volume: 0,
            turnover: None,
            is_complete: true,
            week52_high: None,
            week52_low: None,
        }
    }

    fn holding(symbol: &str, quantity: i64, wac: i64) -> Holding {
        Holding {
            portfolio_id: 1,
            symbol: symbol.to_string(),
            quantity,
            weighted_avg_cost: wac,
            realized_pl_to_date: 0,
        }
    }

    #[test]
    fn unrealized_pl_and_day_change_use_latest_price() {
        let h = holding("NABIL", 10, 9_000);
        let p = price(10_000, 9_500);
        let view = build_holding_view(&h, Sector::CommercialBank, Some(&p));
        assert_eq!(view.unrealized_pl, (10_000 - 9_000) * 10);
        assert_eq!(view.day_change, (10_000 - 9_500) * 10);
        assert_eq!(view.day_change_percent, Some(500.0 / 9_500.0 * 100.0));
    }

    #[test]
    fn holding_with_no_price_values_at_zero() {
        let h = holding("NEWCO", 5, 1_000);
        let view = build_holding_view(&h, Sector::Unspecified, None);
        assert_eq!(view.market_value, 0);
        assert_eq!(view.day_change_percent, None);
    }

    #[test]
    fn single_holding_over_30_percent_triggers_a_warning() {
        let big = build_holding_view(&holding("NABIL", 100, 5_000), Sector::CommercialBank, Some(&price(10_000, 10_000)));
        let small = build_holding_view(&holding("SCB", 10, 5_000), Sector::CommercialBank, Some(&price(1_000, 1_000)));
        let holdings = vec![big, small];
        let allocation = sector_allocation(&holdings);
        let tips = health_tips(&holdings, &allocation);
        assert!(tips.iter().any(|t| t.level == HealthTipLevel::Warning));
    }

    #[test]
    fn sector_over_40_percent_triggers_an_info_tip_even_split_across_holdings() {
        let a = build_holding_view(&holding("NABIL", 50, 1_000), Sector::CommercialBank, Some(&price(1_000, 1_000)));
        let b = build_holding_view(&holding("SCB", 50, 1_000), Sector::CommercialBank, Some(&price(1_000, 1_000)));
        let c = build_holding_view(&holding("CHCL", 10, 1_000), Sector::Hydropower, Some(&price(1_000, 1_000)));
        let holdings = vec![a, b, c];
        let allocation = sector_allocation(&holdings);
        let tips = health_tips(&holdings, &allocation);
        assert!(tips.iter().any(|t| t.level == HealthTipLevel::Info));
        // Neither individual bank holding exceeds 30%, so only the
        // sector-level tip should fire.
        assert!(!tips.iter().any(|t| t.level == HealthTipLevel::Warning));
    }

    #[test]
    fn daily_movers_ranks_by_absolute_percent_change() {
        let up = build_holding_view(&holding("NABIL", 10, 1_000), Sector::CommercialBank, Some(&price(1_100, 1_000)));
        let down = build_holding_view(&holding("SCB", 10, 1_000), Sector::CommercialBank, Some(&price(800, 1_000)));
        let flat = build_holding_view(&holding("CHCL", 10, 1_000), Sector::Hydropower, Some(&price(1_000, 1_000)));
        let movers = daily_movers(&[flat.clone(), up, down], 2);
        assert_eq!(movers.len(), 2);
        assert_eq!(movers[0].symbol, "SCB");
        assert_eq!(movers[1].symbol, "NABIL");
    }
}
