//! Portfolio core (§4.G): pure functions over a transaction stream,
//! producing Holdings and RealizedGains, covering the
//! `BUY/SELL/BONUS/RIGHTS/MERGER_CR/MERGER_DR/IPO/OTHER` transaction-type
//! set. The replay runs entirely over an in-memory `Vec<Transaction>`
//! and hands back plain values — it never touches a `rusqlite::
//! Connection` itself; the caller decides whether and how to persist
//! the result via `storage::queries::
//! replace_realized_gains_for_portfolio`. Per-portfolio-id
//! serialization lives one layer up, in the RPC service that owns the
//! lock table, not here.

pub mod analytics;

use crate::domain::{Holding, RealizedGain, Transaction, TransactionType};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

/// An open purchase lot. `unit_cost` is per-share, paisa-exact.
#[derive(Debug, Clone)]
pub struct Lot {
    pub symbol: String,
    pub purchase_tx_id: i64,
    pub acquired_at: NaiveDate,
    pub original_qty: i64,
    pub remaining_qty: i64,
    pub unit_cost: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayResult {
    pub lots: Vec<Lot>,
    pub realized_gains: Vec<RealizedGain>,
    /// Non-fatal: a SELL or MERGER_DR consuming more shares than were
    /// open. The replay continues with whatever was available.
    pub errors: Vec<String>,
}

fn push_lot(lots_by_symbol: &mut HashMap<String, Vec<Lot>>, tx: &Transaction, unit_cost: i64) {
    lots_by_symbol.entry(tx.symbol.clone()).or_default().push(Lot {
        symbol: tx.symbol.clone(),
        purchase_tx_id: tx.id,
        acquired_at: tx.date,
        original_qty: tx.quantity,
        remaining_qty: tx.quantity,
        unit_cost,
    });
}

/// Consumes up to `tx.quantity` shares FIFO from `tx.symbol`'s open
/// lots. Returns `(total_cost_basis, quantity_consumed, quantity_left_unconsumed)`.
fn consume_lots(lots_by_symbol: &mut HashMap<String, Vec<Lot>>, tx: &Transaction) -> (i64, i64, i64) {
    let lots = lots_by_symbol.entry(tx.symbol.clone()).or_default();
    let mut remaining = tx.quantity;
    let mut total_cost = 0i64;
    let mut consumed_qty = 0i64;
    for lot in lots.iter_mut() {
        if remaining <= 0 {
            break;
        }
        if lot.remaining_qty <= 0 {
            continue;
        }
        let consumed = remaining.min(lot.remaining_qty);
        total_cost += lot.unit_cost * consumed;
        consumed_qty += consumed;
        lot.remaining_qty -= consumed;
        remaining -= consumed;
    }
    (total_cost, consumed_qty, remaining)
}

#[derive(Debug, Clone)]
struct DrRecord {
    tx_id: i64,
    quantity: i64,
    total_cost_basis: i64,
}

/// Replays every symbol's queue ignoring `MERGER_CR` (which never
/// consumes) to learn each `MERGER_DR`'s total cost basis ahead of the
/// main pass, computed once rather than looked up live. Pairing a
/// `MERGER_CR` to a `MERGER_DR` is date-based, not id-based: there is no
/// cross-entry table, so same-date is the only signal available (spec
/// §9 Open Question, preserved — see DESIGN.md).
fn compute_merger_dr_costs(ordered: &[&Transaction]) -> HashMap<NaiveDate, Vec<DrRecord>> {
    let mut lots_by_symbol: HashMap<String, Vec<Lot>> = HashMap::new();
    let mut by_date: HashMap<NaiveDate, Vec<DrRecord>> = HashMap::new();

    for tx in ordered {
        match tx.transaction_type {
            TransactionType::Buy | TransactionType::Rights | TransactionType::Ipo => {
                push_lot(&mut lots_by_symbol, tx, tx.unit_price);
            }
            TransactionType::Bonus => {
                push_lot(&mut lots_by_symbol, tx, 0);
            }
            TransactionType::Sell => {
                consume_lots(&mut lots_by_symbol, tx);
            }
            TransactionType::MergerDr => {
                let (total_cost_basis, quantity, _) = consume_lots(&mut lots_by_symbol, tx);
                by_date.entry(tx.date).or_default().push(DrRecord {
                    tx_id: tx.id,
                    quantity,
                    total_cost_basis,
                });
            }
            TransactionType::MergerCr | TransactionType::Other => {}
        }
    }

    by_date
}

/// Replays one portfolio's full transaction history, ordered by
/// `(date, id)` per spec §5. `P3 (Transaction replay)` holds: calling
/// this twice on the same input yields identical output, since nothing
/// here reads wall-clock time or mutates shared state.
pub fn replay_portfolio(transactions: &[Transaction]) -> ReplayResult {
    let mut ordered: Vec<&Transaction> = transactions.iter().collect();
    ordered.sort_by_key(|tx| (tx.date, tx.id));

    let dr_costs_by_date = compute_merger_dr_costs(&ordered);
    let mut claimed: HashSet<i64> = HashSet::new();

    let mut lots_by_symbol: HashMap<String, Vec<Lot>> = HashMap::new();
    let mut realized_gains = Vec::new();
    let mut errors = Vec::new();

    for tx in &ordered {
        match tx.transaction_type {
            TransactionType::Buy | TransactionType::Rights | TransactionType::Ipo => {
                push_lot(&mut lots_by_symbol, tx, tx.unit_price);
            }
            TransactionType::Bonus => {
                push_lot(&mut lots_by_symbol, tx, 0);
            }
            TransactionType::Sell => {
                let lots = lots_by_symbol.entry(tx.symbol.clone()).or_default();
                let mut remaining = tx.quantity;
                for lot in lots.iter_mut() {
                    if remaining <= 0 {
                        break;
                    }
                    if lot.remaining_qty <= 0 {
                        continue;
                    }
                    let consumed = remaining.min(lot.remaining_qty);
                    realized_gains.push(RealizedGain {
                        portfolio_id: tx.portfolio_id,
                        symbol: tx.symbol.clone(),
                        sale_tx_id: tx.id,
                        quantity: consumed,
                        sale_price: tx.unit_price,
                        cost_basis: lot.unit_cost,
                        gain: (tx.unit_price - lot.unit_cost) * consumed,
                    });
                    lot.remaining_qty -= consumed;
                    remaining -= consumed;
                }
                if remaining > 0 {
                    errors.push(format!(
                        "transaction {}: sell of {} {} exceeds open position by {remaining} shares",
                        tx.id, tx.quantity, tx.symbol
                    ));
                }
            }
            TransactionType::MergerDr => {
                let (total_cost, consumed_qty, unconsumed) = consume_lots(&mut lots_by_symbol, tx);
                // No gain realized; recorded alongside RealizedGain for
                // audit per spec §4.G, distinguished by sale_price = 0.
                realized_gains.push(RealizedGain {
                    portfolio_id: tx.portfolio_id,
                    symbol: tx.symbol.clone(),
                    sale_tx_id: tx.id,
                    quantity: consumed_qty,
                    sale_price: 0,
                    cost_basis: total_cost,
                    gain: 0,
                });
                if unconsumed > 0 {
                    errors.push(format!(
                        "transaction {}: merger debit of {} {} exceeds open position by {unconsumed} shares",
                        tx.id, tx.quantity, tx.symbol
                    ));
                }
            }
            TransactionType::MergerCr => {
                let matched = dr_costs_by_date
                    .get(&tx.date)
                    .and_then(|records| records.iter().find(|r| !claimed.contains(&r.tx_id)));
                let unit_cost = match matched {
                    Some(record) if record.quantity > 0 => {
                        claimed.insert(record.tx_id);
                        record.total_cost_basis / record.quantity
                    }
                    _ => 0,
                };
                push_lot(&mut lots_by_symbol, tx, unit_cost);
            }
            TransactionType::Other => {}
        }
    }

    let lots = lots_by_symbol
        .into_values()
        .flatten()
        .filter(|lot| lot.remaining_qty > 0)
        .collect();

    ReplayResult {
        lots,
        realized_gains,
        errors,
    }
}

/// Derives `Holding` rows (quantity, WAC, realized P&L to date) from a
/// replay's open lots and realized gains, aggregating in memory rather
/// than with a SQL `GROUP BY`.
pub fn holdings_from_result(portfolio_id: i64, result: &ReplayResult) -> Vec<Holding> {
    let mut by_symbol: HashMap<&str, (i64, i64)> = HashMap::new();
    for lot in &result.lots {
        let entry = by_symbol.entry(lot.symbol.as_str()).or_insert((0, 0));
        entry.0 += lot.remaining_qty;
        entry.1 += lot.remaining_qty * lot.unit_cost;
    }

    let mut realized_by_symbol: HashMap<&str, i64> = HashMap::new();
    for gain in &result.realized_gains {
        *realized_by_symbol.entry(gain.symbol.as_str()).or_insert(0) += gain.gain;
    }

    by_symbol
        .into_iter()
        .filter(|(_, (qty, _))| *qty > 0)
        .map(|(symbol, (qty, total_cost))| Holding {
            portfolio_id,
            symbol: symbol.to_string(),
            quantity: qty,
            weighted_avg_cost: total_cost / qty,
            realized_pl_to_date: realized_by_symbol.get(symbol).copied().unwrap_or(0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(
        id: i64,
        symbol: &str,
        transaction_type: TransactionType,
        date: NaiveDate,
        quantity: i64,
        unit_price: i64,
    ) -> Transaction {
        Transaction {
            id,
            portfolio_id: 1,
            symbol: symbol.to_string(),
            transaction_type,
            date,
            quantity,
            unit_price,
            commission: None,
            tax: None,
            note: None,
        }
    }

    #[test]
    fn bonus_then_sell_matches_the_worked_example() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let txs = vec![
            tx(1, "NABIL", TransactionType::Buy, d, 100, 10_000),
            tx(2, "NABIL", TransactionType::Buy, d, 50, 10_000),
            tx(3, "NABIL", TransactionType::Bonus, d, 20, 0),
            tx(4, "NABIL", TransactionType::Sell, d, 70, 10_000),
        ];
        let result = replay_portfolio(&txs);
        assert!(result.errors.is_empty());
        assert_eq!(result.realized_gains.len(), 1);
        let gain = &result.realized_gains[0];
        assert_eq!(gain.quantity, 70);
        assert_eq!(gain.cost_basis, 10_000);
        assert_eq!(gain.gain, 0);

        let holdings = holdings_from_result(1, &result);
        let nabil = holdings.iter().find(|h| h.symbol == "NABIL").unwrap();
        assert_eq!(nabil.quantity, 100);
        assert_eq!(nabil.weighted_avg_cost, 8_000);
    }

    #[test]
    fn merger_dr_and_cr_pair_across_symbols_on_the_same_date() {
        let d = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let txs = vec![
            tx(1, "MEGA", TransactionType::Buy, d, 100, 10_000),
            tx(2, "MEGA", TransactionType::Bonus, d, 10, 0),
            tx(3, "MEGA", TransactionType::MergerDr, d, 110, 0),
            tx(4, "NIMB", TransactionType::MergerCr, d, 110, 0),
        ];
        let result = replay_portfolio(&txs);
        let holdings = holdings_from_result(1, &result);
        assert!(holdings.iter().all(|h| h.symbol != "MEGA"));

        let nimb = holdings.iter().find(|h| h.symbol == "NIMB").unwrap();
        assert_eq!(nimb.quantity, 110);
        let total_cost = nimb.weighted_avg_cost * nimb.quantity;
        assert!((total_cost - 1_000_000).abs() <= 110);
    }

    #[test]
    fn unpaired_merger_cr_gets_a_zero_cost_lot() {
        let d = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let txs = vec![tx(1, "NIMB", TransactionType::MergerCr, d, 50, 0)];
        let result = replay_portfolio(&txs);
        let holdings = holdings_from_result(1, &result);
        let nimb = holdings.iter().find(|h| h.symbol == "NIMB").unwrap();
        assert_eq!(nimb.quantity, 50);
        assert_eq!(nimb.weighted_avg_cost, 0);
    }

    #[test]
    fn selling_more_than_the_open_position_records_an_error() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let txs = vec![
            tx(1, "NABIL", TransactionType::Buy, d, 10, 10_000),
            tx(2, "NABIL", TransactionType::Sell, d, 20, 10_000),
        ];
        let result = replay_portfolio(&txs);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.realized_gains[0].quantity, 10);
    }

    #[test]
    fn replaying_the_same_history_twice_is_deterministic() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let txs = vec![
            tx(1, "NABIL", TransactionType::Buy, d, 10, 10_000),
            tx(2, "NABIL", TransactionType::Sell, d, 5, 11_000),
        ];
        let first = replay_portfolio(&txs);
        let second = replay_portfolio(&txs);
        assert_eq!(holdings_from_result(1, &first).len(), holdings_from_result(1, &second).len());
        assert_eq!(first.realized_gains.len(), second.realized_gains.len());
    }
}
