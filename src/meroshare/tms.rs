//! TMS Trade Book CSV parser (§6, optional input). Ten columns; only
//! the ones the portfolio core needs are kept. The 8-character prefix
//! of `EXCHANGE TRADE ID` encodes a calendar date — treated here as a
//! literal Gregorian `YYYYMMDD`, the same date representation used
//! everywhere else in the store (see DESIGN.md for why the Nepali
//! Bikram Sambat calendar conversion this implies upstream is left
//! undone).

use super::RowError;
use crate::domain::TransactionType;
use chrono::NaiveDate;
use std::io::Read;

pub const EXPECTED_COLUMN_COUNT: usize = 10;

#[derive(Debug, Clone)]
pub struct TmsTrade {
    pub row_number: usize,
    pub symbol: String,
    pub date: NaiveDate,
    pub transaction_type: TransactionType,
    pub quantity: i64,
    /// Paisa-exact.
    pub unit_price: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TmsImportResult {
    pub trades: Vec<TmsTrade>,
    pub errors: Vec<RowError>,
}

fn trade_date_from_id(trade_id: &str) -> Option<NaiveDate> {
    let prefix = trade_id.get(0..8)?;
    NaiveDate::parse_from_str(prefix, "%Y%m%d").ok()
}

pub fn parse(reader: impl Read) -> Result<TmsImportResult, String> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let headers = csv_reader.headers().map_err(|e| format!("cannot read header row: {e}"))?.clone();
    let col = |name: &str| -> Result<usize, String> {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("missing column {name}"))
    };
    let symbol_col = col("SYMBOL")?;
    let trade_id_col = col("EXCHANGE TRADE ID")?;
    let side_col = col("BUY/SELL")?;
    let qty_col = col("TRADE QTY")?;
    let price_col = col("PRICE(NPR)")?;

    let mut result = TmsImportResult::default();
    for (index, record) in csv_reader.records().enumerate() {
        let row_number = index + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                result.errors.push(RowError { row_number, message: e.to_string() });
                continue;
            }
        };
        if record.len() != EXPECTED_COLUMN_COUNT {
            result.errors.push(RowError {
                row_number,
                message: format!("expected {EXPECTED_COLUMN_COUNT} columns, got {}", record.len()),
            });
            continue;
        }

        let trade_id = record[trade_id_col].trim();
        let date = match trade_date_from_id(trade_id) {
            Some(d) => d,
            None => {
                result.errors.push(RowError {
                    row_number,
                    message: format!("cannot derive date from trade id {trade_id}"),
                });
                continue;
            }
        };

        let side = record[side_col].trim().to_uppercase();
        let transaction_type = match side.as_str() {
            "BUY" | "B" => TransactionType::Buy,
            "SELL" | "S" => TransactionType::Sell,
            other => {
                result.errors.push(RowError { row_number, message: format!("unrecognized side {other}") });
                continue;
            }
        };

        let quantity: i64 = match record[qty_col].trim().replace(',', "").parse() {
            Ok(q) => q,
            Err(e) => {
                result.errors.push(RowError { row_number, message: format!("bad quantity: {e}") });
                continue;
            }
        };
        let price_rupees: f64 = match record[price_col].trim().replace(',', "").parse() {
            Ok(p) => p,
            Err(e) => {
                result.errors.push(RowError { row_number, message: format!("bad price: {e}") });
                continue;
            }
        };

        result.trades.push(TmsTrade {
            row_number,
            symbol: record[symbol_col].trim().to_string(),
            date,
            transaction_type,
            quantity,
            unit_price: (price_rupees * 100.0).round() as i64,
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "SYMBOL,EXCHANGE,EXCHANGE TRADE ID,BUY/SELL,TRADE QTY,PRICE(NPR),Value(NPR),CONTRACT NO,SETTLEMENT ID,REMARKS\n";

    #[test]
    fn parses_a_buy_row_and_derives_date_from_trade_id() {
        let csv = format!("{HEADER}NABIL,NEPSE,20240616AB,BUY,10,505.50,5055.00,C1,S1,\n");
        let result = parse(csv.as_bytes()).unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.symbol, "NABIL");
        assert_eq!(trade.transaction_type, TransactionType::Buy);
        assert_eq!(trade.quantity, 10);
        assert_eq!(trade.unit_price, 50550);
        assert_eq!(trade.date, NaiveDate::from_ymd_opt(2024, 6, 16).unwrap());
    }

    #[test]
    fn unparseable_trade_id_is_a_row_error() {
        let csv = format!("{HEADER}NABIL,NEPSE,bad,BUY,10,505.50,5055.00,C1,S1,\n");
        let result = parse(csv.as_bytes()).unwrap();
        assert_eq!(result.trades.len(), 0);
        assert_eq!(result.errors.len(), 1);
    }
}
