//! Meroshare CSV ingester (§4.F / §6): a streaming, deterministic parser
//! for depository transaction exports. Built on the `csv` crate rather
//! than hand-rolled splitting. A row is classified by matching its
//! `History Description` cell against an ordered table of
//! `starts_with`/`contains` rules, first match wins, rather than an
//! exact-equality lookup — Meroshare's description strings vary in
//! trailing detail across brokers, so exact equality would miss rows a
//! human would classify the same way.

pub mod tms;

use crate::domain::TransactionType;
use chrono::NaiveDate;
use std::io::Read;

pub const EXPECTED_HEADER: [&str; 7] = [
    "S.N",
    "Scrip",
    "Transaction Date",
    "Credit Quantity",
    "Debit Quantity",
    "Balance After Transaction",
    "History Description",
];

#[derive(Debug, Clone)]
pub struct RowError {
    pub row_number: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ParsedTransaction {
    pub row_number: usize,
    pub symbol: String,
    pub date: NaiveDate,
    pub transaction_type: TransactionType,
    pub quantity: i64,
    pub is_ipo: bool,
    /// The untouched `History Description` cell (spec §9 / P8: preserved
    /// verbatim even when classification falls back to `OTHER`).
    pub raw_description: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub transactions: Vec<ParsedTransaction>,
    pub errors: Vec<RowError>,
    /// Rows whose transaction type requires a caller-supplied price
    /// (BUY/SELL/RIGHTS) — the price must be reconciled against a
    /// broker contract note before the transaction is trustworthy.
    pub price_reconciliation_warnings: Vec<String>,
}

enum QtySource {
    Credit,
    Debit,
    Inferred,
    None,
}

enum Matcher {
    StartsWith(&'static str),
    Contains(&'static str),
    ContainsAll(&'static [&'static str]),
    /// Matches any description — the closed-world fallback rule, always
    /// last in `classification_rules` so every other rule gets first
    /// refusal.
    Any,
}

impl Matcher {
    fn matches(&self, description_upper: &str) -> bool {
        match self {
            Matcher::StartsWith(prefix) => description_upper.starts_with(&prefix.to_uppercase()),
            Matcher::Contains(needle) => description_upper.contains(&needle.to_uppercase()),
            Matcher::ContainsAll(needles) => needles.iter().all(|n| description_upper.contains(&n.to_uppercase())),
            Matcher::Any => true,
        }
    }
}

struct Rule {
    matcher: Matcher,
    txn_type: TransactionType,
    qty_source: QtySource,
    is_ipo: bool,
}

/// First match wins, case-insensitive on description — direct
/// generalization of `BrokerTemplate::type_mapping`'s flat lookup into
/// an ordered table of pattern rules.
fn classification_rules() -> Vec<Rule> {
    vec![
        Rule { matcher: Matcher::StartsWith("ON-CR"), txn_type: TransactionType::Buy, qty_source: QtySource::Credit, is_ipo: false },
        Rule { matcher: Matcher::StartsWith("ON-DR"), txn_type: TransactionType::Sell, qty_source: QtySource::Debit, is_ipo: false },
        Rule { matcher: Matcher::Contains("CA-BONUS"), txn_type: TransactionType::Bonus, qty_source: QtySource::Credit, is_ipo: false },
        Rule { matcher: Matcher::Contains("CA-RIGHTS"), txn_type: TransactionType::Rights, qty_source: QtySource::Credit, is_ipo: false },
        Rule { matcher: Matcher::ContainsAll(&["CA-MERGER", "CR"]), txn_type: TransactionType::MergerCr, qty_source: QtySource::Credit, is_ipo: false },
        Rule { matcher: Matcher::ContainsAll(&["CA-MERGER", "DB"]), txn_type: TransactionType::MergerDr, qty_source: QtySource::Debit, is_ipo: false },
        Rule { matcher: Matcher::Contains("INITIAL PUBLIC OFFERING"), txn_type: TransactionType::Buy, qty_source: QtySource::Credit, is_ipo: true },
        Rule { matcher: Matcher::Contains("IPO"), txn_type: TransactionType::Buy, qty_source: QtySource::Credit, is_ipo: true },
        Rule { matcher: Matcher::Contains("CA-REARRANGEMENT"), txn_type: TransactionType::Other, qty_source: QtySource::Credit, is_ipo: false },
        Rule { matcher: Matcher::StartsWith("DEMAT"), txn_type: TransactionType::Other, qty_source: QtySource::None, is_ipo: false },
        // Closed-world fallback: unrecognized descriptions become OTHER,
        // quantity inferred from whichever column is non-zero.
        Rule { matcher: Matcher::Any, txn_type: TransactionType::Other, qty_source: QtySource::Inferred, is_ipo: false },
    ]
}

fn parse_quantity_cell(raw: &str) -> i64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return 0;
    }
    trimmed.replace(',', "").parse().unwrap_or(0)
}

/// Fiscal-year strings in `YYYY/YY` form yield the first 4-digit year;
/// unparseable input yields 0.
pub fn parse_fiscal_year(raw: &str) -> i32 {
    raw.split(['/', '-'])
        .next()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// The `Matcher::Any` rule at the end of `classification_rules` always
/// matches, so this loop never falls through unmatched.
fn classify(description: &str, credit_qty: i64, debit_qty: i64) -> (TransactionType, i64, bool) {
    let upper = description.to_uppercase();
    for rule in classification_rules() {
        if rule.matcher.matches(&upper) {
            let qty = match rule.qty_source {
                QtySource::Credit => credit_qty,
                QtySource::Debit => debit_qty,
                QtySource::None => 0,
                QtySource::Inferred => if credit_qty != 0 { credit_qty } else { debit_qty },
            };
            return (rule.txn_type, qty, rule.is_ipo);
        }
    }
    unreachable!("Matcher::Any always matches")
}

/// Parses a Meroshare transaction-history export. Reads the whole
/// stream; malformed rows are skipped with a row-scoped error rather
/// than aborting the import.
pub fn parse(reader: impl Read) -> Result<ImportResult, String> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    {
        let headers = csv_reader.headers().map_err(|e| format!("cannot read header row: {e}"))?;
        if headers.len() != EXPECTED_HEADER.len() || !headers.iter().eq(EXPECTED_HEADER.iter().copied()) {
            return Err(format!(
                "unexpected header: expected {:?}, got {:?}",
                EXPECTED_HEADER,
                headers.iter().collect::<Vec<_>>()
            ));
        }
    }

    let mut result = ImportResult::default();
    for (index, record) in csv_reader.records().enumerate() {
        let row_number = index + 2; // header is row 1
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                result.errors.push(RowError { row_number, message: e.to_string() });
                continue;
            }
        };
        if record.len() != EXPECTED_HEADER.len() {
            result.errors.push(RowError {
                row_number,
                message: format!("expected {} columns, got {}", EXPECTED_HEADER.len(), record.len()),
            });
            continue;
        }

        let symbol = record[1].trim().to_string();
        let date = match NaiveDate::parse_from_str(record[2].trim(), "%Y-%m-%d") {
            Ok(d) => d,
            Err(e) => {
                result.errors.push(RowError { row_number, message: format!("bad transaction date: {e}") });
                continue;
            }
        };
        let credit_qty = parse_quantity_cell(&record[3]);
        let debit_qty = parse_quantity_cell(&record[4]);
        let description = record[6].trim();

        let (transaction_type, quantity, is_ipo) = classify(description, credit_qty, debit_qty);

        if matches!(transaction_type, TransactionType::Buy | TransactionType::Sell | TransactionType::Rights) {
            result.price_reconciliation_warnings.push(format!(
                "row {row_number} ({symbol}): {:?} requires a caller-supplied price to be reconciled",
                transaction_type
            ));
        }

        result.transactions.push(ParsedTransaction {
            row_number,
            symbol,
            date,
            transaction_type,
            quantity,
            is_ipo,
            raw_description: description.to_string(),
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_with_row(description: &str, credit: &str, debit: &str) -> String {
        format!(
            "\"S.N\",\"Scrip\",\"Transaction Date\",\"Credit Quantity\",\"Debit Quantity\",\"Balance After Transaction\",\"History Description\"\n\
             \"1\",\"NABIL\",\"2024-06-16\",\"{credit}\",\"{debit}\",\"100\",\"{description}\"\n"
        )
    }

    #[test]
    fn on_cr_classifies_as_buy_using_credit_quantity() {
        let csv = csv_with_row("ON-CR Purchase Settlement", "50", "-");
        let result = parse(csv.as_bytes()).unwrap();
        assert_eq!(result.transactions.len(), 1);
        let tx = &result.transactions[0];
        assert_eq!(tx.transaction_type, TransactionType::Buy);
        assert_eq!(tx.quantity, 50);
    }

    #[test]
    fn ca_bonus_classifies_as_bonus() {
        let csv = csv_with_row("CA-Bonus Share Issue", "25", "-");
        let result = parse(csv.as_bytes()).unwrap();
        assert_eq!(result.transactions[0].transaction_type, TransactionType::Bonus);
        assert_eq!(result.transactions[0].quantity, 25);
    }

    #[test]
    fn ca_merger_cr_and_db_are_distinguished() {
        let cr = parse(csv_with_row("CA-Merger Cr NABIL-GBBL", "10", "-").as_bytes()).unwrap();
        assert_eq!(cr.transactions[0].transaction_type, TransactionType::MergerCr);
        let dr = parse(csv_with_row("CA-Merger Db NABIL-GBBL", "-", "10").as_bytes()).unwrap();
        assert_eq!(dr.transactions[0].transaction_type, TransactionType::MergerDr);
    }

    #[test]
    fn ipo_rows_are_flagged() {
        let csv = csv_with_row("INITIAL PUBLIC OFFERING Allotment", "100", "-");
        let result = parse(csv.as_bytes()).unwrap();
        assert!(result.transactions[0].is_ipo);
        assert_eq!(result.transactions[0].transaction_type, TransactionType::Buy);
    }

    #[test]
    fn unrecognized_description_falls_back_to_other_with_inferred_quantity() {
        let csv = csv_with_row("Some Unexpected Future Event", "-", "7");
        let result = parse(csv.as_bytes()).unwrap();
        assert_eq!(result.transactions[0].transaction_type, TransactionType::Other);
        assert_eq!(result.transactions[0].quantity, 7);
    }

    #[test]
    fn raw_description_survives_classification_including_the_other_fallback() {
        let recognized = parse(csv_with_row("ON-CR Purchase Settlement", "50", "-").as_bytes()).unwrap();
        assert_eq!(recognized.transactions[0].raw_description, "ON-CR Purchase Settlement");

        let unrecognized = parse(csv_with_row("Some Unexpected Future Event", "-", "7").as_bytes()).unwrap();
        assert_eq!(unrecognized.transactions[0].raw_description, "Some Unexpected Future Event");
    }

    #[test]
    fn dash_quantity_parses_as_zero() {
        assert_eq!(parse_quantity_cell("-"), 0);
        assert_eq!(parse_quantity_cell(""), 0);
        assert_eq!(parse_quantity_cell("1,234"), 1234);
    }

    #[test]
    fn wrong_header_is_rejected() {
        let csv = "\"Wrong\",\"Header\"\n";
        let result = parse(csv.as_bytes());
        assert!(result.is_err());
    }

    #[test]
    fn malformed_date_is_a_row_error_not_a_hard_failure() {
        let csv = "\"S.N\",\"Scrip\",\"Transaction Date\",\"Credit Quantity\",\"Debit Quantity\",\"Balance After Transaction\",\"History Description\"\n\
                   \"1\",\"NABIL\",\"not-a-date\",\"10\",\"-\",\"100\",\"ON-CR Purchase\"\n";
        let result = parse(csv.as_bytes()).unwrap();
        assert_eq!(result.transactions.len(), 0);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn buy_sell_rights_rows_are_flagged_for_price_reconciliation() {
        let csv = csv_with_row("ON-CR Purchase Settlement", "50", "-");
        let result = parse(csv.as_bytes()).unwrap();
        assert_eq!(result.price_reconciliation_warnings.len(), 1);
    }

    #[test]
    fn fiscal_year_parses_first_four_digits() {
        assert_eq!(parse_fiscal_year("2080/81"), 2080);
        assert_eq!(parse_fiscal_year("garbage"), 0);
    }
}
