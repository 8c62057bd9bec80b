//! `import`: ingests a Meroshare (or TMS) CSV export into a named
//! portfolio, replays the resulting transaction list through the FIFO
//! core, and persists realized gains.

use clap::Parser;
use ntx_core::config::NtxConfig;
use ntx_core::domain::{Transaction, TransactionType};
use ntx_core::meroshare::{self, tms};
use ntx_core::portfolio::replay_portfolio;
use ntx_core::storage::{queries, Store};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "import", about = "Import a Meroshare or TMS CSV export into a portfolio")]
struct Args {
    #[arg(long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// CSV file to import.
    file: PathBuf,

    /// Name of the portfolio to import into. Created if it doesn't exist.
    #[arg(long)]
    portfolio: String,

    /// Owner recorded on a newly created portfolio.
    #[arg(long, default_value = "")]
    owner: String,

    /// Parse the file as a TMS Trade Book export instead of a Meroshare
    /// transaction history export.
    #[arg(long)]
    tms: bool,

    /// Paisa-exact unit price applied to Meroshare BUY/SELL/RIGHTS rows,
    /// which carry no price of their own (spec §4.F: "BUY/SELL/RIGHTS
    /// receive a caller-supplied default and emit a warning that the
    /// price must be reconciled"). BONUS/MERGER rows always cost 0
    /// regardless of this flag. Ignored for `--tms` imports, whose rows
    /// already carry a real trade price.
    #[arg(long, default_value_t = 0)]
    default_price: i64,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("ntx").join("ntx.toml")
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = NtxConfig::load(&args.config)?;
    let store = Store::open(&config.db_path)?;

    let portfolio_id = {
        let conn = store.writer();
        match queries::list_portfolios(&conn)?.into_iter().find(|p| p.name == args.portfolio) {
            Some(p) => p.id,
            None => queries::create_portfolio(&conn, &args.portfolio, &args.owner)?.id,
        }
    };

    let file = std::fs::File::open(&args.file)?;

    let (new_transactions, row_errors, warnings) = if args.tms {
        let result = tms::parse(file).map_err(|e| anyhow::anyhow!(e))?;
        let transactions = result
            .trades
            .into_iter()
            .map(|t| Transaction {
                id: 0,
                portfolio_id,
                symbol: t.symbol,
                transaction_type: t.transaction_type,
                date: t.date,
                quantity: t.quantity,
                unit_price: t.unit_price,
                commission: None,
                tax: None,
                note: Some(format!("imported from TMS row {}", t.row_number)),
            })
            .collect::<Vec<_>>();
        (transactions, result.errors, Vec::new())
    } else {
        let result = meroshare::parse(file).map_err(|e| anyhow::anyhow!(e))?;
        let transactions = result
            .transactions
            .into_iter()
            .map(|t| {
                let unit_price = match t.transaction_type {
                    TransactionType::Buy | TransactionType::Sell | TransactionType::Rights => args.default_price,
                    _ => 0,
                };
                let note = if t.is_ipo {
                    format!("imported from Meroshare row {} (IPO allotment): {}", t.row_number, t.raw_description)
                } else {
                    format!("imported from Meroshare row {}: {}", t.row_number, t.raw_description)
                };
                Transaction {
                    id: 0,
                    portfolio_id,
                    symbol: t.symbol,
                    transaction_type: t.transaction_type,
                    date: t.date,
                    quantity: t.quantity,
                    unit_price,
                    commission: None,
                    tax: None,
                    note: Some(note),
                }
            })
            .collect::<Vec<_>>();
        (transactions, result.errors, result.price_reconciliation_warnings)
    };

    if args.default_price == 0
        && new_transactions
            .iter()
            .any(|t| matches!(t.transaction_type, TransactionType::Buy | TransactionType::Sell | TransactionType::Rights))
    {
        eprintln!(
            "warning: --default-price not given (or 0); BUY/SELL/RIGHTS rows were inserted with unit_price 0 \
             and must have their cost basis corrected before relying on WAC or realized/unrealized P&L"
        );
    }

    for err in &row_errors {
        eprintln!("row {}: {}", err.row_number, err.message);
    }
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }

    let inserted = {
        let conn = store.writer();
        let mut inserted = 0usize;
        for tx in &new_transactions {
            queries::insert_transaction(&conn, tx)?;
            inserted += 1;
        }
        inserted
    };

    let conn = store.writer();
    let all = queries::list_transactions(&conn, portfolio_id, None)?;
    let result = replay_portfolio(&all);
    for err in &result.errors {
        eprintln!("replay: {err}");
    }
    queries::replace_realized_gains_for_portfolio(&conn, portfolio_id, &result.realized_gains)?;

    println!(
        "imported {inserted} transactions into portfolio {} ({} row errors, {} price-reconciliation warnings)",
        args.portfolio,
        row_errors.len(),
        warnings.len()
    );
    Ok(())
}
