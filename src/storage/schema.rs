//! Schema creation and forward-only migrations.
//!
//! Tables are created with `CREATE TABLE IF NOT EXISTS`; older databases
//! are brought up to date through an explicit, numbered migration list
//! recorded in `schema_migrations`, so `get_schema_version` answers
//! "what migration version is this database at" directly rather than
//! re-deriving it from `PRAGMA table_info` every time.

use rusqlite::Connection;

const BASE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    id INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS companies (
    symbol TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    sector TEXT NOT NULL DEFAULT 'UNSPECIFIED' CHECK (sector IN (
        'COMMERCIAL_BANK', 'DEVELOPMENT_BANK', 'FINANCE',
        'MICROFINANCE_LAGHUBITTA', 'LIFE_INSURANCE', 'NON_LIFE_INSURANCE',
        'HYDROPOWER', 'HOTEL', 'MANUFACTURING', 'TRADING_COMPANY',
        'INVESTMENT', 'MUTUAL_FUND', 'OTHERS', 'UNSPECIFIED'
    )),
    description TEXT,
    logo TEXT
);

CREATE TABLE IF NOT EXISTS prices (
    symbol TEXT NOT NULL REFERENCES companies(symbol),
    date TEXT NOT NULL,
    open INTEGER NOT NULL,
    high INTEGER NOT NULL,
    low INTEGER NOT NULL,
    close INTEGER NOT NULL,
    previous_close INTEGER,
    volume INTEGER NOT NULL DEFAULT 0 CHECK (volume >= 0),
    turnover INTEGER,
    is_complete INTEGER NOT NULL DEFAULT 0,
    week52_high INTEGER,
    week52_low INTEGER,
    PRIMARY KEY (symbol, date)
);

CREATE INDEX IF NOT EXISTS idx_prices_symbol_date ON prices(symbol, date);

CREATE TABLE IF NOT EXISTS reports (
    symbol TEXT NOT NULL REFERENCES companies(symbol),
    report_type TEXT NOT NULL CHECK (report_type IN ('quarterly', 'annual')),
    fiscal_year INTEGER NOT NULL,
    quarter INTEGER,
    eps REAL,
    book_value REAL,
    net_income INTEGER,
    published_at TEXT,
    PRIMARY KEY (symbol, report_type, fiscal_year, quarter)
);

CREATE TABLE IF NOT EXISTS dividends (
    symbol TEXT NOT NULL REFERENCES companies(symbol),
    fiscal_year INTEGER NOT NULL,
    cash_percent REAL NOT NULL DEFAULT 0,
    bonus_percent REAL NOT NULL DEFAULT 0,
    headline TEXT,
    published_at TEXT,
    PRIMARY KEY (symbol, fiscal_year)
);

CREATE TABLE IF NOT EXISTS fundamentals (
    symbol TEXT PRIMARY KEY REFERENCES companies(symbol),
    pe REAL,
    pb REAL,
    eps REAL,
    book_value REAL,
    market_cap INTEGER,
    dividend_yield REAL,
    roe REAL,
    shares_outstanding INTEGER
);

CREATE TABLE IF NOT EXISTS trading_days (
    date TEXT PRIMARY KEY,
    is_trading_day INTEGER NOT NULL,
    state TEXT NOT NULL DEFAULT 'pending' CHECK (state IN ('pending', 'completed'))
);

CREATE TABLE IF NOT EXISTS portfolios (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    owner TEXT NOT NULL,
    currency TEXT NOT NULL DEFAULT 'NPR',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    portfolio_id INTEGER NOT NULL REFERENCES portfolios(id) ON DELETE CASCADE,
    symbol TEXT NOT NULL REFERENCES companies(symbol),
    transaction_type TEXT NOT NULL CHECK (transaction_type IN (
        'BUY', 'SELL', 'BONUS', 'RIGHTS', 'MERGER_CR', 'MERGER_DR', 'IPO', 'OTHER'
    )),
    date TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    unit_price INTEGER NOT NULL,
    commission INTEGER,
    tax INTEGER,
    note TEXT
);

CREATE INDEX IF NOT EXISTS idx_transactions_portfolio ON transactions(portfolio_id);
CREATE INDEX IF NOT EXISTS idx_transactions_portfolio_symbol ON transactions(portfolio_id, symbol);
CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date, id);

CREATE TABLE IF NOT EXISTS realized_gains (
    portfolio_id INTEGER NOT NULL REFERENCES portfolios(id) ON DELETE CASCADE,
    symbol TEXT NOT NULL,
    sale_tx_id INTEGER NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
    lot_seq INTEGER NOT NULL,
    quantity INTEGER NOT NULL,
    sale_price INTEGER NOT NULL,
    cost_basis INTEGER NOT NULL,
    gain INTEGER NOT NULL,
    PRIMARY KEY (sale_tx_id, lot_seq)
);

CREATE INDEX IF NOT EXISTS idx_realized_gains_portfolio_symbol ON realized_gains(portfolio_id, symbol);
"#;

/// Each entry is applied once, in order, and recorded in
/// `schema_migrations`. Append-only: never edit a past entry.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, BASE_SCHEMA),
];

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (id INTEGER PRIMARY KEY, applied_at TEXT NOT NULL DEFAULT (datetime('now')))",
        [],
    )?;

    for (id, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE id = ?1)",
            [id],
            |row| row.get(0),
        )?;
        if already_applied {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (id) VALUES (?1)",
            [id],
        )?;
        log::info!("applied schema migration {id}");
    }

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(id), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
}
