//! Typed, pre-compiled query surface (§4.A). No ad-hoc string SQL at
//! callsites outside this module — every storage operation gets one
//! function here, each backed by `prepare_cached` so repeated calls
//! reuse the compiled statement.

use crate::domain::{
    Company, Dividend, Fundamentals, Portfolio, Price, Report, ReportType, Sector, Transaction,
    TransactionType,
};
use crate::error::StorageError;
use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};

pub type Result<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------
// Companies
// ---------------------------------------------------------------------

pub fn upsert_company(conn: &Connection, company: &Company) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO companies (symbol, name, sector, description, logo)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(symbol) DO UPDATE SET
            name = excluded.name,
            sector = excluded.sector,
            description = COALESCE(excluded.description, companies.description),
            logo = COALESCE(excluded.logo, companies.logo)",
    )?;
    stmt.execute(params![
        company.symbol,
        company.name,
        company.sector.as_str(),
        company.description,
        company.logo,
    ])?;
    Ok(())
}

pub fn update_company_description(conn: &Connection, symbol: &str, description: &str) -> Result<()> {
    let mut stmt =
        conn.prepare_cached("UPDATE companies SET description = ?2 WHERE symbol = ?1")?;
    stmt.execute(params![symbol, description])?;
    Ok(())
}

pub fn get_company(conn: &Connection, symbol: &str) -> Result<Option<Company>> {
    let mut stmt = conn.prepare_cached(
        "SELECT symbol, name, sector, description, logo FROM companies WHERE symbol = ?1",
    )?;
    let row = stmt
        .query_row(params![symbol], row_to_company)
        .optional()?;
    Ok(row)
}

pub fn list_companies(
    conn: &Connection,
    sector: Option<Sector>,
    query: Option<&str>,
) -> Result<Vec<Company>> {
    let mut stmt = conn.prepare_cached(
        "SELECT symbol, name, sector, description, logo FROM companies
         WHERE (?1 IS NULL OR sector = ?1)
           AND (?2 IS NULL OR symbol LIKE ?2 OR name LIKE ?2)
         ORDER BY symbol",
    )?;
    let like = query.map(|q| format!("%{}%", q));
    let rows = stmt
        .query_map(params![sector.map(|s| s.as_str()), like], row_to_company)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn row_to_company(row: &rusqlite::Row) -> rusqlite::Result<Company> {
    let sector_str: String = row.get(2)?;
    Ok(Company {
        symbol: row.get(0)?,
        name: row.get(1)?,
        sector: Sector::from_str(&sector_str),
        description: row.get(3)?,
        logo: row.get(4)?,
    })
}

// ---------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------

/// Insert or update `(symbol, date)`. Never flips `is_complete` from 1 to
/// 0. If the caller sets `is_complete = true` and a same-day row exists
/// with `is_complete = false`, the row freezes and the 52-week aggregate
/// for that symbol is refreshed.
pub fn upsert_price(conn: &Connection, price: &Price) -> Result<()> {
    if !price.satisfies_ohlc_invariant() {
        return Err(StorageError::DataIntegrity(format!(
            "price for {} on {} violates the OHLCV invariant",
            price.symbol, price.date
        )));
    }

    let mut stmt = conn.prepare_cached(
        "INSERT INTO prices (
            symbol, date, open, high, low, close, previous_close,
            volume, turnover, is_complete, week52_high, week52_low
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(symbol, date) DO UPDATE SET
            open = excluded.open,
            high = excluded.high,
            low = excluded.low,
            close = excluded.close,
            previous_close = COALESCE(excluded.previous_close, prices.previous_close),
            volume = excluded.volume,
            turnover = COALESCE(excluded.turnover, prices.turnover),
            is_complete = MAX(prices.is_complete, excluded.is_complete),
            week52_high = COALESCE(excluded.week52_high, prices.week52_high),
            week52_low = COALESCE(excluded.week52_low, prices.week52_low)",
    )?;
    stmt.execute(params![
        price.symbol,
        price.date.to_string(),
        price.open,
        price.high,
        price.low,
        price.close,
        price.previous_close,
        price.volume,
        price.turnover,
        price.is_complete as i64,
        price.week52_high,
        price.week52_low,
    ])?;

    if price.is_complete {
        refresh_52week_aggregate(conn, &price.symbol)?;
    }
    Ok(())
}

/// Mark a symbol's row for `date` complete (used by the sync worker's
/// `finalSnapshot`) and refresh the 52-week aggregate.
pub fn mark_price_complete(conn: &Connection, symbol: &str, date: NaiveDate) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "UPDATE prices SET is_complete = 1 WHERE symbol = ?1 AND date = ?2",
    )?;
    stmt.execute(params![symbol, date.to_string()])?;
    refresh_52week_aggregate(conn, symbol)?;
    Ok(())
}

fn refresh_52week_aggregate(conn: &Connection, symbol: &str) -> Result<()> {
    let (high, low) = get_52week_high_low(conn, symbol)?;
    let mut stmt = conn.prepare_cached(
        "UPDATE prices SET week52_high = ?2, week52_low = ?3
         WHERE symbol = ?1 AND date = (SELECT MAX(date) FROM prices WHERE symbol = ?1)",
    )?;
    stmt.execute(params![symbol, high, low])?;
    Ok(())
}

/// True max/min of `close` for `symbol` over the trailing 365 calendar
/// days of `is_complete = 1` rows (§4.A / P7).
pub fn get_52week_high_low(conn: &Connection, symbol: &str) -> Result<(Option<i64>, Option<i64>)> {
    let mut stmt = conn.prepare_cached(
        "SELECT MAX(close), MIN(close) FROM prices
         WHERE symbol = ?1 AND is_complete = 1 AND date >= ?2",
    )?;
    // "last 365 days" is anchored on the latest stored date for the
    // symbol, not wall-clock now, so a backfill populating history for a
    // symbol with no live price still computes a meaningful window.
    let anchor: Option<String> = conn
        .query_row(
            "SELECT MAX(date) FROM prices WHERE symbol = ?1 AND is_complete = 1",
            params![symbol],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    let Some(anchor) = anchor else {
        return Ok((None, None));
    };
    let anchor_date = NaiveDate::parse_from_str(&anchor, "%Y-%m-%d")
        .map_err(|e| StorageError::DataIntegrity(e.to_string()))?;
    let window_start = anchor_date - Duration::days(365);
    let row = stmt.query_row(params![symbol, window_start.to_string()], |row| {
        Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?))
    })?;
    Ok(row)
}

pub fn get_latest_price(conn: &Connection, symbol: &str) -> Result<Option<Price>> {
    let mut stmt = conn.prepare_cached(
        "SELECT symbol, date, open, high, low, close, previous_close, volume, turnover,
                is_complete, week52_high, week52_low
         FROM prices WHERE symbol = ?1 ORDER BY date DESC LIMIT 1",
    )?;
    let row = stmt.query_row(params![symbol], row_to_price).optional()?;
    Ok(row)
}

pub fn list_candles(
    conn: &Connection,
    symbol: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<Price>> {
    let mut stmt = conn.prepare_cached(
        "SELECT symbol, date, open, high, low, close, previous_close, volume, turnover,
                is_complete, week52_high, week52_low
         FROM prices WHERE symbol = ?1 AND date BETWEEN ?2 AND ?3 ORDER BY date ASC",
    )?;
    let rows = stmt
        .query_map(params![symbol, from.to_string(), to.to_string()], row_to_price)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Drives incremental backfill: one row per company with its latest
/// stored price date, if any.
pub fn get_latest_price_dates(conn: &Connection) -> Result<Vec<(String, Option<NaiveDate>)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT c.symbol, MAX(p.date)
         FROM companies c LEFT JOIN prices p ON p.symbol = c.symbol
         GROUP BY c.symbol ORDER BY c.symbol",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let symbol: String = row.get(0)?;
            let date_str: Option<String> = row.get(1)?;
            Ok((symbol, date_str))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(symbol, date_str)| {
            let date = date_str
                .map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
                .transpose()
                .map_err(|e| StorageError::DataIntegrity(e.to_string()))?;
            Ok((symbol, date))
        })
        .collect()
}

fn row_to_price(row: &rusqlite::Row) -> rusqlite::Result<Price> {
    let date_str: String = row.get(1)?;
    Ok(Price {
        symbol: row.get(0)?,
        date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
        open: row.get(2)?,
        high: row.get(3)?,
        low: row.get(4)?,
        close: row.get(5)?,
        previous_close: row.get(6)?,
        volume: row.get(7)?,
        turnover: row.get(8)?,
        is_complete: row.get::<_, i64>(9)? != 0,
        week52_high: row.get(10)?,
        week52_low: row.get(11)?,
    })
}

// ---------------------------------------------------------------------
// Reports / Dividends / Fundamentals
// ---------------------------------------------------------------------

pub fn insert_report(conn: &Connection, report: &Report) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO reports (symbol, report_type, fiscal_year, quarter, eps, book_value, net_income, published_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(symbol, report_type, fiscal_year, quarter) DO UPDATE SET
            eps = excluded.eps,
            book_value = excluded.book_value,
            net_income = excluded.net_income,
            published_at = excluded.published_at",
    )?;
    stmt.execute(params![
        report.symbol,
        report.report_type.as_str(),
        report.fiscal_year,
        report.quarter,
        report.eps,
        report.book_value,
        report.net_income,
        report.published_at.map(|d| d.to_string()),
    ])?;
    Ok(())
}

pub fn list_reports(
    conn: &Connection,
    symbol: &str,
    report_type: Option<ReportType>,
    limit: u32,
) -> Result<Vec<Report>> {
    let mut stmt = conn.prepare_cached(
        "SELECT symbol, report_type, fiscal_year, quarter, eps, book_value, net_income, published_at
         FROM reports WHERE symbol = ?1 AND (?2 IS NULL OR report_type = ?2)
         ORDER BY fiscal_year DESC, quarter DESC LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(
            params![symbol, report_type.map(|t| t.as_str()), limit],
            row_to_report,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn row_to_report(row: &rusqlite::Row) -> rusqlite::Result<Report> {
    let type_str: String = row.get(1)?;
    let published: Option<String> = row.get(7)?;
    Ok(Report {
        symbol: row.get(0)?,
        report_type: ReportType::from_str(&type_str).unwrap_or(ReportType::Annual),
        fiscal_year: row.get(2)?,
        quarter: row.get(3)?,
        eps: row.get(4)?,
        book_value: row.get(5)?,
        net_income: row.get(6)?,
        published_at: published
            .map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
            .transpose()
            .unwrap_or(None),
    })
}

pub fn upsert_dividend(conn: &Connection, dividend: &Dividend) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO dividends (symbol, fiscal_year, cash_percent, bonus_percent, headline, published_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(symbol, fiscal_year) DO UPDATE SET
            cash_percent = excluded.cash_percent,
            bonus_percent = excluded.bonus_percent,
            headline = COALESCE(excluded.headline, dividends.headline),
            published_at = COALESCE(excluded.published_at, dividends.published_at)",
    )?;
    stmt.execute(params![
        dividend.symbol,
        dividend.fiscal_year,
        dividend.cash_percent,
        dividend.bonus_percent,
        dividend.headline,
        dividend.published_at.map(|d| d.to_string()),
    ])?;
    Ok(())
}

pub fn list_dividends(conn: &Connection, symbol: &str) -> Result<Vec<Dividend>> {
    let mut stmt = conn.prepare_cached(
        "SELECT symbol, fiscal_year, cash_percent, bonus_percent, headline, published_at
         FROM dividends WHERE symbol = ?1 ORDER BY fiscal_year DESC",
    )?;
    let rows = stmt
        .query_map(params![symbol], |row| {
            let published: Option<String> = row.get(5)?;
            Ok(Dividend {
                symbol: row.get(0)?,
                fiscal_year: row.get(1)?,
                cash_percent: row.get(2)?,
                bonus_percent: row.get(3)?,
                headline: row.get(4)?,
                published_at: published
                    .map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
                    .transpose()
                    .unwrap_or(None),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn upsert_fundamentals(conn: &Connection, f: &Fundamentals) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO fundamentals (symbol, pe, pb, eps, book_value, market_cap, dividend_yield, roe, shares_outstanding)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(symbol) DO UPDATE SET
            pe = excluded.pe,
            pb = excluded.pb,
            eps = excluded.eps,
            book_value = excluded.book_value,
            market_cap = excluded.market_cap,
            dividend_yield = excluded.dividend_yield,
            roe = excluded.roe,
            shares_outstanding = excluded.shares_outstanding",
    )?;
    stmt.execute(params![
        f.symbol,
        f.pe,
        f.pb,
        f.eps,
        f.book_value,
        f.market_cap,
        f.dividend_yield,
        f.roe,
        f.shares_outstanding,
    ])?;
    Ok(())
}

pub fn get_fundamentals(conn: &Connection, symbol: &str) -> Result<Option<Fundamentals>> {
    let mut stmt = conn.prepare_cached(
        "SELECT symbol, pe, pb, eps, book_value, market_cap, dividend_yield, roe, shares_outstanding
         FROM fundamentals WHERE symbol = ?1",
    )?;
    let row = stmt
        .query_row(params![symbol], |row| {
            Ok(Fundamentals {
                symbol: row.get(0)?,
                pe: row.get(1)?,
                pb: row.get(2)?,
                eps: row.get(3)?,
                book_value: row.get(4)?,
                market_cap: row.get(5)?,
                dividend_yield: row.get(6)?,
                roe: row.get(7)?,
                shares_outstanding: row.get(8)?,
            })
        })
        .optional()?;
    Ok(row)
}

// ---------------------------------------------------------------------
// Trading days
// ---------------------------------------------------------------------

pub fn record_trading_day(conn: &Connection, date: NaiveDate, state: crate::domain::TradingDayState) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO trading_days (date, is_trading_day, state) VALUES (?1, 1, ?2)
         ON CONFLICT(date) DO UPDATE SET state = excluded.state",
    )?;
    stmt.execute(params![date.to_string(), state.as_str()])?;
    Ok(())
}

pub fn get_trading_day(conn: &Connection, date: NaiveDate) -> Result<Option<crate::domain::TradingDay>> {
    let mut stmt = conn.prepare_cached(
        "SELECT date, is_trading_day, state FROM trading_days WHERE date = ?1",
    )?;
    let row = stmt
        .query_row(params![date.to_string()], |row| {
            let date_str: String = row.get(0)?;
            let state_str: String = row.get(2)?;
            Ok(crate::domain::TradingDay {
                date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").unwrap_or(date),
                is_trading_day: row.get::<_, i64>(1)? != 0,
                state: crate::domain::TradingDayState::from_str(&state_str),
            })
        })
        .optional()?;
    Ok(row)
}

// ---------------------------------------------------------------------
// Screener / movers
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ScreenerFilters {
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub min_pe: Option<f64>,
    pub max_pe: Option<f64>,
    pub min_pb: Option<f64>,
    pub max_pb: Option<f64>,
    pub min_percent_change: Option<f64>,
    pub max_percent_change: Option<f64>,
    pub min_market_cap: Option<i64>,
    pub max_market_cap: Option<i64>,
    pub min_volume: Option<i64>,
    pub near_52w_high: bool,
    pub near_52w_low: bool,
    pub sector: Option<Sector>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenerRow {
    pub symbol: String,
    pub name: String,
    pub sector: Sector,
    pub close: i64,
    pub previous_close: Option<i64>,
    pub percent_change: Option<f64>,
    pub volume: i64,
    pub turnover: Option<i64>,
    pub pe: Option<f64>,
    pub pb: Option<f64>,
    pub market_cap: Option<i64>,
    pub dividend_yield: Option<f64>,
    pub week52_high: Option<i64>,
    pub week52_low: Option<i64>,
}

impl ScreenerRow {
    pub fn near_52w_high(&self) -> bool {
        match self.week52_high {
            Some(h) if h > 0 => (h - self.close) as f64 / h as f64 <= 0.05,
            _ => false,
        }
    }

    pub fn near_52w_low(&self) -> bool {
        match self.week52_low {
            Some(l) if l > 0 => (self.close - l) as f64 / l as f64 <= 0.05,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Symbol,
    Price,
    PercentChange,
    Volume,
    Turnover,
    MarketCap,
    Pe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Joins Company, latest Price, Fundamentals, and Dividend; filters and
/// sorts in Rust rather than in SQL so null/NaN-last ordering (spec
/// §4.H) is exact regardless of SQLite's NULL-sort quirks.
pub fn get_screener_data(
    conn: &Connection,
    filters: &ScreenerFilters,
    sort: SortKey,
    direction: SortDirection,
    offset: u32,
    limit: u32,
) -> Result<(Vec<ScreenerRow>, usize)> {
    let mut stmt = conn.prepare_cached(
        "SELECT c.symbol, c.name, c.sector,
                p.close, p.previous_close, p.volume, p.turnover, p.week52_high, p.week52_low,
                f.pe, f.pb, f.market_cap, f.dividend_yield
         FROM companies c
         JOIN prices p ON p.symbol = c.symbol AND p.date = (
             SELECT MAX(date) FROM prices WHERE symbol = c.symbol
         )
         LEFT JOIN fundamentals f ON f.symbol = c.symbol
         WHERE p.close != 0",
    )?;

    let mut rows: Vec<ScreenerRow> = stmt
        .query_map([], |row| {
            let sector_str: String = row.get(2)?;
            let close: i64 = row.get(3)?;
            let previous_close: Option<i64> = row.get(4)?;
            let percent_change = previous_close.and_then(|pc| {
                if pc != 0 {
                    Some((close - pc) as f64 / pc as f64)
                } else {
                    None
                }
            });
            Ok(ScreenerRow {
                symbol: row.get(0)?,
                name: row.get(1)?,
                sector: Sector::from_str(&sector_str),
                close,
                previous_close,
                percent_change,
                volume: row.get(5)?,
                turnover: row.get(6)?,
                week52_high: row.get(7)?,
                week52_low: row.get(8)?,
                pe: row.get(9)?,
                pb: row.get(10)?,
                market_cap: row.get(11)?,
                dividend_yield: row.get(12)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.retain(|r| {
        if let Some(sector) = filters.sector {
            if r.sector != sector {
                return false;
            }
        }
        if let Some(min) = filters.min_price {
            if r.close < min {
                return false;
            }
        }
        if let Some(max) = filters.max_price {
            if r.close > max {
                return false;
            }
        }
        if let Some(min) = filters.min_pe {
            if !matches!(r.pe, Some(pe) if pe >= min) {
                return false;
            }
        }
        if let Some(max) = filters.max_pe {
            // PE <= max AND PE > 0, per scenario 4 in spec §8.
            if !matches!(r.pe, Some(pe) if pe > 0.0 && pe <= max) {
                return false;
            }
        }
        if let Some(min) = filters.min_pb {
            if !matches!(r.pb, Some(pb) if pb >= min) {
                return false;
            }
        }
        if let Some(max) = filters.max_pb {
            if !matches!(r.pb, Some(pb) if pb <= max) {
                return false;
            }
        }
        if let Some(min) = filters.min_percent_change {
            if !matches!(r.percent_change, Some(pc) if pc >= min) {
                return false;
            }
        }
        if let Some(max) = filters.max_percent_change {
            if !matches!(r.percent_change, Some(pc) if pc <= max) {
                return false;
            }
        }
        if let Some(min) = filters.min_market_cap {
            if !matches!(r.market_cap, Some(mc) if mc >= min) {
                return false;
            }
        }
        if let Some(max) = filters.max_market_cap {
            if !matches!(r.market_cap, Some(mc) if mc <= max) {
                return false;
            }
        }
        if let Some(min) = filters.min_volume {
            if r.volume < min {
                return false;
            }
        }
        if filters.near_52w_high && !r.near_52w_high() {
            return false;
        }
        if filters.near_52w_low && !r.near_52w_low() {
            return false;
        }
        true
    });

    let total = rows.len();
    sort_screener_rows(&mut rows, sort, direction);

    let page = rows
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect();
    Ok((page, total))
}

fn sort_screener_rows(rows: &mut [ScreenerRow], sort: SortKey, direction: SortDirection) {
    // Nulls/NaN always sort last regardless of direction (spec §4.H).
    rows.sort_by(|a, b| {
        use std::cmp::Ordering;
        let ordering = match sort {
            SortKey::Symbol => a.symbol.cmp(&b.symbol),
            SortKey::Price => a.close.cmp(&b.close),
            SortKey::Volume => a.volume.cmp(&b.volume),
            SortKey::Turnover => cmp_opt_i64(a.turnover, b.turnover),
            SortKey::MarketCap => cmp_opt_i64(a.market_cap, b.market_cap),
            SortKey::PercentChange => cmp_opt_f64(a.percent_change, b.percent_change),
            SortKey::Pe => cmp_opt_f64(a.pe, b.pe),
        };
        match (ordering, direction) {
            (Ordering::Equal, _) => Ordering::Equal,
            (o, SortDirection::Asc) => o,
            (o, SortDirection::Desc) => o.reverse(),
        }
    });
}

fn cmp_opt_i64(a: Option<i64>, b: Option<i64>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

fn cmp_opt_f64(a: Option<f64>, b: Option<f64>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

/// Ordered by percent change of the most recent `(close, previous_close)`.
pub fn get_top_gainers(conn: &Connection, limit: u32, sector: Option<Sector>) -> Result<Vec<ScreenerRow>> {
    let filters = ScreenerFilters {
        sector,
        ..Default::default()
    };
    let (mut rows, _) = get_screener_data(conn, &filters, SortKey::PercentChange, SortDirection::Desc, 0, u32::MAX)?;
    rows.retain(|r| r.percent_change.is_some());
    rows.truncate(limit as usize);
    Ok(rows)
}

/// Per-sector `{stock_count, turnover}` (spec §4.H `ListSectors`): one
/// row per sector in `Sector::ALL`, including sectors with zero
/// companies, turnover summed over each symbol's latest stored price.
pub fn get_sector_summaries(conn: &Connection) -> Result<Vec<crate::domain::SectorSummary>> {
    let mut stmt = conn.prepare_cached(
        "SELECT c.sector, COUNT(*), COALESCE(SUM(p.turnover), 0)
         FROM companies c
         LEFT JOIN prices p ON p.symbol = c.symbol AND p.date = (
             SELECT MAX(date) FROM prices WHERE symbol = c.symbol
         )
         GROUP BY c.sector",
    )?;
    let mut by_sector: std::collections::HashMap<Sector, (u32, i64)> = stmt
        .query_map([], |row| {
            let sector_str: String = row.get(0)?;
            let count: u32 = row.get(1)?;
            let turnover: i64 = row.get(2)?;
            Ok((Sector::from_str(&sector_str), (count, turnover)))
        })?
        .collect::<std::result::Result<_, _>>()?;

    Ok(Sector::ALL
        .into_iter()
        .map(|sector| {
            let (stock_count, turnover) = by_sector.remove(&sector).unwrap_or((0, 0));
            crate::domain::SectorSummary {
                sector,
                stock_count,
                turnover,
            }
        })
        .collect())
}

pub fn get_top_losers(conn: &Connection, limit: u32, sector: Option<Sector>) -> Result<Vec<ScreenerRow>> {
    let filters = ScreenerFilters {
        sector,
        ..Default::default()
    };
    let (mut rows, _) = get_screener_data(conn, &filters, SortKey::PercentChange, SortDirection::Asc, 0, u32::MAX)?;
    rows.retain(|r| r.percent_change.is_some());
    rows.truncate(limit as usize);
    Ok(rows)
}

// ---------------------------------------------------------------------
// Portfolios / Transactions
// ---------------------------------------------------------------------

pub fn create_portfolio(conn: &Connection, name: &str, owner: &str) -> Result<Portfolio> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO portfolios (name, owner, currency) VALUES (?1, ?2, 'NPR')",
    )?;
    stmt.execute(params![name, owner])?;
    let id = conn.last_insert_rowid();
    get_portfolio(conn, id)?.ok_or_else(|| StorageError::NotFound(format!("portfolio {id}")))
}

pub fn get_portfolio(conn: &Connection, id: i64) -> Result<Option<Portfolio>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, owner, currency, created_at FROM portfolios WHERE id = ?1",
    )?;
    let row = stmt.query_row(params![id], row_to_portfolio).optional()?;
    Ok(row)
}

pub fn list_portfolios(conn: &Connection) -> Result<Vec<Portfolio>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, owner, currency, created_at FROM portfolios ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], row_to_portfolio)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn row_to_portfolio(row: &rusqlite::Row) -> rusqlite::Result<Portfolio> {
    let created_at: String = row.get(4)?;
    Ok(Portfolio {
        id: row.get(0)?,
        name: row.get(1)?,
        owner: row.get(2)?,
        currency: row.get(3)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| {
                chrono::NaiveDateTime::parse_from_str(&created_at, "%Y-%m-%d %H:%M:%S")
                    .map(|naive| naive.and_utc())
                    .unwrap_or_else(|_| chrono::Utc::now())
            }),
    })
}

pub fn insert_transaction(conn: &Connection, tx: &Transaction) -> Result<Transaction> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO transactions (portfolio_id, symbol, transaction_type, date, quantity, unit_price, commission, tax, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    stmt.execute(params![
        tx.portfolio_id,
        tx.symbol,
        tx.transaction_type.as_str(),
        tx.date.to_string(),
        tx.quantity,
        tx.unit_price,
        tx.commission,
        tx.tax,
        tx.note,
    ])?;
    let id = conn.last_insert_rowid();
    get_transaction(conn, id)?.ok_or_else(|| StorageError::NotFound(format!("transaction {id}")))
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<Option<Transaction>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, portfolio_id, symbol, transaction_type, date, quantity, unit_price, commission, tax, note
         FROM transactions WHERE id = ?1",
    )?;
    let row = stmt.query_row(params![id], row_to_transaction).optional()?;
    Ok(row)
}

pub fn list_transactions(
    conn: &Connection,
    portfolio_id: i64,
    symbol: Option<&str>,
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, portfolio_id, symbol, transaction_type, date, quantity, unit_price, commission, tax, note
         FROM transactions
         WHERE portfolio_id = ?1 AND (?2 IS NULL OR symbol = ?2)
         ORDER BY date ASC, id ASC",
    )?;
    let rows = stmt
        .query_map(params![portfolio_id, symbol], row_to_transaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_transaction(conn: &Connection, id: i64) -> Result<()> {
    let mut stmt = conn.prepare_cached("DELETE FROM transactions WHERE id = ?1")?;
    stmt.execute(params![id])?;
    Ok(())
}

fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    let type_str: String = row.get(3)?;
    let date_str: String = row.get(4)?;
    Ok(Transaction {
        id: row.get(0)?,
        portfolio_id: row.get(1)?,
        symbol: row.get(2)?,
        transaction_type: TransactionType::from_str(&type_str).unwrap_or(TransactionType::Other),
        date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
        quantity: row.get(5)?,
        unit_price: row.get(6)?,
        commission: row.get(7)?,
        tax: row.get(8)?,
        note: row.get(9)?,
    })
}

// ---------------------------------------------------------------------
// Realized gains (written by the portfolio core after a FIFO replay)
// ---------------------------------------------------------------------

pub fn replace_realized_gains_for_portfolio(
    conn: &Connection,
    portfolio_id: i64,
    gains: &[crate::domain::RealizedGain],
) -> Result<()> {
    conn.execute(
        "DELETE FROM realized_gains WHERE portfolio_id = ?1",
        params![portfolio_id],
    )?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO realized_gains (portfolio_id, symbol, sale_tx_id, lot_seq, quantity, sale_price, cost_basis, gain)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    let mut seq_by_tx: std::collections::HashMap<i64, i64> = std::collections::HashMap::new();
    for gain in gains {
        let seq = seq_by_tx.entry(gain.sale_tx_id).or_insert(0);
        stmt.execute(params![
            gain.portfolio_id,
            gain.symbol,
            gain.sale_tx_id,
            *seq,
            gain.quantity,
            gain.sale_price,
            gain.cost_basis,
            gain.gain,
        ])?;
        *seq += 1;
    }
    Ok(())
}

pub fn list_realized_gains(
    conn: &Connection,
    portfolio_id: i64,
    symbol: Option<&str>,
) -> Result<Vec<crate::domain::RealizedGain>> {
    let mut stmt = conn.prepare_cached(
        "SELECT portfolio_id, symbol, sale_tx_id, quantity, sale_price, cost_basis, gain
         FROM realized_gains WHERE portfolio_id = ?1 AND (?2 IS NULL OR symbol = ?2)
         ORDER BY sale_tx_id, lot_seq",
    )?;
    let rows = stmt
        .query_map(params![portfolio_id, symbol], |row| {
            Ok(crate::domain::RealizedGain {
                portfolio_id: row.get(0)?,
                symbol: row.get(1)?,
                sale_tx_id: row.get(2)?,
                quantity: row.get(3)?,
                sale_price: row.get(4)?,
                cost_basis: row.get(5)?,
                gain: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Company, Price};
    use chrono::NaiveDate;

    fn sample_price(symbol: &str, date: NaiveDate, turnover: i64) -> Price {
        Price {
            symbol: symbol.to_string(),
            date,
            open: 100_00,
            high: 105_00,
            low: 99_00,
            close: 102_00,
            previous_close: Some(101_00),
            volume: 1000,
            turnover: Some(turnover),
            is_complete: true,
            week52_high: None,
            week52_low: None,
        }
    }

    #[test]
    fn sector_summaries_include_every_sector_even_with_no_companies() {
        let store = crate::storage::Store::open_in_memory().unwrap();
        let conn = store.writer();

        upsert_company(
            &conn,
            &Company {
                symbol: "NABIL".into(),
                name: "Nabil Bank".into(),
                sector: Sector::CommercialBank,
                description: None,
                logo: None,
            },
        )
        .unwrap();
        upsert_price(&conn, &sample_price("NABIL", NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(), 50_000_00)).unwrap();
        upsert_price(&conn, &sample_price("NABIL", NaiveDate::from_ymd_opt(2026, 1, 6).unwrap(), 70_000_00)).unwrap();

        let summaries = get_sector_summaries(&conn).unwrap();
        assert_eq!(summaries.len(), Sector::ALL.len());

        let bank = summaries.iter().find(|s| s.sector == Sector::CommercialBank).unwrap();
        assert_eq!(bank.stock_count, 1);
        assert_eq!(bank.turnover, 70_000_00);

        let hotel = summaries.iter().find(|s| s.sector == Sector::Hotel).unwrap();
        assert_eq!(hotel.stock_count, 0);
        assert_eq!(hotel.turnover, 0);
    }
}
