//! End-to-end scenarios exercising storage, the portfolio core, and the
//! screener together through a real (in-memory) SQLite database —
//! nothing here stubs out `ntx_core::storage`.

use chrono::{NaiveDate, TimeZone};
use ntx_core::clock::MarketClock;
use ntx_core::domain::{Company, Fundamentals, Price, Sector, Transaction, TransactionType};
use ntx_core::portfolio::{holdings_from_result, replay_portfolio};
use ntx_core::storage::queries::{self, ScreenerFilters, SortDirection, SortKey};
use ntx_core::storage::Store;
use ntx_core::validation::{self, TransactionCheck};
use std::collections::HashSet;

fn price(symbol: &str, date: NaiveDate, close: i64) -> Price {
    Price {
        symbol: symbol.to_string(),
        date,
        open: close,
        high: close,
        low: close,
        close,
        previous_close: None,
        volume: 1_000,
        turnover: Some(close * 1_000),
        is_complete: true,
        week52_high: None,
        week52_low: None,
    }
}

fn tx(
    id: i64,
    portfolio_id: i64,
    symbol: &str,
    transaction_type: TransactionType,
    date: NaiveDate,
    quantity: i64,
    unit_price: i64,
) -> Transaction {
    Transaction {
        id,
        portfolio_id,
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
fn bonus_shares_then_a_partial_sell_realize_gain_against_the_zero_cost_lot_first() {
    let store = Store::open_in_memory().unwrap();
    let conn = store.writer();
    let portfolio = queries::create_portfolio(&conn, "Main", "ram").unwrap();

    let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
    let buy = queries::insert_transaction(
        &conn,
        &tx(0, portfolio.id, "NABIL", TransactionType::Buy, d(2023, 1, 10), 100, 50_000),
    )
    .unwrap();
    let bonus = queries::insert_transaction(
        &conn,
        &tx(0, portfolio.id, "NABIL", TransactionType::Bonus, d(2023, 6, 1), 10, 0),
    )
    .unwrap();
    let sell = queries::insert_transaction(
        &conn,
        &tx(0, portfolio.id, "NABIL", TransactionType::Sell, d(2023, 7, 1), 10, 60_000),
    )
    .unwrap();
    assert!(buy.id < bonus.id && bonus.id < sell.id);

    let all = queries::list_transactions(&conn, portfolio.id, None).unwrap();
    let result = replay_portfolio(&all);
    assert!(result.errors.is_empty());

    // The bonus lot (unit_cost 0) is older than no other zero-cost lot,
    // but FIFO ordering is by (date, id): the BUY lot (2023-01-10) comes
    // first, so the 10-share sell consumes from the BUY lot, not bonus.
    assert_eq!(result.realized_gains.len(), 1);
    let gain = &result.realized_gains[0];
    assert_eq!(gain.quantity, 10);
    assert_eq!(gain.cost_basis, 50_000);
    assert_eq!(gain.gain, (60_000 - 50_000) * 10);

    let holdings = holdings_from_result(portfolio.id, &result);
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].quantity, 100); // 90 remaining BUY + 10 BONUS
}

#[test]
fn merger_debit_and_credit_on_the_same_date_pair_and_carry_cost_basis_forward() {
    let store = Store::open_in_memory().unwrap();
    let conn = store.writer();
    let portfolio = queries::create_portfolio(&conn, "Main", "ram").unwrap();

    let d = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
    let buy = tx(1, portfolio.id, "GBBL", TransactionType::Buy, NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(), 200, 20_000);
    let merger_dr = tx(2, portfolio.id, "GBBL", TransactionType::MergerDr, d, 200, 0);
    let merger_cr = tx(3, portfolio.id, "NABIL", TransactionType::MergerCr, d, 220, 0);

    for t in [&buy, &merger_dr, &merger_cr] {
        queries::insert_transaction(&conn, t).unwrap();
    }

    let all = queries::list_transactions(&conn, portfolio.id, None).unwrap();
    let result = replay_portfolio(&all);
    assert!(result.errors.is_empty());

    // GBBL lot fully consumed by the merger debit; cost basis 200 * 20_000.
    let merger_dr_gain = result
        .realized_gains
        .iter()
        .find(|g| g.symbol == "GBBL")
        .expect("merger debit recorded for audit");
    assert_eq!(merger_dr_gain.cost_basis, 200 * 20_000);
    assert_eq!(merger_dr_gain.gain, 0);

    // NABIL lot receives the per-share cost carried over from GBBL.
    let nabil_lot = result.lots.iter().find(|l| l.symbol == "NABIL").expect("merger credit opened a lot");
    assert_eq!(nabil_lot.unit_cost, (200 * 20_000) / 200);
    assert_eq!(nabil_lot.remaining_qty, 220);
}

#[test]
fn incremental_price_backfill_only_fetches_from_the_day_after_the_latest_stored_candle() {
    let store = Store::open_in_memory().unwrap();
    let conn = store.writer();
    let company = Company {
        symbol: "NABIL".into(),
        name: "Nabil Bank".into(),
        sector: Sector::CommercialBank,
        description: None,
        logo: None,
    };
    queries::upsert_company(&conn, &company).unwrap();
    queries::upsert_price(&conn, &price("NABIL", NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(), 50_000)).unwrap();
    drop(conn);

    let conn = store.writer();
    let dates = queries::get_latest_price_dates(&conn).unwrap();
    assert_eq!(dates, vec![("NABIL".to_string(), Some(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()))]);

    // A fresh company with no stored price has no anchor date at all.
    let company2 = Company {
        symbol: "GBBL".into(),
        name: "Gandaki Bikas Bank".into(),
        sector: Sector::DevelopmentBank,
        description: None,
        logo: None,
    };
    queries::upsert_company(&conn, &company2).unwrap();
    let dates = queries::get_latest_price_dates(&conn).unwrap();
    assert!(dates.iter().any(|(s, d)| s == "GBBL" && d.is_none()));
}

#[test]
fn screener_filters_by_sector_and_minimum_price_and_sorts_descending() {
    let store = Store::open_in_memory().unwrap();
    let conn = store.writer();

    for (symbol, sector, close, pe) in [
        ("NABIL", Sector::CommercialBank, 50_000i64, Some(18.0)),
        ("GBBL", Sector::DevelopmentBank, 20_000i64, Some(12.0)),
        ("NLIC", Sector::LifeInsurance, 90_000i64, Some(22.0)),
    ] {
        queries::upsert_company(
            &conn,
            &Company { symbol: symbol.into(), name: symbol.into(), sector, description: None, logo: None },
        )
        .unwrap();
        queries::upsert_price(&conn, &price(symbol, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), close)).unwrap();
        queries::mark_price_complete(&conn, symbol, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()).unwrap();
        queries::upsert_fundamentals(
            &conn,
            &Fundamentals {
                symbol: symbol.into(),
                pe,
                pb: None,
                eps: None,
                book_value: None,
                market_cap: None,
                dividend_yield: None,
                roe: None,
                shares_outstanding: None,
            },
        )
        .unwrap();
    }

    let filters = ScreenerFilters {
        min_price: Some(30_000),
        max_price: None,
        min_pe: None,
        max_pe: None,
        min_pb: None,
        max_pb: None,
        min_percent_change: None,
        max_percent_change: None,
        min_market_cap: None,
        max_market_cap: None,
        min_volume: None,
        near_52w_high: false,
        near_52w_low: false,
        sector: None,
    };
    let (rows, total) = queries::get_screener_data(&conn, &filters, SortKey::Price, SortDirection::Desc, 0, 10).unwrap();
    assert_eq!(total, 2);
    assert_eq!(rows.iter().map(|r| r.symbol.as_str()).collect::<Vec<_>>(), vec!["NLIC", "NABIL"]);
}

#[test]
fn close_of_day_snapshot_marks_the_days_prices_complete_and_records_the_trading_day() {
    let store = Store::open_in_memory().unwrap();
    let conn = store.writer();
    let today = NaiveDate::from_ymd_opt(2024, 8, 20).unwrap();

    queries::upsert_company(
        &conn,
        &Company { symbol: "NABIL".into(), name: "Nabil Bank".into(), sector: Sector::CommercialBank, description: None, logo: None },
    )
    .unwrap();
    let mut p = price("NABIL", today, 55_000);
    p.is_complete = false;
    queries::upsert_price(&conn, &p).unwrap();

    let dates = queries::get_latest_price_dates(&conn).unwrap();
    for (symbol, latest) in &dates {
        if *latest == Some(today) {
            queries::mark_price_complete(&conn, symbol, today).unwrap();
        }
    }
    queries::record_trading_day(&conn, today, ntx_core::domain::TradingDayState::Completed).unwrap();

    let stored = queries::get_latest_price(&conn, "NABIL").unwrap().unwrap();
    assert!(stored.is_complete);

    let trading_day = queries::get_trading_day(&conn, today).unwrap().unwrap();
    assert_eq!(trading_day.state, ntx_core::domain::TradingDayState::Completed);
    assert!(trading_day.is_trading_day);
}

#[test]
fn bank_sector_quantity_not_a_multiple_of_ten_is_rejected_in_strict_mode_but_warned_in_lenient_mode() {
    let clock = MarketClock::new(11, 15, HashSet::new());
    let sunday_noon = ntx_core::clock::NPT
        .from_local_datetime(&NaiveDate::from_ymd_opt(2024, 6, 16).unwrap().and_hms_opt(12, 0, 0).unwrap())
        .single();
    let check = TransactionCheck {
        symbol: "NABIL".into(),
        transaction_type: TransactionType::Buy,
        quantity: 15,
        unit_price: 50_000,
        sector: Sector::CommercialBank,
        last_close: Some(50_000),
        entry_time: sunday_noon,
    };

    let strict_outcomes = validation::validate_transaction(&check, &clock, true);
    assert!(validation::any_errors(&strict_outcomes));

    let lenient_outcomes = validation::validate_transaction(&check, &clock, false);
    assert!(!validation::any_errors(&lenient_outcomes));
    assert!(lenient_outcomes.iter().any(|o| matches!(o, ntx_core::validation::ValidationOutcome::Warning { .. })));
}
