//! `backfill`: one-shot CLI driving the backfill pipeline (§4.E). Takes
//! an advisory lock (`backups/.backfill.lock`) for the duration of the
//! run so `ntxd` and a concurrent `backfill` invocation both refuse to
//! touch the database at the same time, prints one progress line per
//! symbol as it completes, and exits 1 if any job reported an error.

use clap::Parser;
use ntx_core::adapter::{FallbackScraper, OrchestratingScraper, PrimaryScraper, Scraper};
use ntx_core::backfill::{self, BackfillReport, JobConfig, Outcome, ProgressLine};
use ntx_core::config::NtxConfig;
use ntx_core::storage::{queries, Store};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "backfill", about = "One-shot historical data backfill")]
struct Args {
    #[arg(long, default_value_os_t = default_config_path())]
    config: PathBuf,

    #[arg(long)]
    prices: bool,
    #[arg(long)]
    reports: bool,
    #[arg(long)]
    dividends: bool,
    #[arg(long)]
    profiles: bool,

    /// Run every job; equivalent to passing all four flags.
    #[arg(long)]
    all: bool,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("ntx").join("ntx.toml")
}

struct LockFile(PathBuf);

impl LockFile {
    fn acquire(path: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self(path)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                anyhow::bail!("another backfill (or ntxd) holds {}; refusing to start", path.display())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn print_progress(line: &ProgressLine) {
    match &line.outcome {
        Outcome::Processed => println!("{} ok", line.symbol),
        Outcome::Skipped(reason) => println!("{} skipped: {reason}", line.symbol),
        Outcome::Error(reason) => eprintln!("{} error: {reason}", line.symbol),
    }
}

fn print_report(job: &str, report: &BackfillReport) {
    println!(
        "{job}: {} processed, {} skipped, {} errors",
        report.processed, report.skipped, report.errors
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let mut args = Args::parse();
    if args.all {
        args.prices = true;
        args.reports = true;
        args.dividends = true;
        args.profiles = true;
    }
    if !(args.prices || args.reports || args.dividends || args.profiles) {
        anyhow::bail!("no job selected; pass --prices/--reports/--dividends/--profiles or --all");
    }

    let config = NtxConfig::load(&args.config)?;
    let _lock = LockFile::acquire(config.backups_dir().join(".backfill.lock"))?;

    let store = Store::open(&config.db_path)?;

    let primary = PrimaryScraper::new(config.adapter.primary_base_url.clone())?;
    let fallback = match &config.adapter.fallback_base_url {
        Some(url) => Some(Box::new(FallbackScraper::new(url.clone())?) as Box<dyn Scraper>),
        None => None,
    };
    let scraper: Arc<dyn Scraper> = Arc::new(OrchestratingScraper::new(Box::new(primary), fallback));

    let job_config = || JobConfig {
        concurrency: config.backfill.concurrency,
        rate_limit: Duration::from_millis(config.backfill.rate_limit_ms),
    };

    let companies = {
        let conn = store.writer();
        queries::list_companies(&conn, None, None)?
    };
    let symbols: Vec<String> = companies.iter().map(|c| c.symbol.clone()).collect();

    let mut any_errors = false;
    let today = chrono::Utc::now().with_timezone(&ntx_core::clock::NPT).date_naive();

    if args.prices {
        let report = backfill::backfill_prices(
            store.clone(),
            scraper.clone(),
            today,
            job_config(),
            CancellationToken::new(),
            print_progress,
        )
        .await;
        print_report("prices", &report);
        any_errors |= report.errors > 0;
    }

    if args.reports {
        let report = backfill::backfill_reports(
            store.clone(),
            scraper.clone(),
            symbols.clone(),
            job_config(),
            CancellationToken::new(),
            print_progress,
        )
        .await;
        print_report("reports", &report);
        any_errors |= report.errors > 0;
    }

    if args.dividends {
        let report = backfill::backfill_dividends(
            store.clone(),
            scraper.clone(),
            symbols.clone(),
            job_config(),
            CancellationToken::new(),
            print_progress,
        )
        .await;
        print_report("dividends", &report);
        any_errors |= report.errors > 0;
    }

    if args.profiles {
        let report = backfill::backfill_profiles(
            store.clone(),
            scraper.clone(),
            companies,
            job_config(),
            CancellationToken::new(),
            print_progress,
        )
        .await;
        print_report("profiles", &report);
        any_errors |= report.errors > 0;
    }

    if any_errors {
        std::process::exit(1);
    }
    Ok(())
}
