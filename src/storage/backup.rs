//! Online backup and retention (§6). Uses SQLite's own backup API via
//! `rusqlite::backup` rather than copying the file out from under a
//! live writer, so a backup never observes a torn WAL checkpoint.

use chrono::{Duration, Utc};
use rusqlite::backup::{Backup, Progress};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use crate::config::BackupConfig;

const STEP_PAGES: i32 = 64;

/// Copies the live database into `backups_dir/ntx-<timestamp>.db`,
/// stepping the backup in page batches so a large database doesn't hold
/// the source locked for the whole copy.
pub fn create_backup(conn: &Connection, backups_dir: &Path, now: chrono::DateTime<Utc>) -> rusqlite::Result<PathBuf> {
    std::fs::create_dir_all(backups_dir).map_err(|e| {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
            Some(e.to_string()),
        )
    })?;

    let file_name = format!("ntx-{}.db", now.format("%Y%m%dT%H%M%SZ"));
    let dest_path = backups_dir.join(&file_name);
    let mut dest = Connection::open(&dest_path)?;

    {
        let backup = Backup::new(conn, &mut dest)?;
        backup.run_to_completion(STEP_PAGES, StdDuration::from_millis(50), None::<fn(Progress)>)?;
    }

    log::info!("wrote backup {}", dest_path.display());
    Ok(dest_path)
}

/// Deletes backups beyond `retain_count` newest, and any older than
/// `retain_days`, whichever policy is stricter for a given file.
pub fn enforce_retention(
    backups_dir: &Path,
    config: &BackupConfig,
    now: chrono::DateTime<Utc>,
) -> std::io::Result<Vec<PathBuf>> {
    let mut entries: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if !backups_dir.exists() {
        return Ok(Vec::new());
    }
    for entry in std::fs::read_dir(backups_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("db") {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        entries.push((path, modified));
    }
    entries.sort_by(|a, b| b.1.cmp(&a.1));

    let cutoff = now - Duration::days(config.retain_days);
    let mut removed = Vec::new();
    for (index, (path, modified)) in entries.into_iter().enumerate() {
        let age_exceeded = chrono::DateTime::<Utc>::from(modified) < cutoff;
        let count_exceeded = index >= config.retain_count;
        if age_exceeded || count_exceeded {
            std::fs::remove_file(&path)?;
            log::info!("pruned backup {}", path.display());
            removed.push(path);
        }
    }
    Ok(removed)
}
