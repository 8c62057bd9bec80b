//! Storage engine (§4.A): a single SQLite database behind one writer
//! connection, plus a small pool of read-only connections so screener
//! and portfolio reads never block on the sync worker's writes.
//!
//! `Store` is an explicit, cloneable handle the caller owns and passes
//! around, rather than a lazily-initialized global connection.

pub mod backup;
pub mod queries;
pub mod schema;

use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::StorageError;

const READ_POOL_SIZE: usize = 4;

/// Owns the writer connection and a small read-only pool. Clone is cheap
/// (an `Arc` internally) so the worker, the backfill pipeline, and the
/// RPC server can each hold a handle.
#[derive(Clone)]
pub struct Store {
    inner: std::sync::Arc<StoreInner>,
}

struct StoreInner {
    db_path: PathBuf,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::DataIntegrity(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let writer = Connection::open(db_path)?;
        schema::init_schema(&writer)?;

        let mut readers = Vec::with_capacity(READ_POOL_SIZE);
        for _ in 0..READ_POOL_SIZE {
            let conn = Connection::open(db_path)?;
            conn.pragma_update(None, "query_only", true)?;
            readers.push(conn);
        }

        Ok(Self {
            inner: std::sync::Arc::new(StoreInner {
                db_path: db_path.to_path_buf(),
                writer: Mutex::new(writer),
                readers: Mutex::new(readers),
            }),
        })
    }

    /// A private, in-process database backed by SQLite's shared-cache
    /// in-memory mode. Plain `Connection::open_in_memory()` gives every
    /// connection its own isolated database, so the writer's rows would
    /// never be visible to the reader pool; `file:<uuid>?mode=memory&
    /// cache=shared` under `SQLITE_OPEN_URI` shares one in-memory database
    /// across every connection opened against the same URI, and the
    /// database lives exactly as long as this `Store` keeps one connection
    /// open to it.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let uri = format!("file:ntx-{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let writer = Connection::open_with_flags(&uri, flags)?;
        schema::init_schema(&writer)?;

        let mut readers = Vec::with_capacity(READ_POOL_SIZE);
        for _ in 0..READ_POOL_SIZE {
            let conn = Connection::open_with_flags(&uri, flags)?;
            conn.pragma_update(None, "query_only", true)?;
            readers.push(conn);
        }

        Ok(Self {
            inner: std::sync::Arc::new(StoreInner {
                db_path: PathBuf::from(uri),
                writer: Mutex::new(writer),
                readers: Mutex::new(readers),
            }),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.inner.db_path
    }

    /// Exclusive access to the single writer connection. All mutating
    /// queries in `storage::queries` go through this.
    pub fn writer(&self) -> MutexGuard<'_, Connection> {
        self.inner.writer.lock().expect("writer mutex poisoned")
    }

    /// Borrows one read-only connection from the pool for the duration
    /// of `f`, returning it when done. Falls back to a fresh ad hoc
    /// connection if the pool is momentarily exhausted rather than
    /// blocking a reader on the writer mutex.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T, StorageError>) -> Result<T, StorageError> {
        let mut pool = self.inner.readers.lock().expect("reader pool poisoned");
        if let Some(conn) = pool.pop() {
            drop(pool);
            let result = f(&conn);
            self.inner.readers.lock().expect("reader pool poisoned").push(conn);
            result
        } else {
            drop(pool);
            let conn = Connection::open(&self.inner.db_path)?;
            conn.pragma_update(None, "query_only", true)?;
            f(&conn)
        }
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(schema::get_schema_version(&self.writer())?)
    }
}
