//! Opening databases and running transactions against them.

use crate::error::{DatabaseError, DatabaseResult};
use crate::schema::SCHEMA_DHT;
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// The various databases an hdht node keeps.
#[derive(Clone, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum DbKind {
    /// The DHT shard: entries, links, change log, gossip cursors.
    #[display(fmt = "dht-{}", _0)]
    Dht(String),
}

impl DbKind {
    /// File name of this database inside a data directory.
    pub fn filename(&self) -> PathBuf {
        let mut path: PathBuf = match self {
            DbKind::Dht(name) => ["dht", name].iter().collect(),
        };
        path.set_extension("sqlite3");
        path
    }
}

/// Handle to one database. Cloning shares the single underlying connection.
#[derive(Clone)]
pub struct DbWrite {
    kind: DbKind,
    path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for DbWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbWrite")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .finish()
    }
}

fn initialize_connection(mut conn: Connection, kind: &DbKind) -> DatabaseResult<Connection> {
    // tell SQLite to wait this long during write contention
    conn.busy_timeout(SQLITE_BUSY_TIMEOUT)?;

    // set to faster write-ahead-log mode
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    SCHEMA_DHT.initialize(&mut conn, kind)?;

    Ok(conn)
}

impl DbWrite {
    /// Open (creating if needed) the database for `kind` under `path_prefix`.
    pub fn open(path_prefix: &Path, kind: DbKind) -> DatabaseResult<Self> {
        let path = path_prefix.join(kind.filename());
        if let Some(parent) = path.parent() {
            if !parent.is_dir() {
                std::fs::create_dir_all(parent)
                    .map_err(|_e| DatabaseError::EnvironmentMissing(parent.to_owned()))?;
            }
        }
        let conn = initialize_connection(Connection::open(&path)?, &kind)?;
        Ok(Self {
            kind,
            path: Some(path),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create a fresh in-memory database, for tests.
    pub fn test_in_mem(kind: DbKind) -> DatabaseResult<Self> {
        let conn = initialize_connection(Connection::open_in_memory()?, &kind)?;
        Ok(Self {
            kind,
            path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Accessor for the [DbKind] of the DbWrite
    pub fn kind(&self) -> &DbKind {
        &self.kind
    }

    /// The file path, `None` when in memory.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// Run a closure inside an exclusive read-write transaction on the
    /// blocking pool, committing if it returns `Ok`.
    pub async fn write_async<E, R, F>(&self, f: F) -> Result<R, E>
    where
        E: From<DatabaseError> + Send + 'static,
        F: FnOnce(&mut Transaction) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            execute_in_exclusive_rw_txn(&mut conn, f)
        })
        .await
        .map_err(DatabaseError::from)?
    }

    /// Run a closure inside a read transaction on the blocking pool.
    pub async fn read_async<E, R, F>(&self, f: F) -> Result<R, E>
    where
        E: From<DatabaseError> + Send + 'static,
        F: FnOnce(&Transaction) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            let txn = conn.transaction().map_err(DatabaseError::from)?;
            f(&txn)
        })
        .await
        .map_err(DatabaseError::from)?
    }
}

/// Run a closure, passing in a mutable reference to a read-write
/// transaction, and commit the transaction after the closure has run.
/// Dropping the transaction on error rolls it back.
fn execute_in_exclusive_rw_txn<E, R, F>(conn: &mut Connection, f: F) -> Result<R, E>
where
    E: From<DatabaseError>,
    F: FnOnce(&mut Transaction) -> Result<R, E>,
{
    tracing::trace!("entered execute_in_exclusive_rw_txn");
    let mut txn = conn
        .transaction_with_behavior(TransactionBehavior::Exclusive)
        .map_err(DatabaseError::from)?;
    let result = f(&mut txn)?;
    txn.commit().map_err(DatabaseError::from)?;
    Ok(result)
}
