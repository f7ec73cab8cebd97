//! Database client and connection management

use crate::schema::quote_ident;
use crate::{DbError, DbResult};
use rusqlite::{Connection, OpenFlags, Params};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Database client wrapping a single SQLite connection
///
/// The client is the single writer of its database. It can move between
/// threads but not be shared by them.
pub struct DbClient {
    conn: Connection,
    path: Option<PathBuf>,
    depth: Cell<u32>,
}

impl std::fmt::Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient")
            .field("path", &self.path)
            .field("in_transaction", &(self.depth.get() > 0))
            .finish()
    }
}

struct ScopeGuard<'a>(&'a Cell<u32>);

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.0.set(0);
    }
}

impl DbClient {
    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Self {
        Self {
            conn,
            path,
            depth: Cell::new(0),
        }
    }

    /// Create a new database file; fails if one already exists
    pub fn create(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(DbError::DatabaseExists(path.to_path_buf()));
        }
        DbConnectionBuilder::new(path).create_if_missing(true).connect()
    }

    /// Open an existing database file
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        DbConnectionBuilder::new(path.as_ref()).connect()
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?, None))
    }

    /// Delete a database file together with its journal files
    #[instrument]
    pub fn drop_database(path: &Path) -> DbResult<()> {
        if !path.exists() {
            return Err(DbError::NoDatabase(path.to_path_buf()));
        }
        std::fs::remove_file(path)?;
        for suffix in ["-wal", "-shm", "-journal"] {
            let mut side = path.as_os_str().to_owned();
            side.push(suffix);
            let side = PathBuf::from(side);
            if side.exists() {
                std::fs::remove_file(&side)?;
            }
        }
        info!("Dropped database {}", path.display());
        Ok(())
    }

    /// Underlying connection for direct queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Test the database connection
    pub fn ping(&self) -> DbResult<()> {
        self.conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    /// Execute one statement, returning the number of rows changed
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> DbResult<usize> {
        Ok(self.conn.execute(sql, params)?)
    }

    /// Run `f` inside a transaction: commit when it returns `Ok`, roll back
    /// when it returns `Err` or unwinds.
    ///
    /// A transaction opened while another is active joins the outer one.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&DbClient) -> Result<T, E>,
        E: From<DbError>,
    {
        if self.depth.get() > 0 {
            return f(self);
        }

        let tx = self.conn.unchecked_transaction().map_err(DbError::from)?;
        let guard = ScopeGuard(&self.depth);
        self.depth.set(1);
        let result = f(self);
        drop(guard);

        match result {
            Ok(value) => {
                tx.commit().map_err(DbError::from)?;
                Ok(value)
            }
            Err(err) => {
                debug!("Rolling back transaction");
                drop(tx);
                Err(err)
            }
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.depth.get() > 0
    }

    /// Names of all user tables
    pub fn tables(&self) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn has_table(&self, table: &str) -> DbResult<bool> {
        let found = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(found > 0)
    }

    /// Column names of `table`, in declaration order
    pub fn columns_of(&self, table: &str) -> DbResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(DbError::NoSuchTable(table.to_string()));
        }
        Ok(columns)
    }
}

/// Build SQLite connection settings
pub struct DbConnectionBuilder {
    path: PathBuf,
    create_if_missing: bool,
    busy_timeout: Duration,
    wal: bool,
}

impl DbConnectionBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            create_if_missing: false,
            busy_timeout: Duration::from_secs(5),
            wal: true,
        }
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }

    pub fn connect(self) -> DbResult<DbClient> {
        if !self.create_if_missing && !self.path.exists() {
            return Err(DbError::NoDatabase(self.path));
        }

        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI;
        if self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        let conn = Connection::open_with_flags(&self.path, flags)?;
        conn.busy_timeout(self.busy_timeout)?;
        if self.wal {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }

        debug!(path = %self.path.display(), wal = self.wal, "Opened database");
        Ok(DbClient::from_connection(conn, Some(self.path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_open_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weewx.sdb");

        assert!(matches!(DbClient::open(&path), Err(DbError::NoDatabase(_))));

        let db = DbClient::create(&path).unwrap();
        db.ping().unwrap();
        db.execute("CREATE TABLE t (x INTEGER)", []).unwrap();
        drop(db);

        assert!(matches!(DbClient::create(&path), Err(DbError::DatabaseExists(_))));
        let db = DbClient::open(&path).unwrap();
        assert_eq!(db.tables().unwrap(), vec!["t".to_string()]);
        drop(db);

        DbClient::drop_database(&path).unwrap();
        assert!(!path.exists());
        assert!(matches!(DbClient::drop_database(&path), Err(DbError::NoDatabase(_))));
    }

    #[test]
    fn test_transaction_commit_and_rollback() {
        let db = DbClient::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (x INTEGER)", []).unwrap();

        db.transaction(|db| db.execute("INSERT INTO t VALUES (1)", []).map(|_| ()))
            .unwrap();

        let failed: DbResult<()> = db.transaction(|db| {
            db.execute("INSERT INTO t VALUES (2)", [])?;
            db.execute("INSERT INTO missing VALUES (3)", [])?;
            Ok(())
        });
        assert!(failed.unwrap_err().is_operational());
        assert!(!db.in_transaction());

        let total: i64 = db
            .connection()
            .query_row("SELECT SUM(x) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_nested_transaction_joins_outer() {
        let db = DbClient::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (x INTEGER)", []).unwrap();

        let outcome: DbResult<()> = db.transaction(|db| {
            db.transaction(|db| db.execute("INSERT INTO t VALUES (1)", []).map(|_| ()))?;
            Err(DbError::NoSuchTable("forced".into()))
        });
        assert!(outcome.is_err());

        let rows: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_introspection() {
        let db = DbClient::open_in_memory().unwrap();
        db.execute("CREATE TABLE archive (dateTime INTEGER PRIMARY KEY, outTemp REAL)", [])
            .unwrap();
        assert!(db.has_table("archive").unwrap());
        assert!(!db.has_table("nope").unwrap());
        assert_eq!(db.columns_of("archive").unwrap(), vec!["dateTime", "outTemp"]);
        assert!(matches!(db.columns_of("nope"), Err(DbError::NoSuchTable(_))));
    }
}
