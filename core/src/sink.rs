//! Storage sinks for the assembled dataset.
//!
//! RULE: A sink either writes the whole dataset or leaves nothing
//! behind. Failures are returned to the caller and never retried.
//!
//! Writing is two-phase. `stage` puts the dataset somewhere readers
//! cannot see it yet; `commit` publishes it; `abort` throws it away.
//! The engine stages every sink before committing any of them.

use crate::{
    dataset::{Cell, Dataset},
    error::{SimError, SimResult},
    types::RunId,
};
use rusqlite::{params, params_from_iter, types::Value, Connection};
use std::{
    fs,
    path::{Path, PathBuf},
};

const MIGRATIONS: &str = include_str!("../../migrations/001_run.sql");
const TRANSACTIONS_TABLE: &str = "transactions";

pub trait DatasetSink {
    /// Unique stable name for this sink.
    fn name(&self) -> &'static str;

    /// Write the dataset without publishing it.
    fn stage(&mut self, dataset: &Dataset) -> SimResult<()>;

    /// Publish whatever `stage` wrote.
    fn commit(&mut self) -> SimResult<()>;

    /// Discard staged output. A no-op when nothing is staged.
    fn abort(&mut self);

    /// Stage and commit a single sink.
    fn write(&mut self, dataset: &Dataset) -> SimResult<()> {
        let result = match self.stage(dataset) {
            Ok(()) => self.commit(),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.abort();
        }
        result
    }
}

// ── CSV ────────────────────────────────────────────────────────────

/// Comma-delimited text with a header row.
pub struct CsvSink {
    path: PathBuf,
    staged: Option<PathBuf>,
    staged_rows: usize,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staged: None,
            staged_rows: 0,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl DatasetSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn stage(&mut self, dataset: &Dataset) -> SimResult<()> {
        let tmp = self.temp_path();
        if let Err(e) = write_csv(&tmp, dataset) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        self.staged = Some(tmp);
        self.staged_rows = dataset.len();
        Ok(())
    }

    fn commit(&mut self) -> SimResult<()> {
        let Some(tmp) = self.staged.take() else {
            return Ok(());
        };
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        log::info!("csv: wrote {} rows to {}", self.staged_rows, self.path.display());
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(tmp) = self.staged.take() {
            let _ = fs::remove_file(tmp);
        }
    }
}

fn write_csv(path: &Path, dataset: &Dataset) -> SimResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&dataset.columns)?;
    for row in &dataset.rows {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

// ── SQLite ─────────────────────────────────────────────────────────

enum SqliteTarget {
    File(PathBuf),
    Memory,
}

impl SqliteTarget {
    /// Returns the connection and whether this call created the file.
    fn connect(&self) -> SimResult<(Connection, bool)> {
        match self {
            Self::File(path) => {
                let created = !path.exists();
                let conn = Connection::open(path)?;
                if let Err(e) = conn.execute_batch("PRAGMA journal_mode=WAL;") {
                    drop(conn);
                    if created {
                        remove_database_files(path);
                    }
                    return Err(e.into());
                }
                Ok((conn, created))
            }
            Self::Memory => Ok((Connection::open_in_memory()?, false)),
        }
    }
}

fn remove_database_files(path: &Path) {
    let _ = fs::remove_file(path);
    for suffix in ["-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        let _ = fs::remove_file(PathBuf::from(side));
    }
}

/// Writes the dataset into a `transactions` table keyed by run,
/// plus one bookkeeping row in `run`.
///
/// The database is not touched until `stage`. Every run in one
/// database must share the same column set.
pub struct SqliteSink {
    target: SqliteTarget,
    conn: Option<Connection>,
    created_file: bool,
    in_transaction: bool,
    staged_rows: usize,
    run_id: RunId,
    seed: u64,
    version: String,
}

impl SqliteSink {
    /// Sink for the database at `path`. Nothing is opened or created yet.
    pub fn open(path: impl Into<PathBuf>, run_id: RunId, seed: u64, version: &str) -> Self {
        Self::with_target(SqliteTarget::File(path.into()), None, run_id, seed, version)
    }

    /// In-memory database (used in tests).
    pub fn in_memory(run_id: RunId, seed: u64, version: &str) -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(MIGRATIONS)?;
        Ok(Self::with_target(SqliteTarget::Memory, Some(conn), run_id, seed, version))
    }

    fn with_target(
        target: SqliteTarget,
        conn: Option<Connection>,
        run_id: RunId,
        seed: u64,
        version: &str,
    ) -> Self {
        Self {
            target,
            conn,
            created_file: false,
            in_transaction: false,
            staged_rows: 0,
            run_id,
            seed,
            version: version.to_string(),
        }
    }

    fn connection(&mut self) -> SimResult<&Connection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                let (conn, created) = self.target.connect()?;
                self.created_file = created;
                conn
            }
        };
        Ok(self.conn.insert(conn))
    }

    pub fn transaction_count(&mut self, run_id: &str) -> SimResult<i64> {
        let count = self.connection()?.query_row(
            "SELECT COUNT(*) FROM transactions WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Row count recorded in the run table, if the run was written.
    pub fn recorded_row_count(&mut self, run_id: &str) -> SimResult<Option<i64>> {
        let result = self.connection()?.query_row(
            "SELECT row_count FROM run WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        );
        match result {
            Ok(count) => Ok(Some(count)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl DatasetSink for SqliteSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn stage(&mut self, dataset: &Dataset) -> SimResult<()> {
        self.connection()?;
        let Some(conn) = self.conn.as_ref() else {
            return Ok(());
        };

        conn.execute_batch("BEGIN IMMEDIATE;")?;
        self.in_transaction = true;
        conn.execute_batch(MIGRATIONS)?;
        ensure_schema(conn, &dataset.columns)?;

        let quoted: Vec<String> = dataset.columns.iter().map(|c| format!("\"{c}\"")).collect();
        let placeholders: Vec<String> = (1..=dataset.columns.len() + 1)
            .map(|i| format!("?{i}"))
            .collect();
        let insert = format!(
            "INSERT INTO {TRANSACTIONS_TABLE} (run_id, {}) VALUES ({})",
            quoted.join(", "),
            placeholders.join(", ")
        );
        {
            let mut stmt = conn.prepare(&insert)?;
            for row in &dataset.rows {
                let values = std::iter::once(Value::Text(self.run_id.clone()))
                    .chain(row.iter().map(sql_value));
                stmt.execute(params_from_iter(values))?;
            }
        }
        conn.execute(
            "INSERT INTO run (run_id, seed, version, row_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.run_id,
                self.seed as i64,
                self.version,
                dataset.len() as i64,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        self.staged_rows = dataset.len();
        Ok(())
    }

    fn commit(&mut self) -> SimResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        if let Some(conn) = self.conn.as_ref() {
            conn.execute_batch("COMMIT;")?;
        }
        self.in_transaction = false;
        self.created_file = false;
        log::info!("sqlite: wrote {} rows for run {}", self.staged_rows, self.run_id);
        Ok(())
    }

    fn abort(&mut self) {
        if self.in_transaction {
            if let Some(conn) = self.conn.as_ref() {
                let _ = conn.execute_batch("ROLLBACK;");
            }
            self.in_transaction = false;
        }
        if self.created_file {
            self.conn = None;
            if let SqliteTarget::File(path) = &self.target {
                remove_database_files(path);
            }
            self.created_file = false;
        }
    }
}

/// Create the transactions table, or check an existing one has
/// exactly the columns this dataset writes.
fn ensure_schema(conn: &Connection, columns: &[String]) -> SimResult<()> {
    let existing: Vec<String> = {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({TRANSACTIONS_TABLE})"))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        names.collect::<Result<_, _>>()?
    };

    if existing.is_empty() {
        let quoted: Vec<String> = columns.iter().map(|c| format!("\"{c}\"")).collect();
        conn.execute_batch(&format!(
            "CREATE TABLE {TRANSACTIONS_TABLE} (run_id TEXT NOT NULL, {})",
            quoted.join(", ")
        ))?;
        return Ok(());
    }

    let matches = existing.first().map(String::as_str) == Some("run_id")
        && existing[1..] == *columns;
    if !matches {
        return Err(SimError::SchemaMismatch {
            table: TRANSACTIONS_TABLE.to_string(),
            existing: existing.iter().skip(1).cloned().collect::<Vec<_>>().join(", "),
            requested: columns.join(", "),
        });
    }
    Ok(())
}

fn sql_value(cell: &Cell) -> Value {
    match cell {
        Cell::Int(v) => Value::Integer(*v),
        Cell::Float(v) => Value::Real(*v),
        Cell::Text(v) => Value::Text(v.clone()),
        Cell::Bool(v) => Value::Integer(i64::from(*v)),
        Cell::Empty => Value::Null,
    }
}
