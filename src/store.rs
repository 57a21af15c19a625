use anyhow::{anyhow, Context, Result};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::posting::Posting;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS postings (
        id            TEXT PRIMARY KEY,
        title         TEXT NOT NULL,
        company       TEXT NOT NULL,
        location      TEXT NOT NULL,
        link          TEXT NOT NULL,
        source        TEXT NOT NULL DEFAULT '',
        discovered_at TEXT NOT NULL,
        high_value    INTEGER NOT NULL DEFAULT 0
    );
";

const REPORT_INDEX: &str = "
    CREATE INDEX IF NOT EXISTS idx_postings_report
        ON postings (high_value DESC, discovered_at DESC);
";

/// Durable set of postings keyed by canonical id.
///
/// Rows are only ever inserted. The connection sits behind a mutex so the
/// store can be shared by concurrent sweepers.
pub struct PostingStore {
    conn: Mutex<Connection>,
}

impl PostingStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open posting store at {:?}", path))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory store")?;
        Self::from_connection(conn)
    }

    /// Wraps an existing connection, creating or upgrading the schema.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(PostingStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("posting store lock poisoned"))
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row("SELECT 1 FROM postings WHERE id = ?1", params![id], |_| Ok(()))
            .optional()
            .context("Failed to look up posting")?;
        Ok(found.is_some())
    }

    /// Inserts `posting` unless its id is already stored. Returns true when a
    /// row was written. The check and the write are one statement.
    pub fn insert_if_absent(&self, posting: &Posting) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO postings
                    (id, title, company, location, link, source, discovered_at, high_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    posting.id,
                    posting.title,
                    posting.company,
                    posting.location,
                    posting.link,
                    posting.source,
                    posting.discovered_at,
                    posting.high_value,
                ],
            )
            .with_context(|| format!("Failed to insert posting {}", posting.id))?;
        Ok(changed == 1)
    }

    /// All postings, high-value first, newest first within each group.
    pub fn all_ordered(&self, limit: Option<usize>) -> Result<Vec<Posting>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, company, location, link, COALESCE(source, ''),
                    discovered_at, high_value
             FROM postings
             ORDER BY high_value DESC, discovered_at DESC
             LIMIT ?1",
        )?;
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(Posting {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    company: row.get(2)?,
                    location: row.get(3)?,
                    link: row.get(4)?,
                    source: row.get(5)?,
                    discovered_at: row.get(6)?,
                    high_value: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read postings")?;
        Ok(rows)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM postings", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|n| n == column))
}

fn has_table(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Copies rows from the `vagas` table kept by the earlier tracker into
/// `postings`. The old table is left untouched; re-running is a no-op.
fn import_legacy_vagas(conn: &Connection) -> Result<()> {
    if !has_table(conn, "vagas")? {
        return Ok(());
    }
    let source = if has_column(conn, "vagas", "plataforma")? {
        "COALESCE(plataforma, '')"
    } else {
        "''"
    };
    // data_encontrada holds naive local time
    let sql = format!(
        "INSERT OR IGNORE INTO postings
            (id, title, company, location, link, source, discovered_at, high_value)
         SELECT id,
                COALESCE(titulo, ''),
                COALESCE(empresa, ''),
                COALESCE(local, ''),
                COALESCE(link, ''),
                {source},
                COALESCE(strftime('%Y-%m-%d %H:%M:%f', data_encontrada, 'utc'),
                         strftime('%Y-%m-%d %H:%M:%f', 'now')),
                COALESCE(match_vip, 0) != 0
         FROM vagas
         WHERE id IS NOT NULL"
    );
    let imported = conn
        .execute(&sql, [])
        .context("Failed to import postings from legacy `vagas` table")?;
    if imported > 0 {
        info!("Imported {} postings from legacy `vagas` table.", imported);
    }
    Ok(())
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Failed to create posting store schema")?;

    // Stores written before postings were tagged with their source.
    if !has_column(conn, "postings", "source")? {
        conn.execute_batch("ALTER TABLE postings ADD COLUMN source TEXT NOT NULL DEFAULT ''")
            .context("Failed to add source column")?;
        info!("Upgraded posting store: added `source` column.");
    }

    import_legacy_vagas(conn)?;

    conn.execute_batch(REPORT_INDEX)
        .context("Failed to create report index")?;
    Ok(())
}
