//! SQLite-backed work store implementation.

use super::models::{Arrangement, ArrangementContent, Provenance, Work, WorkIdentity};
use super::schema::WORK_VERSIONED_SCHEMAS;
use super::trait_def::WorkStore;
use crate::sqlite_persistence::migrate_if_needed;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// SQLite-backed work store.
///
/// All writes go through a single connection and open `BEGIN IMMEDIATE`
/// transactions, so check-then-insert sequences are serialized both inside
/// this process and against other processes sharing the file.
#[derive(Clone)]
pub struct SqliteWorkStore {
    read_conn: Arc<Mutex<Connection>>,
    write_conn: Arc<Mutex<Connection>>,
}

const WORK_COLUMNS: &str = "id, title, artist, external_id, provenance, created_at";
const ARRANGEMENT_COLUMNS: &str =
    "id, work_id, version, song_key, tempo, time_signature, sections, notes, created_at, updated_at";

impl SqliteWorkStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path_ref = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open work database")?;

        migrate_if_needed(&mut write_conn, WORK_VERSIONED_SCHEMAS, "work")?;

        write_conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on work write connection")?;
        write_conn.pragma_update(None, "foreign_keys", "ON")?;
        write_conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let read_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open work database for reading")?;

        read_conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on work read connection")?;

        let works: usize = read_conn.query_row("SELECT COUNT(*) FROM works", [], |r| r.get(0))?;
        let arrangements: usize =
            read_conn.query_row("SELECT COUNT(*) FROM arrangements", [], |r| r.get(0))?;
        info!(
            "Work store ready: {} works, {} arrangements",
            works, arrangements
        );

        Ok(Self {
            read_conn: Arc::new(Mutex::new(read_conn)),
            write_conn: Arc::new(Mutex::new(write_conn)),
        })
    }

    /// Single in-memory connection shared by reads and writes.
    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrate_if_needed(&mut conn, WORK_VERSIONED_SCHEMAS, "work")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let conn = Arc::new(Mutex::new(conn));
        Ok(Self {
            read_conn: conn.clone(),
            write_conn: conn,
        })
    }

    fn row_to_work(row: &rusqlite::Row) -> rusqlite::Result<Work> {
        let provenance: String = row.get(4)?;
        Ok(Work {
            id: row.get(0)?,
            title: row.get(1)?,
            artist: row.get(2)?,
            external_id: row.get(3)?,
            provenance: Provenance::parse(&provenance).unwrap_or(Provenance::UserEntered),
            created_at: row.get(5)?,
        })
    }

    fn row_to_arrangement(row: &rusqlite::Row) -> rusqlite::Result<Arrangement> {
        let sections_json: String = row.get(6)?;
        let sections = serde_json::from_str(&sections_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Arrangement {
            id: row.get(0)?,
            work_id: row.get(1)?,
            version: row.get(2)?,
            key: row.get(3)?,
            tempo: row.get(4)?,
            time_signature: row.get(5)?,
            sections,
            notes: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn select_work_by_id(conn: &Connection, work_id: &str) -> Result<Option<Work>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM works WHERE id = ?1",
            WORK_COLUMNS
        ))?;
        Ok(stmt
            .query_row(params![work_id], Self::row_to_work)
            .optional()?)
    }

    fn select_existing(conn: &Connection, identity: &WorkIdentity) -> Result<Option<Work>> {
        if let Some(external_id) = identity.external_id.as_deref() {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM works WHERE external_id = ?1",
                WORK_COLUMNS
            ))?;
            if let Some(work) = stmt
                .query_row(params![external_id], Self::row_to_work)
                .optional()?
            {
                return Ok(Some(work));
            }
        }

        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM works WHERE normalized_title = ?1 AND normalized_artist = ?2",
            WORK_COLUMNS
        ))?;
        Ok(stmt
            .query_row(
                params![identity.normalized_title(), identity.normalized_artist()],
                Self::row_to_work,
            )
            .optional()?)
    }

    fn find_or_create_in_tx(conn: &Connection, identity: &WorkIdentity) -> Result<Work> {
        if let Some(mut work) = Self::select_existing(conn, identity)? {
            if let (None, Some(external_id)) = (&work.external_id, &identity.external_id) {
                conn.execute(
                    "UPDATE works SET external_id = ?1 WHERE id = ?2",
                    params![external_id, work.id],
                )?;
                debug!("Filled external id {} on work {}", external_id, work.id);
                work.external_id = Some(external_id.clone());
            }
            return Ok(work);
        }

        let work = Work {
            id: uuid::Uuid::new_v4().to_string(),
            title: identity.title.clone(),
            artist: identity.artist.clone(),
            external_id: identity.external_id.clone(),
            provenance: identity.provenance,
            created_at: chrono::Utc::now().timestamp(),
        };
        conn.execute(
            "INSERT INTO works (id, title, artist, normalized_title, normalized_artist, external_id, provenance, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                work.id,
                work.title,
                work.artist,
                identity.normalized_title(),
                identity.normalized_artist(),
                work.external_id,
                work.provenance.as_str(),
                work.created_at,
            ],
        )?;
        debug!("Created work {} ({} - {})", work.id, work.artist, work.title);
        Ok(work)
    }

    fn create_arrangement_in_tx(
        conn: &Connection,
        work_id: &str,
        content: &ArrangementContent,
    ) -> Result<Arrangement> {
        if Self::select_work_by_id(conn, work_id)?.is_none() {
            bail!("Work {} does not exist", work_id);
        }

        let version: u32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM arrangements WHERE work_id = ?1",
            params![work_id],
            |r| r.get(0),
        )?;
        let sections_json =
            serde_json::to_string(&content.sections).context("Failed to serialize sections")?;
        let now = chrono::Utc::now().timestamp();

        let arrangement = Arrangement {
            id: uuid::Uuid::new_v4().to_string(),
            work_id: work_id.to_string(),
            version,
            key: content.key.clone(),
            tempo: content.tempo,
            time_signature: content.time_signature.clone(),
            sections: content.sections.clone(),
            notes: content.notes.clone(),
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            &format!(
                "INSERT INTO arrangements ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                ARRANGEMENT_COLUMNS
            ),
            params![
                arrangement.id,
                arrangement.work_id,
                arrangement.version,
                arrangement.key,
                arrangement.tempo,
                arrangement.time_signature,
                sections_json,
                arrangement.notes,
                arrangement.created_at,
                arrangement.updated_at,
            ],
        )?;
        Ok(arrangement)
    }
}

fn is_constraint_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Runs `f` inside `BEGIN IMMEDIATE`, committing on success.
fn immediate<T>(conn: &Connection, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    conn.execute("BEGIN IMMEDIATE", [])?;
    match f(conn) {
        Ok(value) => {
            conn.execute("COMMIT", [])?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute("ROLLBACK", []);
            Err(e)
        }
    }
}

impl WorkStore for SqliteWorkStore {
    fn find_or_create_work(&self, identity: &WorkIdentity) -> Result<Work> {
        let conn = self.write_conn.lock().unwrap();
        match immediate(&conn, |c| Self::find_or_create_in_tx(c, identity)) {
            Ok(work) => Ok(work),
            Err(e) if is_constraint_violation(&e) => {
                // Another writer created it between our read and insert.
                warn!(
                    "Work insert for {} - {} raced with another writer, re-reading",
                    identity.artist, identity.title
                );
                Self::select_existing(&conn, identity)?
                    .ok_or(e)
                    .context("Work missing after constraint violation")
            }
            Err(e) => Err(e),
        }
    }

    fn get_work(&self, work_id: &str) -> Result<Option<Work>> {
        let conn = self.read_conn.lock().unwrap();
        Self::select_work_by_id(&conn, work_id)
    }

    fn count_works(&self) -> Result<usize> {
        let conn = self.read_conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM works", [], |r| r.get(0))?)
    }

    fn count_arrangements(&self, work_id: &str) -> Result<usize> {
        let conn = self.read_conn.lock().unwrap();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM arrangements WHERE work_id = ?1",
            params![work_id],
            |r| r.get(0),
        )?)
    }

    fn create_arrangement(
        &self,
        work_id: &str,
        content: &ArrangementContent,
    ) -> Result<Arrangement> {
        let conn = self.write_conn.lock().unwrap();
        immediate(&conn, |c| Self::create_arrangement_in_tx(c, work_id, content))
            .with_context(|| format!("Failed to create arrangement for work {}", work_id))
    }

    fn list_arrangements(&self, work_id: &str) -> Result<Vec<Arrangement>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM arrangements WHERE work_id = ?1 ORDER BY version ASC",
            ARRANGEMENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![work_id], Self::row_to_arrangement)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
