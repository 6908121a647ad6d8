// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite-backed printer store.
//
// One row per printer.  Settings are stored as a JSON column so new fields
// can be added without a schema change.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument};

use tokenprint_core::error::{Result, TokenprintError};
use tokenprint_core::types::{PrinterConfig, PrinterId, PrinterSettings, TransportType};

use super::{PrinterStore, sort_for_listing};

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS printers (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        transport_type TEXT NOT NULL,
        connection_string TEXT NOT NULL,
        is_default INTEGER NOT NULL DEFAULT 0,
        is_connected INTEGER NOT NULL DEFAULT 0,
        settings TEXT NOT NULL DEFAULT '{}',
        last_used TEXT,
        created_at TEXT NOT NULL
    )
"#;

const SELECT_COLUMNS: &str = "SELECT id, name, transport_type, connection_string, is_default,
        is_connected, settings, last_used, created_at FROM printers";

fn db_err(what: &str) -> impl FnOnce(rusqlite::Error) -> TokenprintError + '_ {
    move |e| TokenprintError::Database(format!("{what}: {e}"))
}

/// Printer store in a local SQLite database.
pub struct SqlitePrinterStore {
    conn: Mutex<Connection>,
}

impl SqlitePrinterStore {
    /// Open (or create) the printer database at `path`, in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err("open"))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err("WAL pragma"))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(db_err("create table"))?;

        info!("printer database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("open in-memory"))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(db_err("create table"))?;

        debug!("in-memory printer database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn query_one(&self, sql: &str, id: Option<&PrinterId>) -> Result<Option<PrinterConfig>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql).map_err(db_err("prepare"))?;
        let row = match id {
            Some(id) => stmt.query_row(params![id.to_string()], row_to_printer),
            None => stmt.query_row([], row_to_printer),
        };
        row.optional().map_err(db_err("row parse"))
    }
}

impl PrinterStore for SqlitePrinterStore {
    #[instrument(skip(self), fields(printer_id = %id))]
    fn find_by_id(&self, id: &PrinterId) -> Result<Option<PrinterConfig>> {
        self.query_one(&format!("{SELECT_COLUMNS} WHERE id = ?1"), Some(id))
    }

    fn find_default(&self) -> Result<Option<PrinterConfig>> {
        self.query_one(
            &format!("{SELECT_COLUMNS} WHERE is_default = 1 ORDER BY created_at DESC LIMIT 1"),
            None,
        )
    }

    fn list(&self) -> Result<Vec<PrinterConfig>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(SELECT_COLUMNS)
            .map_err(db_err("prepare list"))?;
        let mut printers = stmt
            .query_map([], row_to_printer)
            .map_err(db_err("query list"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err("collect rows"))?;

        sort_for_listing(&mut printers);
        debug!(count = printers.len(), "listed printers");
        Ok(printers)
    }

    #[instrument(skip(self, config), fields(printer_id = %config.id))]
    fn insert(&self, config: &PrinterConfig) -> Result<()> {
        let settings = serde_json::to_string(&config.settings)?;
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db_err("begin"))?;

        if config.is_default {
            tx.execute("UPDATE printers SET is_default = 0", [])
                .map_err(db_err("clear default"))?;
        }
        tx.execute(
            "INSERT INTO printers (id, name, transport_type, connection_string, is_default,
             is_connected, settings, last_used, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                config.id.to_string(),
                config.name,
                config.transport_type.as_str(),
                config.connection_string,
                config.is_default,
                config.is_connected,
                settings,
                config.last_used.map(|t| t.to_rfc3339()),
                config.created_at.to_rfc3339(),
            ],
        )
        .map_err(db_err("insert printer"))?;
        tx.commit().map_err(db_err("commit"))?;

        info!(name = %config.name, transport = %config.transport_type, "printer stored");
        Ok(())
    }

    #[instrument(skip(self, config), fields(printer_id = %config.id))]
    fn update(&self, config: &PrinterConfig) -> Result<()> {
        let settings = serde_json::to_string(&config.settings)?;
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db_err("begin"))?;

        if config.is_default {
            tx.execute(
                "UPDATE printers SET is_default = 0 WHERE id != ?1",
                params![config.id.to_string()],
            )
            .map_err(db_err("clear default"))?;
        }
        let rows = tx
            .execute(
                "UPDATE printers SET name = ?1, transport_type = ?2, connection_string = ?3,
                 is_default = ?4, is_connected = ?5, settings = ?6, last_used = ?7
                 WHERE id = ?8",
                params![
                    config.name,
                    config.transport_type.as_str(),
                    config.connection_string,
                    config.is_default,
                    config.is_connected,
                    settings,
                    config.last_used.map(|t| t.to_rfc3339()),
                    config.id.to_string(),
                ],
            )
            .map_err(db_err("update printer"))?;
        if rows == 0 {
            return Err(TokenprintError::Database(format!(
                "printer {} not found",
                config.id
            )));
        }
        tx.commit().map_err(db_err("commit"))?;
        Ok(())
    }

    #[instrument(skip(self), fields(printer_id = %id))]
    fn delete(&self, id: &PrinterId) -> Result<()> {
        self.conn()
            .execute("DELETE FROM printers WHERE id = ?1", params![id.to_string()])
            .map_err(db_err("delete printer"))?;
        info!("printer removed");
        Ok(())
    }

    #[instrument(skip(self), fields(printer_id = %id))]
    fn set_default(&self, id: &PrinterId) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db_err("begin"))?;
        let rows = tx
            .execute(
                "UPDATE printers SET is_default = (id = ?1)",
                params![id.to_string()],
            )
            .map_err(db_err("set default"))?;
        let found: bool = tx
            .query_row(
                "SELECT COUNT(*) > 0 FROM printers WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .map_err(db_err("check printer"))?;
        if !found {
            // Dropping the transaction rolls the flag change back.
            return Err(TokenprintError::Database(format!("printer {id} not found")));
        }
        tx.commit().map_err(db_err("commit"))?;

        debug!(rows, "default printer changed");
        Ok(())
    }

    fn record_connectivity(
        &self,
        id: &PrinterId,
        connected: bool,
        last_used: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                "UPDATE printers SET is_connected = ?1, last_used = COALESCE(?2, last_used)
                 WHERE id = ?3",
                params![connected, last_used.map(|t| t.to_rfc3339()), id.to_string()],
            )
            .map_err(db_err("record connectivity"))?;
        if rows == 0 {
            return Err(TokenprintError::Database(format!("printer {id} not found")));
        }
        debug!(printer_id = %id, connected, "connectivity recorded");
        Ok(())
    }
}

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

/// Column order matches `SELECT_COLUMNS`.
fn row_to_printer(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrinterConfig> {
    let id: String = row.get(0)?;
    let transport: String = row.get(2)?;
    let settings: String = row.get(6)?;
    let last_used: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;

    let id = id.parse::<PrinterId>().map_err(|e| conversion_error(0, e))?;
    let transport_type = transport
        .parse::<TransportType>()
        .map_err(|e| conversion_error(2, e))?;
    // A damaged settings blob should not hide the printer itself.
    let settings: PrinterSettings = serde_json::from_str(&settings).unwrap_or_default();

    Ok(PrinterConfig {
        id,
        name: row.get(1)?,
        transport_type,
        connection_string: row.get(3)?,
        is_default: row.get(4)?,
        is_connected: row.get(5)?,
        settings,
        last_used: last_used
            .as_deref()
            .map(|t| parse_timestamp(7, t))
            .transpose()?,
        created_at: parse_timestamp(8, &created_at)?,
    })
}
