// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and migrations.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use mnemo_core::MnemoError;
use tokio_rusqlite::Connection;

use crate::migrations;

/// Convert a tokio-rusqlite error into `MnemoError::Storage`.
pub fn storage_err(e: tokio_rusqlite::Error) -> MnemoError {
    MnemoError::Storage {
        source: Box::new(e),
    }
}

/// Open (or create) the database at `path`, apply PRAGMAs, and run migrations.
pub async fn open(path: &str) -> Result<Connection, MnemoError> {
    let conn = Connection::open(path).await.map_err(storage_err)?;
    configure(&conn, true).await?;
    migrations::run(&conn).await?;
    Ok(conn)
}

/// Open an in-memory database with the full schema applied. Test harnesses
/// and ephemeral installs use this.
pub async fn open_in_memory() -> Result<Connection, MnemoError> {
    let conn = Connection::open_in_memory().await.map_err(storage_err)?;
    configure(&conn, false).await?;
    migrations::run(&conn).await?;
    Ok(conn)
}

/// Apply connection PRAGMAs. WAL only applies to file-backed databases.
async fn configure(conn: &Connection, wal: bool) -> Result<(), MnemoError> {
    conn.call(move |conn| {
        if wal {
            // journal_mode returns the resulting mode as a row.
            conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))?;
            conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        }
        // Required for the abstracts -> pages delete cascade.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
    })
    .await
    .map_err(storage_err)
}
