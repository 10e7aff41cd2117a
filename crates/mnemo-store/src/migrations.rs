// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema migrations for the page + abstract store.
//!
//! The core tables are mandatory. The keyword index is best-effort: FTS5 is
//! preferred, FTS4 is created only when FTS5 is unavailable, and when neither
//! module is compiled in the keyword retriever falls back to scoring over the
//! pre-tokenized `content_tokens` column or plain LIKE matching.

use mnemo_core::MnemoError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::database::storage_err;

/// Core relational schema: pages, abstracts, and their btree indexes.
const CORE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS pages (
    id TEXT PRIMARY KEY NOT NULL,
    owner_id TEXT NOT NULL,
    content TEXT NOT NULL,
    content_tokens TEXT NOT NULL DEFAULT '',
    token_count INTEGER NOT NULL DEFAULT 0,
    embedding BLOB,
    metadata TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS abstracts (
    page_id TEXT PRIMARY KEY NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    owner_id TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    headers TEXT NOT NULL DEFAULT '[]',
    summary_embedding BLOB,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pages_owner ON pages(owner_id);
CREATE INDEX IF NOT EXISTS idx_pages_created ON pages(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_abstracts_owner ON abstracts(owner_id);
";

/// FTS5 external-content table over page content, kept in sync by triggers.
const FTS5_SCHEMA: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS pages_fts USING fts5(
    content,
    content='pages',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS pages_fts_ai AFTER INSERT ON pages BEGIN
    INSERT INTO pages_fts(rowid, content) VALUES (new.rowid, new.content);
END;

CREATE TRIGGER IF NOT EXISTS pages_fts_ad AFTER DELETE ON pages BEGIN
    INSERT INTO pages_fts(pages_fts, rowid, content)
        VALUES('delete', old.rowid, old.content);
END;

CREATE TRIGGER IF NOT EXISTS pages_fts_au AFTER UPDATE ON pages BEGIN
    INSERT INTO pages_fts(pages_fts, rowid, content)
        VALUES('delete', old.rowid, old.content);
    INSERT INTO pages_fts(rowid, content) VALUES (new.rowid, new.content);
END;
";

/// FTS4 fallback table, only created when FTS5 is not compiled in.
const FTS4_SCHEMA: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS pages_fts4 USING fts4(content);

CREATE TRIGGER IF NOT EXISTS pages_fts4_ai AFTER INSERT ON pages BEGIN
    INSERT INTO pages_fts4(docid, content) VALUES (new.rowid, new.content);
END;

CREATE TRIGGER IF NOT EXISTS pages_fts4_ad AFTER DELETE ON pages BEGIN
    DELETE FROM pages_fts4 WHERE docid = old.rowid;
END;

CREATE TRIGGER IF NOT EXISTS pages_fts4_au AFTER UPDATE ON pages BEGIN
    DELETE FROM pages_fts4 WHERE docid = old.rowid;
    INSERT INTO pages_fts4(docid, content) VALUES (new.rowid, new.content);
END;
";

/// Apply the schema. Idempotent.
pub async fn run(conn: &Connection) -> Result<(), MnemoError> {
    conn.call(|conn| {
        conn.execute_batch(CORE_SCHEMA)?;
        match conn.execute_batch(FTS5_SCHEMA) {
            Ok(()) => {}
            Err(e) => {
                debug!(error = %e, "FTS5 unavailable, attempting FTS4 keyword index");
                if let Err(e4) = conn.execute_batch(FTS4_SCHEMA) {
                    debug!(error = %e4, "FTS4 also unavailable, keyword search will use token/LIKE fallback");
                }
            }
        }
        Ok(())
    })
    .await
    .map_err(storage_err)
}
