// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transactional page + abstract store.
//!
//! Owner-scoped persistence for the entity pair (page, abstract) with the
//! queries the three retrievers are built on. All errors are storage errors
//! surfaced to the caller unmodified; the store does not retry.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mnemo_core::types::{
    blob_to_vec, format_timestamp, parse_timestamp, vec_to_blob, OwnerStats, Page, PageAbstract,
};
use mnemo_core::MnemoError;
use rusqlite::params;
use tokio_rusqlite::Connection;

use crate::database::{self, storage_err};

/// One raw hit from a keyword backend query, before score normalization.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub page_id: String,
    /// Raw backend score; sign convention depends on the backend.
    pub raw_score: f64,
    /// Content snippet around the match, where the backend provides one.
    pub snippet: Option<String>,
}

/// Split text into lowercase alphanumeric tokens.
///
/// This is both the writer for the `content_tokens` column and the query
/// helper the token-vector keyword backend uses; the two must agree.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Pre-serialized page row, safe to move into a connection closure.
struct PageRow {
    id: String,
    owner_id: String,
    content: String,
    content_tokens: String,
    token_count: i64,
    embedding: Option<Vec<u8>>,
    metadata: Option<String>,
    created_at: String,
}

impl PageRow {
    fn from_page(page: &Page) -> Result<Self, MnemoError> {
        let metadata = page
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| MnemoError::Internal(format!("metadata serialization: {e}")))?;
        Ok(Self {
            id: page.id.clone(),
            owner_id: page.owner_id.clone(),
            content: page.content.clone(),
            content_tokens: tokenize(&page.content).join(" "),
            token_count: page.token_count,
            embedding: page.embedding.as_ref().map(|v| vec_to_blob(v)),
            metadata,
            created_at: format_timestamp(&page.created_at),
        })
    }

    fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO pages (id, owner_id, content, content_tokens, token_count, embedding, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                 content = excluded.content,
                 content_tokens = excluded.content_tokens,
                 token_count = excluded.token_count,
                 embedding = excluded.embedding,
                 metadata = excluded.metadata",
            params![
                self.id,
                self.owner_id,
                self.content,
                self.content_tokens,
                self.token_count,
                self.embedding,
                self.metadata,
                self.created_at,
            ],
        )?;
        Ok(())
    }
}

/// Pre-serialized abstract row.
struct AbstractRow {
    page_id: String,
    owner_id: String,
    summary: String,
    headers: String,
    summary_embedding: Option<Vec<u8>>,
    created_at: String,
}

impl AbstractRow {
    fn from_abstract(abs: &PageAbstract) -> Result<Self, MnemoError> {
        let headers = serde_json::to_string(&abs.headers)
            .map_err(|e| MnemoError::Internal(format!("headers serialization: {e}")))?;
        Ok(Self {
            page_id: abs.page_id.clone(),
            owner_id: abs.owner_id.clone(),
            summary: abs.summary.clone(),
            headers,
            summary_embedding: abs.summary_embedding.as_ref().map(|v| vec_to_blob(v)),
            created_at: format_timestamp(&abs.created_at),
        })
    }

    fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO abstracts (page_id, owner_id, summary, headers, summary_embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(page_id) DO UPDATE SET
                 summary = excluded.summary,
                 headers = excluded.headers,
                 summary_embedding = excluded.summary_embedding",
            params![
                self.page_id,
                self.owner_id,
                self.summary,
                self.headers,
                self.summary_embedding,
                self.created_at,
            ],
        )?;
        Ok(())
    }
}

const PAGE_COLUMNS: &str = "id, owner_id, content, token_count, embedding, metadata, created_at";

fn page_from_row(row: &rusqlite::Row) -> rusqlite::Result<Page> {
    let embedding: Option<Vec<u8>> = row.get(4)?;
    let metadata: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(Page {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        content: row.get(2)?,
        token_count: row.get(3)?,
        embedding: embedding.map(|b| blob_to_vec(&b)),
        metadata: metadata
            .map(|m| serde_json::from_str(&m))
            .transpose()
            .map_err(|e| conversion_err(5, e))?,
        created_at: parse_timestamp(&created_at).map_err(|e| conversion_err(6, e))?,
    })
}

fn abstract_from_row(row: &rusqlite::Row) -> rusqlite::Result<PageAbstract> {
    let headers: String = row.get(3)?;
    let summary_embedding: Option<Vec<u8>> = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(PageAbstract {
        page_id: row.get(0)?,
        owner_id: row.get(1)?,
        summary: row.get(2)?,
        headers: serde_json::from_str(&headers).map_err(|e| conversion_err(3, e))?,
        summary_embedding: summary_embedding.map(|b| blob_to_vec(&b)),
        created_at: parse_timestamp(&created_at).map_err(|e| conversion_err(5, e))?,
    })
}

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

/// Build `?N, ?N+1, ...` placeholders starting at `start`.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Persistent store for pages and abstracts in SQLite.
///
/// Embeddings are stored as little-endian f32 BLOBs; headers and metadata as
/// JSON TEXT. An FTS index over page content is maintained by triggers when
/// the module is available (see `migrations`).
pub struct MemoryStore {
    conn: Connection,
}

impl MemoryStore {
    /// Wrap an existing connection that already has migrations applied.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Open (or create) a file-backed store.
    pub async fn open(path: &str) -> Result<Self, MnemoError> {
        Ok(Self::new(database::open(path).await?))
    }

    /// Open an in-memory store with the full schema applied.
    pub async fn open_in_memory() -> Result<Self, MnemoError> {
        Ok(Self::new(database::open_in_memory().await?))
    }

    /// The underlying connection, for wiring and test scaffolding.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Fetch a page by id. No owner check; callers enforce scoping upstream.
    pub async fn get_page(&self, id: &str) -> Result<Option<Page>, MnemoError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PAGE_COLUMNS} FROM pages WHERE id = ?1"
                ))?;
                let mut rows = stmt.query_map(params![id], page_from_row)?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(storage_err)
    }

    /// Fetch the abstract paired with a page, if any.
    pub async fn get_abstract(&self, page_id: &str) -> Result<Option<PageAbstract>, MnemoError> {
        let page_id = page_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT page_id, owner_id, summary, headers, summary_embedding, created_at
                     FROM abstracts WHERE page_id = ?1",
                )?;
                let mut rows = stmt.query_map(params![page_id], abstract_from_row)?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(storage_err)
    }

    /// Bulk fetch pages by id. Order is not guaranteed; callers re-order.
    pub async fn get_pages_by_ids(&self, ids: &[String]) -> Result<Vec<Page>, MnemoError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let ids = ids.to_vec();
        self.conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {PAGE_COLUMNS} FROM pages WHERE id IN ({})",
                    placeholders(1, ids.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let pages = stmt
                    .query_map(rusqlite::params_from_iter(ids.iter()), page_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(pages)
            })
            .await
            .map_err(storage_err)
    }

    /// Upsert a page by id.
    ///
    /// On conflict, content, token count, embedding, and metadata are
    /// replaced; owner and creation timestamp of the existing row are kept.
    pub async fn store_page(&self, page: &Page) -> Result<(), MnemoError> {
        let row = PageRow::from_page(page)?;
        self.conn
            .call(move |conn| {
                row.insert(conn)?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    /// Upsert an abstract by page id, replacing summary, headers, and
    /// summary embedding.
    pub async fn store_abstract(&self, abs: &PageAbstract) -> Result<(), MnemoError> {
        let row = AbstractRow::from_abstract(abs)?;
        self.conn
            .call(move |conn| {
                row.insert(conn)?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    /// Store a page and its abstract in one transaction.
    ///
    /// This is the ingest write path: either both records land or neither
    /// does. Any failure rolls the transaction back.
    pub async fn store_page_with_abstract(
        &self,
        page: &Page,
        abs: &PageAbstract,
    ) -> Result<(), MnemoError> {
        let page_row = PageRow::from_page(page)?;
        let abstract_row = AbstractRow::from_abstract(abs)?;
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                page_row.insert(&tx)?;
                abstract_row.insert(&tx)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    /// Delete a page by id. The abstract cascades.
    pub async fn delete_page(&self, id: &str) -> Result<(), MnemoError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM pages WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    /// Delete every page (and abstract) belonging to an owner.
    pub async fn delete_by_owner(&self, owner_id: &str) -> Result<(), MnemoError> {
        let owner_id = owner_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM pages WHERE owner_id = ?1", params![owner_id])?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    /// Delete pages strictly older than `now - max_age`, optionally scoped
    /// to one owner. Returns the number of pages deleted. Intended for
    /// background TTL callers.
    pub async fn cleanup_expired(
        &self,
        max_age: Duration,
        owner_id: Option<&str>,
    ) -> Result<u64, MnemoError> {
        let age = chrono::Duration::from_std(max_age)
            .map_err(|e| MnemoError::InvalidArgument(format!("max_age out of range: {e}")))?;
        self.delete_before(Utc::now() - age, owner_id).await
    }

    /// Delete pages created strictly before `cutoff`, optionally scoped to
    /// one owner. Returns the number of pages deleted.
    pub async fn delete_before(
        &self,
        cutoff: DateTime<Utc>,
        owner_id: Option<&str>,
    ) -> Result<u64, MnemoError> {
        let cutoff = format_timestamp(&cutoff);
        let owner_id = owner_id.map(str::to_string);
        self.conn
            .call(move |conn| {
                let deleted = match owner_id {
                    Some(owner) => conn.execute(
                        "DELETE FROM pages WHERE created_at < ?1 AND owner_id = ?2",
                        params![cutoff, owner],
                    )?,
                    None => conn.execute(
                        "DELETE FROM pages WHERE created_at < ?1",
                        params![cutoff],
                    )?,
                };
                Ok(deleted as u64)
            })
            .await
            .map_err(storage_err)
    }

    /// Aggregate page statistics for one owner.
    pub async fn stats_by_owner(&self, owner_id: &str) -> Result<OwnerStats, MnemoError> {
        let owner_id = owner_id.to_string();
        self.conn
            .call(move |conn| {
                let (page_count, total_tokens, oldest, newest) = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(token_count), 0),
                            MIN(created_at), MAX(created_at)
                     FROM pages WHERE owner_id = ?1",
                    params![owner_id],
                    |row| {
                        let oldest: Option<String> = row.get(2)?;
                        let newest: Option<String> = row.get(3)?;
                        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, oldest, newest))
                    },
                )?;
                let oldest_page_at = oldest
                    .map(|s| parse_timestamp(&s))
                    .transpose()
                    .map_err(|e| conversion_err(2, e))?;
                let newest_page_at = newest
                    .map(|s| parse_timestamp(&s))
                    .transpose()
                    .map_err(|e| conversion_err(3, e))?;
                Ok(OwnerStats {
                    page_count,
                    total_tokens,
                    oldest_page_at,
                    newest_page_at,
                })
            })
            .await
            .map_err(storage_err)
    }

    // --- Retrieval support queries ---

    /// Whether a table (including virtual tables) exists in the schema.
    pub async fn table_exists(&self, name: &str) -> Result<bool, MnemoError> {
        let name = name.to_string();
        self.conn
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(n > 0)
            })
            .await
            .map_err(storage_err)
    }

    /// Whether a column exists on a table.
    pub async fn column_exists(&self, table: &str, column: &str) -> Result<bool, MnemoError> {
        let table = table.to_string();
        let column = column.to_string();
        self.conn
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
                    params![table, column],
                    |row| row.get(0),
                )?;
                Ok(n > 0)
            })
            .await
            .map_err(storage_err)
    }

    /// FTS5 keyword query. Raw `bm25()` scores are negative (lower = better
    /// match); callers normalize the sign.
    pub async fn search_fts5(
        &self,
        owner_id: &str,
        match_expr: &str,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<KeywordHit>, MnemoError> {
        let mut sql = String::from(
            "SELECT p.id, bm25(pages_fts) AS score,
                    snippet(pages_fts, 0, '', '', '…', 12) AS snip
             FROM pages_fts
             JOIN pages p ON p.rowid = pages_fts.rowid
             WHERE pages_fts MATCH ?1 AND p.owner_id = ?2",
        );
        let mut bind: Vec<String> = vec![match_expr.to_string(), owner_id.to_string()];
        append_exclusion(&mut sql, &mut bind, "p.id", exclude);
        sql.push_str(&format!(" ORDER BY bm25(pages_fts) LIMIT {limit}"));

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let hits = stmt
                    .query_map(rusqlite::params_from_iter(bind.iter()), |row| {
                        Ok(KeywordHit {
                            page_id: row.get(0)?,
                            raw_score: row.get(1)?,
                            snippet: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(hits)
            })
            .await
            .map_err(storage_err)
    }

    /// FTS4 keyword query returning raw `matchinfo('pcnx')` blobs for
    /// tf-idf scoring in the retriever.
    pub async fn search_fts4(
        &self,
        owner_id: &str,
        match_expr: &str,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<(String, Vec<u8>)>, MnemoError> {
        let mut sql = String::from(
            "SELECT p.id, matchinfo(pages_fts4, 'pcnx')
             FROM pages_fts4
             JOIN pages p ON p.rowid = pages_fts4.docid
             WHERE pages_fts4 MATCH ?1 AND p.owner_id = ?2",
        );
        let mut bind: Vec<String> = vec![match_expr.to_string(), owner_id.to_string()];
        append_exclusion(&mut sql, &mut bind, "p.id", exclude);
        sql.push_str(&format!(" LIMIT {limit}"));

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(bind.iter()), |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)
    }

    /// All (id, content_tokens) pairs for an owner, for the token-vector
    /// keyword backend.
    pub async fn token_candidates(
        &self,
        owner_id: &str,
        exclude: &HashSet<String>,
    ) -> Result<Vec<(String, String)>, MnemoError> {
        let mut sql = String::from(
            "SELECT id, content_tokens FROM pages WHERE owner_id = ?1 AND content_tokens <> ''",
        );
        let mut bind: Vec<String> = vec![owner_id.to_string()];
        append_exclusion(&mut sql, &mut bind, "id", exclude);

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(bind.iter()), |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)
    }

    /// (id, content) pairs for an owner whose content contains any of the
    /// given tokens, for the native LIKE fallback backend.
    pub async fn like_candidates(
        &self,
        owner_id: &str,
        tokens: &[String],
        exclude: &HashSet<String>,
    ) -> Result<Vec<(String, String)>, MnemoError> {
        if tokens.is_empty() {
            return Ok(vec![]);
        }
        let mut sql = String::from("SELECT id, content FROM pages WHERE owner_id = ?1");
        let mut bind: Vec<String> = vec![owner_id.to_string()];

        let start = bind.len() + 1;
        let likes = (start..start + tokens.len())
            .map(|i| format!("lower(content) LIKE ?{i}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        sql.push_str(&format!(" AND ({likes})"));
        bind.extend(tokens.iter().map(|t| format!("%{}%", t.to_lowercase())));

        append_exclusion(&mut sql, &mut bind, "id", exclude);

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(bind.iter()), |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)
    }

    /// All (id, embedding) pairs for an owner. Pages without an embedding
    /// are skipped.
    pub async fn page_embeddings(
        &self,
        owner_id: &str,
        exclude: &HashSet<String>,
    ) -> Result<Vec<(String, Vec<f32>)>, MnemoError> {
        let mut sql = String::from(
            "SELECT id, embedding FROM pages WHERE owner_id = ?1 AND embedding IS NOT NULL",
        );
        let mut bind: Vec<String> = vec![owner_id.to_string()];
        append_exclusion(&mut sql, &mut bind, "id", exclude);

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(bind.iter()), |row| {
                        let blob: Vec<u8> = row.get(1)?;
                        Ok((row.get::<_, String>(0)?, blob_to_vec(&blob)))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)
    }

    /// (page_id, header) pairs whose header contains `needle`
    /// (case-insensitive), in array order per abstract.
    pub async fn header_matches(
        &self,
        owner_id: &str,
        needle: &str,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<(String, String)>, MnemoError> {
        let mut sql = String::from(
            "SELECT a.page_id, je.value
             FROM abstracts a, json_each(a.headers) je
             WHERE a.owner_id = ?1 AND instr(lower(je.value), lower(?2)) > 0",
        );
        let mut bind: Vec<String> = vec![owner_id.to_string(), needle.to_string()];
        append_exclusion(&mut sql, &mut bind, "a.page_id", exclude);
        sql.push_str(&format!(" ORDER BY a.created_at DESC, je.id LIMIT {limit}"));

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(bind.iter()), |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)
    }
}

/// Append `AND <column> NOT IN (...)` with bound placeholders when the
/// exclusion set is non-empty.
fn append_exclusion(
    sql: &mut String,
    bind: &mut Vec<String>,
    column: &str,
    exclude: &HashSet<String>,
) {
    if exclude.is_empty() {
        return;
    }
    let start = bind.len() + 1;
    sql.push_str(&format!(
        " AND {column} NOT IN ({})",
        placeholders(start, exclude.len())
    ));
    bind.extend(exclude.iter().cloned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn ts(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, secs).unwrap()
    }

    fn make_page(id: &str, owner: &str, content: &str) -> Page {
        Page {
            id: id.to_string(),
            owner_id: owner.to_string(),
            content: content.to_string(),
            token_count: (content.len() / 4) as i64,
            embedding: Some(vec![0.1; 8]),
            metadata: None,
            created_at: ts(0),
        }
    }

    fn make_abstract(page_id: &str, owner: &str, headers: &[&str]) -> PageAbstract {
        PageAbstract {
            page_id: page_id.to_string(),
            owner_id: owner.to_string(),
            summary: "a summary".to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            summary_embedding: Some(vec![0.2; 8]),
            created_at: ts(0),
        }
    }

    #[tokio::test]
    async fn store_and_get_page_roundtrip() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        let mut page = make_page("p1", "u1", "Kubernetes is a container orchestration platform");
        page.metadata = Some(HashMap::from([("source".to_string(), "chat".to_string())]));
        store.store_page(&page).await.unwrap();

        let got = store.get_page("p1").await.unwrap().unwrap();
        assert_eq!(got.id, "p1");
        assert_eq!(got.owner_id, "u1");
        assert_eq!(got.content, page.content);
        assert_eq!(got.token_count, page.token_count);
        assert_eq!(got.embedding.as_ref().unwrap().len(), 8);
        assert_eq!(
            got.metadata.unwrap().get("source").map(String::as_str),
            Some("chat")
        );
        assert_eq!(got.created_at, page.created_at);
    }

    #[tokio::test]
    async fn get_page_missing_returns_none() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        assert!(store.get_page("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_content_but_keeps_owner_and_created_at() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        let original = make_page("p1", "u1", "first version");
        store.store_page(&original).await.unwrap();

        let mut second = make_page("p1", "u2", "second version");
        second.created_at = ts(30);
        store.store_page(&second).await.unwrap();

        let got = store.get_page("p1").await.unwrap().unwrap();
        assert_eq!(got.content, "second version");
        assert_eq!(got.owner_id, "u1", "owner must be preserved on conflict");
        assert_eq!(got.created_at, original.created_at);
    }

    #[tokio::test]
    async fn upsert_keeps_single_row() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        store.store_page(&make_page("p1", "u1", "v1")).await.unwrap();
        store.store_page(&make_page("p1", "u1", "v2")).await.unwrap();

        let stats = store.stats_by_owner("u1").await.unwrap();
        assert_eq!(stats.page_count, 1);
    }

    #[tokio::test]
    async fn get_pages_by_ids_bulk() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        for i in 0..4 {
            store
                .store_page(&make_page(&format!("p{i}"), "u1", &format!("content {i}")))
                .await
                .unwrap();
        }
        let pages = store
            .get_pages_by_ids(&["p0".to_string(), "p2".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(pages.len(), 2);
    }

    #[tokio::test]
    async fn get_pages_by_ids_empty() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        assert!(store.get_pages_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn atomic_write_stores_both_records() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        let page = make_page("p1", "u1", "content");
        let abs = make_abstract("p1", "u1", &["kubernetes", "containers"]);
        store.store_page_with_abstract(&page, &abs).await.unwrap();

        assert!(store.get_page("p1").await.unwrap().is_some());
        let got = store.get_abstract("p1").await.unwrap().unwrap();
        assert_eq!(got.page_id, "p1");
        assert_eq!(got.owner_id, "u1");
        assert_eq!(got.headers, vec!["kubernetes", "containers"]);
    }

    #[tokio::test]
    async fn atomic_write_rolls_back_on_failure() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        let page = make_page("p1", "u1", "content");
        // Abstract referencing a different, nonexistent page violates the FK
        // inside the transaction.
        let abs = make_abstract("other-page", "u1", &["k8s"]);

        let result = store.store_page_with_abstract(&page, &abs).await;
        assert!(result.is_err());
        assert!(
            store.get_page("p1").await.unwrap().is_none(),
            "page insert must roll back with the failed abstract"
        );
    }

    #[tokio::test]
    async fn delete_page_cascades_to_abstract() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        let page = make_page("p1", "u1", "content");
        let abs = make_abstract("p1", "u1", &["k8s"]);
        store.store_page_with_abstract(&page, &abs).await.unwrap();

        store.delete_page("p1").await.unwrap();
        assert!(store.get_page("p1").await.unwrap().is_none());
        assert!(store.get_abstract("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_by_owner_removes_all_owner_records() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        store.store_page(&make_page("p1", "u1", "a")).await.unwrap();
        store.store_page(&make_page("p2", "u1", "b")).await.unwrap();
        store.store_page(&make_page("p3", "u2", "c")).await.unwrap();

        store.delete_by_owner("u1").await.unwrap();
        assert_eq!(store.stats_by_owner("u1").await.unwrap().page_count, 0);
        assert_eq!(store.stats_by_owner("u2").await.unwrap().page_count, 1);
    }

    #[tokio::test]
    async fn delete_before_is_strict_and_owner_scoped() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        let mut old = make_page("old", "u1", "old");
        old.created_at = ts(0);
        let mut newer = make_page("new", "u1", "new");
        newer.created_at = ts(30);
        let mut other = make_page("other", "u2", "other");
        other.created_at = ts(0);
        store.store_page(&old).await.unwrap();
        store.store_page(&newer).await.unwrap();
        store.store_page(&other).await.unwrap();

        let deleted = store.delete_before(ts(30), Some("u1")).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_page("old").await.unwrap().is_none());
        // Exactly at the cutoff is not "strictly less than".
        assert!(store.get_page("new").await.unwrap().is_some());
        assert!(store.get_page("other").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cleanup_expired_removes_old_pages() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        let mut ancient = make_page("ancient", "u1", "ancient");
        ancient.created_at = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let mut fresh = make_page("fresh", "u1", "fresh");
        fresh.created_at = Utc::now();
        store.store_page(&ancient).await.unwrap();
        store.store_page(&fresh).await.unwrap();

        let deleted = store
            .cleanup_expired(Duration::from_secs(3600), None)
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_page("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stats_empty_owner() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        let stats = store.stats_by_owner("nobody").await.unwrap();
        assert_eq!(stats.page_count, 0);
        assert_eq!(stats.total_tokens, 0);
        assert!(stats.oldest_page_at.is_none());
        assert!(stats.newest_page_at.is_none());
    }

    #[tokio::test]
    async fn stats_aggregates_tokens_and_timestamps() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        let mut first = make_page("p1", "u1", "aaaa");
        first.token_count = 10;
        first.created_at = ts(0);
        let mut second = make_page("p2", "u1", "bbbb");
        second.token_count = 15;
        second.created_at = ts(30);
        store.store_page(&first).await.unwrap();
        store.store_page(&second).await.unwrap();

        let stats = store.stats_by_owner("u1").await.unwrap();
        assert_eq!(stats.page_count, 2);
        assert_eq!(stats.total_tokens, 25);
        assert_eq!(stats.oldest_page_at.unwrap(), ts(0));
        assert_eq!(stats.newest_page_at.unwrap(), ts(30));
    }

    #[tokio::test]
    async fn page_embeddings_skips_missing() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        let with = make_page("p1", "u1", "has embedding");
        let mut without = make_page("p2", "u1", "no embedding");
        without.embedding = None;
        store.store_page(&with).await.unwrap();
        store.store_page(&without).await.unwrap();

        let embeddings = store.page_embeddings("u1", &HashSet::new()).await.unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].0, "p1");
    }

    #[tokio::test]
    async fn page_embeddings_honors_exclusion() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        store.store_page(&make_page("p1", "u1", "a")).await.unwrap();
        store.store_page(&make_page("p2", "u1", "b")).await.unwrap();

        let exclude = HashSet::from(["p1".to_string()]);
        let embeddings = store.page_embeddings("u1", &exclude).await.unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].0, "p2");
    }

    #[tokio::test]
    async fn header_matches_case_insensitive_substring() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        let page = make_page("p1", "u1", "content");
        let abs = make_abstract("p1", "u1", &["Kubernetes Deployment", "networking"]);
        store.store_page_with_abstract(&page, &abs).await.unwrap();

        let hits = store
            .header_matches("u1", "kubernetes", &HashSet::new(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "p1");
        assert_eq!(hits[0].1, "Kubernetes Deployment");

        let none = store
            .header_matches("u1", "databases", &HashSet::new(), 10)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn header_matches_owner_scoped() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        let page = make_page("p1", "u1", "content");
        let abs = make_abstract("p1", "u1", &["kubernetes"]);
        store.store_page_with_abstract(&page, &abs).await.unwrap();

        let hits = store
            .header_matches("u2", "kubernetes", &HashSet::new(), 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn fts5_search_finds_and_orders_matches() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        store
            .store_page(&make_page(
                "p1",
                "u1",
                "Kubernetes is a container orchestration platform",
            ))
            .await
            .unwrap();
        store
            .store_page(&make_page("p2", "u1", "The user likes pizza"))
            .await
            .unwrap();

        let hits = store
            .search_fts5("u1", "\"kubernetes\"", &HashSet::new(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].page_id, "p1");
        assert!(hits[0].raw_score < 0.0, "raw bm25 scores are negative");
    }

    #[tokio::test]
    async fn fts5_search_owner_scoped_and_excluding() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        store
            .store_page(&make_page("p1", "u1", "kubernetes cluster"))
            .await
            .unwrap();
        store
            .store_page(&make_page("p2", "u2", "kubernetes cluster"))
            .await
            .unwrap();

        let hits = store
            .search_fts5("u1", "\"kubernetes\"", &HashSet::new(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].page_id, "p1");

        let exclude = HashSet::from(["p1".to_string()]);
        let hits = store
            .search_fts5("u1", "\"kubernetes\"", &exclude, 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn fts_index_follows_updates_and_deletes() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        store
            .store_page(&make_page("p1", "u1", "rust programming"))
            .await
            .unwrap();
        store
            .store_page(&make_page("p1", "u1", "go programming"))
            .await
            .unwrap();

        let rust_hits = store
            .search_fts5("u1", "\"rust\"", &HashSet::new(), 10)
            .await
            .unwrap();
        assert!(rust_hits.is_empty(), "stale content must leave the index");

        store.delete_page("p1").await.unwrap();
        let go_hits = store
            .search_fts5("u1", "\"go\"", &HashSet::new(), 10)
            .await
            .unwrap();
        assert!(go_hits.is_empty());
    }

    #[tokio::test]
    async fn token_candidates_returns_prebuilt_tokens() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        store
            .store_page(&make_page("p1", "u1", "Hello, World! Kubernetes."))
            .await
            .unwrap();

        let rows = store.token_candidates("u1", &HashSet::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, "hello world kubernetes");
    }

    #[tokio::test]
    async fn like_candidates_prefilters_by_token() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        store
            .store_page(&make_page("p1", "u1", "Kubernetes cluster notes"))
            .await
            .unwrap();
        store
            .store_page(&make_page("p2", "u1", "Completely unrelated"))
            .await
            .unwrap();

        let rows = store
            .like_candidates("u1", &["kubernetes".to_string()], &HashSet::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "p1");
    }

    #[tokio::test]
    async fn table_exists_probes_schema() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        assert!(store.table_exists("pages").await.unwrap());
        assert!(store.table_exists("pages_fts").await.unwrap());
        assert!(!store.table_exists("nonexistent").await.unwrap());
    }

    #[test]
    fn tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("Hello, World! Kubernetes-2024"),
            vec!["hello", "world", "kubernetes", "2024"]
        );
        assert!(tokenize("  ...  ").is_empty());
    }
}
