//! The index store's public operations.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, Row, SqlitePool};
use std::str::FromStr;

use crate::schema;
use crate::types::{FileMetaInput, FrecencyInput, SearchResultRow, WatchedRoot};
use crate::{StoreError, StoreResult};

/// A single score formula shared by every ranked query.
const SCORE_EXPR: &str = "coalesce(f.git_recency, 0) \
     + coalesce(f.git_frequency, 0) * 0.1 \
     + coalesce(f.git_status_boost, 0)";

/// Handle to the SQLite-backed index store.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at `db_path` and bootstrap its schema.
    pub async fn open(db_path: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(StoreError::from_sqlx)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5))
            .log_statements(tracing::log::LevelFilter::Debug);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        schema::bootstrap(&pool).await?;
        tracing::info!(path = %db_path.display(), "index store opened");
        Ok(Self { pool })
    }

    /// Open an in-memory store, used by tests and by callers with no
    /// persistence requirement.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(StoreError::from_sqlx)?
            .shared_cache(true)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;
        schema::bootstrap(&pool).await?;
        Ok(Self { pool })
    }

    /// Insert or replace a batch of files under a single `BEGIN IMMEDIATE`
    /// transaction. An empty batch is a no-op.
    pub async fn upsert_files(&self, batch: &[FileMetaInput]) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(StoreError::from_sqlx)?;

        for file in batch {
            sqlx::query(
                "INSERT INTO files_meta (path, filename, dir_components, root, mtime, relative_path) \
                 VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(path) DO UPDATE SET \
                    filename = excluded.filename, \
                    dir_components = excluded.dir_components, \
                    root = excluded.root, \
                    mtime = excluded.mtime, \
                    relative_path = excluded.relative_path",
            )
            .bind(&file.path)
            .bind(&file.filename)
            .bind(&file.dir_components)
            .bind(&file.root)
            .bind(file.mtime)
            .bind(&file.relative_path)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;
        }

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    /// Delete a batch of paths under a single transaction. An empty batch is
    /// a no-op.
    pub async fn delete_files(&self, paths: &[String]) -> StoreResult<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(StoreError::from_sqlx)?;

        for path in paths {
            sqlx::query("DELETE FROM files_meta WHERE path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from_sqlx)?;
        }

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    /// Delete every indexed path not present in `existing_set` (post-scan
    /// sweep after a walk).
    pub async fn prune_missing(&self, existing_set: &[String]) -> StoreResult<u64> {
        let all_paths: Vec<String> = sqlx::query_scalar("SELECT path FROM files_meta")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        let existing: std::collections::HashSet<&str> =
            existing_set.iter().map(String::as_str).collect();
        let stale: Vec<String> = all_paths
            .into_iter()
            .filter(|p| !existing.contains(p.as_str()))
            .collect();

        let pruned = stale.len() as u64;
        self.delete_files(&stale).await?;
        Ok(pruned)
    }

    /// Upsert a batch of frecency records. An empty batch is a no-op.
    pub async fn upsert_frecency(&self, batch: &[FrecencyInput]) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(StoreError::from_sqlx)?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        for record in batch {
            sqlx::query(
                "INSERT INTO frecency (path, git_recency, git_frequency, git_status_boost, last_seen) \
                 VALUES (?, ?, ?, ?, ?) \
                 ON CONFLICT(path) DO UPDATE SET \
                    git_recency = excluded.git_recency, \
                    git_frequency = excluded.git_frequency, \
                    git_status_boost = excluded.git_status_boost, \
                    last_seen = excluded.last_seen",
            )
            .bind(&record.path)
            .bind(record.git_recency)
            .bind(record.git_frequency)
            .bind(record.git_status_boost)
            .bind(now_ms)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;
        }

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    /// All configured roots known to the store.
    pub async fn get_watched_roots(&self) -> StoreResult<Vec<WatchedRoot>> {
        sqlx::query_as::<_, WatchedRoot>(
            "SELECT root, max_depth, last_indexed, file_count FROM watched_roots ORDER BY root",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    /// Insert or update a single watched-root row.
    pub async fn update_watched_root(&self, r: &WatchedRoot) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO watched_roots (root, max_depth, last_indexed, file_count) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(root) DO UPDATE SET \
                max_depth = excluded.max_depth, \
                last_indexed = excluded.last_indexed, \
                file_count = excluded.file_count",
        )
        .bind(&r.root)
        .bind(r.max_depth)
        .bind(r.last_indexed)
        .bind(r.file_count)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    /// Ranked full-text search combining negated BM25 with frecency.
    /// `query` must already be a well-formed FTS5 MATCH expression (see the
    /// query escaper); an empty string must never reach this call.
    pub async fn search_fts(
        &self,
        query: &str,
        path_filters: &[String],
        limit: u32,
    ) -> StoreResult<Vec<SearchResultRow>> {
        let (filter_sql, filter_binds) = path_filter_clause("m.path", path_filters);

        let sql = format!(
            "SELECT m.path AS path, m.filename AS filename, m.relative_path AS relative_path, \
                    m.root AS root, \
                    (-bm25(files_fts) + {score}) AS score \
             FROM files_fts \
             JOIN files_meta m ON m.rowid = files_fts.rowid \
             LEFT JOIN frecency f ON f.path = m.path \
             WHERE files_fts MATCH ?{filters} \
             ORDER BY score DESC \
             LIMIT ?",
            score = SCORE_EXPR,
            filters = if filter_binds.is_empty() {
                String::new()
            } else {
                format!(" AND ({filter_sql})")
            },
        );

        let mut q = sqlx::query_as::<_, SearchResultRow>(&sql).bind(query);
        for pattern in &filter_binds {
            q = q.bind(pattern.clone());
        }
        q = q.bind(limit as i64);

        q.fetch_all(&self.pool).await.map_err(|err| match &err {
            sqlx::Error::Database(db_err) if db_err.message().to_lowercase().contains("fts5") => {
                StoreError::FtsSyntax {
                    query: query.to_string(),
                    source: err,
                }
            }
            _ => StoreError::from_sqlx(err),
        })
    }

    /// Suffix-match on filename (`LIKE '%<ext>'`), frecency-only ranking.
    /// Backs glob-prefix queries like `@*.ts`.
    pub async fn list_by_extension(
        &self,
        ext: &str,
        path_filters: &[String],
        limit: u32,
    ) -> StoreResult<Vec<SearchResultRow>> {
        let (filter_sql, filter_binds) = path_filter_clause("m.path", path_filters);

        let sql = format!(
            "SELECT m.path AS path, m.filename AS filename, m.relative_path AS relative_path, \
                    m.root AS root, \
                    ({score}) AS score \
             FROM files_meta m \
             LEFT JOIN frecency f ON f.path = m.path \
             WHERE m.filename LIKE ? ESCAPE '\\'{filters} \
             ORDER BY score DESC, m.filename ASC \
             LIMIT ?",
            score = SCORE_EXPR,
            filters = if filter_binds.is_empty() {
                String::new()
            } else {
                format!(" AND ({filter_sql})")
            },
        );

        let pattern = format!("%{}", escape_like(ext));
        let mut q = sqlx::query_as::<_, SearchResultRow>(&sql).bind(pattern);
        for pattern in &filter_binds {
            q = q.bind(pattern.clone());
        }
        q = q.bind(limit as i64);

        q.fetch_all(&self.pool).await.map_err(StoreError::from_sqlx)
    }

    /// Every indexed file under the given path filters, frecency-only
    /// ranked. Backs the fuzzy candidate set.
    pub async fn list_all(
        &self,
        path_filters: &[String],
        limit: u32,
    ) -> StoreResult<Vec<SearchResultRow>> {
        let (filter_sql, filter_binds) = path_filter_clause("m.path", path_filters);

        let sql = format!(
            "SELECT m.path AS path, m.filename AS filename, m.relative_path AS relative_path, \
                    m.root AS root, \
                    ({score}) AS score \
             FROM files_meta m \
             LEFT JOIN frecency f ON f.path = m.path \
             {where_clause} \
             ORDER BY score DESC, m.filename ASC \
             LIMIT ?",
            score = SCORE_EXPR,
            where_clause = if filter_binds.is_empty() {
                String::new()
            } else {
                format!("WHERE {filter_sql}")
            },
        );

        let mut q = sqlx::query_as::<_, SearchResultRow>(&sql);
        for pattern in &filter_binds {
            q = q.bind(pattern.clone());
        }
        q = q.bind(limit as i64);

        q.fetch_all(&self.pool).await.map_err(StoreError::from_sqlx)
    }

    /// Read the persisted generation counter (`PRAGMA user_version`).
    pub async fn read_generation(&self) -> StoreResult<i64> {
        let row = sqlx::query("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(row.try_get::<i64, _>(0).map_err(StoreError::from_sqlx)?)
    }

    /// Atomically bump and return the generation counter. `user_version` is
    /// a 32-bit signed pragma; wrap to 0 on overflow.
    pub async fn bump_generation(&self) -> StoreResult<i64> {
        let current = self.read_generation().await?;
        let next = if current >= i64::from(i32::MAX) {
            0
        } else {
            current + 1
        };
        sqlx::query(&format!("PRAGMA user_version = {next}"))
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(next)
    }

    /// Release the pool. Safe to call more than once.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Escape `\`, `%`, and `_` for use inside a `LIKE ... ESCAPE '\\'` pattern.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Build the `path LIKE ?` OR-clause and bind list for a set of absolute
/// path-filter prefixes, appended as `m.path LIKE ? ESCAPE '\\'` clauses
/// OR-joined.
fn path_filter_clause(column: &str, path_filters: &[String]) -> (String, Vec<String>) {
    if path_filters.is_empty() {
        return (String::new(), Vec::new());
    }
    let clauses: Vec<String> = path_filters
        .iter()
        .map(|_| format!("{column} LIKE ? ESCAPE '\\'"))
        .collect();
    let binds = path_filters
        .iter()
        .map(|prefix| {
            let trimmed = prefix.trim_end_matches('/');
            if trimmed.is_empty() {
                "%".to_string()
            } else {
                format!("{}/%", escape_like(trimmed))
            }
        })
        .collect();
    (clauses.join(" OR "), binds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, root: &str) -> FileMetaInput {
        let p = std::path::Path::new(path);
        FileMetaInput {
            path: path.to_string(),
            filename: p.file_name().unwrap().to_string_lossy().to_string(),
            dir_components: p
                .parent()
                .map(|d| d.to_string_lossy().replace('/', " "))
                .unwrap_or_default(),
            root: root.to_string(),
            mtime: 0,
            relative_path: Some(path.trim_start_matches(root).trim_start_matches('/').to_string()),
        }
    }

    async fn corpus() -> Store {
        let store = Store::open_in_memory().await.unwrap();
        store
            .upsert_files(&[
                file("/p/src/components/Button.tsx", "/p"),
                file("/p/src/components/Modal.tsx", "/p"),
                file("/p/src/utils/helpers.ts", "/p"),
                file("/p/README.md", "/p"),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_upsert_and_search() {
        let store = corpus().await;
        let results = store.search_fts("\"Butt\"*", &[], 50).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].path.ends_with("Button.tsx"));
        assert!(results[0].score > 0.0);
    }

    #[tokio::test]
    async fn test_search_no_match() {
        let store = corpus().await;
        let results = store.search_fts("\"nonexistentxyz\"*", &[], 50).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_idempotent() {
        let store = Store::open_in_memory().await.unwrap();
        let batch = [file("/p/a.rs", "/p")];
        store.upsert_files(&batch).await.unwrap();
        store.upsert_files(&batch).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files_meta")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
        let fts_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files_fts")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(fts_count, 1);
    }

    #[tokio::test]
    async fn test_delete_files_removes_fts_row() {
        let store = corpus().await;
        store
            .delete_files(&["/p/README.md".to_string()])
            .await
            .unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files_fts")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_prune_missing() {
        let store = corpus().await;
        let pruned = store
            .prune_missing(&["/p/README.md".to_string()])
            .await
            .unwrap();
        assert_eq!(pruned, 3);
        let remaining: Vec<String> = sqlx::query_scalar("SELECT path FROM files_meta")
            .fetch_all(store.pool())
            .await
            .unwrap();
        assert_eq!(remaining, vec!["/p/README.md".to_string()]);
    }

    #[tokio::test]
    async fn test_list_by_extension_matches_tsx_for_ts_suffix() {
        let store = corpus().await;
        let results = store.list_by_extension(".ts", &[], 50).await.unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.filename.as_str()).collect();
        assert!(names.contains(&"helpers.ts"));
        assert!(names.contains(&"Button.tsx") || names.contains(&"Modal.tsx"));
    }

    #[tokio::test]
    async fn test_generation_counter_bumps() {
        let store = Store::open_in_memory().await.unwrap();
        assert_eq!(store.read_generation().await.unwrap(), 0);
        assert_eq!(store.bump_generation().await.unwrap(), 1);
        assert_eq!(store.bump_generation().await.unwrap(), 2);
        assert_eq!(store.read_generation().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_path_filter_restricts_results() {
        let store = corpus().await;
        let results = store
            .list_all(&["/p/src/utils".to_string()], 50)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].path.ends_with("helpers.ts"));
    }

    #[tokio::test]
    async fn test_path_filter_does_not_match_sibling_prefix() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .upsert_files(&[
                file("/p/src/a.ts", "/p"),
                file("/p2/src/b.ts", "/p2"),
                file("/pizza/src/c.ts", "/pizza"),
            ])
            .await
            .unwrap();
        let results = store.list_all(&["/p".to_string()], 50).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].path.ends_with("a.ts"));
    }

    #[tokio::test]
    async fn test_watched_roots_roundtrip() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .update_watched_root(&WatchedRoot {
                root: "/p".to_string(),
                max_depth: 10,
                last_indexed: Some(1000),
                file_count: Some(4),
            })
            .await
            .unwrap();
        let roots = store.get_watched_roots().await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].file_count, Some(4));
    }

    #[tokio::test]
    async fn test_upsert_frecency() {
        let store = corpus().await;
        store
            .upsert_frecency(&[FrecencyInput {
                path: "/p/README.md".to_string(),
                git_recency: 1.0,
                git_frequency: 5,
                git_status_boost: 5.0,
            }])
            .await
            .unwrap();
        let results = store.list_all(&[], 50).await.unwrap();
        let readme = results.iter().find(|r| r.path == "/p/README.md").unwrap();
        assert!((readme.score - (1.0 + 0.5 + 5.0)).abs() < 1e-9);
    }
}
