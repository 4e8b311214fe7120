//! Schema bootstrap and recovery.
//!
//! Inline SQL, with explicit recovery rules: a `schema_meta` row records the
//! applied version; if the `files_fts` shadow table is missing even though
//! `schema_meta` is present, it is recreated from scratch.

use sqlx::SqlitePool;

use crate::StoreResult;

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

const CREATE_BASE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS files_meta (
    rowid           INTEGER PRIMARY KEY,
    path            TEXT NOT NULL UNIQUE,
    filename        TEXT NOT NULL,
    dir_components  TEXT NOT NULL DEFAULT '',
    root            TEXT NOT NULL,
    mtime           INTEGER NOT NULL,
    relative_path   TEXT
);
CREATE INDEX IF NOT EXISTS idx_files_meta_root ON files_meta(root);
CREATE INDEX IF NOT EXISTS idx_files_meta_filename ON files_meta(filename);

CREATE TABLE IF NOT EXISTS frecency (
    path             TEXT PRIMARY KEY REFERENCES files_meta(path) ON DELETE CASCADE,
    git_recency      REAL NOT NULL DEFAULT 0,
    git_frequency    INTEGER NOT NULL DEFAULT 0,
    git_status_boost REAL NOT NULL DEFAULT 0,
    last_seen        INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS watched_roots (
    root          TEXT PRIMARY KEY,
    max_depth     INTEGER NOT NULL DEFAULT 10,
    last_indexed  INTEGER,
    file_count    INTEGER
);
"#;

const CREATE_FTS_AND_TRIGGERS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS files_fts USING fts5(
    path,
    filename,
    dir_components,
    content='files_meta',
    content_rowid='rowid',
    tokenize='unicode61 remove_diacritics 1'
);

CREATE TRIGGER IF NOT EXISTS files_meta_ai AFTER INSERT ON files_meta BEGIN
    INSERT INTO files_fts(rowid, path, filename, dir_components)
    VALUES (new.rowid, new.path, new.filename, new.dir_components);
END;

CREATE TRIGGER IF NOT EXISTS files_meta_ad AFTER DELETE ON files_meta BEGIN
    INSERT INTO files_fts(files_fts, rowid, path, filename, dir_components)
    VALUES ('delete', old.rowid, old.path, old.filename, old.dir_components);
END;

CREATE TRIGGER IF NOT EXISTS files_meta_au AFTER UPDATE ON files_meta BEGIN
    INSERT INTO files_fts(files_fts, rowid, path, filename, dir_components)
    VALUES ('delete', old.rowid, old.path, old.filename, old.dir_components);
    INSERT INTO files_fts(rowid, path, filename, dir_components)
    VALUES (new.rowid, new.path, new.filename, new.dir_components);
END;
"#;

/// Open with WAL journaling and foreign keys on, then bootstrap/recover the
/// schema.
pub async fn bootstrap(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    let schema_meta_exists = table_exists(pool, "schema_meta").await?;

    if !schema_meta_exists {
        sqlx::raw_sql(CREATE_BASE_TABLES).execute(pool).await?;
        sqlx::raw_sql(CREATE_FTS_AND_TRIGGERS).execute(pool).await?;
        sqlx::query("INSERT INTO schema_meta (key, value) VALUES ('version', ?)")
            .bind(CURRENT_SCHEMA_VERSION.to_string())
            .execute(pool)
            .await?;
        tracing::info!("initialized fresh pickme index schema");
        return Ok(());
    }

    // Recovery path: schema_meta present but the FTS shadow table is gone
    // (e.g. the db file was copied without its WAL, or a prior crash left
    // things half-built).
    if !table_exists(pool, "files_fts").await? {
        tracing::warn!("files_fts missing, recreating FTS index and triggers");
        sqlx::raw_sql(CREATE_FTS_AND_TRIGGERS).execute(pool).await?;
        sqlx::raw_sql(
            "INSERT INTO files_fts(files_fts) VALUES ('rebuild')",
        )
        .execute(pool)
        .await?;
    }

    let version: i64 = sqlx::query_scalar(
        "SELECT CAST(value AS INTEGER) FROM schema_meta WHERE key = 'version'",
    )
    .fetch_one(pool)
    .await?;

    if version < CURRENT_SCHEMA_VERSION {
        // No-op upgrade path today; a future bump would add migration SQL here.
        sqlx::query("UPDATE schema_meta SET value = ? WHERE key = 'version'")
            .bind(CURRENT_SCHEMA_VERSION.to_string())
            .execute(pool)
            .await?;
    }

    Ok(())
}

async fn table_exists(pool: &SqlitePool, name: &str) -> StoreResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn memory_pool() -> SqlitePool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .shared_cache(true);
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_creates_all_tables() {
        let pool = memory_pool().await;
        bootstrap(&pool).await.unwrap();
        for table in ["schema_meta", "files_meta", "frecency", "watched_roots", "files_fts"] {
            assert!(table_exists(&pool, table).await.unwrap(), "{table} missing");
        }
        let version: i64 =
            sqlx::query_scalar("SELECT CAST(value AS INTEGER) FROM schema_meta WHERE key = 'version'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_bootstrap_idempotent() {
        let pool = memory_pool().await;
        bootstrap(&pool).await.unwrap();
        bootstrap(&pool).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_meta WHERE key = 'version'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_bootstrap_recovers_missing_fts() {
        let pool = memory_pool().await;
        bootstrap(&pool).await.unwrap();
        sqlx::raw_sql("DROP TABLE files_fts; DROP TRIGGER files_meta_ai; DROP TRIGGER files_meta_ad; DROP TRIGGER files_meta_au;")
            .execute(&pool)
            .await
            .unwrap();
        assert!(!table_exists(&pool, "files_fts").await.unwrap());
        bootstrap(&pool).await.unwrap();
        assert!(table_exists(&pool, "files_fts").await.unwrap());
    }
}
