//! The picker orchestrator: composes the escaper, prefix resolver, fuzzy
//! scorer, and index store into `search` / `ensure_indexed` / `refresh_index`.

use std::path::Path;
use std::time::Instant;

use pickme_core::{Config, Env};
use pickme_store::{FileMetaInput, Store, WatchedRoot};

use crate::escape::escape_query;
use crate::fuzzy::{candidate_limit, score_candidates};
use crate::prefix::{parse_prefix, resolve, strip_escaped_at, strip_fuzzy_sigil, Prefix, ResolveContext};
use crate::{PickResult, PickerError, SearchOptions};

/// A batch of freshly-walked files for one root, as produced by the
/// external directory walker. The walker itself is injected, not part of
/// this crate.
#[derive(Debug, Clone, Default)]
pub struct WalkBatch {
    pub files: Vec<FileMetaInput>,
}

/// Parameters the orchestrator hands the external walker.
#[derive(Debug, Clone)]
pub struct WalkParams {
    pub max_depth: u32,
    pub include_hidden: bool,
    pub include_gitignored: bool,
    pub exclude_patterns: Vec<String>,
    pub max_files: u64,
    pub incremental_since: Option<i64>,
}

/// The caller-supplied walk function: given a root and parameters, produce
/// the file batch. Injected rather than implemented here, since walking the
/// filesystem is out of scope for this crate.
pub type Walker = dyn Fn(&str, &WalkParams) -> Result<WalkBatch, PickerError> + Send + Sync;

/// Outcome of an indexing pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexOutcome {
    pub files_indexed: u64,
    pub files_skipped: u64,
    pub errors: Vec<String>,
}

/// Owns the DB handle exclusively; handlers never retain it across
/// suspensions.
pub struct Picker {
    store: Store,
    config: Config,
    env: Env,
}

impl Picker {
    pub fn new(store: Store, config: Config) -> Self {
        Self { store, config, env: Env::from_process() }
    }

    pub fn with_env(store: Store, config: Config, env: Env) -> Self {
        Self { store, config, env }
    }

    /// Search with the given query and options.
    pub async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<PickResult>, PickerError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let literal = strip_escaped_at(query);
        let (prefix, remainder) = match literal {
            Some(literal_query) => (Prefix::None, literal_query),
            None => parse_prefix(query),
        };

        let ctx = ResolveContext {
            project_root: opts.project_root.clone(),
            env: self.env.clone(),
        };
        let scope = resolve(&prefix, &ctx, &self.config);

        let mut path_filters = scope.roots;
        if path_filters.is_empty() {
            if let Some(root) = &opts.project_root {
                path_filters.push(root.clone());
            }
        }

        let prefix_rest: &str = match &prefix {
            Prefix::Namespace { rest, .. } => rest,
            Prefix::Folder { rest, .. } => rest,
            _ => remainder,
        };

        let (search_query, forced_fuzzy) = strip_fuzzy_sigil(prefix_rest);

        let effective_query = if search_query.trim().is_empty() {
            match &prefix {
                Prefix::Folder { relpath, .. } => {
                    relpath.rsplit('/').next().unwrap_or(relpath).to_string()
                }
                Prefix::Namespace { name, .. } => name.clone(),
                _ => search_query.clone(),
            }
        } else {
            search_query.clone()
        };

        if let Prefix::Glob { pattern } = &prefix {
            let rows = self
                .store
                .list_by_extension(&glob_suffix(pattern), &path_filters, opts.limit)
                .await?;
            return Ok(rows.into_iter().map(PickResult::from).collect());
        }

        if forced_fuzzy {
            return self.fuzzy_search(&effective_query, &path_filters, opts.limit).await;
        }

        let escaped = escape_query(&effective_query);
        if escaped.expression.is_empty() {
            return self.fuzzy_search(&effective_query, &path_filters, opts.limit).await;
        }

        let rows = self
            .store
            .search_fts(&escaped.expression, &path_filters, opts.limit)
            .await?;

        let rows = apply_pattern_filters(rows, &scope.patterns);

        if rows.is_empty() && !effective_query.trim().is_empty() {
            return self.fuzzy_search(&effective_query, &path_filters, opts.limit).await;
        }

        Ok(rows.into_iter().map(PickResult::from).collect())
    }

    async fn fuzzy_search(
        &self,
        query: &str,
        path_filters: &[String],
        limit: u32,
    ) -> Result<Vec<PickResult>, PickerError> {
        let candidates = self
            .store
            .list_all(path_filters, candidate_limit(limit))
            .await?;
        let mut scored = score_candidates(query, candidates);
        scored.truncate(limit as usize);
        Ok(scored.into_iter().map(|m| PickResult::from(m.row)).collect())
    }

    /// Indexes any root not yet present in `watched_roots`, or whose
    /// `last_indexed` is null.
    pub async fn ensure_indexed(
        &self,
        roots: &[String],
        walker: &Walker,
    ) -> Result<IndexOutcome, PickerError> {
        let watched = self.store.get_watched_roots().await?;
        let mut outcome = IndexOutcome::default();

        for root in roots {
            let already = watched
                .iter()
                .find(|w| &w.root == root)
                .is_some_and(|w| w.last_indexed.is_some());
            if already {
                continue;
            }

            let depth = self
                .config
                .index
                .depth
                .per_root
                .get(root)
                .copied()
                .unwrap_or(self.config.index.depth.default);

            let params = WalkParams {
                max_depth: depth,
                include_hidden: self.config.index.include_hidden,
                include_gitignored: !self.config.index.exclude.gitignored_files,
                exclude_patterns: self.config.index.exclude.patterns.clone(),
                max_files: self.config.index.limits.max_files_per_root,
                incremental_since: None,
            };

            match walker(root, &params) {
                Ok(batch) => {
                    outcome.files_indexed += batch.files.len() as u64;
                    self.store.upsert_files(&batch.files).await?;
                    self.store
                        .update_watched_root(&WatchedRoot {
                            root: root.clone(),
                            max_depth: depth as i64,
                            last_indexed: Some(now_ms()),
                            file_count: Some(batch.files.len() as i64),
                        })
                        .await?;
                    self.refresh_frecency(root).await;
                }
                Err(err) => {
                    outcome.files_skipped += 1;
                    outcome.errors.push(err.to_string());
                }
            }
        }

        Ok(outcome)
    }

    /// Incremental unless `force`; prunes stale entries and bumps the
    /// generation counter on success.
    pub async fn refresh_index(
        &self,
        root: &str,
        force: bool,
        walker: &Walker,
    ) -> Result<IndexOutcome, PickerError> {
        let start = Instant::now();
        let watched = self.store.get_watched_roots().await?;
        let existing = watched.iter().find(|w| w.root == root);

        let depth = existing.map(|w| w.max_depth as u32).unwrap_or(
            self.config
                .index
                .depth
                .per_root
                .get(root)
                .copied()
                .unwrap_or(self.config.index.depth.default),
        );

        let params = WalkParams {
            max_depth: depth,
            include_hidden: self.config.index.include_hidden,
            include_gitignored: !self.config.index.exclude.gitignored_files,
            exclude_patterns: self.config.index.exclude.patterns.clone(),
            max_files: self.config.index.limits.max_files_per_root,
            incremental_since: if force {
                None
            } else {
                existing.and_then(|w| w.last_indexed)
            },
        };

        let mut outcome = IndexOutcome::default();
        let batch = match walker(root, &params) {
            Ok(batch) => batch,
            Err(err) => {
                outcome.errors.push(err.to_string());
                return Ok(outcome);
            }
        };

        outcome.files_indexed = batch.files.len() as u64;
        self.store.upsert_files(&batch.files).await?;

        let existing_set: Vec<String> = batch.files.iter().map(|f| f.path.clone()).collect();
        self.store.prune_missing(&existing_set).await?;

        self.store
            .update_watched_root(&WatchedRoot {
                root: root.to_string(),
                max_depth: depth as i64,
                last_indexed: Some(now_ms()),
                file_count: Some(batch.files.len() as i64),
            })
            .await?;

        self.store.bump_generation().await?;
        self.refresh_frecency(root).await;

        let _ = start.elapsed();
        Ok(outcome)
    }

    async fn refresh_frecency(&self, root: &str) {
        let snapshot = pickme_store::compute_frecency(Path::new(root), now_ms()).await;
        if snapshot.records.is_empty() {
            return;
        }
        if let Err(err) = self.store.upsert_frecency(&snapshot.records).await {
            tracing::warn!(root, %err, "failed to refresh frecency");
        }
    }

    /// Release the DB handle.
    pub async fn close(&self) {
        self.store.close().await;
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

/// Apply glob pattern filters in-process; patterns without `/` are also
/// tried as `**/pattern`.
fn apply_pattern_filters(
    rows: Vec<pickme_store::SearchResultRow>,
    patterns: &[String],
) -> Vec<pickme_store::SearchResultRow> {
    if patterns.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| {
            let relative = row.relative_path.as_deref().unwrap_or(&row.path);
            patterns.iter().any(|pattern| {
                glob_match(pattern, relative)
                    || (!pattern.contains('/') && glob_match(&format!("**/{pattern}"), relative))
            })
        })
        .collect()
}

/// Minimal glob matcher supporting `*` (any run excluding `/`), `?` (one
/// char excluding `/`), and `**` (any run, `/` included); sufficient for
/// the pattern filters this crate produces.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();
    matches_here(&pat, &txt)
}

fn matches_here(pat: &[char], txt: &[char]) -> bool {
    match pat.first() {
        None => txt.is_empty(),
        Some('*') if pat.get(1) == Some(&'*') => {
            let rest = &pat[2..];
            (0..=txt.len()).any(|i| matches_here(rest, &txt[i..]))
        }
        Some('*') => {
            let rest = &pat[1..];
            (0..=txt.len())
                .take_while(|&i| i == 0 || txt[i - 1] != '/')
                .any(|i| matches_here(rest, &txt[i..]))
        }
        Some('?') => !txt.is_empty() && txt[0] != '/' && matches_here(&pat[1..], &txt[1..]),
        Some(&c) => !txt.is_empty() && txt[0] == c && matches_here(&pat[1..], &txt[1..]),
    }
}

fn glob_suffix(pattern: &str) -> String {
    pattern.trim_start_matches('*').to_string()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
