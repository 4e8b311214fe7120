//! Git-history mining and status-boost collection.
//!
//! Shells out to `git` and parses its stdout; never links a native library.
//! Any failure (not a repo, git missing, non-zero exit) degrades to an
//! empty result rather than surfacing an error; frecency is best-effort.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::types::FrecencyInput;

const GIT_TIMEOUT_SECS: u64 = 10;
const LOOKBACK: &str = "90 days ago";
const MAX_COMMITS: usize = 1000;
const HALF_LIFE_DAYS: f64 = 14.0;

/// One file's mined git signal before it is folded into a [`FrecencyInput`].
#[derive(Debug, Clone, Default, PartialEq)]
struct RawSignal {
    last_commit: Option<i64>,
    frequency: i64,
    status_boost: f64,
}

/// The full set of per-path signals mined for one root.
#[derive(Debug, Clone, Default)]
pub struct FrecencySnapshot {
    pub records: Vec<FrecencyInput>,
}

/// Mine `root` for recency/frequency/status signal and fold it into one
/// [`FrecencyInput`] batch. Returns an empty snapshot for anything that
/// isn't a git repository or on any git failure (missing binary, non-repo,
/// non-zero exit; all treated as non-fatal).
pub async fn compute_frecency(root: &Path, now_ms: i64) -> FrecencySnapshot {
    if !is_git_repo(root).await {
        return FrecencySnapshot::default();
    }

    let (log_signal, status_signal) =
        tokio::join!(mine_log(root), mine_status(root));

    let mut signals: std::collections::HashMap<String, RawSignal> = log_signal;
    for (path, boost) in status_signal {
        signals.entry(path).or_default().status_boost = boost;
    }

    let now_secs = now_ms / 1000;
    let records = signals
        .into_iter()
        .map(|(path, signal)| {
            let git_recency = signal
                .last_commit
                .map(|ct| recency_score(now_secs, ct))
                .unwrap_or(0.0);
            FrecencyInput {
                path,
                git_recency,
                git_frequency: signal.frequency,
                git_status_boost: signal.status_boost,
            }
        })
        .collect();

    FrecencySnapshot { records }
}

/// `exp(-age_days / 14)`, clamped to `[0, 1]`: `now` -> ~1.0,
/// `now - 14d` -> ~0.368, `now - 28d` -> ~0.135.
fn recency_score(now_secs: i64, commit_ts: i64) -> f64 {
    let age_days = (now_secs - commit_ts).max(0) as f64 / 86_400.0;
    (-age_days / HALF_LIFE_DAYS).exp().clamp(0.0, 1.0)
}

async fn is_git_repo(root: &Path) -> bool {
    let mut cmd = Command::new("git");
    cmd.arg("-C")
        .arg(root)
        .arg("rev-parse")
        .arg("--is-inside-work-tree")
        .current_dir(root)
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    match run_with_timeout(cmd).await {
        Some(status) => status.success(),
        None => false,
    }
}

/// `git log --since='90 days ago' --max-count=1000 --name-only --format=%ct`:
/// parse each commit header (`%ct`, the commit timestamp) followed by the
/// file list, keeping the max `ct` per path and a per-path commit count.
async fn mine_log(root: &Path) -> std::collections::HashMap<String, RawSignal> {
    let mut cmd = Command::new("git");
    cmd.arg("-C")
        .arg(root)
        .arg("log")
        .arg(format!("--since={LOOKBACK}"))
        .arg(format!("--max-count={MAX_COMMITS}"))
        .arg("--name-only")
        .arg("--format=%ct")
        .current_dir(root)
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut signals: std::collections::HashMap<String, RawSignal> = std::collections::HashMap::new();

    let Ok(mut child) = cmd.spawn() else {
        return signals;
    };
    let Some(stdout) = child.stdout.take() else {
        return signals;
    };

    let timeout = Duration::from_secs(GIT_TIMEOUT_SECS);
    let parsed = tokio::time::timeout(timeout, async move {
        let mut reader = BufReader::new(stdout).lines();
        let mut current_ct: Option<i64> = None;
        let mut out: std::collections::HashMap<String, RawSignal> = std::collections::HashMap::new();

        while let Ok(Some(line)) = reader.next_line().await {
            if line.is_empty() {
                continue;
            }
            if let Ok(ct) = line.parse::<i64>() {
                current_ct = Some(ct);
                continue;
            }
            let Some(ct) = current_ct else { continue };
            let abs_path = root.join(&line).to_string_lossy().into_owned();
            let entry = out.entry(abs_path).or_default();
            entry.frequency += 1;
            entry.last_commit = Some(entry.last_commit.map_or(ct, |prev| prev.max(ct)));
        }

        out
    })
    .await;

    let _ = child.kill().await;

    if let Ok(out) = parsed {
        signals = out;
    }
    signals
}

/// `git status --porcelain=v1 -z`: NUL-separated records, each a two-char
/// status prefix followed by a path. `M/A/D/R/C` -> boost 5.0, `??` -> 3.0.
async fn mine_status(root: &Path) -> std::collections::HashMap<String, f64> {
    let mut cmd = Command::new("git");
    cmd.arg("-C")
        .arg(root)
        .arg("status")
        .arg("--porcelain=v1")
        .arg("-z")
        .current_dir(root)
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut boosts = std::collections::HashMap::new();

    let Ok(mut child) = cmd.spawn() else {
        return boosts;
    };
    let Some(mut stdout) = child.stdout.take() else {
        return boosts;
    };

    let timeout = Duration::from_secs(GIT_TIMEOUT_SECS);
    let parsed = tokio::time::timeout(timeout, async move {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await.ok();
        buf
    })
    .await;

    let _ = child.wait().await;

    let Ok(buf) = parsed else {
        return boosts;
    };

    for record in buf.split(|b| *b == 0) {
        if record.len() < 3 {
            continue;
        }
        let status = &record[0..2];
        let rel_path = String::from_utf8_lossy(&record[3..]).into_owned();
        if rel_path.is_empty() {
            continue;
        }
        let boost = if status == b"??" {
            3.0
        } else if status
            .iter()
            .any(|c| matches!(c, b'M' | b'A' | b'D' | b'R' | b'C'))
        {
            5.0
        } else {
            continue;
        };
        let abs_path = root.join(&rel_path).to_string_lossy().into_owned();
        boosts.insert(abs_path, boost);
    }

    boosts
}

async fn run_with_timeout(mut cmd: Command) -> Option<std::process::ExitStatus> {
    let mut child = cmd.spawn().ok()?;
    let timeout = Duration::from_secs(GIT_TIMEOUT_SECS);
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        _ => {
            let _ = child.kill().await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recency_score_now() {
        let now = 1_000_000;
        assert!((recency_score(now, now) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_recency_score_14_days() {
        let now = 1_000_000_000;
        let commit = now - 14 * 86_400;
        let score = recency_score(now, commit);
        assert!((score - 0.368).abs() < 0.01);
    }

    #[test]
    fn test_recency_score_28_days() {
        let now = 1_000_000_000;
        let commit = now - 28 * 86_400;
        let score = recency_score(now, commit);
        assert!((score - 0.135).abs() < 0.01);
    }

    #[test]
    fn test_recency_score_monotone_decreasing() {
        let now = 1_000_000_000;
        let s1 = recency_score(now, now - 1 * 86_400);
        let s2 = recency_score(now, now - 10 * 86_400);
        let s3 = recency_score(now, now - 100 * 86_400);
        assert!(s1 > s2);
        assert!(s2 > s3);
    }

    #[tokio::test]
    async fn test_non_git_dir_returns_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let snapshot = compute_frecency(tmp.path(), 0).await;
        assert!(snapshot.records.is_empty());
    }
}
