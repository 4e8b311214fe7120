//! The UNIX-domain socket accept loop: one cooperative task per connection,
//! reading a single framed request and writing a single framed response
//! before closing. Shared state is touched only from task bodies that run
//! to completion without retaining the state across an `.await` that could
//! race another handler's mutation of the same field.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use pickme_query::SearchOptions;

use crate::circuit::CircuitAction;
use crate::protocol::{parse_request, HealthPayload, Request, Response};
use crate::state::DaemonState;

pub const REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Remove a stale socket file unless a `health` probe against it succeeds.
/// Returns `Ok(())` once the path is clear to bind.
pub async fn clear_stale_socket(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if probe_liveness(path).await {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "a daemon is already listening on this socket",
        ));
    }
    std::fs::remove_file(path)?;
    Ok(())
}

async fn probe_liveness(path: &Path) -> bool {
    let Ok(stream) = UnixStream::connect(path).await else {
        return false;
    };
    send_and_read(stream, r#"{"id":"probe","type":"health"}"#)
        .await
        .map(|body| body.contains("\"ok\":true"))
        .unwrap_or(false)
}

async fn send_and_read(mut stream: UnixStream, line: &str) -> std::io::Result<String> {
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    let mut reader = BufReader::new(stream);
    let mut buf = String::new();
    tokio::time::timeout(Duration::from_millis(500), reader.read_line(&mut buf))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "probe timeout"))??;
    Ok(buf)
}

/// Accept connections until `shutdown` is set, dispatching each to its own
/// task. Returns once the listener is closed.
pub async fn serve(
    state: Arc<DaemonState>,
    socket_path: PathBuf,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<()> {
    clear_stale_socket(&socket_path).await?;
    let listener = UnixListener::bind(&socket_path)?;
    tracing::info!(path = %socket_path.display(), "daemon listening");

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let accepted = tokio::time::timeout(Duration::from_millis(250), listener.accept()).await;
        let (stream, _addr) = match accepted {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => {
                tracing::warn!(%err, "accept failed");
                continue;
            }
            Err(_) => continue,
        };

        let state = state.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(state, stream, shutdown).await {
                tracing::debug!(%err, "connection handling ended with an error");
            }
        });
    }

    drop(listener);
    let _ = std::fs::remove_file(&socket_path);
    tracing::info!("daemon stopped accepting connections");
    Ok(())
}

async fn handle_connection(
    state: Arc<DaemonState>,
    stream: UnixStream,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(());
    }

    let response = match tokio::time::timeout(
        Duration::from_millis(REQUEST_TIMEOUT_MS),
        dispatch(&state, line.trim_end(), &shutdown),
    )
    .await
    {
        Ok(response) => response,
        Err(_) => Response::error(String::new(), "Request timeout"),
    };

    write_half.write_all(response.to_line().as_bytes()).await?;
    write_half.shutdown().await?;
    Ok(())
}

/// Parse, validate, and dispatch one request line to a response. Never
/// panics: every handler error is translated to a structured error
/// response.
async fn dispatch(state: &Arc<DaemonState>, line: &str, shutdown: &Arc<AtomicBool>) -> Response {
    maybe_check_rss(state, shutdown).await;

    let request = match parse_request(line) {
        Ok(request) => request,
        Err(err) => return Response::error(err.response_id(), err.message()),
    };

    let id = request.id().to_string();
    match request {
        Request::Search { query, cwd, limit, .. } => {
            handle_search(state, id, query, cwd, limit).await
        }
        Request::Health { .. } => handle_health(state, id).await,
        Request::Invalidate { root, .. } => handle_invalidate(state, id, root).await,
        Request::Stop { .. } => {
            shutdown.store(true, Ordering::SeqCst);
            Response::empty(id)
        }
    }
}

async fn handle_search(
    state: &Arc<DaemonState>,
    id: String,
    query: String,
    cwd: Option<String>,
    limit: Option<u32>,
) -> Response {
    let start = Instant::now();
    let opts = SearchOptions::new(cwd, limit);
    match state.picker.search(&query, &opts).await {
        Ok(results) => {
            state.db_errors.record_success();
            state.record_cache_outcome(false);
            let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
            let entries = results.into_iter().map(Into::into).collect();
            Response::search(id, entries, duration_ms)
        }
        Err(err) => {
            let daemon_err = crate::error::DaemonError::from(err);
            record_db_outcome(state, &daemon_err);
            Response::error(id, daemon_err.response_message())
        }
    }
}

async fn handle_health(state: &Arc<DaemonState>, id: String) -> Response {
    let generation = state
        .picker
        .store()
        .read_generation()
        .await
        .unwrap_or_else(|_| state.generation.lock().unwrap().current());
    state.generation.lock().unwrap().observe(generation);

    let rss = state.rss.lock().unwrap().sample();
    let payload = HealthPayload {
        uptime: state.uptime_secs(),
        rss,
        generation,
        cache_hit_rate: state.cache_hit_rate(),
        active_watchers: 0,
        roots_loaded: state.config.index.roots.len() as u32,
    };
    Response::health(id, payload)
}

async fn handle_invalidate(state: &Arc<DaemonState>, id: String, _root: Option<String>) -> Response {
    match state.picker.store().bump_generation().await {
        Ok(next) => {
            state.db_errors.record_success();
            state.generation.lock().unwrap().observe(next);
            Response::empty(id)
        }
        Err(err) => {
            let daemon_err = crate::error::DaemonError::Database(err);
            record_db_outcome(state, &daemon_err);
            Response::error(id, daemon_err.response_message())
        }
    }
}

fn record_db_outcome(state: &Arc<DaemonState>, err: &crate::error::DaemonError) {
    if err.is_database_error() {
        if state.db_errors.record_failure() == CircuitAction::Shutdown {
            tracing::error!("second consecutive database error, shutting down");
            std::process::exit(1);
        }
    }
}

async fn maybe_check_rss(state: &Arc<DaemonState>, shutdown: &Arc<AtomicBool>) {
    let action = {
        let mut rss = state.rss.lock().unwrap();
        rss.check()
    };
    match action {
        (rss, CircuitAction::WarnHighRss) => {
            tracing::warn!(rss_bytes = rss, "daemon RSS exceeds 256 MiB");
        }
        (rss, CircuitAction::Shutdown) => {
            tracing::error!(rss_bytes = rss, "daemon RSS exceeds 512 MiB, shutting down");
            shutdown.store(true, Ordering::SeqCst);
        }
        (_, CircuitAction::Continue) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickme_core::Config;
    use pickme_query::Picker;
    use pickme_store::Store;

    async fn state_with_corpus() -> Arc<DaemonState> {
        let store = Store::open_in_memory().await.unwrap();
        store
            .upsert_files(&[pickme_store::FileMetaInput {
                path: "/p/src/components/Button.tsx".to_string(),
                filename: "Button.tsx".to_string(),
                dir_components: "src components".to_string(),
                root: "/p".to_string(),
                mtime: 0,
                relative_path: Some("src/components/Button.tsx".to_string()),
            }])
            .await
            .unwrap();
        let picker = Picker::new(store, Config::default());
        Arc::new(DaemonState::new(picker, Config::default(), pickme_core::Env::default()).await)
    }

    #[tokio::test]
    async fn test_dispatch_search_round_trip() {
        let state = state_with_corpus().await;
        let shutdown = Arc::new(AtomicBool::new(false));
        let response = dispatch(
            &state,
            r#"{"id":"x","type":"search","query":"Button","cwd":"/p"}"#,
            &shutdown,
        )
        .await;
        match response {
            Response::SearchOk { id, ok, results, cached, .. } => {
                assert_eq!(id, "x");
                assert!(ok);
                assert!(!cached);
                assert_eq!(results.len(), 1);
                assert!(results[0].path.ends_with("Button.tsx"));
            }
            other => panic!("expected SearchOk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_invalid_json() {
        let state = state_with_corpus().await;
        let shutdown = Arc::new(AtomicBool::new(false));
        let response = dispatch(&state, "not json", &shutdown).await;
        match response {
            Response::Err { ok, error, .. } => {
                assert!(!ok);
                assert_eq!(error, "invalid JSON");
            }
            other => panic!("expected Err, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_health() {
        let state = state_with_corpus().await;
        let shutdown = Arc::new(AtomicBool::new(false));
        let response = dispatch(&state, r#"{"id":"h","type":"health"}"#, &shutdown).await;
        match response {
            Response::HealthOk { id, ok, health } => {
                assert_eq!(id, "h");
                assert!(ok);
                assert_eq!(health.generation, 0);
            }
            other => panic!("expected HealthOk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_invalidate_bumps_generation() {
        let state = state_with_corpus().await;
        let shutdown = Arc::new(AtomicBool::new(false));
        assert_eq!(state.picker.store().read_generation().await.unwrap(), 0);
        let response = dispatch(&state, r#"{"id":"i","type":"invalidate"}"#, &shutdown).await;
        assert!(matches!(response, Response::Empty { ok: true, .. }));
        assert_eq!(state.picker.store().read_generation().await.unwrap(), 1);
        let response = dispatch(&state, r#"{"id":"i2","type":"invalidate"}"#, &shutdown).await;
        assert!(matches!(response, Response::Empty { ok: true, .. }));
        assert_eq!(state.picker.store().read_generation().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_stop_sets_shutdown() {
        let state = state_with_corpus().await;
        let shutdown = Arc::new(AtomicBool::new(false));
        let response = dispatch(&state, r#"{"id":"s","type":"stop"}"#, &shutdown).await;
        assert!(matches!(response, Response::Empty { ok: true, .. }));
        assert!(shutdown.load(Ordering::SeqCst));
    }
}
