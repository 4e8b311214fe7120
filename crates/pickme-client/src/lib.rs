//! Client for the pickme daemon's UNIX-domain socket: liveness probing,
//! one-shot request/response, and a thin `search` wrapper. Used by the CLI
//! surface and by any embedder that wants the fast path without paying for
//! an in-process index.

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::timeout;

pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Daemon request timeout")]
    Timeout,
    #[error("Invalid daemon response")]
    InvalidResponse,
    #[error("{0}")]
    Daemon(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// `false` if the socket path doesn't exist; otherwise sends `health` and
/// reports whether the response was `ok`.
pub async fn is_daemon_running(socket: &Path) -> bool {
    is_daemon_running_with_timeout(socket, DEFAULT_PROBE_TIMEOUT_MS).await
}

pub async fn is_daemon_running_with_timeout(socket: &Path, timeout_ms: u64) -> bool {
    if !socket.exists() {
        return false;
    }
    let req = json!({"id": new_id(), "type": "health"});
    match send_request_with_timeout(socket, req, timeout_ms).await {
        Ok(response) => response.get("ok").and_then(Value::as_bool).unwrap_or(false),
        Err(_) => false,
    }
}

/// Connect, write `req` as one NDJSON line, then read until the peer closes
/// the connection and parse the accumulated bytes as JSON. On timeout the
/// socket file is removed (the daemon on the other end is assumed wedged)
/// and the call rejects with `Timeout`.
pub async fn send_request(socket: &Path, req: Value) -> Result<Value, ClientError> {
    send_request_with_timeout(socket, req, DEFAULT_REQUEST_TIMEOUT_MS).await
}

pub async fn send_request_with_timeout(
    socket: &Path,
    mut req: Value,
    timeout_ms: u64,
) -> Result<Value, ClientError> {
    if req.get("id").and_then(Value::as_str).map(str::is_empty).unwrap_or(true) {
        if let Value::Object(map) = &mut req {
            map.insert("id".to_string(), Value::String(new_id()));
        }
    }

    let mut line = serde_json::to_string(&req).map_err(|_| ClientError::InvalidResponse)?;
    line.push('\n');

    let outcome = timeout(Duration::from_millis(timeout_ms), roundtrip(socket, line)).await;

    let buf = match outcome {
        Ok(inner) => inner?,
        Err(_) => {
            let _ = std::fs::remove_file(socket);
            return Err(ClientError::Timeout);
        }
    };

    serde_json::from_slice(&buf).map_err(|_| ClientError::InvalidResponse)
}

async fn roundtrip(socket: &Path, line: String) -> Result<Vec<u8>, ClientError> {
    let mut stream = UnixStream::connect(socket).await?;
    stream.write_all(line.as_bytes()).await?;
    stream.shutdown().await?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Fill in `type: "search"`, default `limit` to 50, and reject with the
/// server-supplied `error` on `ok: false`.
pub async fn query_daemon(
    socket: &Path,
    query: &str,
    cwd: Option<&str>,
    limit: Option<u32>,
) -> Result<Value, ClientError> {
    let payload = json!({
        "id": new_id(),
        "type": "search",
        "query": query,
        "cwd": cwd,
        "limit": limit.unwrap_or(50),
    });
    let response = send_request(socket, payload).await?;
    match response.get("ok").and_then(Value::as_bool) {
        Some(true) => Ok(response),
        Some(false) => {
            let message = response
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("daemon request failed")
                .to_string();
            Err(ClientError::Daemon(message))
        }
        None => Err(ClientError::InvalidResponse),
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::UnixListener;

    async fn spawn_fake_daemon(respond: &'static str) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            write_half.write_all(respond.as_bytes()).await.unwrap();
            write_half.shutdown().await.unwrap();
        });
        (dir, path)
    }

    #[tokio::test]
    async fn test_is_daemon_running_false_when_socket_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.sock");
        assert!(!is_daemon_running(&path).await);
    }

    #[tokio::test]
    async fn test_is_daemon_running_true_on_healthy_response() {
        let (_dir, path) = spawn_fake_daemon(r#"{"id":"x","ok":true,"health":{}}"#).await;
        assert!(is_daemon_running(&path).await);
    }

    #[tokio::test]
    async fn test_send_request_round_trip() {
        let (_dir, path) = spawn_fake_daemon(r#"{"id":"x","ok":true,"results":[]}"#).await;
        let response = send_request(&path, json!({"id": "x", "type": "search", "query": "a"}))
            .await
            .unwrap();
        assert_eq!(response["ok"], true);
    }

    #[tokio::test]
    async fn test_send_request_fills_missing_id() {
        let (_dir, path) = spawn_fake_daemon(r#"{"id":"x","ok":true}"#).await;
        let response = send_request(&path, json!({"type": "health"})).await.unwrap();
        assert_eq!(response["ok"], true);
    }

    #[tokio::test]
    async fn test_send_request_invalid_json_response() {
        let (_dir, path) = spawn_fake_daemon("not json").await;
        let err = send_request(&path, json!({"id": "x", "type": "health"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse));
    }

    #[tokio::test]
    async fn test_query_daemon_rejects_on_ok_false() {
        let (_dir, path) =
            spawn_fake_daemon(r#"{"id":"x","ok":false,"error":"malformed query"}"#).await;
        let err = query_daemon(&path, "foo", None, None).await.unwrap_err();
        match err {
            ClientError::Daemon(message) => assert_eq!(message, "malformed query"),
            other => panic!("expected Daemon error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_request_timeout_destroys_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stuck.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        let err = send_request_with_timeout(&path, json!({"id": "x", "type": "health"}), 50)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout));
        assert!(!path.exists());
    }
}
