//! NDJSON request/response schema: one object per line, each response
//! echoing the request's `id`.

use serde::{Deserialize, Serialize};

use pickme_query::PickResult;

/// A single incoming line, parsed before dispatch.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    Search {
        id: String,
        query: String,
        cwd: Option<String>,
        limit: Option<u32>,
    },
    Health {
        id: String,
    },
    Invalidate {
        id: String,
        root: Option<String>,
    },
    Stop {
        id: String,
    },
}

impl Request {
    pub fn id(&self) -> &str {
        match self {
            Request::Search { id, .. } => id,
            Request::Health { id } => id,
            Request::Invalidate { id, .. } => id,
            Request::Stop { id } => id,
        }
    }
}

/// Parse one NDJSON line into a [`Request`], applying the schema checks the
/// wire format requires before a typed `Request` is trusted.
pub fn parse_request(line: &str) -> Result<Request, ParseError> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|_| ParseError::InvalidJson)?;

    let id = value.get("id").and_then(|v| v.as_str());
    let Some(id) = id.filter(|s| !s.is_empty()) else {
        return Err(ParseError::MissingId);
    };

    let request: Request = serde_json::from_value(value).map_err(ParseError::Schema)?;

    if let Request::Search { query, .. } = &request {
        if query.trim().is_empty() {
            return Err(ParseError::EmptyQuery(id.to_string()));
        }
    }

    Ok(request)
}

/// Why a request line failed to become a [`Request`]; each variant maps
/// directly to one of the wire-level error strings.
#[derive(Debug, Clone)]
pub enum ParseError {
    InvalidJson,
    MissingId,
    EmptyQuery(String),
    Schema(serde_json::Error),
}

impl ParseError {
    /// The id to echo back, or `""` when none could be recovered.
    pub fn response_id(&self) -> String {
        match self {
            ParseError::EmptyQuery(id) => id.clone(),
            _ => String::new(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            ParseError::InvalidJson => "invalid JSON".to_string(),
            ParseError::MissingId => "id is required".to_string(),
            ParseError::EmptyQuery(_) => "empty query".to_string(),
            ParseError::Schema(err) => err.to_string(),
        }
    }
}

/// One ranked hit, as sent over the wire.
#[derive(Debug, Clone, Serialize)]
pub struct ResultEntry {
    pub path: String,
    pub score: f64,
    pub root: String,
}

impl From<PickResult> for ResultEntry {
    fn from(r: PickResult) -> Self {
        Self {
            path: r.path,
            score: r.score,
            root: r.root,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthPayload {
    pub uptime: u64,
    pub rss: u64,
    pub generation: i64,
    #[serde(rename = "cacheHitRate")]
    pub cache_hit_rate: f64,
    #[serde(rename = "activeWatchers")]
    pub active_watchers: u32,
    #[serde(rename = "rootsLoaded")]
    pub roots_loaded: u32,
}

/// The tagged-variant wire response: `{id, ok}` always present, the rest of
/// the payload keyed by request type. Built explicitly rather than derived
/// from `Request` so a failed parse can still produce a well-formed
/// response with an empty `id`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    SearchOk {
        id: String,
        ok: bool,
        results: Vec<ResultEntry>,
        cached: bool,
        #[serde(rename = "durationMs")]
        duration_ms: f64,
    },
    HealthOk {
        id: String,
        ok: bool,
        health: HealthPayload,
    },
    Empty {
        id: String,
        ok: bool,
    },
    Err {
        id: String,
        ok: bool,
        error: String,
    },
}

impl Response {
    pub fn search(id: String, results: Vec<ResultEntry>, duration_ms: f64) -> Self {
        Response::SearchOk {
            id,
            ok: true,
            results,
            cached: false,
            duration_ms,
        }
    }

    pub fn health(id: String, health: HealthPayload) -> Self {
        Response::HealthOk {
            id,
            ok: true,
            health,
        }
    }

    pub fn empty(id: String) -> Self {
        Response::Empty { id, ok: true }
    }

    pub fn error(id: String, message: impl Into<String>) -> Self {
        Response::Err {
            id,
            ok: false,
            error: message.into(),
        }
    }

    /// Serialize as a single NDJSON line, terminated by `\n`.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"id":"","ok":false,"error":"internal: response serialization failed"}"#.to_string()
        });
        line.push('\n');
        line
    }
}
