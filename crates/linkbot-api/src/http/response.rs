//! JSON envelope shared by every API response.
//!
//! ```json
//! {
//!   "data": { ... },
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 5 },
//!   "errors": [],
//!   "_links": { "events": "..." }
//! }
//! ```
//!
//! `data` is always present (null on errors); `errors` and `_links` are
//! omitted when empty.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

/// Request id plus start time, captured when a handler begins.
pub struct RequestTimer {
    request_id: String,
    started: Instant,
}

impl RequestTimer {
    pub fn start() -> Self {
        Self {
            request_id: Uuid::now_v7().to_string(),
            started: Instant::now(),
        }
    }

    fn meta(&self) -> ApiMeta {
        ApiMeta {
            request_id: self.request_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            response_time_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub meta: ApiMeta,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiErrorDetail>,
    #[serde(rename = "_links", skip_serializing_if = "HashMap::is_empty")]
    pub links: HashMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
pub struct ApiMeta {
    pub request_id: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub response_time_ms: u64,
}

/// One entry of `errors`: machine-readable code plus message.
#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, timer: &RequestTimer) -> Self {
        Self {
            data: Some(data),
            meta: timer.meta(),
            errors: Vec::new(),
            links: HashMap::new(),
        }
    }

    /// Attach a related resource under `_links`.
    pub fn with_link(mut self, rel: &'static str, href: impl Into<String>) -> Self {
        self.links.insert(rel, href.into());
        self
    }
}

impl ApiResponse<()> {
    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            data: None,
            meta: RequestTimer::start().meta(),
            errors: vec![ApiErrorDetail {
                code,
                message: message.into(),
            }],
            links: HashMap::new(),
        }
    }
}
