use crate::error::MockServerError;
use crate::snapshot::RequestSnapshot;
use may_minihttp::Response;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, warn};

/// Hook invoked with the snapshot of the triggering request and the current
/// template. Returning `Some(patch)` overrides the template for this exchange.
pub type PreResponseHook =
    Arc<dyn Fn(&RequestSnapshot, &ResponseTemplate) -> Option<ResponsePatch> + Send + Sync>;

/// Headers decoders set before the response is resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseDraft {
    headers: Vec<(String, String)>,
}

impl ResponseDraft {
    /// Set a header, replacing any earlier value with the same name (case-insensitive)
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => *slot = (name, value),
            None => self.headers.push((name, value)),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// What the server answers with.
///
/// Every field is optional: status falls back to 200, headers to none and a
/// missing body produces an empty payload.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ResponseTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(skip)]
    pub pre_response: Option<PreResponseHook>,
}

impl ResponseTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_pre_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestSnapshot, &ResponseTemplate) -> Option<ResponsePatch> + Send + Sync + 'static,
    {
        self.pre_response = Some(Arc::new(hook));
        self
    }

    /// Compute the response for one exchange.
    ///
    /// Runs the pre-response hook when present and merges its patch over a
    /// copy of this template; the template itself is never modified.
    pub fn resolve(&self, snapshot: &RequestSnapshot) -> ResolvedResponse {
        let patch = self
            .pre_response
            .as_ref()
            .and_then(|hook| (**hook)(snapshot, self))
            .unwrap_or_default();
        ResolvedResponse {
            status: patch.status.or(self.status).unwrap_or(200),
            body: patch.body.or_else(|| self.body.clone()),
            headers: patch.headers.unwrap_or_else(|| self.headers.clone()),
        }
    }
}

impl fmt::Debug for ResponseTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseTemplate")
            .field("status", &self.status)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .field("pre_response", &self.pre_response.is_some())
            .finish()
    }
}

impl PartialEq for ResponseTemplate {
    fn eq(&self, other: &Self) -> bool {
        let same_hook = match (&self.pre_response, &other.pre_response) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_hook
            && self.status == other.status
            && self.body == other.body
            && self.headers == other.headers
    }
}

/// Per-exchange override returned by a pre-response hook.
///
/// The merge is shallow: a `Some(headers)` replaces the template's whole
/// header map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsePatch {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
}

impl ResponsePatch {
    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn body(body: impl Into<Value>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }
}

/// Final status, body and headers for one exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResponse {
    pub status: u16,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
}

impl ResolvedResponse {
    /// JSON text of the body; empty when there is none.
    ///
    /// A `serde_json::Value` always serializes, so with the current body type
    /// this never fails; the `Result` mirrors `serde_json::to_vec`.
    ///
    /// # Errors
    ///
    /// Returns [`MockServerError::Serialization`] if the body cannot be encoded.
    pub fn encode_body(&self) -> Result<Vec<u8>, MockServerError> {
        match &self.body {
            Some(body) => Ok(serde_json::to_vec(body)?),
            None => Ok(Vec::new()),
        }
    }
}

fn status_reason(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown")
}

/// Merge decoder-set and resolved headers; resolved ones win on name collision.
fn merge_headers(
    draft: &ResponseDraft,
    resolved: &BTreeMap<String, String>,
) -> Vec<(String, String)> {
    let mut merged = draft.clone();
    for (name, value) in resolved {
        merged.set_header(name.as_str(), value.as_str());
    }
    merged.headers
}

fn is_valid_header(name: &str, value: &str) -> bool {
    http::HeaderName::from_bytes(name.as_bytes()).is_ok()
        && http::HeaderValue::from_str(value).is_ok()
}

/// Header lines handed to `may_minihttp`, which only accepts `'static` slices.
static HEADER_LINES: Mutex<BTreeMap<String, &'static str>> = Mutex::new(BTreeMap::new());

/// Leak each distinct `name: value` line once and reuse it afterwards.
///
/// Memory grows with the number of distinct header lines, not with traffic.
fn intern_header_line(name: &str, value: &str) -> &'static str {
    let line = format!("{name}: {value}");
    let mut lines = HEADER_LINES.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = lines.get(&line) {
        return existing;
    }
    let leaked: &'static str = Box::leak(line.clone().into_boxed_str());
    lines.insert(line, leaked);
    leaked
}

/// Write a resolved response to the transport.
pub fn write_response(res: &mut Response, draft: &ResponseDraft, resolved: &ResolvedResponse) {
    let payload = match resolved.encode_body() {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(error = %err, status = resolved.status, "failed to serialize response body");
            res.status_code(500, status_reason(500));
            return;
        }
    };

    res.status_code(resolved.status as usize, status_reason(resolved.status));
    for (name, value) in merge_headers(draft, &resolved.headers) {
        if !is_valid_header(&name, &value) {
            warn!(header = %name, "skipping invalid response header");
            continue;
        }
        res.header(intern_header_line(&name, &value));
    }
    res.body_vec(payload);
}
