use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

/// Keys owned by the named fields; extra fields must not shadow them.
const RESERVED_KEYS: [&str; 3] = ["message", "status", "type"];

/// Failure reported by a decoder; aborts the rest of the chain.
///
/// Captured verbatim into [`RequestSnapshot::parse_error`](crate::RequestSnapshot).
/// Besides the message, a decoder may attach an HTTP status, an error type
/// string and any number of extra JSON fields, which serialize flattened next
/// to the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Error category, e.g. `entity.parse.failed`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            kind: None,
            fields: Map::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Attach an extra field; a later value for the same key replaces the earlier one.
    ///
    /// `message`, `status` and `type` are skipped: set those through
    /// [`new`](Self::new), [`with_status`](Self::with_status) and
    /// [`with_kind`](Self::with_kind).
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) {
            warn!(field = %key, "ignoring extra decode error field with a reserved name");
            return self;
        }
        self.fields.insert(key, value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub(crate) fn too_large(length: usize, limit: usize) -> Self {
        Self::new("request entity too large")
            .with_status(413)
            .with_kind("entity.too.large")
            .with_field("length", length)
            .with_field("limit", limit)
    }

    pub(crate) fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(message)
            .with_status(400)
            .with_kind("entity.parse.failed")
    }

    pub(crate) fn unsupported_charset(charset: &str) -> Self {
        Self::new(format!("unsupported charset \"{}\"", charset.to_uppercase()))
            .with_status(415)
            .with_kind("charset.unsupported")
            .with_field("charset", charset)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({status})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DecodeError {}
