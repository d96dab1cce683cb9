//! Serializable record of one accepted request.

use crate::decoder::{DecodeError, DecodedBody};
use crate::server::IncomingRequest;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// What the server saw for one exchange, taken right after the decoder chain
/// finished.
///
/// Every field is always present. `parse_error` holds the decoder failure,
/// if any, exactly as the decoder reported it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    pub http_version: String,
    pub method: String,
    pub url: String,
    pub query: BTreeMap<String, Value>,
    pub headers: BTreeMap<String, String>,
    pub raw_headers: Vec<(String, String)>,
    pub upgrade: bool,
    pub body: Option<DecodedBody>,
    pub parse_error: Option<DecodeError>,
    pub trailers: BTreeMap<String, String>,
    pub raw_trailers: Vec<(String, String)>,
}

impl RequestSnapshot {
    pub fn capture(req: &IncomingRequest, parse_error: Option<DecodeError>) -> Self {
        Self {
            http_version: req.http_version.clone(),
            method: req.method.clone(),
            url: req.url.clone(),
            query: req.query.clone(),
            headers: req.headers.clone(),
            raw_headers: req.raw_headers.clone(),
            upgrade: req.upgrade,
            body: req.body.clone(),
            parse_error,
            trailers: req.trailers.clone(),
            raw_trailers: req.raw_trailers.clone(),
        }
    }

    /// Get a header by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(self.url.as_str(), |(path, _)| path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> IncomingRequest {
        IncomingRequest::new(
            "1.1",
            "POST",
            "/aa?x=1",
            vec![
                ("Host".to_string(), "localhost".to_string()),
                ("X-Trace".to_string(), "a".to_string()),
                ("X-Trace".to_string(), "b".to_string()),
            ],
            Vec::new(),
        )
    }

    #[test]
    fn test_capture_copies_request_view() {
        let mut req = request();
        req.body = Some(DecodedBody::empty());
        let snap = RequestSnapshot::capture(&req, None);
        assert_eq!(snap.method, "POST");
        assert_eq!(snap.path(), "/aa");
        assert_eq!(snap.header("x-trace"), Some("a, b"));
        assert_eq!(snap.raw_headers.len(), 3);
        assert_eq!(snap.query.get("x"), Some(&json!("1")));
        assert_eq!(snap.body, Some(DecodedBody::Json(json!({}))));
        assert!(snap.parse_error.is_none());
    }

    #[test]
    fn test_capture_is_detached_from_request() {
        let mut req = request();
        let snap = RequestSnapshot::capture(&req, None);
        req.body = Some(DecodedBody::Text("later".into()));
        assert_eq!(snap.body, None);
    }

    #[test]
    fn test_serializes_camel_case_with_every_field() {
        let err = DecodeError::new("oups").with_field("mock", "yup, it is");
        let snap = RequestSnapshot::capture(&request(), Some(err));
        let value = serde_json::to_value(&snap).unwrap();
        for key in [
            "httpVersion",
            "method",
            "url",
            "query",
            "headers",
            "rawHeaders",
            "upgrade",
            "body",
            "parseError",
            "trailers",
            "rawTrailers",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["parseError"]["mock"], json!("yup, it is"));
        assert_eq!(value["rawHeaders"][0], json!(["Host", "localhost"]));
    }
}
