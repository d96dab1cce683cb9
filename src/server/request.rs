use crate::decoder::DecodedBody;
use may_minihttp::Request;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{self, Read};
use tracing::debug;

/// Mutable view of one incoming request, handed to every decoder in turn.
///
/// Decoders read `raw_body` and write `body`; everything else is captured from
/// the transport before the chain starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomingRequest {
    /// Protocol version, e.g. `"1.1"`
    pub http_version: String,
    /// HTTP method as sent by the client
    pub method: String,
    /// Request target including the query string
    pub url: String,
    /// Query string parameters; repeated keys become arrays
    pub query: BTreeMap<String, Value>,
    /// Lowercase header name to value; duplicates joined with `", "`
    pub headers: BTreeMap<String, String>,
    /// Every header pair in arrival order with its original casing
    pub raw_headers: Vec<(String, String)>,
    /// Whether the client asked for a protocol upgrade
    pub upgrade: bool,
    /// Trailer fields (lowercase name to value)
    pub trailers: BTreeMap<String, String>,
    /// Every trailer pair in arrival order
    pub raw_trailers: Vec<(String, String)>,
    /// Undecoded request payload
    pub raw_body: Vec<u8>,
    /// Set by the decoder that consumed `raw_body`; later decoders skip
    pub body_consumed: bool,
    /// Body produced by the decoders so far
    pub body: Option<DecodedBody>,
}

impl IncomingRequest {
    /// Build a request from header pairs, deriving the normalized header map,
    /// query and upgrade flag.
    pub fn new(
        http_version: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        raw_headers: Vec<(String, String)>,
        raw_body: Vec<u8>,
    ) -> Self {
        let url = url.into();
        let headers = normalize_headers(&raw_headers);
        let upgrade = is_upgrade(&headers);
        Self {
            http_version: http_version.into(),
            method: method.into(),
            query: parse_query_params(&url),
            url,
            headers,
            raw_headers,
            upgrade,
            trailers: BTreeMap::new(),
            raw_trailers: Vec::new(),
            raw_body,
            body_consumed: false,
            body: None,
        }
    }

    /// Get a header by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Media type of the body without parameters, lowercased
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .and_then(|ct| ct.split(';').next())
            .map(|mt| mt.trim().to_ascii_lowercase())
            .filter(|mt| !mt.is_empty())
    }

    /// `charset` parameter of the content type, lowercased
    pub fn charset(&self) -> Option<String> {
        self.header("content-type")?
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim().trim_matches('"').to_ascii_lowercase())
    }

    /// Whether the client sent any payload
    pub fn has_body(&self) -> bool {
        !self.raw_body.is_empty()
    }
}

/// Collapse raw header pairs into a lowercase-keyed map.
///
/// Repeated headers keep every value, joined with `", "` in arrival order.
pub fn normalize_headers(raw: &[(String, String)]) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in raw {
        headers
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }
    headers
}

/// Parse query string parameters from a URL path
///
/// Extracts everything after the `?` character and URL-decodes parameter names
/// and values. A key given more than once maps to an array of its values.
pub fn parse_query_params(path: &str) -> BTreeMap<String, Value> {
    match path.split_once('?') {
        Some((_, query)) => crate::decoder::urlencoded::parse_flat(query.as_bytes()),
        None => BTreeMap::new(),
    }
}

fn is_upgrade(headers: &BTreeMap<String, String>) -> bool {
    headers.contains_key("upgrade")
        && headers.get("connection").is_some_and(|connection| {
            connection
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        })
}

/// Extract an [`IncomingRequest`] from a `may_minihttp::Request`.
///
/// The body is read to the end before any decoder runs.
///
/// # Errors
///
/// Returns the I/O error if the body cannot be read from the connection.
pub fn parse_request(req: Request) -> io::Result<IncomingRequest> {
    let method = req.method().to_string();
    let url = req.path().to_string();
    let http_version = format!("1.{:?}", req.version());

    let raw_headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    let mut raw_body = Vec::new();
    req.body().read_to_end(&mut raw_body)?;

    debug!(
        method = %method,
        url = %url,
        http_version = %http_version,
        header_count = raw_headers.len(),
        body_size_bytes = raw_body.len(),
        "HTTP request parsed"
    );

    Ok(IncomingRequest::new(
        http_version,
        method,
        url,
        raw_headers,
        raw_body,
    ))
}
