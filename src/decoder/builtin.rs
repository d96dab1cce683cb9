//! Built-in body decoders: `json`, `raw`, `text` and `urlencoded`.
//!
//! All four share the same gate before touching the payload:
//!
//! 1. install the `{}` placeholder body if nothing decoded one yet
//! 2. skip when an earlier decoder consumed the payload, when there is no
//!    payload, or when the content type does not match the `type` option
//! 3. reject unsupported charsets (415) and payloads over `limit` (413);
//!    json takes UTF-8 only, text and urlencoded also take US-ASCII
//!
//! Options are read from JSON with camelCase keys; unknown keys are ignored.

use super::{urlencoded, DecodeError, DecodedBody, Decoder};
use crate::server::{IncomingRequest, ResponseDraft};
use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Names that resolve to a built-in decoder.
pub const BUILTIN_DECODERS: [&str; 4] = ["json", "raw", "text", "urlencoded"];

/// Default payload limit: 100 KiB
pub const DEFAULT_LIMIT: usize = 100 * 1024;

/// Default cap on urlencoded pairs
pub const DEFAULT_PARAMETER_LIMIT: usize = 1000;

/// Build the built-in decoder called `name`, or `None` if `name` is not a
/// built-in.
pub fn instantiate(name: &str, options: &Value) -> Option<anyhow::Result<Arc<dyn Decoder>>> {
    let built = match name {
        "json" => JsonDecoder::from_options(options).map(|d| Arc::new(d) as Arc<dyn Decoder>),
        "raw" => RawDecoder::from_options(options).map(|d| Arc::new(d) as Arc<dyn Decoder>),
        "text" => TextDecoder::from_options(options).map(|d| Arc::new(d) as Arc<dyn Decoder>),
        "urlencoded" => {
            UrlencodedDecoder::from_options(options).map(|d| Arc::new(d) as Arc<dyn Decoder>)
        }
        _ => return None,
    };
    Some(built)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MediaTypes {
    One(String),
    Many(Vec<String>),
}

impl MediaTypes {
    fn into_vec(self) -> Vec<String> {
        match self {
            MediaTypes::One(t) => vec![t],
            MediaTypes::Many(ts) => ts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ByteLimit {
    Bytes(u64),
    Human(String),
}

impl ByteLimit {
    fn to_bytes(&self) -> anyhow::Result<usize> {
        match self {
            ByteLimit::Bytes(n) => usize::try_from(*n).context("limit does not fit in usize"),
            ByteLimit::Human(s) => parse_byte_size(s),
        }
    }
}

/// Parse sizes such as `"100kb"`, `"1.5mb"` or `"512"` (1024-based units).
pub fn parse_byte_size(input: &str) -> anyhow::Result<usize> {
    let lower = input.trim().to_ascii_lowercase();
    let split = lower
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(lower.len());
    let (number, unit) = lower.split_at(split);
    let number: f64 = number
        .parse()
        .with_context(|| format!("invalid byte size '{input}'"))?;
    let multiplier: f64 = match unit.trim() {
        "" | "b" => 1.0,
        "kb" => 1024.0,
        "mb" => 1024.0 * 1024.0,
        "gb" => 1024.0 * 1024.0 * 1024.0,
        "tb" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        other => bail!("unknown byte size unit '{other}' in '{input}'"),
    };
    Ok((number * multiplier).floor() as usize)
}

fn read_options<T: for<'de> Deserialize<'de> + Default>(options: &Value) -> anyhow::Result<T> {
    if options.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(options.clone()).context("invalid decoder options")
}

/// Media type match supporting `*/*`, `type/*`, `*/subtype` and bare
/// subtype shorthands (`"json"` matches `application/json` and
/// `application/vnd.api+json`).
fn media_type_matches(pattern: &str, actual: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    let Some((actual_type, actual_sub)) = actual.split_once('/') else {
        return false;
    };
    match pattern.split_once('/') {
        None => actual_sub == pattern || actual_sub.ends_with(&format!("+{pattern}")),
        Some((ty, sub)) => {
            (ty == "*" || ty == actual_type) && (sub == "*" || sub == actual_sub)
        }
    }
}

/// Which `charset` parameters a decoder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Charsets {
    /// Charset is ignored
    Any,
    /// UTF-8 only
    Utf8,
    /// UTF-8 and its ASCII subset
    Text,
}

impl Charsets {
    fn accepts(self, charset: &str) -> bool {
        match self {
            Charsets::Any => true,
            Charsets::Utf8 => matches!(charset, "utf-8" | "utf8"),
            Charsets::Text => matches!(charset, "utf-8" | "utf8" | "us-ascii"),
        }
    }
}

/// Shared admission checks of the built-in decoders.
#[derive(Debug, Clone)]
struct Gate {
    name: &'static str,
    types: Vec<String>,
    limit: usize,
    charsets: Charsets,
}

impl Gate {
    /// `Ok(true)` when this decoder should consume the payload.
    fn admit(&self, req: &mut IncomingRequest) -> Result<bool, DecodeError> {
        if req.body.is_none() {
            req.body = Some(DecodedBody::empty());
        }
        if req.body_consumed || !req.has_body() {
            return Ok(false);
        }
        let Some(content_type) = req.content_type() else {
            return Ok(false);
        };
        if !self
            .types
            .iter()
            .any(|pattern| media_type_matches(pattern, &content_type))
        {
            debug!(decoder = self.name, content_type = %content_type, "content type not handled");
            return Ok(false);
        }
        if let Some(charset) = req.charset() {
            if !self.charsets.accepts(&charset) {
                return Err(DecodeError::unsupported_charset(&charset));
            }
        }
        if req.raw_body.len() > self.limit {
            return Err(DecodeError::too_large(req.raw_body.len(), self.limit));
        }
        Ok(true)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct JsonOptions {
    r#type: Option<MediaTypes>,
    limit: Option<ByteLimit>,
    strict: Option<bool>,
}

/// Parses `application/json` payloads.
#[derive(Debug, Clone)]
pub struct JsonDecoder {
    gate: Gate,
    strict: bool,
}

impl Default for JsonDecoder {
    fn default() -> Self {
        Self {
            gate: Gate {
                name: "json",
                types: vec!["application/json".to_string()],
                limit: DEFAULT_LIMIT,
                charsets: Charsets::Utf8,
            },
            strict: true,
        }
    }
}

impl JsonDecoder {
    /// Options: `type`, `limit`, `strict` (only objects and arrays at the top level).
    pub fn from_options(options: &Value) -> anyhow::Result<Self> {
        let opts: JsonOptions = read_options(options)?;
        let mut decoder = Self::default();
        if let Some(types) = opts.r#type {
            decoder.gate.types = types.into_vec();
        }
        if let Some(limit) = opts.limit {
            decoder.gate.limit = limit.to_bytes()?;
        }
        if let Some(strict) = opts.strict {
            decoder.strict = strict;
        }
        Ok(decoder)
    }
}

impl Decoder for JsonDecoder {
    fn name(&self) -> &str {
        "json"
    }

    fn decode(
        &self,
        req: &mut IncomingRequest,
        _res: &mut ResponseDraft,
    ) -> Result<(), DecodeError> {
        if !self.gate.admit(req)? {
            return Ok(());
        }
        let raw = &req.raw_body;
        let first = raw.iter().find(|b| !b.is_ascii_whitespace()).copied();
        if self.strict && !matches!(first, Some(b'{') | Some(b'[')) {
            return Err(DecodeError::parse_failed(
                "JSON body must be an object or array in strict mode",
            )
            .with_field("body", String::from_utf8_lossy(raw).into_owned()));
        }
        let value: Value = serde_json::from_slice(raw).map_err(|err| {
            DecodeError::parse_failed(err.to_string())
                .with_field("body", String::from_utf8_lossy(raw).into_owned())
        })?;
        req.body = Some(DecodedBody::Json(value));
        req.body_consumed = true;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawOptions {
    r#type: Option<MediaTypes>,
    limit: Option<ByteLimit>,
}

/// Keeps `application/octet-stream` payloads as bytes.
#[derive(Debug, Clone)]
pub struct RawDecoder {
    gate: Gate,
}

impl Default for RawDecoder {
    fn default() -> Self {
        Self {
            gate: Gate {
                name: "raw",
                types: vec!["application/octet-stream".to_string()],
                limit: DEFAULT_LIMIT,
                charsets: Charsets::Any,
            },
        }
    }
}

impl RawDecoder {
    pub fn from_options(options: &Value) -> anyhow::Result<Self> {
        let opts: RawOptions = read_options(options)?;
        let mut decoder = Self::default();
        if let Some(types) = opts.r#type {
            decoder.gate.types = types.into_vec();
        }
        if let Some(limit) = opts.limit {
            decoder.gate.limit = limit.to_bytes()?;
        }
        Ok(decoder)
    }
}

impl Decoder for RawDecoder {
    fn name(&self) -> &str {
        "raw"
    }

    fn decode(
        &self,
        req: &mut IncomingRequest,
        _res: &mut ResponseDraft,
    ) -> Result<(), DecodeError> {
        if !self.gate.admit(req)? {
            return Ok(());
        }
        req.body = Some(DecodedBody::Raw(req.raw_body.clone()));
        req.body_consumed = true;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TextOptions {
    r#type: Option<MediaTypes>,
    limit: Option<ByteLimit>,
    default_charset: Option<String>,
}

/// Decodes `text/plain` payloads as UTF-8; invalid sequences are replaced.
#[derive(Debug, Clone)]
pub struct TextDecoder {
    gate: Gate,
}

impl Default for TextDecoder {
    fn default() -> Self {
        Self {
            gate: Gate {
                name: "text",
                types: vec!["text/plain".to_string()],
                limit: DEFAULT_LIMIT,
                charsets: Charsets::Text,
            },
        }
    }
}

impl TextDecoder {
    /// Options: `type`, `limit`, `defaultCharset` (only `utf-8` is supported).
    pub fn from_options(options: &Value) -> anyhow::Result<Self> {
        let opts: TextOptions = read_options(options)?;
        let mut decoder = Self::default();
        if let Some(types) = opts.r#type {
            decoder.gate.types = types.into_vec();
        }
        if let Some(limit) = opts.limit {
            decoder.gate.limit = limit.to_bytes()?;
        }
        if let Some(charset) = opts.default_charset {
            if !matches!(charset.to_ascii_lowercase().as_str(), "utf-8" | "utf8") {
                bail!("unsupported defaultCharset '{charset}'");
            }
        }
        Ok(decoder)
    }
}

impl Decoder for TextDecoder {
    fn name(&self) -> &str {
        "text"
    }

    fn decode(
        &self,
        req: &mut IncomingRequest,
        _res: &mut ResponseDraft,
    ) -> Result<(), DecodeError> {
        if !self.gate.admit(req)? {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&req.raw_body).into_owned();
        req.body = Some(DecodedBody::Text(text));
        req.body_consumed = true;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct UrlencodedOptions {
    r#type: Option<MediaTypes>,
    limit: Option<ByteLimit>,
    extended: Option<bool>,
    parameter_limit: Option<usize>,
}

/// Parses `application/x-www-form-urlencoded` payloads into a JSON object.
#[derive(Debug, Clone)]
pub struct UrlencodedDecoder {
    gate: Gate,
    extended: bool,
    parameter_limit: usize,
}

impl Default for UrlencodedDecoder {
    fn default() -> Self {
        Self {
            gate: Gate {
                name: "urlencoded",
                types: vec!["application/x-www-form-urlencoded".to_string()],
                limit: DEFAULT_LIMIT,
                charsets: Charsets::Text,
            },
            extended: false,
            parameter_limit: DEFAULT_PARAMETER_LIMIT,
        }
    }
}

impl UrlencodedDecoder {
    /// Decoder with bracket nesting enabled
    pub fn extended() -> Self {
        Self {
            extended: true,
            ..Self::default()
        }
    }

    /// Options: `type`, `limit`, `extended`, `parameterLimit`.
    pub fn from_options(options: &Value) -> anyhow::Result<Self> {
        let opts: UrlencodedOptions = read_options(options)?;
        let mut decoder = Self::default();
        if let Some(types) = opts.r#type {
            decoder.gate.types = types.into_vec();
        }
        if let Some(limit) = opts.limit {
            decoder.gate.limit = limit.to_bytes()?;
        }
        if let Some(extended) = opts.extended {
            decoder.extended = extended;
        }
        if let Some(parameter_limit) = opts.parameter_limit {
            if parameter_limit == 0 {
                bail!("parameterLimit must be a positive number");
            }
            decoder.parameter_limit = parameter_limit;
        }
        Ok(decoder)
    }
}

impl Decoder for UrlencodedDecoder {
    fn name(&self) -> &str {
        "urlencoded"
    }

    fn decode(
        &self,
        req: &mut IncomingRequest,
        _res: &mut ResponseDraft,
    ) -> Result<(), DecodeError> {
        if !self.gate.admit(req)? {
            return Ok(());
        }
        let pairs = urlencoded::count_pairs(&req.raw_body);
        if pairs > self.parameter_limit {
            return Err(DecodeError::new("too many parameters")
                .with_status(413)
                .with_kind("parameters.too.many")
                .with_field("limit", self.parameter_limit));
        }
        let form: Map<String, Value> = if self.extended {
            urlencoded::parse_extended(&req.raw_body)
        } else {
            urlencoded::parse_flat(&req.raw_body).into_iter().collect()
        };
        req.body = Some(DecodedBody::Json(Value::Object(form)));
        req.body_consumed = true;
        Ok(())
    }
}
