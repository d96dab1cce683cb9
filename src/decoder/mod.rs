//! # Decoder Module
//!
//! Body decoders are the pluggable stages every request passes through before
//! it is recorded. A server is configured with an ordered list of
//! [`DecoderSpec`]s which [`resolve`] turns, once, into executable
//! [`Decoder`]s.
//!
//! ## Spec forms
//!
//! | Form | Example | Resolves to |
//! |------|---------|-------------|
//! | name | `"json"` | built-in or registered factory, empty options |
//! | name + options | `{"urlencoded": {"extended": true}}` | same lookup, options passed through |
//! | inline | `DecoderSpec::inline(\|req, res\| ...)` | used verbatim |
//!
//! The first two forms deserialize from JSON, so a decoder chain can be kept
//! in a fixture file:
//!
//! ```rust
//! use mockserve::decoder::DecoderSpec;
//!
//! let specs: Vec<DecoderSpec> =
//!     serde_json::from_str(r#"["json", {"text": {"type": "text/*"}}]"#).unwrap();
//! assert_eq!(specs.len(), 2);
//! ```
//!
//! ## Resolution rule
//!
//! A name matching one of [`BUILTIN_DECODERS`] always resolves to the built-in,
//! even when a factory with the same name is registered. Any other name is
//! looked up in the [`DecoderRegistry`]; a miss is a
//! [`MockServerError::Resolution`].

pub mod builtin;
mod error;
pub mod urlencoded;

pub use builtin::{JsonDecoder, RawDecoder, TextDecoder, UrlencodedDecoder, BUILTIN_DECODERS};
pub use error::DecodeError;

use crate::error::MockServerError;
use crate::server::{IncomingRequest, ResponseDraft};
use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One stage of the decode chain.
///
/// Returning `Ok(())` hands the request to the next decoder; returning an
/// error stops the chain and the error is recorded on the request snapshot.
/// A decoder that blocks forever stalls its own request and nothing else.
pub trait Decoder: Send + Sync {
    /// Name used in log events
    fn name(&self) -> &str {
        "custom"
    }

    fn decode(
        &self,
        req: &mut IncomingRequest,
        res: &mut ResponseDraft,
    ) -> Result<(), DecodeError>;
}

/// Adapter turning a closure into a [`Decoder`].
pub struct FnDecoder<F> {
    name: String,
    f: F,
}

impl<F> FnDecoder<F>
where
    F: Fn(&mut IncomingRequest, &mut ResponseDraft) -> Result<(), DecodeError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Decoder for FnDecoder<F>
where
    F: Fn(&mut IncomingRequest, &mut ResponseDraft) -> Result<(), DecodeError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn decode(
        &self,
        req: &mut IncomingRequest,
        res: &mut ResponseDraft,
    ) -> Result<(), DecodeError> {
        (self.f)(req, res)
    }
}

/// Wrap a closure as a shareable decoder.
pub fn decoder_fn<F>(f: F) -> Arc<dyn Decoder>
where
    F: Fn(&mut IncomingRequest, &mut ResponseDraft) -> Result<(), DecodeError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnDecoder::new("inline", f))
}

/// Body value produced by the decoders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedBody {
    /// JSON documents and urlencoded forms
    Json(Value),
    /// `text/*` payloads
    Text(String),
    /// Undecoded bytes
    Raw(Vec<u8>),
}

impl DecodedBody {
    /// The `{}` placeholder installed before any payload is decoded
    pub fn empty() -> Self {
        DecodedBody::Json(Value::Object(Map::new()))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            DecodedBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Builds a decoder from its JSON options.
pub type DecoderFactory = Arc<dyn Fn(&Value) -> anyhow::Result<Arc<dyn Decoder>> + Send + Sync>;

/// Named decoder factories available to [`DecoderSpec::Name`] and
/// [`DecoderSpec::WithOptions`] beyond the built-ins.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    factories: HashMap<String, DecoderFactory>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Value) -> anyhow::Result<Arc<dyn Decoder>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<Arc<dyn Decoder>> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn get(&self, name: &str) -> Option<&DecoderFactory> {
        self.factories.get(name)
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("DecoderRegistry")
            .field("factories", &names)
            .finish()
    }
}

/// How one entry of the decoder chain is specified.
#[derive(Clone)]
pub enum DecoderSpec {
    /// Factory name, instantiated with empty options
    Name(String),
    /// Factory name plus the options passed to it
    WithOptions { kind: String, options: Value },
    /// A ready decoder, used as is
    Inline(Arc<dyn Decoder>),
}

impl DecoderSpec {
    pub fn name(name: impl Into<String>) -> Self {
        DecoderSpec::Name(name.into())
    }

    pub fn with_options(kind: impl Into<String>, options: Value) -> Self {
        DecoderSpec::WithOptions {
            kind: kind.into(),
            options,
        }
    }

    pub fn inline<F>(f: F) -> Self
    where
        F: Fn(&mut IncomingRequest, &mut ResponseDraft) -> Result<(), DecodeError>
            + Send
            + Sync
            + 'static,
    {
        DecoderSpec::Inline(decoder_fn(f))
    }

    pub fn decoder(decoder: Arc<dyn Decoder>) -> Self {
        DecoderSpec::Inline(decoder)
    }
}

impl From<&str> for DecoderSpec {
    fn from(name: &str) -> Self {
        DecoderSpec::name(name)
    }
}

impl fmt::Debug for DecoderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoderSpec::Name(name) => f.debug_tuple("Name").field(name).finish(),
            DecoderSpec::WithOptions { kind, options } => f
                .debug_struct("WithOptions")
                .field("kind", kind)
                .field("options", options)
                .finish(),
            DecoderSpec::Inline(decoder) => f.debug_tuple("Inline").field(&decoder.name()).finish(),
        }
    }
}

impl<'de> Deserialize<'de> for DecoderSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpecVisitor;

        impl<'de> Visitor<'de> for SpecVisitor {
            type Value = DecoderSpec;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decoder name or a map of decoder name to options")
            }

            fn visit_str<E: de::Error>(self, name: &str) -> Result<DecoderSpec, E> {
                Ok(DecoderSpec::name(name))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<DecoderSpec, A::Error> {
                let Some((kind, options)) = map.next_entry::<String, Value>()? else {
                    return Err(de::Error::invalid_length(0, &self));
                };
                // Only the first key names the decoder.
                while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
                Ok(DecoderSpec::WithOptions { kind, options })
            }
        }

        deserializer.deserialize_any(SpecVisitor)
    }
}

/// The chain used when none is configured: JSON, raw, text, then extended
/// urlencoded.
pub fn default_specs() -> Vec<DecoderSpec> {
    vec![
        DecoderSpec::name("json"),
        DecoderSpec::name("raw"),
        DecoderSpec::name("text"),
        DecoderSpec::with_options("urlencoded", serde_json::json!({ "extended": true })),
    ]
}

/// The default chain, built without going through resolution.
pub fn default_decoders() -> Vec<Arc<dyn Decoder>> {
    vec![
        Arc::new(JsonDecoder::default()),
        Arc::new(RawDecoder::default()),
        Arc::new(TextDecoder::default()),
        Arc::new(UrlencodedDecoder::extended()),
    ]
}

/// Turn decoder specs into executable decoders, preserving order.
///
/// # Errors
///
/// [`MockServerError::Resolution`] when a name is neither built in nor
/// registered, or when a factory rejects its options.
pub fn resolve(
    specs: &[DecoderSpec],
    registry: &DecoderRegistry,
) -> Result<Vec<Arc<dyn Decoder>>, MockServerError> {
    specs.iter().map(|spec| resolve_one(spec, registry)).collect()
}

fn resolve_one(
    spec: &DecoderSpec,
    registry: &DecoderRegistry,
) -> Result<Arc<dyn Decoder>, MockServerError> {
    let empty = Value::Object(Map::new());
    let (kind, options) = match spec {
        DecoderSpec::Name(name) => (name.as_str(), &empty),
        DecoderSpec::WithOptions { kind, options } => (kind.as_str(), options),
        DecoderSpec::Inline(decoder) => return Ok(Arc::clone(decoder)),
    };

    let built = match builtin::instantiate(kind, options) {
        Some(built) => built,
        None => match registry.get(kind) {
            Some(factory) => (**factory)(options),
            None => {
                return Err(MockServerError::Resolution {
                    spec: kind.to_string(),
                    reason: "no built-in decoder or registered factory with this name"
                        .to_string(),
                })
            }
        },
    };
    debug!(decoder = kind, "body decoder resolved");
    built.map_err(|err| MockServerError::Resolution {
        spec: kind.to_string(),
        reason: format!("{err:#}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn noop() -> Arc<dyn Decoder> {
        decoder_fn(|_req, _res| Ok(()))
    }

    fn named(name: &'static str) -> Arc<dyn Decoder> {
        Arc::new(FnDecoder::new(
            name,
            |_req: &mut IncomingRequest, _res: &mut ResponseDraft| Ok(()),
        ))
    }

    #[test]
    fn test_resolve_preserves_length_and_order() {
        let registry = DecoderRegistry::new().with("tagger", |_opts: &Value| Ok(named("tagger")));
        let specs = vec![
            DecoderSpec::name("text"),
            DecoderSpec::name("tagger"),
            DecoderSpec::decoder(noop()),
            DecoderSpec::with_options("json", json!({"strict": false})),
        ];
        let decoders = resolve(&specs, &registry).unwrap();
        let names: Vec<&str> = decoders.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["text", "tagger", "inline", "json"]);
    }

    #[test]
    fn test_resolve_unknown_name_fails() {
        let err = resolve(&[DecoderSpec::name("./fixtures/missing")], &DecoderRegistry::new())
            .err()
            .unwrap();
        match err {
            MockServerError::Resolution { spec, .. } => assert_eq!(spec, "./fixtures/missing"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builtin_wins_over_registered_factory() {
        let registry = DecoderRegistry::new().with("json", |_opts: &Value| Ok(named("impostor")));
        let decoders = resolve(&[DecoderSpec::name("json")], &registry).unwrap();
        assert_eq!(decoders[0].name(), "json");
    }

    #[test]
    fn test_registered_factory_receives_options() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let registry = DecoderRegistry::new().with("mock-parser", move |opts: &Value| {
            *sink.lock().unwrap() = Some(opts.clone());
            Ok(decoder_fn(|_req, _res| Ok(())))
        });

        resolve(
            &[DecoderSpec::with_options("mock-parser", json!({"foo": "bar"}))],
            &registry,
        )
        .unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(json!({"foo": "bar"})));

        resolve(&[DecoderSpec::name("mock-parser")], &registry).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(json!({})));
    }

    #[test]
    fn test_invalid_builtin_options_fail_resolution() {
        let err = resolve(
            &[DecoderSpec::with_options("json", json!({"strict": "very"}))],
            &DecoderRegistry::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, MockServerError::Resolution { ref spec, .. } if spec == "json"));
    }

    #[test]
    fn test_spec_deserializes_first_key_only() {
        let specs: Vec<DecoderSpec> = serde_json::from_value(json!([
            "raw",
            {"urlencoded": {"extended": false}, "ignored": {"x": 1}}
        ]))
        .unwrap();
        assert!(matches!(&specs[0], DecoderSpec::Name(n) if n == "raw"));
        match &specs[1] {
            DecoderSpec::WithOptions { kind, options } => {
                assert_eq!(kind, "urlencoded");
                assert_eq!(options, &json!({"extended": false}));
            }
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn test_empty_map_spec_is_rejected() {
        let parsed: Result<DecoderSpec, _> = serde_json::from_value(json!({}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_default_specs_resolve_to_default_chain() {
        let resolved = resolve(&default_specs(), &DecoderRegistry::new()).unwrap();
        let names: Vec<&str> = resolved.iter().map(|d| d.name()).collect();
        let built = default_decoders();
        let defaults: Vec<&str> = built.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["json", "raw", "text", "urlencoded"]);
        assert_eq!(names, defaults);
    }
}
