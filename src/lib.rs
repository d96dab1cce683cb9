//! # mockserve
//!
//! **mockserve** is a programmable mock HTTP server for tests, built on the
//! `may` coroutine runtime and `may_minihttp`.
//!
//! ## Overview
//!
//! A test creates a [`MockServer`] with a [`ResponseTemplate`], points the
//! client under test at it, and afterwards inspects
//! [`accepted`](MockServer::accepted): one serializable [`RequestSnapshot`]
//! per request, in arrival order. The template can be swapped between test
//! steps with [`reset_with`](MockServer::reset_with), or made dynamic with a
//! pre-response hook.
//!
//! ## Architecture
//!
//! - **[`decoder`]** - Decoder specs, built-in body decoders and resolution into a chain
//! - **[`pipeline`]** - Runs the decoder chain over one request
//! - **[`snapshot`]** - The recorded view of a request
//! - **[`server`]** - Response resolution, the `may_minihttp` service and the facade
//! - **[`logging`]** - `tracing-subscriber` setup
//! - **[`runtime_config`]** - Coroutine stack size from the environment
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Service as MockService
//!     participant Chain as DecoderChain
//!     participant Log as Accepted Log
//!     participant Template as ResponseTemplate
//!
//!     Client->>Service: HTTP request
//!     Service->>Service: parse_request (read body to end)
//!     Service->>Chain: execute(req, draft)
//!     loop each decoder until error
//!         Chain->>Chain: decoder.decode(req, draft)
//!     end
//!     Chain-->>Service: Ok(()) or Err(DecodeError)
//!     Service->>Log: push RequestSnapshot
//!     Service->>Template: resolve(snapshot)
//!     Template->>Template: pre_response hook (optional)
//!     Template-->>Service: status, headers, body
//!     Service-->>Client: HTTP response (JSON body)
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use mockserve::{MockServer, ResponseTemplate};
//! use serde_json::json;
//!
//! let server = MockServer::new(
//!     ResponseTemplate::new()
//!         .with_status(201)
//!         .with_header("x-foo", "bar")
//!         .with_body(json!({"ok": true})),
//! );
//! server.listen("127.0.0.1:0").expect("bind mock server");
//!
//! // ... drive the client under test against server.url() ...
//!
//! for request in server.accepted() {
//!     println!("{}", serde_json::to_string(&*request).unwrap());
//! }
//! server.close();
//! ```
//!
//! ## Decoder Chains
//!
//! The default chain is `json`, `raw`, `text`, then `urlencoded` with
//! `extended: true`. Custom chains mix built-in names, names registered in a
//! [`DecoderRegistry`](decoder::DecoderRegistry), and inline closures:
//!
//! ```no_run
//! use mockserve::decoder::{DecodeError, DecoderRegistry, DecoderSpec};
//! use mockserve::{MockServer, MockServerOptions, ResponseTemplate};
//! use serde_json::json;
//!
//! let registry = DecoderRegistry::new().with("reject-all", |_options| {
//!     Ok(mockserve::decoder::decoder_fn(|_req, _res| {
//!         Err(DecodeError::new("rejected").with_status(400))
//!     }))
//! });
//! let options = MockServerOptions::new()
//!     .with_registry(registry)
//!     .with_body_decoders(vec![
//!         DecoderSpec::with_options("json", json!({"strict": false})),
//!         DecoderSpec::name("reject-all"),
//!     ]);
//! let server = MockServer::with_options(ResponseTemplate::new(), options).unwrap();
//! ```
//!
//! ## Runtime Considerations
//!
//! mockserve uses the `may` coroutine runtime, not tokio or async-std:
//!
//! - Every connection runs in a coroutine on a multi-threaded scheduler
//! - Stack size is configurable via the `MOCKSERVE_STACK_SIZE` environment variable
//! - Decoders and hooks run inside those coroutines and should not block for long

pub mod decoder;
pub mod error;
pub mod ids;
pub mod logging;
pub mod pipeline;
pub mod runtime_config;
pub mod server;
pub mod snapshot;

pub use decoder::{DecodeError, DecodedBody, Decoder, DecoderRegistry, DecoderSpec};
pub use error::MockServerError;
pub use pipeline::DecoderChain;
pub use server::{
    IncomingRequest, MockServer, MockServerOptions, ResponseDraft, ResponsePatch,
    ResponseTemplate,
};
pub use snapshot::RequestSnapshot;
