//! HTTP transport for the mock server.
//!
//! [`MockServer`] is the public facade. Underneath, [`HttpServer`] runs a
//! `may_minihttp` accept loop whose connection coroutines each call
//! [`MockService`], which walks the pipeline for one exchange: parse the
//! request, run the decoder chain, record the snapshot, resolve and write
//! the response.

pub mod http_server;
pub mod mock_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use mock_server::{MockServer, MockServerOptions};
pub use request::{normalize_headers, parse_query_params, parse_request, IncomingRequest};
pub use response::{
    write_response, PreResponseHook, ResolvedResponse, ResponseDraft, ResponsePatch,
    ResponseTemplate,
};
pub use service::{MockService, SharedState};
