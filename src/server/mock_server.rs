use super::http_server::{HttpServer, ServerHandle};
use super::response::ResponseTemplate;
use super::service::{MockService, SharedState};
use crate::decoder::{self, default_specs, DecoderRegistry, DecoderSpec};
use crate::error::MockServerError;
use crate::pipeline::DecoderChain;
use crate::runtime_config::RuntimeConfig;
use crate::snapshot::RequestSnapshot;
use serde::Deserialize;
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Construction options for [`MockServer`].
///
/// Deserializable from JSON such as
/// `{"bodyDecoders": ["json", {"urlencoded": {"extended": false}}]}`. The
/// registry can only be supplied in code.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockServerOptions {
    /// Decoder chain; `None` uses json, raw, text and extended urlencoded
    #[serde(default)]
    pub body_decoders: Option<Vec<DecoderSpec>>,
    /// Factories for decoder names that are not built in
    #[serde(skip)]
    pub registry: DecoderRegistry,
}

impl MockServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_body_decoders<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<DecoderSpec>,
    {
        self.body_decoders = Some(specs.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: DecoderRegistry) -> Self {
        self.registry = registry;
        self
    }
}

/// A programmable HTTP server for tests.
///
/// Every request runs through the decoder chain, is recorded in the accepted
/// log and is answered from the current [`ResponseTemplate`].
///
/// ```no_run
/// use mockserve::{MockServer, ResponseTemplate};
/// use serde_json::json;
///
/// let server = MockServer::new(
///     ResponseTemplate::new()
///         .with_status(201)
///         .with_header("x-foo", "bar")
///         .with_body(json!({"ok": true})),
/// );
/// server.listen("127.0.0.1:3030").unwrap();
/// // ... exercise the client under test ...
/// assert_eq!(server.accepted().len(), 0);
/// server.close();
/// ```
pub struct MockServer {
    state: Arc<SharedState>,
    handle: Mutex<Option<ServerHandle>>,
}

impl MockServer {
    /// Server with the default decoder chain
    pub fn new(template: ResponseTemplate) -> Self {
        Self::from_chain(DecoderChain::new(decoder::default_decoders()), template)
    }

    /// Server with a custom decoder chain, resolved once here.
    ///
    /// # Errors
    ///
    /// [`MockServerError::Resolution`] if a decoder spec cannot be resolved.
    pub fn with_options(
        template: ResponseTemplate,
        options: MockServerOptions,
    ) -> Result<Self, MockServerError> {
        let specs = options.body_decoders.unwrap_or_else(default_specs);
        let decoders = decoder::resolve(&specs, &options.registry)?;
        Ok(Self::from_chain(DecoderChain::new(decoders), template))
    }

    fn from_chain(chain: DecoderChain, template: ResponseTemplate) -> Self {
        Self {
            state: Arc::new(SharedState::new(chain, template)),
            handle: Mutex::new(None),
        }
    }

    fn handle(&self) -> MutexGuard<'_, Option<ServerHandle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start accepting connections.
    ///
    /// Returns once the socket accepts connections. Port 0 picks a free
    /// port; see [`local_addr`](Self::local_addr).
    ///
    /// # Errors
    ///
    /// [`MockServerError::Transport`] if the server is already listening or
    /// the address cannot be bound.
    pub fn listen<A: ToSocketAddrs>(&self, addr: A) -> Result<&Self, MockServerError> {
        let mut slot = self.handle();
        if let Some(running) = slot.as_ref() {
            return Err(MockServerError::Transport(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("already listening on {}", running.local_addr()),
            )));
        }

        RuntimeConfig::from_env().apply_once();
        let handle = HttpServer(MockService::new(Arc::clone(&self.state))).start(addr)?;
        if let Err(err) = handle.wait_ready() {
            handle.stop();
            return Err(err.into());
        }
        info!(
            addr = %handle.local_addr(),
            decoders = ?self.state.chain,
            "mock server listening"
        );
        *slot = Some(handle);
        Ok(self)
    }

    /// Stop accepting new connections. No-op when not listening.
    pub fn close(&self) -> &Self {
        self.close_with(|| {})
    }

    /// Stop accepting new connections, then run `done`.
    ///
    /// `done` runs even when the server was not listening.
    pub fn close_with<F: FnOnce()>(&self, done: F) -> &Self {
        let running = self.handle().take();
        match running {
            Some(handle) => {
                let addr = handle.local_addr();
                handle.stop();
                info!(addr = %addr, "mock server closed");
            }
            None => warn!("close called on a mock server that is not listening"),
        }
        done();
        self
    }

    /// Clear the accepted log.
    pub fn reset(&self) -> &Self {
        self.state.clear();
        self
    }

    /// Clear the accepted log and replace the response template.
    pub fn reset_with(&self, template: ResponseTemplate) -> &Self {
        self.state.clear();
        self.state.replace_template(template);
        self
    }

    /// The template requests are currently answered with
    pub fn response(&self) -> Arc<ResponseTemplate> {
        self.state.template()
    }

    /// Snapshots of every request accepted since the last reset, oldest first
    pub fn accepted(&self) -> Vec<Arc<RequestSnapshot>> {
        self.state.accepted()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.handle().as_ref().map(ServerHandle::local_addr)
    }

    pub fn is_listening(&self) -> bool {
        self.handle().is_some()
    }

    /// Base URL of the running server, e.g. `http://127.0.0.1:3030`
    pub fn url(&self) -> Option<String> {
        self.local_addr().map(|addr| format!("http://{addr}"))
    }
}

impl fmt::Debug for MockServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockServer")
            .field("addr", &self.local_addr())
            .field("decoders", &self.state.chain)
            .field("response", &self.response())
            .finish()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        let running = self
            .handle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = running {
            handle.stop();
        }
    }
}
