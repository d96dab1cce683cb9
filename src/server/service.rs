use super::request::parse_request;
use super::response::{write_response, ResponseDraft, ResponseTemplate};
use crate::ids::ExchangeId;
use crate::pipeline::DecoderChain;
use crate::snapshot::RequestSnapshot;
use may_minihttp::{HttpService, Request, Response};
use std::io;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

/// State shared between the facade and every connection coroutine.
pub struct SharedState {
    pub chain: DecoderChain,
    template: RwLock<Arc<ResponseTemplate>>,
    accepted: Mutex<Vec<Arc<RequestSnapshot>>>,
}

impl SharedState {
    pub fn new(chain: DecoderChain, template: ResponseTemplate) -> Self {
        Self {
            chain,
            template: RwLock::new(Arc::new(template)),
            accepted: Mutex::new(Vec::new()),
        }
    }

    pub fn template(&self) -> Arc<ResponseTemplate> {
        let guard = self.template.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn replace_template(&self, template: ResponseTemplate) {
        let mut guard = self.template.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(template);
    }

    pub fn accepted(&self) -> Vec<Arc<RequestSnapshot>> {
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Append a snapshot and return the log length after the append
    pub fn record(&self, snapshot: Arc<RequestSnapshot>) -> usize {
        let mut log = self.accepted.lock().unwrap_or_else(PoisonError::into_inner);
        log.push(snapshot);
        log.len()
    }

    pub fn clear(&self) {
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// `may_minihttp` service running the mock pipeline for every request.
#[derive(Clone)]
pub struct MockService {
    state: Arc<SharedState>,
}

impl MockService {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }
}

impl HttpService for MockService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let exchange = ExchangeId::new();
        let mut incoming = parse_request(req)?;
        let mut draft = ResponseDraft::default();

        let parse_error = self
            .state
            .chain
            .execute_traced(exchange, &mut incoming, &mut draft)
            .err();

        let snapshot = Arc::new(RequestSnapshot::capture(&incoming, parse_error));
        let position = self.state.record(Arc::clone(&snapshot));
        info!(
            exchange = %exchange,
            method = %snapshot.method,
            url = %snapshot.url,
            parse_error = snapshot.parse_error.is_some(),
            accepted = position,
            "request accepted"
        );

        let template = self.state.template();
        let resolved = template.resolve(&snapshot);
        debug!(
            exchange = %exchange,
            status = resolved.status,
            header_count = resolved.headers.len(),
            hooked = template.pre_response.is_some(),
            "response resolved"
        );
        write_response(res, &draft, &resolved);
        Ok(())
    }
}
