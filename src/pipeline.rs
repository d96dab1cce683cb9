//! Decoder chain execution.
//!
//! The chain is resolved once per server and shared by every connection
//! coroutine. Each exchange walks it with its own cursor: decoders run in
//! list order, the first error ends the walk, and reaching the end means
//! success.

use crate::decoder::{DecodeError, Decoder};
use crate::ids::ExchangeId;
use crate::server::{IncomingRequest, ResponseDraft};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Frozen, ordered list of decoders.
#[derive(Clone)]
pub struct DecoderChain {
    decoders: Arc<[Arc<dyn Decoder>]>,
}

impl DecoderChain {
    pub fn new(decoders: Vec<Arc<dyn Decoder>>) -> Self {
        Self {
            decoders: decoders.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Names of the decoders in execution order
    pub fn names(&self) -> Vec<&str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    /// Run the chain over one request.
    ///
    /// # Errors
    ///
    /// The first [`DecodeError`] reported; decoders after it do not run.
    pub fn execute(
        &self,
        req: &mut IncomingRequest,
        res: &mut ResponseDraft,
    ) -> Result<(), DecodeError> {
        self.execute_traced(ExchangeId::new(), req, res)
    }

    pub(crate) fn execute_traced(
        &self,
        exchange: ExchangeId,
        req: &mut IncomingRequest,
        res: &mut ResponseDraft,
    ) -> Result<(), DecodeError> {
        let mut cursor = 0;
        while let Some(decoder) = self.decoders.get(cursor) {
            cursor += 1;
            if let Err(err) = decoder.decode(req, res) {
                warn!(
                    exchange = %exchange,
                    decoder = decoder.name(),
                    position = cursor,
                    error = %err,
                    "body decoder failed; skipping remaining decoders"
                );
                return Err(err);
            }
            debug!(
                exchange = %exchange,
                decoder = decoder.name(),
                position = cursor,
                "body decoder passed"
            );
        }
        Ok(())
    }
}

impl fmt::Debug for DecoderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{decoder_fn, DecodedBody, FnDecoder, JsonDecoder};
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<usize>>>, index: usize) -> Arc<dyn Decoder> {
        let log = Arc::clone(log);
        decoder_fn(move |_req, _res| {
            log.lock().unwrap().push(index);
            Ok(())
        })
    }

    fn failing(marker: &'static str) -> Arc<dyn Decoder> {
        Arc::new(FnDecoder::new(
            "failing",
            move |_req: &mut IncomingRequest, _res: &mut ResponseDraft| {
                Err(DecodeError::new("oups").with_field("mock", marker))
            },
        ))
    }

    fn request() -> IncomingRequest {
        IncomingRequest::new(
            "1.1",
            "POST",
            "/",
            vec![("Content-Type".to_string(), "application/json".to_string())],
            br#"{"n":1}"#.to_vec(),
        )
    }

    #[test]
    fn test_runs_every_decoder_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = DecoderChain::new((0..5).map(|i| recorder(&log, i)).collect());
        chain
            .execute(&mut request(), &mut ResponseDraft::default())
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_error_short_circuits_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = DecoderChain::new(vec![
            recorder(&log, 0),
            failing("yup, it is"),
            recorder(&log, 2),
        ]);
        let err = chain
            .execute(&mut request(), &mut ResponseDraft::default())
            .unwrap_err();
        assert_eq!(err.field("mock"), Some(&json!("yup, it is")));
        assert_eq!(*log.lock().unwrap(), vec![0]);
    }

    #[test]
    fn test_empty_chain_succeeds() {
        let chain = DecoderChain::new(Vec::new());
        assert!(chain.is_empty());
        let mut req = request();
        chain.execute(&mut req, &mut ResponseDraft::default()).unwrap();
        assert_eq!(req.body, None);
    }

    #[test]
    fn test_body_reflects_cumulative_decoding() {
        let annotate = decoder_fn(|req, _res| {
            if let Some(DecodedBody::Json(value)) = req.body.as_mut() {
                value["seen"] = json!(true);
            }
            Ok(())
        });
        let chain = DecoderChain::new(vec![Arc::new(JsonDecoder::default()), annotate]);
        let mut req = request();
        chain.execute(&mut req, &mut ResponseDraft::default()).unwrap();
        assert_eq!(
            req.body,
            Some(DecodedBody::Json(json!({"n": 1, "seen": true})))
        );
    }

    #[test]
    fn test_decoders_can_preset_response_headers() {
        let chain = DecoderChain::new(vec![decoder_fn(|_req, res| {
            res.set_header("X-Decoded-By", "inline");
            Ok(())
        })]);
        let mut draft = ResponseDraft::default();
        chain.execute(&mut request(), &mut draft).unwrap();
        assert_eq!(draft.header("x-decoded-by"), Some("inline"));
    }
}
