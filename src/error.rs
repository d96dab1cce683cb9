use std::fmt;
use std::io;

/// Errors surfaced by the mock server facade.
///
/// Per-request decode failures are not represented here; they are captured
/// as [`DecodeError`](crate::decoder::DecodeError) values in the request
/// snapshot and never abort the exchange.
#[derive(Debug)]
pub enum MockServerError {
    /// A decoder spec names a factory that is neither built in nor
    /// registered, or the factory rejected its options.
    ///
    /// Returned from [`MockServer::with_options`](crate::MockServer::with_options).
    Resolution {
        /// The decoder identifier that failed to resolve
        spec: String,
        /// Why it failed
        reason: String,
    },
    /// The response body could not be encoded as JSON.
    ///
    /// Fatal to one exchange only; the server answers that request with a 500.
    Serialization(serde_json::Error),
    /// Binding or listening on the socket failed.
    Transport(io::Error),
}

impl fmt::Display for MockServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MockServerError::Resolution { spec, reason } => {
                write!(f, "cannot resolve body decoder '{spec}': {reason}")
            }
            MockServerError::Serialization(err) => {
                write!(f, "failed to serialize response body: {err}")
            }
            MockServerError::Transport(err) => write!(f, "transport error: {err}"),
        }
    }
}

impl std::error::Error for MockServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MockServerError::Resolution { .. } => None,
            MockServerError::Serialization(err) => Some(err),
            MockServerError::Transport(err) => Some(err),
        }
    }
}

impl From<io::Error> for MockServerError {
    fn from(err: io::Error) -> Self {
        MockServerError::Transport(err)
    }
}

impl From<serde_json::Error> for MockServerError {
    fn from(err: serde_json::Error) -> Self {
        MockServerError::Serialization(err)
    }
}
