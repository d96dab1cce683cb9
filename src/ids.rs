use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Identifier attached to every log event of one request/response exchange.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct ExchangeId(pub ulid::Ulid);

impl ExchangeId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ExchangeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExchangeId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ExchangeId(ulid::Ulid::from_string(s)?))
    }
}
