//! # Runtime Configuration Module
//!
//! Environment variable-based configuration for the coroutine runtime that
//! hosts the mock server.
//!
//! ## Environment Variables
//!
//! ### `MOCKSERVE_STACK_SIZE`
//!
//! Sets the stack size for connection coroutines. Accepts values in:
//! - Decimal: `65536` (64 KB)
//! - Hexadecimal: `0x10000` (64 KB)
//!
//! Default: `0x10000` (64 KB). JSON decoding recurses per nesting level, so
//! the default leaves room for deeply nested request bodies.
//!
//! Custom decoders that recurse deeply or keep large buffers on the stack may
//! need a larger value.
//!
//! ## Usage
//!
//! ```rust
//! use mockserve::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("Stack size: {} bytes", config.stack_size);
//! ```
//!
//! The configuration is applied to the `may` runtime once, the first time any
//! [`MockServer`](crate::MockServer) starts listening.

use std::env;
use std::sync::Once;

/// Default coroutine stack size (64 KB)
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

static APPLY_ONCE: Once = Once::new();

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes (default: 64 KB / 0x10000)
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let stack_size = env::var("MOCKSERVE_STACK_SIZE")
            .ok()
            .and_then(|val| parse_stack_size(&val))
            .unwrap_or(DEFAULT_STACK_SIZE);
        RuntimeConfig { stack_size }
    }

    /// Configure the `may` runtime with these settings.
    ///
    /// Only the first call in a process has an effect; coroutines spawned
    /// before it keep their stacks.
    pub fn apply_once(&self) {
        let stack_size = self.stack_size;
        APPLY_ONCE.call_once(|| {
            may::config().set_stack_size(stack_size);
            tracing::debug!(stack_size, "may runtime configured");
        });
    }
}

/// Parse a stack size given as decimal or `0x`-prefixed hexadecimal.
pub fn parse_stack_size(val: &str) -> Option<usize> {
    let val = val.trim();
    if let Some(hex) = val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        val.parse().ok()
    }
}
