//! A string wrapper that never prints its contents.
//!
//! Grounded on `waav-gateway`'s use of `zeroize` for provider API key
//! material; `Debug`/`Display` are overridden so an accidental `{:?}` on a
//! config struct containing a `Secret` cannot leak it into a log line,
//! independent of the `SafeConfig` masking path.

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

pub const MASKED: &str = "***redacted***";

#[derive(Clone, Serialize, Deserialize, Zeroize)]
#[zeroize(drop)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(MASKED)
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(MASKED)
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
