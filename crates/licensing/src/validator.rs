//! Format checks applied to an inbound license key before any lookup is attempted.

use entitlement_core::config::ValidationConfig;
use entitlement_core::{EntitlementError, ResolveResult};
use serde_json::Value;

pub const MISSING_KEY: &str = "licenseKey is required";
pub const INVALID_KEY_FORMAT: &str = "Invalid license key format";

/// Syntactic validator for raw `licenseKey` values. Never touches the lookup collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyValidator {
    min_len: usize,
    max_len: usize,
}

impl Default for KeyValidator {
    fn default() -> Self {
        Self::new(&ValidationConfig::default())
    }
}

impl KeyValidator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            min_len: config.min_key_len,
            max_len: config.max_key_len,
        }
    }

    /// Accept `raw` only if it is a string whose length (in characters) lies in
    /// `[min_len, max_len]`. Returns the borrowed key on success.
    pub fn validate<'a>(&self, raw: Option<&'a Value>) -> ResolveResult<&'a str> {
        let key = match raw {
            Some(Value::String(key)) => key.as_str(),
            _ => return Err(EntitlementError::Format(MISSING_KEY.to_string())),
        };

        let len = key.chars().count();
        if len < self.min_len || len > self.max_len {
            return Err(EntitlementError::Format(INVALID_KEY_FORMAT.to_string()));
        }
        Ok(key)
    }
}
