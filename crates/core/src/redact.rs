//! License keys are secrets; diagnostics only ever carry a short prefix.

/// Number of leading characters of a license key allowed in diagnostics.
pub const KEY_PREFIX_LEN: usize = 8;

/// Return the first [`KEY_PREFIX_LEN`] characters of `key` followed by an ellipsis.
pub fn redact_key(key: &str) -> String {
    let prefix: String = key.chars().take(KEY_PREFIX_LEN).collect();
    format!("{prefix}...")
}
