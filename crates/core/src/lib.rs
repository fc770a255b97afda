pub mod config;
pub mod error;
pub mod redact;

pub use config::AppConfig;
pub use error::{EntitlementError, ResolveResult};
pub use redact::redact_key;
