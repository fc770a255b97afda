use thiserror::Error;

pub type ResolveResult<T> = Result<T, EntitlementError>;

/// Failures that terminate an entitlement request before a resolution is produced.
///
/// Deactivated and expired licenses are not errors: they resolve to a
/// payload with `valid: false`.
#[derive(Error, Debug)]
pub enum EntitlementError {
    #[error("{0}")]
    Format(String),

    #[error("{0}")]
    Authorization(String),

    #[error("License lookup unavailable: {0}")]
    Infrastructure(String),
}

impl EntitlementError {
    /// Stable machine-readable kind, used as the `error` field of API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Format(_) => "invalid_request",
            Self::Authorization(_) => "unauthorized",
            Self::Infrastructure(_) => "lookup_unavailable",
        }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format(_))
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization(_))
    }

    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }
}
