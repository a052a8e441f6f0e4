use thiserror::Error;

/// Errors surfaced by the public operation surface.
///
/// Malformed, unsigned, expired and revoked-by-timestamp credentials all
/// collapse into [`AuthError::InvalidCredential`]; callers cannot tell which
/// one they hit. Policy violations and missing records stay distinguishable,
/// and backend failures are never reported as an authentication verdict.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The presented token failed verification, or its subject no longer
    /// exists or has been revoked since issuance.
    #[error("invalid credential")]
    InvalidCredential,

    /// Requested access-token validity exceeds the configured maximum. The
    /// request is rejected outright rather than clamped.
    #[error("requested validity {requested_secs}s exceeds the maximum {max_secs}s")]
    ValidityTooLong { requested_secs: i64, max_secs: i64 },

    /// The service exists but is not in NORMAL status and cannot be granted
    /// authorizations.
    #[error("service is not in normal status")]
    ServiceNotActive,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Infrastructure failure from a backing store or the token codec.
    #[error("storage backend failure: {0}")]
    Storage(#[from] anyhow::Error),
}
