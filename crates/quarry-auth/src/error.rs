//! Error types for the auth crate.

use thiserror::Error;

/// Errors that can occur while authenticating a tool call.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A presented token failed validation.
    #[error("auth service {service}: invalid token: {reason}")]
    InvalidToken { service: String, reason: String },

    /// No required auth service accepted the caller.
    #[error("not authorized: a valid token is required for one of [{}]", .services.join(", "))]
    Unauthorized { services: Vec<String> },

    /// The tool forwards the caller's OAuth token but none was sent.
    #[error("tool requires an Authorization bearer token")]
    MissingClientToken,

    /// The token names a key the service does not publish.
    #[error("auth service {service}: no signing key with id {kid}")]
    UnknownKey { service: String, kid: String },

    /// Signing keys could not be retrieved.
    #[error("auth service {service}: failed to fetch signing keys: {reason}")]
    KeyFetch { service: String, reason: String },
}
