//! # quarry-auth
//!
//! Authentication for Quarry tools.
//!
//! Tools may name one or more **auth services** in `authRequired`. A caller
//! presents one OIDC ID token per service in a `{service}_token` header; the
//! gate validates each presented token (signature, issuer, audience, expiry)
//! and grants access when **any** required service validates.
//!
//! Validated claims are handed back to the dispatcher so parameters declared
//! with `authServices` can be filled from the caller's identity.
//!
//! | Transport | Auth |
//! |-----------|------|
//! | HTTP / SSE / REST | enforced per tool |
//! | stdio | bypassed: a local pipe carries no headers and is trusted |

pub mod claims;
pub mod error;
pub mod gate;
pub mod headers;
pub mod validator;

pub use claims::Claims;
pub use error::AuthError;
pub use gate::{AuthGate, AuthOutcome, AuthRequirements, Transport};
pub use headers::{RequestHeaders, token_header};
pub use validator::OidcValidator;
