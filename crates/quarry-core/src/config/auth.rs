//! Auth service configuration.
//!
//! Each auth service is an OIDC ID token validator. Clients present a token
//! per service in the `{name}_token` header.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const GOOGLE_ISSUER: &str = "https://accounts.google.com";
const GOOGLE_JWKS_URI: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Configuration for one named auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthServiceConfig {
    pub kind: AuthServiceKind,

    /// Expected `iss` claim. Defaults to Google's issuer for `kind: google`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Expected `aud` claim.
    pub client_id: String,

    /// JWKS location. Discovered from the issuer when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// HS256 secret for development identity providers that sign with a
    /// shared key instead of publishing a JWKS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,

    /// Clock skew tolerated on `exp`/`nbf`.
    #[serde(default = "default_leeway", with = "humantime_serde")]
    pub leeway: Duration,
}

/// Auth service flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthServiceKind {
    /// Generic OpenID Connect provider.
    Oidc,
    /// Google Sign-In; issuer and JWKS are preset.
    Google,
}

impl AuthServiceConfig {
    /// The issuer tokens must carry, if any is known.
    pub fn issuer(&self) -> Option<&str> {
        match (&self.issuer, self.kind) {
            (Some(issuer), _) => Some(issuer.as_str()),
            (None, AuthServiceKind::Google) => Some(GOOGLE_ISSUER),
            (None, AuthServiceKind::Oidc) => None,
        }
    }

    /// Explicit or preset JWKS location. `None` means discover from the issuer.
    pub fn jwks_uri(&self) -> Option<&str> {
        match (&self.jwks_uri, self.kind) {
            (Some(uri), _) => Some(uri.as_str()),
            (None, AuthServiceKind::Google) => Some(GOOGLE_JWKS_URI),
            (None, AuthServiceKind::Oidc) => None,
        }
    }
}

fn default_leeway() -> Duration {
    Duration::from_secs(60)
}
