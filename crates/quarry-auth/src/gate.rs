//! The auth gate.
//!
//! Built once from the `authServices` section; holds one validator per
//! service name. [`AuthGate::check`] decides whether a call to a tool may
//! proceed and collects the claims of every token that validated.

use crate::claims::Claims;
use crate::error::AuthError;
use crate::headers::{RequestHeaders, token_header};
use crate::validator::OidcValidator;
use quarry_core::{AuthServiceConfig, ConfigError};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// How the invocation reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// HTTP, SSE or REST. Headers are available and auth is enforced.
    Http,
    /// Local stdio pipe. No headers exist; auth is bypassed.
    Stdio,
}

/// Auth requirements of one tool, computed at registry load time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRequirements {
    /// At least one of these must validate (empty = public).
    pub required: Vec<String>,
    /// Services whose claims fill parameters.
    pub claim_services: Vec<String>,
    /// The caller's `Authorization` bearer token must be present. It is
    /// handed to the data source unverified; the sql sources only check its
    /// presence and still connect with their configured credentials.
    pub use_client_oauth: bool,
}

impl AuthRequirements {
    /// Every service whose token should be looked at, without duplicates.
    pub fn services(&self) -> Vec<&str> {
        let mut services: Vec<&str> = Vec::new();
        for name in self.required.iter().chain(self.claim_services.iter()) {
            if !services.contains(&name.as_str()) {
                services.push(name);
            }
        }
        services
    }

    /// Whether the tool can be called without any credentials.
    pub fn is_public(&self) -> bool {
        self.required.is_empty() && !self.use_client_oauth
    }
}

/// Result of a successful gate check.
#[derive(Debug, Clone, Default)]
pub struct AuthOutcome {
    /// Claims per auth service whose token validated.
    pub claims: BTreeMap<String, Claims>,
    /// Caller bearer token, when the tool forwards client OAuth.
    pub client_token: Option<String>,
    /// Auth was skipped because the transport carries no headers.
    pub bypassed: bool,
}

impl AuthOutcome {
    fn bypassed() -> Self {
        Self {
            bypassed: true,
            ..Self::default()
        }
    }
}

/// Mapping from auth service name to validator.
pub struct AuthGate {
    validators: HashMap<String, OidcValidator>,
}

impl AuthGate {
    /// Build validators for every configured auth service.
    pub fn from_config(
        services: &BTreeMap<String, AuthServiceConfig>,
    ) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConfigError::invalid("authServices", e.to_string()))?;

        let mut validators = HashMap::new();
        for (name, config) in services {
            let validator = OidcValidator::new(name.clone(), config.clone(), client.clone())?;
            validators.insert(name.clone(), validator);
        }

        Ok(Self { validators })
    }

    /// A gate with no auth services; only public tools can be called.
    pub fn empty() -> Self {
        Self {
            validators: HashMap::new(),
        }
    }

    /// Whether an auth service of this name exists.
    pub fn contains(&self, service: &str) -> bool {
        self.validators.contains_key(service)
    }

    /// Names of all configured auth services.
    pub fn services(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.validators.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check a call against the tool's requirements.
    ///
    /// Semantics are OR across `required`: one validated service is enough.
    /// Tokens for services that fail validation are logged and ignored, so a
    /// stale token for one service does not block access through another.
    pub async fn check(
        &self,
        requirements: &AuthRequirements,
        headers: &RequestHeaders,
        transport: Transport,
    ) -> Result<AuthOutcome, AuthError> {
        if transport == Transport::Stdio {
            tracing::debug!("Auth bypassed for stdio transport");
            return Ok(AuthOutcome::bypassed());
        }

        let mut claims = BTreeMap::new();
        for service in requirements.services() {
            let Some(token) = headers.get(&token_header(service)) else {
                continue;
            };
            let Some(validator) = self.validators.get(service) else {
                tracing::warn!(service, "Tool references an unknown auth service");
                continue;
            };
            match validator.validate(token).await {
                Ok(validated) => {
                    tracing::debug!(service, "Token validated");
                    claims.insert(service.to_string(), validated);
                }
                Err(e) => {
                    tracing::warn!(service, error = %e, "Token rejected");
                }
            }
        }

        if !requirements.required.is_empty()
            && !requirements.required.iter().any(|s| claims.contains_key(s))
        {
            return Err(AuthError::Unauthorized {
                services: requirements.required.clone(),
            });
        }

        let client_token = if requirements.use_client_oauth {
            let token = headers
                .bearer_token()
                .ok_or(AuthError::MissingClientToken)?;
            Some(token.to_string())
        } else {
            None
        };

        Ok(AuthOutcome {
            claims,
            client_token,
            bypassed: false,
        })
    }
}
