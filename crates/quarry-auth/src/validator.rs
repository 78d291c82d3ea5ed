//! OIDC ID token validation.
//!
//! Checking a token is a pure function of the token, the verification key
//! and the service configuration ([`verify_token`]). Keys come either from
//! a shared secret or from the provider's JWKS document, which is fetched on
//! first use and refreshed when a token names an unknown key id.

use crate::claims::Claims;
use crate::error::AuthError;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use quarry_core::{AuthServiceConfig, AuthServiceKind, ConfigError};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Minimum time between two JWKS downloads for the same service.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Google tokens may carry the issuer without a scheme.
const GOOGLE_ISSUER_ALT: &str = "accounts.google.com";

/// Validator for one auth service.
pub struct OidcValidator {
    service: String,
    config: AuthServiceConfig,
    keys: KeySource,
}

enum KeySource {
    Shared(DecodingKey),
    Jwks(JwksCache),
}

struct JwksCache {
    client: reqwest::Client,
    uri: Option<String>,
    issuer: Option<String>,
    state: RwLock<Option<CachedKeys>>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

#[derive(Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

impl OidcValidator {
    /// Build a validator from configuration.
    pub fn new(
        service: impl Into<String>,
        config: AuthServiceConfig,
        client: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        let service = service.into();
        let location = format!("authServices.{}", service);

        if config.client_id.trim().is_empty() {
            return Err(ConfigError::invalid(location, "clientId must not be empty"));
        }

        let keys = match &config.shared_secret {
            Some(_) if config.jwks_uri.is_some() => {
                return Err(ConfigError::invalid(
                    location,
                    "sharedSecret and jwksUri are mutually exclusive",
                ));
            }
            Some(secret) => KeySource::Shared(DecodingKey::from_secret(secret.as_bytes())),
            None => {
                if config.jwks_uri().is_none() && config.issuer().is_none() {
                    return Err(ConfigError::invalid(
                        location,
                        "an issuer or jwksUri is required to locate signing keys",
                    ));
                }
                KeySource::Jwks(JwksCache {
                    client,
                    uri: config.jwks_uri().map(String::from),
                    issuer: config.issuer().map(String::from),
                    state: RwLock::new(None),
                })
            }
        };

        Ok(Self {
            service,
            config,
            keys,
        })
    }

    /// Name of the auth service.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Validate an ID token and return its claims.
    pub async fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|e| self.invalid(e.to_string()))?;

        match &self.keys {
            KeySource::Shared(key) => {
                if header.alg != Algorithm::HS256 {
                    return Err(self.invalid(format!("unexpected algorithm {:?}", header.alg)));
                }
                verify_token(token, key, Algorithm::HS256, &self.service, &self.config)
            }
            KeySource::Jwks(cache) => {
                if !is_asymmetric(header.alg) {
                    return Err(self.invalid(format!("unexpected algorithm {:?}", header.alg)));
                }
                let kid = header
                    .kid
                    .ok_or_else(|| self.invalid("token header has no key id"))?;
                let key = cache.key(&self.service, &kid).await?;
                verify_token(token, &key, header.alg, &self.service, &self.config)
            }
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> AuthError {
        AuthError::InvalidToken {
            service: self.service.clone(),
            reason: reason.into(),
        }
    }
}

/// Verify signature, issuer, audience and expiry of a token.
pub fn verify_token(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
    service: &str,
    config: &AuthServiceConfig,
) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(algorithm);
    validation.leeway = config.leeway.as_secs();
    validation.set_audience(&[config.client_id.as_str()]);

    let mut required = vec!["exp", "aud"];
    if let Some(issuer) = config.issuer() {
        let mut issuers = vec![issuer];
        if config.kind == AuthServiceKind::Google && config.issuer.is_none() {
            issuers.push(GOOGLE_ISSUER_ALT);
        }
        validation.set_issuer(&issuers);
        required.push("iss");
    }
    validation.set_required_spec_claims(&required);

    decode::<Claims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::InvalidToken {
            service: service.to_string(),
            reason: e.to_string(),
        })
}

fn is_asymmetric(alg: Algorithm) -> bool {
    !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

impl JwksCache {
    async fn key(&self, service: &str, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let state = self.state.read().await;
            if let Some(cached) = state.as_ref()
                && let Some(jwk) = cached.keys.find(kid)
            {
                return to_decoding_key(service, jwk);
            }
        }

        let mut state = self.state.write().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = state.as_ref() {
            if let Some(jwk) = cached.keys.find(kid) {
                return to_decoding_key(service, jwk);
            }
            if cached.fetched_at.elapsed() < MIN_REFRESH_INTERVAL {
                return Err(AuthError::UnknownKey {
                    service: service.to_string(),
                    kid: kid.to_string(),
                });
            }
        }

        let keys = self.fetch(service).await?;
        let key = match keys.find(kid) {
            Some(jwk) => to_decoding_key(service, jwk),
            None => Err(AuthError::UnknownKey {
                service: service.to_string(),
                kid: kid.to_string(),
            }),
        };
        *state = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });
        key
    }

    async fn fetch(&self, service: &str) -> Result<JwkSet, AuthError> {
        let uri = match &self.uri {
            Some(uri) => uri.clone(),
            None => self.discover(service).await?,
        };

        tracing::debug!(service, uri = %uri, "Fetching JWKS");

        let keys = self
            .client
            .get(&uri)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| key_fetch(service, e))?
            .json::<JwkSet>()
            .await
            .map_err(|e| key_fetch(service, e))?;

        tracing::info!(service, key_count = keys.keys.len(), "Loaded signing keys");
        Ok(keys)
    }

    async fn discover(&self, service: &str) -> Result<String, AuthError> {
        let issuer = self.issuer.as_deref().ok_or_else(|| AuthError::KeyFetch {
            service: service.to_string(),
            reason: "no issuer configured for discovery".to_string(),
        })?;
        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );

        let document = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| key_fetch(service, e))?
            .json::<DiscoveryDocument>()
            .await
            .map_err(|e| key_fetch(service, e))?;

        Ok(document.jwks_uri)
    }
}

fn to_decoding_key(service: &str, jwk: &jsonwebtoken::jwk::Jwk) -> Result<DecodingKey, AuthError> {
    DecodingKey::from_jwk(jwk).map_err(|e| AuthError::KeyFetch {
        service: service.to_string(),
        reason: format!("unusable key: {}", e),
    })
}

fn key_fetch(service: &str, e: reqwest::Error) -> AuthError {
    AuthError::KeyFetch {
        service: service.to_string(),
        reason: e.to_string(),
    }
}
