use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use jsonwebtoken::{jwk, jwk::AlgorithmParameters, DecodingKey};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::config::OAuthSettings;

const WELL_KNOWN: &str = ".well-known/openid-configuration";
const SCOPES: &str = "openid profile email";

type Keys = HashMap<String, DecodingKey>;

/// Identity token claims the application reads. Issuer, audience and expiry are
/// checked by `jsonwebtoken` during decoding.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Claims {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.preferred_username.as_deref())
            .or(self.email.as_deref())
            .unwrap_or(&self.sub)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub id_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum OpenIDError {
    #[error("openid configuration could not be fetched from {0}")]
    InvalidWellKnownUri(String),
    #[error("openid configuration document is missing or malformed")]
    MissingOpenIDConfiguration,
    #[error("jwks could not be fetched from {0}")]
    InvalidJwksUri(String),
    #[error("jwks document is missing or malformed")]
    MissingJwksSet,
    #[error("invalid provider url: {0}")]
    InvalidUrl(String),
    #[error("token request failed: {0}")]
    TokenRequest(#[from] reqwest::Error),
    #[error("token endpoint rejected the request with status {0}")]
    TokenRejected(u16),
    #[error("token response has no id_token")]
    MissingIdToken,
    #[error("key cache lock poisoned")]
    InternalServerError,
}

#[derive(Debug, Error, PartialEq)]
pub enum VerifyError {
    #[error("token is malformed or has no key id")]
    Malformed,
    #[error("no signing key for kid {0}")]
    UnknownKey(String),
    #[error("token rejected: {0}")]
    Rejected(String),
    #[error("key cache lock poisoned")]
    Internal,
}

/// Client for one OpenID Connect provider: discovery document, signing key
/// cache, and the login, code exchange and logout endpoints.
pub struct OidcClient {
    http: reqwest::Client,
    settings: OAuthSettings,
    metadata: ProviderMetadata,
    keys: RwLock<Keys>,
}

impl OidcClient {
    pub async fn discover(settings: OAuthSettings) -> Result<Self, OpenIDError> {
        let http = reqwest::Client::new();
        let well_known = format!("{}/{WELL_KNOWN}", settings.issuer_url);
        let metadata = http
            .get(&well_known)
            .send()
            .await
            .map_err(|_| OpenIDError::InvalidWellKnownUri(well_known.clone()))?
            .error_for_status()
            .map_err(|_| OpenIDError::InvalidWellKnownUri(well_known.clone()))?
            .json::<ProviderMetadata>()
            .await
            .map_err(|_| OpenIDError::MissingOpenIDConfiguration)?;
        let keys = decoding_keys(&http, &metadata.jwks_uri).await?;
        tracing::info!(
            issuer = %metadata.issuer,
            keys = keys.len(),
            "openid provider discovered"
        );

        Ok(OidcClient {
            http,
            settings,
            metadata,
            keys: RwLock::new(keys),
        })
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    pub async fn update_jwks(&self) -> Result<(), OpenIDError> {
        let new_keys = decoding_keys(&self.http, &self.metadata.jwks_uri).await?;
        let mut keys = self
            .keys
            .write()
            .map_err(|_| OpenIDError::InternalServerError)?;
        *keys = new_keys;
        Ok(())
    }

    /// Reloads the signing keys every `sec_interval` seconds; 0 disables the refresh.
    pub fn spawn_key_refresh(self: &Arc<Self>, sec_interval: u64) {
        if sec_interval == 0 {
            return;
        }
        let client = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(sec_interval)).await;
                match client.update_jwks().await {
                    Ok(_) => tracing::debug!("jwks updated"),
                    Err(e) => tracing::error!("Jwks not updated: {:?}", e),
                };
            }
        });
    }

    pub fn authorize_url(&self, state: &str) -> Result<String, OpenIDError> {
        let url = Url::parse_with_params(
            &self.metadata.authorization_endpoint,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.settings.redirect_url.as_str()),
                ("response_mode", "query"),
                ("scope", SCOPES),
                ("state", state),
            ],
        )
        .map_err(|_| OpenIDError::InvalidUrl(self.metadata.authorization_endpoint.clone()))?;
        Ok(url.into())
    }

    /// Exchanges an authorization code at the token endpoint and returns the id token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, OpenIDError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.settings.redirect_url.as_str()),
            ("scope", SCOPES),
        ];
        let response = self
            .http
            .post(&self.metadata.token_endpoint)
            .form(&params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "token exchange failed");
            return Err(OpenIDError::TokenRejected(status.as_u16()));
        }
        response
            .json::<TokenResponse>()
            .await?
            .id_token
            .ok_or(OpenIDError::MissingIdToken)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        let kid = decode_header(token)
            .map_err(|_| VerifyError::Malformed)?
            .kid
            .ok_or(VerifyError::Malformed)?;
        let keys = self.keys.read().map_err(|_| VerifyError::Internal)?;
        let key = keys.get(&kid).ok_or(VerifyError::UnknownKey(kid))?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.metadata.issuer]);
        validation.set_audience(&[&self.settings.client_id]);
        let token_data = decode::<Claims>(token, key, &validation).map_err(|e| {
            tracing::debug!("{:?}", e);
            VerifyError::Rejected(e.to_string())
        })?;

        Ok(token_data.claims)
    }

    /// Provider logout location, or `None` when the provider publishes no end-session endpoint.
    pub fn logout_url(&self) -> Option<String> {
        let endpoint = self.metadata.end_session_endpoint.as_deref()?;
        match &self.settings.post_logout_redirect_url {
            None => Some(endpoint.to_string()),
            Some(redirect) => {
                Url::parse_with_params(endpoint, &[("post_logout_redirect_uri", redirect)])
                    .ok()
                    .map(String::from)
            }
        }
    }
}

async fn decoding_keys(http: &reqwest::Client, jwks_uri: &str) -> Result<Keys, OpenIDError> {
    let jwks = http
        .get(jwks_uri)
        .send()
        .await
        .map_err(|_| OpenIDError::InvalidJwksUri(jwks_uri.to_string()))?
        .error_for_status()
        .map_err(|_| OpenIDError::InvalidJwksUri(jwks_uri.to_string()))?
        .json::<jwk::JwkSet>()
        .await
        .map_err(|_| OpenIDError::MissingJwksSet)?;
    Ok(jwks_to_decoding_keys(&jwks))
}

fn jwks_to_decoding_keys(jwks: &jwk::JwkSet) -> Keys {
    let mut hm = HashMap::new();
    for jwk in &jwks.keys {
        if let AlgorithmParameters::RSA(ref rsa) = jwk.algorithm {
            if let Ok(decoding_key) = DecodingKey::from_rsa_components(&rsa.n, &rsa.e) {
                if let Some(kid) = jwk.common.key_id.clone() {
                    hm.insert(kid, decoding_key);
                }
            }
        }
    }
    hm
}
