//! OAuth client-credentials cache for token-gated providers
//!
//! Spotify and IGDB both hand out short-lived bearer tokens in exchange
//! for a client id/secret pair. The cache keeps one token per provider,
//! refreshes it ahead of expiry, and serializes refreshes per provider
//! so concurrent lookups share a single exchange instead of stampeding
//! the token endpoint.

use crate::core::error::{LendError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tokens are considered stale this long before the provider's own
/// expiry, so a token handed to a request never dies mid-flight.
const EXPIRY_MARGIN_SECS: u64 = 300;

pub const PROVIDER_SPOTIFY: &str = "spotify";
pub const PROVIDER_IGDB: &str = "igdb";

const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const TWITCH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Result of a client-credentials exchange
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}

/// The actual network exchange, kept behind a trait so the cache's
/// refresh behavior can be tested without a token endpoint.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, provider: &str) -> Result<TokenResponse>;
}

/// Client id/secret pair for one provider
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Performs real client-credentials exchanges over HTTP
pub struct HttpTokenExchange {
    http: reqwest::Client,
    credentials: HashMap<String, ClientCredentials>,
}

impl HttpTokenExchange {
    pub fn new(http: reqwest::Client, credentials: HashMap<String, ClientCredentials>) -> Self {
        Self { http, credentials }
    }

    fn credentials_for(&self, provider: &str) -> Result<&ClientCredentials> {
        self.credentials.get(provider).ok_or_else(|| {
            LendError::CredentialError(format!("no credentials configured for {}", provider))
        })
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, provider: &str) -> Result<TokenResponse> {
        let creds = self.credentials_for(provider)?;

        let response = match provider {
            PROVIDER_SPOTIFY => {
                // Spotify wants the pair Basic-encoded in the header
                let basic = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", creds.client_id, creds.client_secret));
                self.http
                    .post(SPOTIFY_TOKEN_URL)
                    .header("Authorization", format!("Basic {}", basic))
                    .form(&[("grant_type", "client_credentials")])
                    .send()
                    .await
            }
            PROVIDER_IGDB => {
                // Twitch takes the pair as form fields
                self.http
                    .post(TWITCH_TOKEN_URL)
                    .form(&[
                        ("client_id", creds.client_id.as_str()),
                        ("client_secret", creds.client_secret.as_str()),
                        ("grant_type", "client_credentials"),
                    ])
                    .send()
                    .await
            }
            other => {
                return Err(LendError::CredentialError(format!(
                    "unknown token provider: {}",
                    other
                )));
            }
        }
        .map_err(|e| {
            LendError::ProviderUnavailable(format!("{} token endpoint unreachable: {}", provider, e))
        })?;

        if !response.status().is_success() {
            return Err(LendError::CredentialError(format!(
                "{} token exchange failed with status {}",
                provider,
                response.status()
            )));
        }

        response.json::<TokenResponse>().await.map_err(|e| {
            LendError::CredentialError(format!("{} token response malformed: {}", provider, e))
        })
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Per-provider token store with serialized refresh
pub struct CredentialCache {
    exchange: Arc<dyn TokenExchange>,
    slots: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<Option<CachedToken>>>>>,
}

impl CredentialCache {
    pub fn new(exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            exchange,
            slots: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, provider: &str) -> Arc<tokio::sync::Mutex<Option<CachedToken>>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone()
    }

    /// Get a bearer token for the provider, exchanging a new one only
    /// when the cached token is missing or within the expiry margin.
    pub async fn get_token(&self, provider: &str) -> Result<String> {
        let slot = self.slot(provider);
        let mut guard = slot.lock().await;

        let now = Instant::now();
        if let Some(token) = guard.as_ref() {
            if token.is_fresh(now) {
                debug!(provider = provider, "using cached token");
                return Ok(token.access_token.clone());
            }
        }

        let token = self.refresh_locked(provider, &mut guard).await?;
        Ok(token)
    }

    /// Exchange a new token unconditionally, replacing the cached one
    /// on success. Used after a provider rejects a token the cache
    /// still believed was fresh; a failed exchange leaves the cached
    /// token untouched.
    pub async fn force_refresh(&self, provider: &str) -> Result<String> {
        let slot = self.slot(provider);
        let mut guard = slot.lock().await;
        warn!(provider = provider, "token rejected upstream, forcing refresh");
        self.refresh_locked(provider, &mut guard).await
    }

    async fn refresh_locked(
        &self,
        provider: &str,
        guard: &mut Option<CachedToken>,
    ) -> Result<String> {
        let response = self.exchange.exchange(provider).await?;
        let lifetime = response.expires_in.saturating_sub(EXPIRY_MARGIN_SECS);
        let token = CachedToken {
            access_token: response.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        };
        info!(
            provider = provider,
            expires_in = response.expires_in,
            "exchanged new access token"
        );
        *guard = Some(token);
        Ok(response.access_token)
    }
}
