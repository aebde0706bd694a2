//! Signed-JWT authorization and token management for Google Drive.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use drivestore_common::{Error, Result};

use super::credentials::ServiceAccountCredentials;

/// Google Drive read/write scope.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// OAuth2 grant type for signed-JWT assertions (RFC 7523).
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Bearer token with expiration tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    /// Access token for API requests.
    pub token: String,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Check if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        // Consider expired if less than 5 minutes remaining
        self.expires_at < Utc::now() + Duration::minutes(5)
    }
}

/// Exchanges a signed assertion for a bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// POST `assertion` to `token_uri` and return the issued token.
    async fn exchange(&self, token_uri: &str, assertion: &str) -> Result<AccessToken>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Google OAuth2 token endpoint.
pub struct GoogleTokenEndpoint {
    http: Client,
}

impl GoogleTokenEndpoint {
    /// Create a token endpoint client.
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("drivestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    /// Turn a token endpoint response into an `AccessToken`.
    fn parse_response(status: StatusCode, body: &str, now: DateTime<Utc>) -> Result<AccessToken> {
        if !status.is_success() {
            let reason = match serde_json::from_str::<TokenErrorResponse>(body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => body.to_string(),
            };
            return Err(Error::Authentication(format!(
                "Token exchange failed: {} - {}",
                status, reason
            )));
        }

        let response: TokenResponse = serde_json::from_str(body).map_err(|e| {
            Error::Authentication(format!("Failed to parse token response: {}", e))
        })?;

        let expires_in = response.expires_in.unwrap_or(3600).clamp(0, 86_400);

        Ok(AccessToken {
            token: response.access_token,
            expires_at: now + Duration::seconds(expires_in),
        })
    }
}

#[async_trait]
impl TokenSource for GoogleTokenEndpoint {
    async fn exchange(&self, token_uri: &str, assertion: &str) -> Result<AccessToken> {
        let response = self
            .http
            .post(token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion)])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to reach token endpoint: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("Failed to read token response: {}", e)))?;

        Self::parse_response(status, &body, Utc::now())
    }
}

/// The adapter's single authorization context.
///
/// Holds the immutable service-account credentials and hands out bearer
/// tokens minted from them, re-minting when the cached one nears expiry.
pub struct Authorizer {
    credentials: ServiceAccountCredentials,
    source: Arc<dyn TokenSource>,
    token: RwLock<Option<AccessToken>>,
}

impl Authorizer {
    /// Create an authorizer. No token is requested until first use.
    pub fn new(credentials: ServiceAccountCredentials, source: Arc<dyn TokenSource>) -> Self {
        Self {
            credentials,
            source,
            token: RwLock::new(None),
        }
    }

    /// The credentials this context authenticates with.
    pub fn credentials(&self) -> &ServiceAccountCredentials {
        &self.credentials
    }

    /// Get a valid access token, minting a new one if necessary.
    ///
    /// # Errors
    /// - Assertion signing failed
    /// - Token exchange failed
    pub async fn access_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if let Some(token) = token.as_ref().filter(|t| !t.is_expired()) {
                return Ok(token.token.clone());
            }
        }

        let mut token = self.token.write().await;

        // Double-check after acquiring write lock
        if let Some(current) = token.as_ref().filter(|t| !t.is_expired()) {
            return Ok(current.token.clone());
        }

        tracing::info!(
            client_email = self.credentials.client_email(),
            delegated_user = ?self.credentials.delegated_user(),
            "Requesting access token"
        );

        let assertion = self.credentials.sign_assertion(DRIVE_SCOPE, Utc::now())?;
        let minted = self
            .source
            .exchange(self.credentials.token_uri(), &assertion)
            .await?;
        let value = minted.token.clone();
        *token = Some(minted);

        Ok(value)
    }
}
