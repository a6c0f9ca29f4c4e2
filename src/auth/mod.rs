//! OAuth2 authentication module
//!
//! Implements the client credentials flow against the CRM's authorization
//! server and keeps a single cached bearer token, refreshed lazily.

use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::RwLock;

/// Token endpoint used by the OData dialect
pub const ODATA_TOKEN_URL: &str = "https://auth.tribecrm.nl/oauth2/token";

/// Scope requested by the OData dialect
pub const ODATA_SCOPE: &str = "read write offline";

/// Lead time before expiry at which a token is treated as expired
pub const SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token request failed: {0}")]
    TokenRequestFailed(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Token parse error: {0}")]
    ParseError(String),
}

/// Client credentials, fixed for the lifetime of the process
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub organization_id: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

/// Where and how to request tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEndpoint {
    pub url: String,
    pub scope: Option<String>,
}

impl TokenEndpoint {
    /// Fixed endpoint of the OData deployment
    pub fn odata() -> Self {
        Self {
            url: ODATA_TOKEN_URL.to_string(),
            scope: Some(ODATA_SCOPE.to_string()),
        }
    }

    /// Endpoint relative to the configured auth base URL
    pub fn rest(auth_url: &str, token_path: &str, scope: Option<String>) -> Self {
        let base = auth_url.trim_end_matches('/');
        let path = if token_path.starts_with('/') {
            token_path.to_string()
        } else {
            format!("/{}", token_path)
        };
        Self {
            url: format!("{}{}", base, path),
            scope,
        }
    }
}

/// Token response from the authorization server
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: u64,
    #[serde(default)]
    scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Error body returned by the authorization server
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// An issued bearer token
///
/// Never modified after creation; a refresh replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub scope: Option<String>,
    pub issued_at: SystemTime,
}

impl Token {
    /// Wall-clock time at which the server stops accepting the token;
    /// `None` when the lifetime does not fit in a `SystemTime`
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.issued_at.checked_add(Duration::from_secs(self.expires_in))
    }

    /// Whether the token can still be used at `now`, honouring the safety margin
    pub fn is_usable_at(&self, now: SystemTime) -> bool {
        match (self.expires_at(), now.checked_add(SAFETY_MARGIN)) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(expiry), Some(deadline)) => deadline < expiry,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.is_usable_at(SystemTime::now())
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Owns the cached token and refreshes it on demand
#[derive(Debug)]
pub struct TokenManager {
    credentials: Credentials,
    endpoint: TokenEndpoint,
    http_client: Client,
    token_cache: RwLock<Option<Arc<Token>>>,
}

impl TokenManager {
    pub fn new(credentials: Credentials, endpoint: TokenEndpoint, http_client: Client) -> Self {
        Self {
            credentials,
            endpoint,
            http_client,
            token_cache: RwLock::new(None),
        }
    }

    pub fn endpoint(&self) -> &TokenEndpoint {
        &self.endpoint
    }

    /// Return the cached token, or acquire a new one when it is absent or
    /// within the safety margin of expiry.
    ///
    /// Concurrent callers may both decide to refresh; the last swap wins and
    /// both tokens are valid.
    pub async fn ensure_valid_token(&self) -> Result<Arc<Token>, AuthError> {
        {
            let cache = self.token_cache.read().await;
            if let Some(ref cached) = *cache {
                if cached.is_usable() {
                    tracing::debug!("Using cached token");
                    return Ok(Arc::clone(cached));
                }
            }
        }

        tracing::info!("Acquiring new access token from {}", self.endpoint.url);
        let token = Arc::new(self.acquire_token().await?);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(Arc::clone(&token));
        }

        tracing::info!(
            "Token acquired successfully, expires in {} seconds",
            token.expires_in
        );

        Ok(token)
    }

    /// Request a new token from the authorization server
    async fn acquire_token(&self) -> Result<Token, AuthError> {
        let mut params = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];
        if let Some(ref scope) = self.endpoint.scope {
            params.push(("scope", scope.as_str()));
        }
        if let Some(ref organization_id) = self.credentials.organization_id {
            params.push(("organization_id", organization_id.as_str()));
        }

        let issued_at = SystemTime::now();
        let response = self
            .http_client
            .post(&self.endpoint.url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Token request failed: {} - {}", status, body);
            return Err(AuthError::TokenRequestFailed(describe_token_error(
                status.as_u16(),
                &body,
            )));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            AuthError::ParseError(format!("Failed to parse token response: {}", e))
        })?;

        Ok(Token {
            access_token: token_response.access_token,
            token_type: token_response.token_type,
            expires_in: token_response.expires_in,
            scope: token_response.scope,
            issued_at,
        })
    }

    /// Clear the token cache
    pub async fn clear(&self) {
        let mut cache = self.token_cache.write().await;
        *cache = None;
    }

    /// Drop `rejected` from the cache if it is still the cached token.
    ///
    /// A token swapped in by a concurrent refresh is kept.
    pub async fn invalidate(&self, rejected: &Arc<Token>) {
        let mut cache = self.token_cache.write().await;
        if cache.as_ref().is_some_and(|cached| Arc::ptr_eq(cached, rejected)) {
            tracing::info!("Dropping access token rejected by the API");
            *cache = None;
        }
    }
}

/// Prefer the provider's own description over the raw body
fn describe_token_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(TokenErrorResponse {
            error_description: Some(description),
            ..
        }) => description,
        Ok(TokenErrorResponse {
            error: Some(error), ..
        }) => error,
        _ => format!("Status: {}, Body: {}", status, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_in: u64, issued_at: SystemTime) -> Token {
        Token {
            access_token: "test".to_string(),
            token_type: "Bearer".to_string(),
            expires_in,
            scope: None,
            issued_at,
        }
    }

    #[test]
    fn test_odata_endpoint() {
        let endpoint = TokenEndpoint::odata();
        assert_eq!(endpoint.url, "https://auth.tribecrm.nl/oauth2/token");
        assert_eq!(endpoint.scope.as_deref(), Some("read write offline"));
    }

    #[test]
    fn test_rest_endpoint_joins_path() {
        assert_eq!(
            TokenEndpoint::rest("https://auth.example.com/", "/oauth/token", None).url,
            "https://auth.example.com/oauth/token"
        );
        assert_eq!(
            TokenEndpoint::rest("https://auth.example.com", "token", None).url,
            "https://auth.example.com/token"
        );
    }

    #[test]
    fn test_token_usable_outside_margin() {
        let now = SystemTime::now();
        assert!(token(3600, now).is_usable_at(now));
        assert!(token(61, now).is_usable_at(now));
    }

    #[test]
    fn test_token_unusable_inside_margin() {
        let now = SystemTime::now();
        assert!(!token(60, now).is_usable_at(now));
        assert!(!token(30, now).is_usable_at(now));
        assert!(!token(3600, now).is_usable_at(now + Duration::from_secs(3550)));
    }

    #[test]
    fn test_expires_at() {
        let issued = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        assert_eq!(
            token(3600, issued).expires_at(),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(4_600))
        );
    }

    #[test]
    fn test_huge_lifetime_never_expires() {
        let now = SystemTime::now();
        let forever = token(u64::MAX, now);
        assert_eq!(forever.expires_at(), None);
        assert!(forever.is_usable_at(now));
        assert!(forever.is_usable());
    }

    #[test]
    fn test_describe_token_error() {
        assert_eq!(
            describe_token_error(
                401,
                r#"{"error":"invalid_client","error_description":"Client authentication failed"}"#
            ),
            "Client authentication failed"
        );
        assert_eq!(
            describe_token_error(400, r#"{"error":"invalid_scope"}"#),
            "invalid_scope"
        );
        assert_eq!(
            describe_token_error(502, "Bad Gateway"),
            "Status: 502, Body: Bad Gateway"
        );
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let credentials = Credentials {
            client_id: "id".to_string(),
            client_secret: "hunter2".to_string(),
            organization_id: None,
        };
        assert!(!format!("{:?}", credentials).contains("hunter2"));
    }
}
