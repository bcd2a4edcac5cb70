//! OAuth tokens for the Drive backend.
//!
//! Sign-in uses the authorization code flow with PKCE over a loopback
//! redirect. Tokens are kept in the data directory and refreshed shortly
//! before they expire.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::PathBuf;
use tokio::sync::Mutex;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

/// Access to the app's own hidden Drive folder only.
pub const SCOPE: &str = "https://www.googleapis.com/auth/drive.appdata";

const TOKEN_FILE: &str = "drive_token.json";

/// Tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug)]
pub enum TokenError {
    /// No stored token, or it can no longer be refreshed
    NotLoggedIn,
    /// The user denied or abandoned sign-in
    Cancelled,
    /// The token endpoint could not be reached
    Http(String),
    /// The token endpoint rejected the request
    Rejected { error: String, description: String },
    /// Token file error
    Io(io::Error),
    /// Unexpected response or token file contents
    Parse(String),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::NotLoggedIn => write!(f, "Not signed in. Run 'barra auth login'."),
            TokenError::Cancelled => write!(f, "Sign-in cancelled"),
            TokenError::Http(e) => write!(f, "HTTP error: {}", e),
            TokenError::Rejected { error, description } => {
                write!(f, "{}: {}", error, description)
            }
            TokenError::Io(e) => write!(f, "Token file error: {}", e),
            TokenError::Parse(e) => write!(f, "Invalid token data: {}", e),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<io::Error> for TokenError {
    fn from(e: io::Error) -> Self {
        TokenError::Io(e)
    }
}

/// Tokens as persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) >= self.expires_at
    }
}

/// Response of the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}

impl TokenResponse {
    fn into_token(self, now: DateTime<Utc>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: now + Duration::seconds(self.expires_in),
        }
    }
}

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        Self::from_verifier(random_token())
    }

    pub fn from_verifier(verifier: String) -> Self {
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(digest);
        Self {
            verifier,
            challenge,
        }
    }
}

/// Random URL-safe string, used for PKCE verifiers and the `state` value.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Token file inside the data directory.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(data_dir: &std::path::Path) -> Self {
        Self {
            path: data_dir.join(TOKEN_FILE),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredToken>, TokenError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| TokenError::Parse(e.to_string()))
    }

    pub fn save(&self, token: &StoredToken) -> Result<(), TokenError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json =
            serde_json::to_string_pretty(token).map_err(|e| TokenError::Parse(e.to_string()))?;
        std::fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn remove(&self) -> Result<bool, TokenError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Talks to the OAuth endpoints.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    client_id: String,
    client_secret: Option<String>,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(client_id: String, client_secret: Option<String>) -> Self {
        Self {
            client_id,
            client_secret,
            http: reqwest::Client::new(),
        }
    }

    /// URL the user opens to grant access.
    pub fn authorize_url(&self, redirect_uri: &str, pkce: &Pkce, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}\
             &code_challenge={}&code_challenge_method=S256&state={}\
             &access_type=offline&prompt=consent",
            AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(SCOPE),
            pkce.challenge,
            urlencoding::encode(state),
        )
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        pkce: &Pkce,
        redirect_uri: &str,
    ) -> Result<StoredToken, TokenError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", pkce.verifier.as_str()),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }
        self.request_token(&form).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<StoredToken, TokenError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }
        self.request_token(&form).await
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<StoredToken, TokenError> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(form)
            .send()
            .await
            .map_err(|e| TokenError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TokenError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => TokenError::Rejected {
                    error: err.error,
                    description: err.error_description,
                },
                Err(_) => TokenError::Http(format!("token endpoint returned {}", status)),
            });
        }
        parse_token_response(&body, Utc::now())
    }

    /// Revokes a token at the provider. Failures are only logged.
    pub async fn revoke(&self, token: &str) {
        let result = self
            .http
            .post(REVOKE_URL)
            .form(&[("token", token)])
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Token revoked")
            }
            Ok(response) => tracing::warn!("Token revocation returned {}", response.status()),
            Err(e) => tracing::warn!("Token revocation failed: {}", e),
        }
    }
}

fn parse_token_response(body: &str, now: DateTime<Utc>) -> Result<StoredToken, TokenError> {
    serde_json::from_str::<TokenResponse>(body)
        .map(|response| response.into_token(now))
        .map_err(|e| TokenError::Parse(e.to_string()))
}

/// Hands out valid access tokens, refreshing them as needed.
#[derive(Debug)]
pub struct TokenManager {
    store: TokenStore,
    oauth: OAuthClient,
    cached: Mutex<Option<StoredToken>>,
}

impl TokenManager {
    pub fn new(store: TokenStore, oauth: OAuthClient) -> Self {
        Self {
            store,
            oauth,
            cached: Mutex::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String, TokenError> {
        let mut cached = self.cached.lock().await;
        if cached.is_none() {
            *cached = self.store.load()?;
        }
        let token = cached.as_ref().ok_or(TokenError::NotLoggedIn)?;
        if !token.needs_refresh(Utc::now()) {
            return Ok(token.access_token.clone());
        }

        let refresh_token = token.refresh_token.clone().ok_or(TokenError::NotLoggedIn)?;
        tracing::debug!("Refreshing access token");
        let mut fresh = match self.oauth.refresh(&refresh_token).await {
            Ok(fresh) => fresh,
            // invalid_grant: the refresh token was revoked or expired
            Err(TokenError::Rejected { error, .. }) if error == "invalid_grant" => {
                return Err(TokenError::NotLoggedIn)
            }
            Err(e) => return Err(e),
        };
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = Some(refresh_token);
        }
        self.store.save(&fresh)?;

        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn token(expires_at: DateTime<Utc>) -> StoredToken {
        StoredToken {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at,
        }
    }

    #[test]
    fn test_pkce_challenge_matches_rfc_example() {
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_random_tokens_differ() {
        let a = random_token();
        let b = random_token();
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
    }

    #[test]
    fn test_needs_refresh_within_margin() {
        let now = Utc::now();
        assert!(token(now + Duration::seconds(30)).needs_refresh(now));
        assert!(token(now - Duration::seconds(1)).needs_refresh(now));
        assert!(!token(now + Duration::seconds(300)).needs_refresh(now));
    }

    #[test]
    fn test_authorize_url() {
        let client = OAuthClient::new("my-client".to_string(), None);
        let pkce = Pkce::from_verifier("verifier".to_string());
        let url = client.authorize_url("http://127.0.0.1:5000/callback", &pkce, "xyz");

        assert!(url.starts_with(AUTH_URL));
        assert!(url.contains("client_id=my-client"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A5000%2Fcallback"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fdrive.appdata"));
        assert!(url.contains(&format!("code_challenge={}", pkce.challenge)));
        assert!(url.contains("state=xyz"));
    }

    #[test]
    fn test_parse_token_response() {
        let now = Utc::now();
        let token = parse_token_response(
            r#"{"access_token": "abc", "expires_in": 3599, "token_type": "Bearer"}"#,
            now,
        )
        .unwrap();
        assert_eq!(token.access_token, "abc");
        assert!(token.refresh_token.is_none());
        assert_eq!(token.expires_at, now + Duration::seconds(3599));

        assert!(parse_token_response("{}", now).is_err());
    }

    #[test]
    fn test_token_store_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let store = TokenStore::new(temp_dir.path());
        assert!(store.load().unwrap().is_none());

        let saved = token(Utc::now());
        store.save(&saved).unwrap();
        assert_eq!(store.load().unwrap(), Some(saved));

        assert!(store.remove().unwrap());
        assert!(!store.remove().unwrap());
    }

    #[tokio::test]
    async fn test_access_token_without_login() {
        let temp_dir = tempdir().unwrap();
        let manager = TokenManager::new(
            TokenStore::new(temp_dir.path()),
            OAuthClient::new("id".to_string(), None),
        );
        assert!(matches!(
            manager.access_token().await,
            Err(TokenError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn test_access_token_uses_valid_stored_token() {
        let temp_dir = tempdir().unwrap();
        let store = TokenStore::new(temp_dir.path());
        store.save(&token(Utc::now() + Duration::hours(1))).unwrap();

        let manager = TokenManager::new(store, OAuthClient::new("id".to_string(), None));
        assert_eq!(manager.access_token().await.unwrap(), "access");
    }
}
