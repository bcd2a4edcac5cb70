//! Authentication commands for the Google Drive backend.
//!
//! Provides login, logout, and status commands. Login runs the OAuth
//! authorization code flow with PKCE against a loopback redirect.

use axum::{extract::Query, response::Html, routing::get, Router};
use chrono::Utc;
use clap::{Args, Subcommand};
use serde::Deserialize;
use std::io;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::config::{Config, SyncBackend};
use crate::sync::token::random_token;
use crate::sync::{oauth_client, BackendError, OAuthClient, Pkce, TokenError, TokenStore};

/// How long to wait for the browser to come back.
const LOGIN_TIMEOUT_SECS: u64 = 300;

/// Authentication commands
#[derive(Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Subcommand)]
enum AuthSubcommand {
    /// Sign in to Google Drive
    Login,
    /// Sign out and forget the stored tokens
    Logout,
    /// Show authentication status
    Status,
}

impl AuthCommand {
    pub fn run(&self, config: &Config) -> Result<(), AuthError> {
        // Use tokio runtime for async operations
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| AuthError::ConfigError(format!("Failed to create runtime: {}", e)))?;

        match &self.command {
            AuthSubcommand::Login => rt.block_on(login(config)),
            AuthSubcommand::Logout => rt.block_on(logout(config)),
            AuthSubcommand::Status => status(config),
        }
    }
}

/// Errors that can occur during authentication
#[derive(Debug)]
pub enum AuthError {
    /// I/O error
    IoError(io::Error),
    /// Token exchange or storage failed
    TokenError(TokenError),
    /// Config error
    ConfigError(String),
    /// The redirect did not carry the expected state
    StateMismatch,
    /// Timeout waiting for callback
    Timeout,
    /// Drive backend not configured
    NotConfigured(BackendError),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::IoError(e) => write!(f, "I/O error: {}", e),
            AuthError::TokenError(e) => write!(f, "{}", e),
            AuthError::ConfigError(e) => write!(f, "Config error: {}", e),
            AuthError::StateMismatch => {
                write!(f, "Sign-in response did not match this request. Try again.")
            }
            AuthError::Timeout => write!(f, "Timed out waiting for authentication"),
            AuthError::NotConfigured(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<io::Error> for AuthError {
    fn from(e: io::Error) -> Self {
        AuthError::IoError(e)
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        AuthError::TokenError(e)
    }
}

impl From<BackendError> for AuthError {
    fn from(e: BackendError) -> Self {
        AuthError::NotConfigured(e)
    }
}

fn drive_client(config: &Config) -> Result<OAuthClient, AuthError> {
    if config.sync.effective_backend() != Some(SyncBackend::Drive) {
        println!("Note: sync.backend is not 'drive'; the tokens are only used by the drive backend.");
    }
    Ok(oauth_client(&config.sync)?)
}

/// Callback parameters from the OAuth redirect
#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Interactive login flow
async fn login(config: &Config) -> Result<(), AuthError> {
    let client = drive_client(config)?;
    let pkce = Pkce::generate();
    let state = random_token();

    // Create channel to receive the result
    let (tx, rx) = oneshot::channel::<CallbackParams>();
    let tx = Arc::new(std::sync::Mutex::new(Some(tx)));

    // Start local callback server using tokio's async TcpListener
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let local_port = listener.local_addr()?.port();
    let redirect_uri = format!("http://127.0.0.1:{}/callback", local_port);

    let tx_clone = tx.clone();
    let server_handle = tokio::spawn(async move {
        let app = Router::new().route(
            "/callback",
            get(move |Query(params): Query<CallbackParams>| {
                let tx = tx_clone.clone();
                async move {
                    let denied = params.error.is_some();
                    if let Some(tx) = tx.lock().ok().and_then(|mut slot| slot.take()) {
                        let _ = tx.send(params);
                    }

                    Html(if denied {
                        CALLBACK_DENIED_PAGE
                    } else {
                        CALLBACK_SUCCESS_PAGE
                    })
                }
            }),
        );

        if let Err(e) = axum::serve(listener, app).await {
            tracing::warn!("Callback server stopped: {}", e);
        }
    });

    println!("Open this URL in your browser to sign in:");
    println!();
    println!("  {}", client.authorize_url(&redirect_uri, &pkce, &state));
    println!();
    println!(
        "Waiting for authorization (timeout: {} minutes)",
        LOGIN_TIMEOUT_SECS / 60
    );

    // Wait for callback with timeout
    let result =
        tokio::time::timeout(std::time::Duration::from_secs(LOGIN_TIMEOUT_SECS), rx).await;

    // Shutdown server
    server_handle.abort();

    let params = match result {
        Ok(Ok(params)) => params,
        Ok(Err(_)) | Err(_) => return Err(AuthError::Timeout),
    };
    if let Some(error) = params.error {
        tracing::debug!("Authorization denied: {}", error);
        return Err(TokenError::Cancelled.into());
    }
    if params.state.as_deref() != Some(state.as_str()) {
        return Err(AuthError::StateMismatch);
    }
    let code = params.code.ok_or(AuthError::StateMismatch)?;

    let token = client.exchange_code(&code, &pkce, &redirect_uri).await?;
    TokenStore::new(&config.data_dir.value).save(&token)?;
    println!("✓ Signed in to Google Drive");
    Ok(())
}

/// Revoke and remove the stored tokens
async fn logout(config: &Config) -> Result<(), AuthError> {
    let store = TokenStore::new(&config.data_dir.value);
    let Some(token) = store.load()? else {
        println!("Already logged out.");
        return Ok(());
    };

    if let Ok(client) = oauth_client(&config.sync) {
        let revoke = token.refresh_token.as_deref().unwrap_or(&token.access_token);
        client.revoke(revoke).await;
    }
    store.remove()?;
    println!("Logged out. Drive sync disabled until you log in again.");
    Ok(())
}

/// Show authentication status
fn status(config: &Config) -> Result<(), AuthError> {
    let store = TokenStore::new(&config.data_dir.value);
    match store.load()? {
        Some(token) => {
            let now = Utc::now();
            if token.expires_at > now {
                let minutes = (token.expires_at - now).num_minutes();
                println!("Signed in (access token valid for {} more minutes)", minutes);
            } else if token.refresh_token.is_some() {
                println!("Signed in (access token will be refreshed on next use)");
            } else {
                println!("Session expired. Run 'barra auth login' to sign in again.");
            }
            println!("Tokens: {}", store.path().display());
        }
        None if config.sync.client_id.is_some() => {
            println!("Not logged in. Run 'barra auth login' to authenticate.");
        }
        None => {
            println!("Not configured. Set sync.client_id in config first.");
        }
    }
    Ok(())
}

const CALLBACK_SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Barra Libre - Success</title></head>
<body>
<h1>Authentication successful!</h1>
<p>You can close this window and return to the terminal.</p>
</body>
</html>"#;

const CALLBACK_DENIED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Barra Libre - Cancelled</title></head>
<body>
<h1>Authentication cancelled</h1>
<p>You can close this window and return to the terminal.</p>
</body>
</html>"#;
