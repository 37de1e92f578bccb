//! GoTrue (Supabase Auth) client.

use crate::{AuthError, AuthResult, OAuthCallbackServer, PkcePair, User};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Opens a URL in the user's browser.
pub type UrlOpener = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
        }
    }
}

/// Tokens issued by a sign-in or refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds
    pub expires_in: i64,
    pub user: User,
}

/// The remote half of session management.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Resolve the user an access token belongs to.
    async fn get_user(&self, access_token: &str) -> AuthResult<User>;

    /// Run the full browser sign-in and return the issued tokens.
    async fn sign_in_with_oauth(&self, provider: OAuthProvider) -> AuthResult<TokenGrant>;

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenGrant>;

    /// Revoke the session server-side.
    async fn sign_out(&self, access_token: &str) -> AuthResult<()>;
}

#[derive(Debug, Serialize)]
struct PkceExchangeRequest<'a> {
    auth_code: &'a str,
    code_verifier: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// GoTrue error bodies come in two shapes depending on the endpoint.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorBody {
    fn into_message(self, fallback: String) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or(fallback)
    }
}

#[derive(Clone)]
pub struct GoTrueClient {
    http_client: reqwest::Client,
    base_url: String,
    anon_key: String,
    callback_port: u16,
    oauth_timeout: Duration,
    opener: UrlOpener,
}

impl GoTrueClient {
    pub fn new(
        supabase_url: &str,
        anon_key: &str,
        callback_port: u16,
        oauth_timeout: Duration,
        opener: UrlOpener,
    ) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: supabase_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            callback_port,
            oauth_timeout,
            opener,
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// `GET /auth/v1/authorize` URL for the PKCE flow.
    pub fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        pkce: &PkcePair,
    ) -> AuthResult<Url> {
        let mut url = Url::parse(&self.auth_url("authorize"))?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", pkce.method());
        Ok(url)
    }

    /// `POST /auth/v1/token?grant_type=pkce`
    pub async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> AuthResult<TokenGrant> {
        let url = self.auth_url("token?grant_type=pkce");
        debug!("Exchanging authorization code");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&PkceExchangeRequest {
                auth_code,
                code_verifier,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let err = api_error(response).await;
            warn!(error = %err, "Code exchange failed");
            return Err(match err {
                AuthError::Api { status, message } if status < 500 => AuthError::OAuth(message),
                other => other,
            });
        }

        Ok(response.json().await?)
    }
}

async fn api_error(response: reqwest::Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
    AuthError::Api {
        status: status.as_u16(),
        message: parsed.into_message(status.to_string()),
    }
}

#[async_trait]
impl AuthBackend for GoTrueClient {
    async fn get_user(&self, access_token: &str) -> AuthResult<User> {
        let response = self
            .http_client
            .get(self.auth_url("user"))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let message = match api_error(response).await {
                AuthError::Api { message, .. } => message,
                other => other.to_string(),
            };
            return Err(AuthError::SessionInvalid(message));
        }
        if !status.is_success() {
            return Err(api_error(response).await);
        }

        let user: User = response.json().await?;
        debug!(user_id = %user.id, "Session verified with server");
        Ok(user)
    }

    async fn sign_in_with_oauth(&self, provider: OAuthProvider) -> AuthResult<TokenGrant> {
        let pkce = PkcePair::generate();
        let server = OAuthCallbackServer::bind(self.callback_port, self.oauth_timeout).await?;
        let authorize = self.authorize_url(provider, &server.callback_url(), &pkce)?;

        info!(provider = provider.as_str(), url = %authorize, "Opening browser for sign-in");
        if let Err(e) = (self.opener)(authorize.as_str()) {
            warn!(error = %e, "Could not open browser; visit the URL manually");
        }

        let code = server.wait_for_code().await?;
        let grant = self.exchange_code(&code, &pkce.verifier).await?;
        info!(user_id = %grant.user.id, "Signed in");
        Ok(grant)
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenGrant> {
        let response = self
            .http_client
            .post(self.auth_url("token?grant_type=refresh_token"))
            .header("apikey", &self.anon_key)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(match api_error(response).await {
                AuthError::Api { status, message } if status < 500 && status != 429 => {
                    AuthError::TokenRefresh(message)
                }
                other => other,
            });
        }

        Ok(response.json().await?)
    }

    async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        let response = self
            .http_client
            .post(self.auth_url("logout"))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        // 401 means the session is already gone, which is what we wanted.
        if response.status().is_success() || response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        Err(api_error(response).await)
    }
}
