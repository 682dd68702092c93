//! OAuth2 authorization-code login against Google and GitHub, with S256 PKCE.
use crate::config::{Config, OAuthClient};
use crate::db::OAuthProfile;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

const USER_AGENT: &str = concat!("chat-switchboard/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error("profile request failed: {0}")]
    Profile(String),
    #[error("the identity provider did not return an email address")]
    MissingEmail,
    #[error("the identity provider has not verified the email address")]
    UnverifiedEmail,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    GitHub,
}

#[derive(Clone, Debug)]
pub struct OAuthProvider {
    pub kind: ProviderKind,
    pub client: OAuthClient,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    /// GitHub only: where to look when the profile hides the email.
    pub emails_url: Option<String>,
    pub scope: &'static str,
}

impl OAuthProvider {
    pub fn google(client: OAuthClient) -> Self {
        Self {
            kind: ProviderKind::Google,
            client,
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_url: "https://oauth2.googleapis.com/token".into(),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".into(),
            emails_url: None,
            scope: "openid email profile",
        }
    }

    pub fn github(client: OAuthClient) -> Self {
        Self {
            kind: ProviderKind::GitHub,
            client,
            authorize_url: "https://github.com/login/oauth/authorize".into(),
            token_url: "https://github.com/login/oauth/access_token".into(),
            userinfo_url: "https://api.github.com/user".into(),
            emails_url: Some("https://api.github.com/user/emails".into()),
            scope: "read:user user:email",
        }
    }

    pub fn id(&self) -> &'static str {
        match self.kind {
            ProviderKind::Google => "google",
            ProviderKind::GitHub => "github",
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            ProviderKind::Google => "Google",
            ProviderKind::GitHub => "GitHub",
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
pub struct ProviderInfo {
    pub id: &'static str,
    pub name: &'static str,
}

/// Per-login secrets kept in short-lived cookies between redirect and callback.
#[derive(Clone, Debug)]
pub struct PendingLogin {
    pub state: String,
    pub verifier: String,
}

impl PendingLogin {
    pub fn generate() -> Self {
        Self {
            state: Uuid::new_v4().simple().to_string(),
            verifier: format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()),
        }
    }
}

pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[derive(Clone)]
pub struct OAuthRegistry {
    providers: Vec<OAuthProvider>,
    http: reqwest::Client,
    base_url: String,
}

impl OAuthRegistry {
    pub fn new(providers: Vec<OAuthProvider>, base_url: &str) -> Result<Self, OAuthError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            providers,
            http,
            base_url: base_url.to_string(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, OAuthError> {
        let mut providers = Vec::new();
        if let Some(c) = &cfg.google {
            providers.push(OAuthProvider::google(c.clone()));
        }
        if let Some(c) = &cfg.github {
            providers.push(OAuthProvider::github(c.clone()));
        }
        Self::new(providers, &cfg.public_base_url)
    }

    pub fn get(&self, id: &str) -> Option<&OAuthProvider> {
        self.providers.iter().find(|p| p.id() == id)
    }

    pub fn list(&self) -> Vec<ProviderInfo> {
        self.providers
            .iter()
            .map(|p| ProviderInfo {
                id: p.id(),
                name: p.name(),
            })
            .collect()
    }

    fn redirect_uri(&self, provider: &OAuthProvider) -> String {
        format!("{}/api/auth/callback/{}", self.base_url, provider.id())
    }

    pub fn authorize_url(&self, provider: &OAuthProvider, login: &PendingLogin) -> Result<Url, url::ParseError> {
        let challenge = pkce_challenge(&login.verifier);
        Url::parse_with_params(
            &provider.authorize_url,
            &[
                ("client_id", provider.client.client_id.as_str()),
                ("redirect_uri", self.redirect_uri(provider).as_str()),
                ("response_type", "code"),
                ("scope", provider.scope),
                ("state", login.state.as_str()),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
            ],
        )
    }

    /// Trades the callback code for an access token and reads the user's profile.
    pub async fn exchange(&self, provider: &OAuthProvider, code: &str, verifier: &str) -> Result<OAuthProfile, OAuthError> {
        let redirect_uri = self.redirect_uri(provider);
        let resp = self
            .http
            .post(&provider.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", provider.client.client_id.as_str()),
                ("client_secret", provider.client.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
                ("code_verifier", verifier),
            ])
            .send()
            .await?;
        let status = resp.status();
        let token: TokenResp = resp.json().await?;
        let access_token = match token {
            TokenResp {
                access_token: Some(t),
                ..
            } if status.is_success() => t,
            TokenResp {
                error,
                error_description,
                ..
            } => {
                let reason = error_description
                    .or(error)
                    .unwrap_or_else(|| status.to_string());
                return Err(OAuthError::Exchange(reason));
            }
        };

        match provider.kind {
            ProviderKind::Google => self.google_profile(provider, &access_token).await,
            ProviderKind::GitHub => self.github_profile(provider, &access_token).await,
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str, access_token: &str) -> Result<T, OAuthError> {
        let resp = self.http.get(url).bearer_auth(access_token).send().await?;
        if !resp.status().is_success() {
            return Err(OAuthError::Profile(format!("{url} returned {}", resp.status())));
        }
        Ok(resp.json().await?)
    }

    async fn google_profile(&self, provider: &OAuthProvider, access_token: &str) -> Result<OAuthProfile, OAuthError> {
        let info: GoogleUser = self.get_json(&provider.userinfo_url, access_token).await?;
        let email = info.email.ok_or(OAuthError::MissingEmail)?;
        if !info.email_verified {
            return Err(OAuthError::UnverifiedEmail);
        }
        Ok(OAuthProfile {
            provider: provider.id().to_string(),
            provider_account_id: info.sub,
            email,
            name: info.name,
            image: info.picture,
        })
    }

    async fn github_profile(&self, provider: &OAuthProvider, access_token: &str) -> Result<OAuthProfile, OAuthError> {
        let user: GitHubUser = self.get_json(&provider.userinfo_url, access_token).await?;
        let email = match (user.email, &provider.emails_url) {
            (Some(email), _) => email,
            (None, Some(url)) => {
                let emails: Vec<GitHubEmail> = self.get_json(url, access_token).await?;
                emails
                    .into_iter()
                    .find(|e| e.primary && e.verified)
                    .map(|e| e.email)
                    .ok_or(OAuthError::MissingEmail)?
            }
            (None, None) => return Err(OAuthError::MissingEmail),
        };
        Ok(OAuthProfile {
            provider: provider.id().to_string(),
            provider_account_id: user.id.to_string(),
            email,
            name: user.name.or(Some(user.login)),
            image: user.avatar_url,
        })
    }
}

#[derive(Deserialize)]
struct TokenResp {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct GoogleUser {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}
