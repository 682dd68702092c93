//! Signed session tokens, session cookies and the request extractors built on them.
use crate::db::User;
use crate::error::AppError;
use crate::http::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

pub mod oauth;

pub const SESSION_COOKIE: &str = "session_token";
pub const ANON_COOKIE: &str = "sessionId";

const SESSION_MAX_AGE_DAYS: i64 = 30;
const SESSION_UPDATE_AGE_HOURS: i64 = 24;
pub const ANON_MAX_AGE_DAYS: i64 = 7;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub name: Option<String>,
    pub email: String,
    pub picture: Option<String>,
    pub provider: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    max_age: Duration,
    update_age: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            max_age: Duration::days(SESSION_MAX_AGE_DAYS),
            update_age: Duration::hours(SESSION_UPDATE_AGE_HOURS),
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn issue(&self, user: &User, provider: &str) -> Result<(String, Claims), AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            picture: user.image.clone(),
            provider: provider.to_string(),
            iat: now.timestamp(),
            exp: (now + self.max_age).timestamp(),
        };
        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    /// Same identity with a fresh issue time and expiry.
    pub fn renew(&self, claims: &Claims) -> Result<(String, Claims), AppError> {
        let now = Utc::now();
        let claims = Claims {
            iat: now.timestamp(),
            exp: (now + self.max_age).timestamp(),
            ..claims.clone()
        };
        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to sign session: {e}")))
    }

    /// `None` for tampered, malformed or expired tokens.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(err) => {
                debug!(%err, "rejecting session token");
                None
            }
        }
    }

    pub fn needs_renewal(&self, claims: &Claims) -> bool {
        Utc::now().timestamp() - claims.iat > self.update_age.num_seconds()
    }
}

pub fn http_only_cookie(name: &'static str, value: String, secure: bool, max_age: Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(max_age.num_seconds()))
        .build()
}

/// A cookie that tells the browser to drop `name`.
pub fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}

/// Where to send the browser after sign-in: same-origin absolute urls as-is,
/// relative paths joined to the base, anything else to the base.
pub fn resolve_redirect(url: Option<&str>, base_url: &str) -> String {
    let same_site = |u: &str| {
        u.strip_prefix(base_url)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
    };
    match url {
        Some(u) if same_site(u) => u.to_string(),
        Some(u) if u.starts_with('/') && !u.starts_with("//") => format!("{base_url}{u}"),
        _ => base_url.to_string(),
    }
}

/// The signed-in user if the request carries a valid session cookie.
pub struct MaybeUser(pub Option<Claims>);

impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let claims = jar
            .get(SESSION_COOKIE)
            .and_then(|c| state.sessions.verify(c.value()));
        Ok(MaybeUser(claims))
    }
}

/// Like [`MaybeUser`] but rejects anonymous requests with 401.
pub struct RequireUser(pub Claims);

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let MaybeUser(claims) = MaybeUser::from_request_parts(parts, state)
            .await
            .unwrap_or(MaybeUser(None));
        claims.map(RequireUser).ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "u1".into(),
            name: Some("Ana".into()),
            email: "ana@example.com".into(),
            email_verified: None,
            image: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_verifies() {
        let keys = SessionKeys::new("0123456789abcdef0123456789abcdef");
        let (token, claims) = keys.issue(&user(), "github").unwrap();
        assert_eq!(keys.verify(&token), Some(claims.clone()));
        assert_eq!(claims.exp - claims.iat, 30 * 24 * 3600);
        assert!(!keys.needs_renewal(&claims));
    }

    #[test]
    fn foreign_secret_and_garbage_are_rejected() {
        let keys = SessionKeys::new("0123456789abcdef0123456789abcdef");
        let other = SessionKeys::new("fedcba9876543210fedcba9876543210");
        let (token, _) = other.issue(&user(), "google").unwrap();
        assert_eq!(keys.verify(&token), None);
        assert_eq!(keys.verify("not-a-jwt"), None);
    }

    #[test]
    fn expired_token_is_rejected_and_old_token_renews() {
        let keys = SessionKeys::new("0123456789abcdef0123456789abcdef");
        let (_, mut claims) = keys.issue(&user(), "github").unwrap();
        claims.iat -= 2 * 24 * 3600;
        assert!(keys.needs_renewal(&claims));

        let (_, renewed) = keys.renew(&claims).unwrap();
        assert!(renewed.iat > claims.iat);
        assert_eq!(renewed.sub, "u1");

        claims.exp = Utc::now().timestamp() - 10;
        let stale = keys.sign(&claims).unwrap();
        assert_eq!(keys.verify(&stale), None);
    }

    #[test]
    fn redirects_stay_on_site() {
        let base = "http://localhost:3000";
        assert_eq!(resolve_redirect(None, base), base);
        assert_eq!(resolve_redirect(Some("/chat?x=1"), base), "http://localhost:3000/chat?x=1");
        assert_eq!(
            resolve_redirect(Some("http://localhost:3000/about"), base),
            "http://localhost:3000/about"
        );
        assert_eq!(resolve_redirect(Some("https://evil.example"), base), base);
        assert_eq!(resolve_redirect(Some("//evil.example"), base), base);
        assert_eq!(resolve_redirect(Some("http://localhost:3000.evil.example"), base), base);
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = http_only_cookie(SESSION_COOKIE, "t".into(), true, Duration::days(30));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(30)));
    }
}
