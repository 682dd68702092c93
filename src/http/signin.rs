use super::AppState;
use crate::auth::oauth::{PendingLogin, ProviderInfo};
use crate::auth::{http_only_cookie, removal_cookie, resolve_redirect, SESSION_COOKIE};
use crate::error::AppError;
use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

const STATE_COOKIE: &str = "oauth_state";
const VERIFIER_COOKIE: &str = "oauth_verifier";
const CALLBACK_COOKIE: &str = "oauth_callback";
const LOGIN_FLOW_MINUTES: i64 = 10;

#[derive(Deserialize)]
pub struct SignInQuery {
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

pub async fn providers(State(state): State<Arc<AppState>>) -> Json<Vec<ProviderInfo>> {
    Json(state.oauth.list())
}

/// Starts a login: remembers state, PKCE verifier and callback url, then redirects.
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<SignInQuery>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let provider = state
        .oauth
        .get(&provider)
        .ok_or_else(|| AppError::NotFound("Unknown sign-in provider.".into()))?;
    let login = PendingLogin::generate();
    let url = state
        .oauth
        .authorize_url(provider, &login)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("bad authorize url: {e}")))?;

    let secure = state.config.production;
    let flow = Duration::minutes(LOGIN_FLOW_MINUTES);
    let mut jar = jar
        .add(http_only_cookie(STATE_COOKIE, login.state, secure, flow))
        .add(http_only_cookie(VERIFIER_COOKIE, login.verifier, secure, flow));
    if let Some(callback) = query.callback_url {
        let target = landing(Some(callback.as_str()), &state.config.public_base_url);
        jar = jar.add(http_only_cookie(
            CALLBACK_COOKIE,
            URL_SAFE_NO_PAD.encode(target),
            secure,
            flow,
        ));
    }
    Ok((jar, Redirect::to(url.as_str())))
}

/// Finishes a login: checks state, exchanges the code, stores the user and sets the session.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let base = state.config.public_base_url.as_str();
    let provider = state
        .oauth
        .get(&provider)
        .ok_or_else(|| AppError::NotFound("Unknown sign-in provider.".into()))?;

    if let Some(error) = query.error {
        warn!(provider = provider.id(), error, "provider refused sign-in");
        return Ok((clear_flow(jar), Redirect::to(&format!("{base}/login?error=AccessDenied"))));
    }

    let expected = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    let verifier = jar.get(VERIFIER_COOKIE).map(|c| c.value().to_string());
    let callback = jar.get(CALLBACK_COOKIE).and_then(|c| decode_callback(c.value()));
    let (Some(code), Some(verifier)) = (query.code, verifier) else {
        return Err(AppError::BadRequest("Invalid sign-in state.".into()));
    };
    if expected.is_none() || expected != query.state {
        return Err(AppError::BadRequest("Invalid sign-in state.".into()));
    }

    let profile = state.oauth.exchange(provider, &code, &verifier).await?;
    let Some((user, created)) = state.db.upsert_oauth_user(&profile).await? else {
        warn!(provider = provider.id(), "email already registered through another login");
        return Ok((
            clear_flow(jar),
            Redirect::to(&format!("{base}/login?error=OAuthAccountNotLinked")),
        ));
    };
    if created {
        info!(user_id = %user.id, provider = provider.id(), "new user signed up");
    }

    let (token, _) = state.sessions.issue(&user, provider.id())?;
    let jar = clear_flow(jar).add(http_only_cookie(
        SESSION_COOKIE,
        token,
        state.config.production,
        state.sessions.max_age(),
    ));
    Ok((jar, Redirect::to(&landing(callback.as_deref(), base))))
}

/// Current session, renewed when it is older than a day; `{}` when signed out.
pub async fn session(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<(CookieJar, Json<Value>), AppError> {
    let Some(mut claims) = jar
        .get(SESSION_COOKIE)
        .and_then(|c| state.sessions.verify(c.value()))
    else {
        return Ok((jar, Json(json!({}))));
    };

    let mut jar = jar;
    if state.sessions.needs_renewal(&claims) {
        let (token, renewed) = state.sessions.renew(&claims)?;
        claims = renewed;
        jar = jar.add(http_only_cookie(
            SESSION_COOKIE,
            token,
            state.config.production,
            state.sessions.max_age(),
        ));
    }

    let expires = DateTime::<Utc>::from_timestamp(claims.exp, 0).map(|t| t.to_rfc3339());
    Ok((
        jar,
        Json(json!({
            "user": {
                "id": claims.sub,
                "name": claims.name,
                "email": claims.email,
                "image": claims.picture,
                "provider": claims.provider,
            },
            "expires": expires,
        })),
    ))
}

pub async fn sign_out(jar: CookieJar) -> (CookieJar, Redirect) {
    (jar.remove(removal_cookie(SESSION_COOKIE)), Redirect::to("/login"))
}

fn clear_flow(jar: CookieJar) -> CookieJar {
    jar.remove(removal_cookie(STATE_COOKIE))
        .remove(removal_cookie(VERIFIER_COOKIE))
        .remove(removal_cookie(CALLBACK_COOKIE))
}

/// Same-site landing page for a callback url, re-serialised so it is a valid header value.
fn landing(callback: Option<&str>, base: &str) -> String {
    let target = resolve_redirect(callback, base);
    match Url::parse(&target) {
        Ok(url) if callback.is_some() => url.into(),
        _ => target,
    }
}

fn decode_callback(value: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(value).ok()?;
    String::from_utf8(bytes).ok()
}
