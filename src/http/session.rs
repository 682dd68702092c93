use super::AppState;
use crate::auth::{http_only_cookie, ANON_COOKIE, ANON_MAX_AGE_DAYS};
use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use chrono::Duration;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Anonymous visitor id: reuses the `sessionId` cookie or mints a new one.
pub async fn anonymous_session(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    if let Some(existing) = jar.get(ANON_COOKIE).map(|c| c.value().to_string()) {
        return (jar, Json(json!({ "session_id": existing })));
    }

    let session_id = Uuid::new_v4().to_string();
    let jar = jar.add(http_only_cookie(
        ANON_COOKIE,
        session_id.clone(),
        state.config.production,
        Duration::days(ANON_MAX_AGE_DAYS),
    ));
    (jar, Json(json!({ "session_id": session_id })))
}
