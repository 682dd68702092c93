use super::AppState;
use crate::auth::{removal_cookie, RequireUser, SESSION_COOKIE};
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Removes the account with its linked logins and saved conversations, and signs out.
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    RequireUser(claims): RequireUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), AppError> {
    if !state.db.delete_user(&claims.sub).await? {
        return Err(AppError::NotFound("User not found.".into()));
    }
    info!(user_id = %claims.sub, "account deleted");
    Ok((jar.remove(removal_cookie(SESSION_COOKIE)), Json(json!({ "success": true }))))
}
