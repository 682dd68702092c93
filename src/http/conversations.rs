use super::AppState;
use crate::auth::{MaybeUser, RequireUser};
use crate::db::{Conversation, ConversationMessage};
use crate::error::AppError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

#[derive(Deserialize)]
pub struct SaveConversation {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub model: String,
}

/// Signed-in users get their conversations newest first; anonymous visitors an empty list.
pub async fn list(
    State(state): State<Arc<AppState>>,
    MaybeUser(claims): MaybeUser,
) -> Result<Json<Vec<Conversation>>, AppError> {
    let Some(claims) = claims else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(state.db.list_conversations(&claims.sub).await?))
}

pub async fn save(
    State(state): State<Arc<AppState>>,
    RequireUser(claims): RequireUser,
    body: Result<Json<SaveConversation>, JsonRejection>,
) -> Result<Json<Conversation>, AppError> {
    let Json(body) = body.map_err(|_| AppError::BadRequest("Invalid request body.".into()))?;
    let id = body.id.trim();
    if id.is_empty() {
        return Err(AppError::BadRequest("Invalid conversation id.".into()));
    }
    // the token can outlive the account
    if state.db.find_user(&claims.sub).await?.is_none() {
        return Err(AppError::Unauthorized);
    }

    let saved = state
        .db
        .upsert_conversation(&claims.sub, id, body.messages, &body.model, Utc::now())
        .await?
        .ok_or_else(|| AppError::Forbidden("Conversation belongs to another user.".into()))?;
    Ok(Json(saved))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    RequireUser(claims): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let deleted = state
        .db
        .delete_conversation(&claims.sub, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("Conversation not found.".into()))?;
    info!(conversation_id = %id, user_id = %claims.sub, "conversation deleted");
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}
