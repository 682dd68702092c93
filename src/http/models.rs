use super::AppState;
use crate::models::{catalog, ModelId};
use crate::types::{ModelQuery, ProbeResp, ProbeStatus};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;

/// Lists the models, or probes one when `?modelId=` is given.
pub async fn models(State(state): State<Arc<AppState>>, Query(query): Query<ModelQuery>) -> Response {
    let Some(model_id) = query.model_id else {
        return Json(json!({ "models": catalog() })).into_response();
    };

    let (status, response_time_ms) = match model_id.parse::<ModelId>() {
        Ok(model) => state.llm.probe(model).await,
        Err(_) => (ProbeStatus::Offline, 0),
    };
    Json(ProbeResp {
        model_id,
        status,
        response_time_ms,
    })
    .into_response()
}
