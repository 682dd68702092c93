use super::AppState;
use crate::cache_utils::{client_ip, recent};
use crate::error::AppError;
use crate::llm::Turn;
use crate::models::{ModelChoice, DEFAULT_MODEL};
use crate::persona::system_prompt;
use crate::types::{ChatReq, ChatResp, HistoryMessage};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use std::sync::Arc;
use tracing::info;

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ChatReq>, JsonRejection>,
) -> Result<Json<ChatResp>, AppError> {
    let t0 = std::time::Instant::now();

    if !origin_allowed(&headers, &state.config.allowed_origins) {
        return Err(AppError::Forbidden("Not authorized.".into()));
    }

    let ip = client_ip(&headers);
    if !state.limiter.check(&ip).await? {
        return Err(AppError::RateLimited);
    }

    let Json(body) = body.map_err(|_| AppError::BadRequest("Invalid request body.".into()))?;
    let (Some(question), Some(chat_id)) = (non_blank(body.question), non_blank(body.conversation_id)) else {
        return Err(AppError::BadRequest("Invalid question or conversation id.".into()));
    };
    let requested = body
        .model
        .as_deref()
        .map(str::parse::<ModelChoice>)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?
        .map(ModelChoice::resolve);

    // A conversation keeps the model it started with
    let (model, history) = match state.history.load(&chat_id).await? {
        Some(record) => (
            record.model.or(requested).unwrap_or(DEFAULT_MODEL),
            record.history,
        ),
        None => (requested.unwrap_or(DEFAULT_MODEL), Vec::new()),
    };

    let mut window = recent(&history, state.config.history_window);
    let system = system_prompt(&question);
    let answer = state
        .llm
        .complete(
            model,
            Turn {
                system: &system,
                history: &window,
                question: &question,
            },
        )
        .await
        .map_err(|source| AppError::ModelUnavailable {
            model: model.display_name(),
            source,
        })?;

    let reply = answer.trim().to_string();
    window.push(HistoryMessage::user(question));
    window.push(HistoryMessage::model(answer));
    state.history.store(&chat_id, model, window).await?;

    info!(
        chat_id,
        %model,
        latency_ms = t0.elapsed().as_millis() as u64,
        "chat answered"
    );
    Ok(Json(ChatResp {
        answer: reply,
        source: model.display_name(),
    }))
}

/// `Origin`, or failing that `Referer`, must start with an allowed origin.
fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    [header::ORIGIN, header::REFERER].iter().any(|name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|value| {
                allowed.iter().any(|origin| {
                    value
                        .strip_prefix(origin.as_str())
                        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
                })
            })
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn allowed() -> Vec<String> {
        vec!["https://ai.example.com".into(), "http://localhost:3000".into()]
    }

    #[test]
    fn origin_or_referer_passes() {
        let mut headers = HeaderMap::new();
        assert!(!origin_allowed(&headers, &allowed()));

        headers.insert(header::REFERER, HeaderValue::from_static("http://localhost:3000/chat"));
        assert!(origin_allowed(&headers, &allowed()));

        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://ai.example.com"));
        assert!(origin_allowed(&headers, &allowed()));
    }

    #[test]
    fn lookalike_origins_are_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ORIGIN,
            HeaderValue::from_static("https://ai.example.com.evil.net"),
        );
        headers.insert(
            header::REFERER,
            HeaderValue::from_static("https://evil.net/?https://ai.example.com"),
        );
        assert!(!origin_allowed(&headers, &allowed()));
    }

    #[test]
    fn blank_fields_count_as_missing() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(Some(" oi ".into())).as_deref(), Some("oi"));
        assert_eq!(non_blank(None), None);
    }
}
