//! OpenAI-compatible chat completions, used for OpenRouter and Perplexity.
use super::{upstream_error, Attribution, LlmError, Turn};
use crate::types::Role;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug)]
pub struct Params<'a> {
    pub model: &'a str,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Serialize, Debug, PartialEq)]
pub(crate) struct Msg {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<Msg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResp {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: Option<String>,
}

/// System prompt, then the history (`model` turns become `assistant`), then the question.
pub(crate) fn build_messages(turn: Turn<'_>) -> Vec<Msg> {
    let mut messages = Vec::with_capacity(turn.history.len() + 2);
    messages.push(Msg {
        role: "system",
        content: turn.system.to_string(),
    });
    messages.extend(turn.history.iter().map(|m| Msg {
        role: match m.role {
            Role::User => "user",
            Role::Model => "assistant",
        },
        content: m.text(),
    }));
    messages.push(Msg {
        role: "user",
        content: turn.question.to_string(),
    });
    messages
}

pub async fn chat(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    params: Params<'_>,
    turn: Turn<'_>,
    attribution: Option<&Attribution>,
) -> Result<String, LlmError> {
    let req = ChatReq {
        model: params.model,
        messages: build_messages(turn),
        max_tokens: params.max_tokens,
        temperature: params.temperature,
    };

    let mut builder = http
        .post(format!("{base_url}/chat/completions"))
        .bearer_auth(api_key)
        .json(&req);
    if let Some(a) = attribution {
        builder = builder
            .header("HTTP-Referer", &a.referer)
            .header("X-Title", &a.title);
    }

    let resp = builder.send().await?;
    if !resp.status().is_success() {
        return Err(upstream_error(resp).await);
    }
    let body: ChatResp = resp.json().await?;

    Ok(body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}

pub async fn list_models(http: &reqwest::Client, base_url: &str, api_key: &str) -> Result<(), LlmError> {
    let resp = http
        .get(format!("{base_url}/models"))
        .bearer_auth(api_key)
        .send()
        .await?;
    if !resp.status().is_success() {
        return Err(upstream_error(resp).await);
    }
    Ok(())
}
