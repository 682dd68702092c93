use super::{upstream_error, LlmError};
use crate::types::{HistoryMessage, Part, Role};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct GenerateReq<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: &'a [Part],
}

#[derive(Deserialize)]
struct GenerateResp {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Gemini keeps its own `user`/`model` roles, so the history goes over as-is
/// followed by the question. No system prompt is sent.
pub async fn generate(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    model: &str,
    history: &[HistoryMessage],
    question: &str,
) -> Result<String, LlmError> {
    let question = [Part {
        text: question.to_string(),
    }];
    let mut contents: Vec<Content<'_>> = history
        .iter()
        .map(|m| Content {
            role: match m.role {
                Role::User => "user",
                Role::Model => "model",
            },
            parts: &m.parts,
        })
        .collect();
    contents.push(Content {
        role: "user",
        parts: &question,
    });

    let resp = http
        .post(format!("{base_url}/v1beta/models/{model}:generateContent"))
        .header("x-goog-api-key", api_key)
        .json(&GenerateReq { contents })
        .send()
        .await?;
    if !resp.status().is_success() {
        return Err(upstream_error(resp).await);
    }
    let body: GenerateResp = resp.json().await?;

    Ok(body
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default())
}
