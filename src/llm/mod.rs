//! Routes a chat turn to one of the fixed upstream providers and normalizes the answer.
use crate::config::{Config, Endpoints, ProviderKeys};
use crate::models::{ModelId, Upstream};
use crate::types::{HistoryMessage, ProbeStatus};
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

pub mod gemini;
pub mod openai_compat;

pub const NO_RESPONSE: &str = "No response.";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no API key configured for {0}")]
    MissingKey(ModelId),
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One exchange: the system prompt, the recent history and the new question.
#[derive(Clone, Copy, Debug)]
pub struct Turn<'a> {
    pub system: &'a str,
    pub history: &'a [HistoryMessage],
    pub question: &'a str,
}

/// Extra headers OpenRouter uses to attribute traffic to an app.
#[derive(Clone, Debug)]
pub struct Attribution {
    pub referer: String,
    pub title: String,
}

#[derive(Clone)]
pub struct LlmRouter {
    http: reqwest::Client,
    keys: ProviderKeys,
    endpoints: Endpoints,
    attribution: Attribution,
    slow_after: Duration,
}

impl LlmRouter {
    pub fn new(cfg: &Config) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.upstream_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            keys: cfg.keys.clone(),
            endpoints: cfg.endpoints.clone(),
            attribution: Attribution {
                referer: cfg.public_base_url.clone(),
                title: cfg.app_title.clone(),
            },
            slow_after: Duration::from_millis(cfg.slow_probe_ms),
        })
    }

    fn key(&self, model: ModelId) -> Result<&str, LlmError> {
        let key = match model {
            ModelId::DeepSeek => &self.keys.deepseek,
            ModelId::DeepCode => &self.keys.deepcode,
            ModelId::Phi4 => &self.keys.phi4,
            ModelId::Perplexity => &self.keys.perplexity,
            ModelId::Gemini => &self.keys.gemini,
        };
        key.as_deref().ok_or(LlmError::MissingKey(model))
    }

    pub async fn complete(&self, model: ModelId, turn: Turn<'_>) -> Result<String, LlmError> {
        let key = self.key(model)?;
        let t0 = Instant::now();
        let text = match model.upstream() {
            Upstream::OpenRouter => {
                let params = openai_compat::Params {
                    model: model.upstream_model(),
                    max_tokens: None,
                    temperature: None,
                };
                openai_compat::chat(
                    &self.http,
                    &self.endpoints.openrouter,
                    key,
                    params,
                    turn,
                    Some(&self.attribution),
                )
                .await?
            }
            Upstream::Perplexity => {
                let params = openai_compat::Params {
                    model: model.upstream_model(),
                    max_tokens: Some(300),
                    temperature: Some(0.5),
                };
                openai_compat::chat(&self.http, &self.endpoints.perplexity, key, params, turn, None)
                    .await?
            }
            Upstream::Gemini => {
                gemini::generate(
                    &self.http,
                    &self.endpoints.gemini,
                    key,
                    model.upstream_model(),
                    turn.history,
                    turn.question,
                )
                .await?
            }
        };
        debug!(%model, latency_ms = t0.elapsed().as_millis() as u64, "upstream answered");

        if text.trim().is_empty() {
            return Ok(NO_RESPONSE.to_string());
        }
        Ok(text)
    }

    /// Connection test; failures report `Offline` with a zero response time.
    pub async fn probe(&self, model: ModelId) -> (ProbeStatus, u64) {
        let t0 = Instant::now();
        let result = match self.key(model) {
            Ok(key) => match model.upstream() {
                Upstream::OpenRouter => {
                    openai_compat::list_models(&self.http, &self.endpoints.openrouter, key).await
                }
                Upstream::Perplexity => {
                    openai_compat::list_models(&self.http, &self.endpoints.perplexity, key).await
                }
                Upstream::Gemini => gemini::generate(
                    &self.http,
                    &self.endpoints.gemini,
                    key,
                    model.upstream_model(),
                    &[],
                    "Ping",
                )
                .await
                .map(|_| ()),
            },
            Err(err) => Err(err),
        };

        let elapsed = t0.elapsed();
        match result {
            Ok(()) if elapsed > self.slow_after => (ProbeStatus::Slow, elapsed.as_millis() as u64),
            Ok(()) => (ProbeStatus::Online, elapsed.as_millis() as u64),
            Err(err) => {
                warn!(%model, %err, "probe failed");
                (ProbeStatus::Offline, 0)
            }
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Turns a non-2xx response into `LlmError::Upstream`, preferring `error.message`.
pub(crate) async fn upstream_error(resp: reqwest::Response) -> LlmError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or(body);
    LlmError::Upstream { status, message }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn router_for(server: &MockServer) -> LlmRouter {
        let uri = server.uri();
        let cfg = Config::from_lookup(|key| {
            let v = match key {
                "SESSION_SECRET" => "0123456789abcdef0123456789abcdef".to_string(),
                "OPENROUTER_BASE_URL" => format!("{uri}/openrouter"),
                "PERPLEXITY_BASE_URL" => format!("{uri}/perplexity"),
                "GEMINI_BASE_URL" => format!("{uri}/gemini"),
                "OPENROUTER_DEEPSEEK_API_KEY" => "ds-key".into(),
                "DEEPCODE_API_KEY" => "dc-key".into(),
                "PERPLEXITY_API_KEY" => "px-key".into(),
                "GEMINI_API_KEY" => "gm-key".into(),
                _ => return None,
            };
            Some(v)
        })
        .unwrap();
        LlmRouter::new(&cfg).unwrap()
    }

    const TURN: Turn<'static> = Turn {
        system: "be brief",
        history: &[],
        question: "hi",
    };

    #[tokio::test]
    async fn missing_key_is_reported_before_any_request() {
        let server = MockServer::start().await;
        let router = router_for(&server);
        let err = router.complete(ModelId::Phi4, TURN).await.unwrap_err();
        assert!(matches!(err, LlmError::MissingKey(ModelId::Phi4)));
    }

    #[tokio::test]
    async fn upstream_error_message_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openrouter/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(json!({"error": {"message": "quota"}})),
            )
            .mount(&server)
            .await;

        let router = router_for(&server);
        match router.complete(ModelId::DeepSeek, TURN).await.unwrap_err() {
            LlmError::Upstream { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "quota");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_answer_becomes_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/perplexity/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  "}}]
            })))
            .mount(&server)
            .await;

        let router = router_for(&server);
        let text = router.complete(ModelId::Perplexity, TURN).await.unwrap();
        assert_eq!(text, NO_RESPONSE);
    }

    #[tokio::test]
    async fn probe_reports_online_and_offline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/openrouter/models"))
            .and(header("authorization", "Bearer ds-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/openrouter/models"))
            .and(header("authorization", "Bearer dc-key"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let router = router_for(&server);
        assert_eq!(router.probe(ModelId::DeepSeek).await.0, ProbeStatus::Online);
        assert_eq!(router.probe(ModelId::DeepCode).await, (ProbeStatus::Offline, 0));
        // no key configured
        assert_eq!(router.probe(ModelId::Phi4).await, (ProbeStatus::Offline, 0));
    }
}
