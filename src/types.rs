use serde::{Deserialize, Serialize};

// ============================
// Conversation history
// ============================
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Part {
    pub text: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HistoryMessage {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl HistoryMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part { text: text.into() }],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part { text: text.into() }],
        }
    }

    /// All parts joined by a single space.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ============================
// /api/chat
// ============================
#[derive(Deserialize, Debug, Default)]
pub struct ChatReq {
    #[serde(default, alias = "pergunta")]
    pub question: Option<String>,
    #[serde(default, alias = "modelo")]
    pub model: Option<String>,
    #[serde(default, alias = "conversationId")]
    pub conversation_id: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct ChatResp {
    pub answer: String,
    pub source: &'static str,
}

// ============================
// /api/models
// ============================
#[derive(Deserialize, Debug, Default)]
pub struct ModelQuery {
    #[serde(default, rename = "modelId")]
    pub model_id: Option<String>,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Online,
    Slow,
    Offline,
}

#[derive(Serialize, Debug)]
pub struct ProbeResp {
    pub model_id: String,
    pub status: ProbeStatus,
    pub response_time_ms: u64,
}
