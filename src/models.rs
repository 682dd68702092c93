use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The five upstream chat models a conversation can be routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelId {
    DeepSeek,
    DeepCode,
    Phi4,
    Perplexity,
    Gemini,
}

pub const DEFAULT_MODEL: ModelId = ModelId::DeepSeek;

const ALL: [ModelId; 5] = [
    ModelId::DeepSeek,
    ModelId::DeepCode,
    ModelId::Phi4,
    ModelId::Perplexity,
    ModelId::Gemini,
];

/// Where a model is served from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upstream {
    OpenRouter,
    Perplexity,
    Gemini,
}

impl ModelId {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelId::DeepSeek => "deepseek",
            ModelId::DeepCode => "deepcode",
            ModelId::Phi4 => "phi-4",
            ModelId::Perplexity => "perplexity",
            ModelId::Gemini => "gemini",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ModelId::DeepSeek => "DeepSeek",
            ModelId::DeepCode => "DeepCode",
            ModelId::Phi4 => "Phi-4",
            ModelId::Perplexity => "Perplexity",
            ModelId::Gemini => "Gemini",
        }
    }

    pub fn upstream(self) -> Upstream {
        match self {
            ModelId::DeepSeek | ModelId::DeepCode | ModelId::Phi4 => Upstream::OpenRouter,
            ModelId::Perplexity => Upstream::Perplexity,
            ModelId::Gemini => Upstream::Gemini,
        }
    }

    /// Model name as the upstream API expects it.
    pub fn upstream_model(self) -> &'static str {
        match self {
            ModelId::DeepSeek => "deepseek/deepseek-chat-v3-0324:free",
            ModelId::DeepCode => "agentica-org/deepcoder-14b-preview:free",
            ModelId::Phi4 => "microsoft/phi-4-reasoning-plus:free",
            ModelId::Perplexity => "sonar",
            ModelId::Gemini => "gemini-1.5-pro",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown model: {0}")]
pub struct UnknownModel(pub String);

impl FromStr for ModelId {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim();
        ALL.into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(id))
            .ok_or_else(|| UnknownModel(id.to_string()))
    }
}

/// What a client asked for: a specific model or "auto".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelChoice {
    Auto,
    Fixed(ModelId),
}

impl ModelChoice {
    pub fn resolve(self) -> ModelId {
        match self {
            ModelChoice::Auto => DEFAULT_MODEL,
            ModelChoice::Fixed(m) => m,
        }
    }
}

impl FromStr for ModelChoice {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(ModelChoice::Auto);
        }
        s.parse().map(ModelChoice::Fixed)
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub name: &'static str,
}

pub fn catalog() -> Vec<CatalogEntry> {
    ALL.into_iter()
        .map(|m| CatalogEntry {
            id: m.as_str(),
            name: m.display_name(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_from_str() {
        for m in ALL {
            assert_eq!(m.as_str().parse::<ModelId>().unwrap(), m);
        }
        assert_eq!("PHI-4".parse::<ModelId>().unwrap(), ModelId::Phi4);
        assert!("gpt-4".parse::<ModelId>().is_err());
    }

    #[test]
    fn auto_resolves_to_deepseek() {
        let choice: ModelChoice = "auto".parse().unwrap();
        assert_eq!(choice, ModelChoice::Auto);
        assert_eq!(choice.resolve(), ModelId::DeepSeek);
        assert_eq!(
            "gemini".parse::<ModelChoice>().unwrap().resolve(),
            ModelId::Gemini
        );
    }

    #[test]
    fn catalog_order_is_fixed() {
        let ids: Vec<_> = catalog().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, ["deepseek", "deepcode", "phi-4", "perplexity", "gemini"]);
    }

    #[test]
    fn openrouter_serves_three_models() {
        let routed: Vec<_> = ALL
            .into_iter()
            .filter(|m| m.upstream() == Upstream::OpenRouter)
            .collect();
        assert_eq!(routed, [ModelId::DeepSeek, ModelId::DeepCode, ModelId::Phi4]);
    }
}
