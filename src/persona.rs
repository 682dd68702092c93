//! Picks the system prompt sent ahead of the history, from keywords in the question.

const TECHNICAL: &str =
    "You are a technical expert who explains technical concepts clearly and directly. Be concise and precise.";
const CREATIVE: &str =
    "You are a creative assistant who generates innovative ideas in a brief form. Avoid long explanations.";
const FACTUAL: &str =
    "You are an assistant focused on facts. Provide only verifiable information and be extremely concise.";
const CONCISE: &str = "You are a concise assistant who gives direct and objective answers.";

const LANGUAGE_SUFFIX: &str =
    "Always answer in Portuguese, unless the user explicitly asks for another language.";

const HOW: &[&str] = &["como", "how"];
const BUILD: &[&str] = &["programar", "código", "desenvolver", "code", "program", "develop"];
const IDEAS: &[&str] = &["ideias", "criativo", "sugestões", "ideas", "creative", "suggestions"];
const FACTS: &[&str] = &["quando", "onde", "quem", "fato", "when", "where", "who", "fact"];
const OTHER_LANGUAGE: &[&str] = &["em inglês", "in english", "en español"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Persona {
    Technical,
    Creative,
    Factual,
    Concise,
}

impl Persona {
    pub fn for_question(question: &str) -> Self {
        let q = question.to_lowercase();
        if any(&q, HOW) && any(&q, BUILD) {
            Persona::Technical
        } else if any(&q, IDEAS) {
            Persona::Creative
        } else if any(&q, FACTS) {
            Persona::Factual
        } else {
            Persona::Concise
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            Persona::Technical => TECHNICAL,
            Persona::Creative => CREATIVE,
            Persona::Factual => FACTUAL,
            Persona::Concise => CONCISE,
        }
    }
}

pub fn system_prompt(question: &str) -> String {
    let role = Persona::for_question(question).prompt();
    if any(&question.to_lowercase(), OTHER_LANGUAGE) {
        return role.to_string();
    }
    format!("{role} {LANGUAGE_SUFFIX}")
}

fn any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn technical_needs_how_and_a_build_word() {
        assert_eq!(
            Persona::for_question("Como programar em Rust?"),
            Persona::Technical
        );
        assert_eq!(Persona::for_question("How do I write code?"), Persona::Technical);
        // "como" alone is not enough
        assert_eq!(Persona::for_question("Como vai?"), Persona::Concise);
    }

    #[test]
    fn creative_beats_factual() {
        assert_eq!(
            Persona::for_question("Quero ideias para quando chover"),
            Persona::Creative
        );
        assert_eq!(Persona::for_question("Quem descobriu o Brasil?"), Persona::Factual);
    }

    #[test]
    fn language_suffix_unless_another_language_requested() {
        let pt = system_prompt("Resuma isto");
        assert!(pt.starts_with(CONCISE));
        assert!(pt.ends_with(LANGUAGE_SUFFIX));

        let en = system_prompt("Summarize this IN ENGLISH please");
        assert_eq!(en, CONCISE);
    }
}
