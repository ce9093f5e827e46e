//! Assistant bridge
//!
//! Turns a question into a prompt (persona role, knowledge base, language
//! directive), sends it to the LLM and turns the reply into display text plus
//! optional specialization references. Every failure degrades to a fixed
//! localized string; nothing is retried.

mod gemini;
mod knowledge;

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use rand::seq::SliceRandom;
use regex::Regex;
use serde::Deserialize;

pub use gemini::{GeminiClient, LlmClient};
pub use knowledge::{FACULTY_URL, KnowledgeBase, Specialization, SpecializationCatalog};

use crate::{Config, Error, Language, Persona};

/// How the model is asked to shape its reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Free text, shown as-is
    PlainText,
    /// `{"msg": "...", "ref_ids": [..]}`
    #[default]
    Envelope,
}

impl FromStr for ResponseFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "plain" | "text" | "plaintext" => Ok(Self::PlainText),
            "envelope" | "json" => Ok(Self::Envelope),
            other => Err(Error::Config(format!("unknown response format: {other}"))),
        }
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PlainText => "plain",
            Self::Envelope => "envelope",
        })
    }
}

/// Display text plus referenced specialization ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantReply {
    pub text: String,
    pub reference_ids: Vec<u32>,
}

impl AssistantReply {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reference_ids: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    msg: String,
    #[serde(default)]
    ref_ids: Vec<u32>,
}

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*```[a-zA-Z]*\s*$").expect("valid regex"));

/// Build the full prompt for one question
#[must_use]
pub fn build_prompt(
    persona: &Persona,
    language: Language,
    knowledge: &KnowledgeBase,
    catalog: &SpecializationCatalog,
    question: &str,
    format: ResponseFormat,
) -> String {
    let mut prompt = format!(
        "{role}\n\
         TASK: Answer the user using the data in the JSON below.\n\
         AUDIO RULE: Your answer will be read aloud by a speech synthesizer, so avoid emoji and write words out in full.\n\
         DATA: {data}\n",
        role = persona.role,
        data = knowledge.to_prompt_json(),
    );

    if format == ResponseFormat::Envelope {
        prompt.push_str(
            "FORMAT: Reply with a single JSON object and nothing else: \
             {\"msg\": \"<your answer>\", \"ref_ids\": [<ids of relevant study programs>]}. \
             Use an empty list when no program is relevant.\n",
        );
        if !catalog.is_empty() {
            prompt.push_str("PROGRAMS:\n");
            prompt.push_str(&catalog.index_for_prompt());
            prompt.push('\n');
        }
    }

    prompt.push_str(language.directive());
    prompt.push('\n');
    prompt.push_str("QUESTION: ");
    prompt.push_str(question.trim());
    prompt
}

/// Turn raw model output into a reply
///
/// Envelope replies may arrive wrapped in code fences. Anything that does
/// not parse yields the language's fixed fallback with no references.
#[must_use]
pub fn parse_reply(raw: &str, format: ResponseFormat, language: Language) -> AssistantReply {
    match format {
        ResponseFormat::PlainText => AssistantReply::text(raw.trim()),
        ResponseFormat::Envelope => {
            let stripped = CODE_FENCE.replace_all(raw, "");
            match serde_json::from_str::<Envelope>(stripped.trim()) {
                Ok(envelope) => AssistantReply {
                    text: envelope.msg,
                    reference_ids: envelope.ref_ids,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "unparseable assistant reply");
                    AssistantReply::text(language.strings().parse_failed)
                }
            }
        }
    }
}

/// Suggestion chips shown under the chat input
pub const SHORTCUT_QUESTIONS: [&str; 20] = [
    "Ce specializări există?",
    "Cât durează studiile?",
    "Ce învăț la CTI?",
    "Joburi după AIA?",
    "Unde e facultatea?",
    "Locuri la buget?",
    "Admiterea e grea?",
    "Parteneriate firme?",
    "Limbaje programare?",
    "Există cantină?",
    "Cum sunt căminele?",
    "Inginerie Electrică?",
    "Burse Erasmus?",
    "Laboratoare dotate?",
    "Medie admitere?",
    "Ligă studențească?",
    "Job din facultate?",
    "Telecomunicații?",
    "Număr studenți?",
    "De ce FACIEE?",
];

/// `n` distinct random suggestions
#[must_use]
pub fn shortcut_questions(n: usize) -> Vec<&'static str> {
    SHORTCUT_QUESTIONS
        .choose_multiple(&mut rand::thread_rng(), n)
        .copied()
        .collect()
}

/// Answers kiosk questions through an LLM
pub struct Assistant {
    client: Option<Arc<dyn LlmClient>>,
    knowledge: KnowledgeBase,
    catalog: SpecializationCatalog,
    format: ResponseFormat,
}

impl Assistant {
    /// `client` is `None` when no API key is configured
    #[must_use]
    pub fn new(
        client: Option<Arc<dyn LlmClient>>,
        knowledge: KnowledgeBase,
        catalog: SpecializationCatalog,
        format: ResponseFormat,
    ) -> Self {
        Self {
            client,
            knowledge,
            catalog,
            format,
        }
    }

    /// Assistant backed by Gemini and the configured data files
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let client =
            GeminiClient::from_config(&config.llm).map(|c| Arc::new(c) as Arc<dyn LlmClient>);
        if client.is_none() {
            tracing::warn!("no LLM API key configured, assistant will answer with an error");
        }

        Self::new(
            client,
            KnowledgeBase::load(&config.paths.knowledge_base),
            SpecializationCatalog::load(&config.paths.specializations),
            config.llm.response_format,
        )
    }

    #[must_use]
    pub const fn catalog(&self) -> &SpecializationCatalog {
        &self.catalog
    }

    #[must_use]
    pub const fn format(&self) -> ResponseFormat {
        self.format
    }

    /// Ask one question; never fails, errors become fixed fallback replies
    pub async fn ask(
        &self,
        question: &str,
        persona: &Persona,
        language: Language,
    ) -> AssistantReply {
        let Some(client) = &self.client else {
            return AssistantReply::text(language.strings().missing_key);
        };

        let prompt = build_prompt(
            persona,
            language,
            &self.knowledge,
            &self.catalog,
            question,
            self.format,
        );

        tracing::debug!(
            model = client.model(),
            persona = persona.id,
            language = %language,
            prompt_len = prompt.len(),
            "asking assistant"
        );

        match client.generate(&prompt).await {
            Ok(raw) => parse_reply(&raw, self.format, language),
            Err(e) => {
                tracing::warn!(error = %e, "assistant request failed");
                AssistantReply::text(language.strings().unavailable)
            }
        }
    }
}
