//! Kiosk languages and their fixed strings

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A language supported by the kiosk screens and the assistant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ro,
    En,
    Ua,
}

/// Fixed UI and fallback strings for one language
#[derive(Debug, Clone, Copy)]
pub struct UiStrings {
    pub welcome: &'static str,
    pub thinking: &'static str,
    pub mode_changed: &'static str,
    pub language_changed: &'static str,
    pub report_sent: &'static str,
    /// Reply used when the LLM call fails
    pub unavailable: &'static str,
    /// Reply used when no API key is configured
    pub missing_key: &'static str,
    /// Reply used when a structured reply cannot be parsed
    pub parse_failed: &'static str,
    pub camera_unavailable: &'static str,
    pub quiz_mail_subject: &'static str,
    /// Opening line of the quiz result email
    pub quiz_mail_intro: &'static str,
    pub check_email: &'static str,
}

const RO: UiStrings = UiStrings {
    welcome: "Salut! Sunt THREEB. Cu ce te ajut?",
    thinking: "Procesez...",
    mode_changed: "Mod: ",
    language_changed: "Limbă: Română",
    report_sent: "Raport trimis adminului!",
    unavailable: "Nu pot răspunde acum.",
    missing_key: "Eroare API Key.",
    parse_failed: "Am întâmpinat o eroare la procesarea răspunsului.",
    camera_unavailable: "Camera indisponibilă",
    quiz_mail_subject: "Rezultatul tău la Busola Ingineriei",
    quiz_mail_intro: "Rezultatul tău este:",
    check_email: "Verifică-ți emailul!",
};

const EN: UiStrings = UiStrings {
    welcome: "Hi! I am THREEB. How can I help?",
    thinking: "Thinking...",
    mode_changed: "Mode: ",
    language_changed: "English",
    report_sent: "Report sent to admin!",
    unavailable: "I can't answer right now.",
    missing_key: "API key error.",
    parse_failed: "I ran into an error while processing the answer.",
    camera_unavailable: "Camera unavailable",
    quiz_mail_subject: "Your Engineering Compass result",
    quiz_mail_intro: "Your result is:",
    check_email: "Check your email!",
};

const UA: UiStrings = UiStrings {
    welcome: "Привіт! Я THREEB. Чим можу допомогти?",
    thinking: "Думаю...",
    mode_changed: "Режим: ",
    language_changed: "Мова: Українська",
    report_sent: "Звіт надіслано!",
    unavailable: "Я не можу відповісти зараз.",
    missing_key: "Помилка API ключа.",
    parse_failed: "Сталася помилка під час обробки відповіді.",
    camera_unavailable: "Камера недоступна",
    quiz_mail_subject: "Ваш результат Інженерного компаса",
    quiz_mail_intro: "Ваш результат:",
    check_email: "Перевірте свою пошту!",
};

impl Language {
    /// Short code used on the language buttons and in config
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Ro => "ro",
            Self::En => "en",
            Self::Ua => "ua",
        }
    }

    /// Instruction appended to the prompt so the model replies in this language
    #[must_use]
    pub const fn directive(self) -> &'static str {
        match self {
            Self::Ro => "Respond only in Romanian.",
            Self::En => "Respond only in English.",
            Self::Ua => "Respond only in Ukrainian.",
        }
    }

    /// Language tag for the fallback HTTP synthesizer
    #[must_use]
    pub const fn speech_tag(self) -> &'static str {
        match self {
            Self::Ro => "ro",
            Self::En => "en",
            Self::Ua => "uk",
        }
    }

    #[must_use]
    pub const fn strings(self) -> &'static UiStrings {
        match self {
            Self::Ro => &RO,
            Self::En => &EN,
            Self::Ua => &UA,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ro" => Ok(Self::Ro),
            "en" => Ok(Self::En),
            // "uk" is the ISO code, "ua" is what the kiosk buttons show
            "ua" | "uk" => Ok(Self::Ua),
            other => Err(Error::UnsupportedLanguage(other.to_string())),
        }
    }
}
