//! Persona definitions
//!
//! A persona is a named tone/style profile. It changes the role text sent to
//! the LLM, the voice used for speech and the theme of the chat screen.
//! Personas are static configuration; screens receive them by reference.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Voice gender used for neural voice selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    Female,
    Male,
}

/// Immutable color/typography profile for a persona's screens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub name: &'static str,
    pub background: &'static str,
    pub header: &'static str,
    pub chat_background: &'static str,
    pub input_background: &'static str,
    pub user_bubble: &'static str,
    pub ai_bubble: &'static str,
    pub accent: &'static str,
    pub button_hover: &'static str,
    pub font: &'static str,
    /// Short avatar label drawn next to AI bubbles
    pub avatar: &'static str,
}

/// A named tone/style profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Persona {
    /// Stable identifier (e.g. "professor")
    pub id: &'static str,

    /// Name the persona introduces itself with
    pub name: &'static str,

    /// Label shown on the persona selector
    pub label: &'static str,

    /// Role description embedded at the top of every prompt
    pub role: &'static str,

    /// Voice gender for TTS
    pub gender: VoiceGender,

    /// Screen theme
    pub theme: Theme,
}

const STANDARD: Persona = Persona {
    id: "standard",
    name: "Ana",
    label: "Standard",
    role: "You are ANA, an outstanding student at FACIEE. You are calm, polite and speak \
           clearly. You introduce yourself as Ana.",
    gender: VoiceGender::Female,
    theme: Theme {
        name: "Standard",
        background: "#0f172a",
        header: "#1e293b",
        chat_background: "#0f172a",
        input_background: "#334155",
        user_bubble: "#3b82f6",
        ai_bubble: "#1e293b",
        accent: "#60a5fa",
        button_hover: "#2563eb",
        font: "Roboto Medium",
        avatar: "AI",
    },
};

const PROFESSOR: Persona = Persona {
    id: "professor",
    name: "Professor Ionescu",
    label: "Professor",
    role: "You are PROFESSOR IONESCU, an older and highly respected man. You speak formally, \
           academically, a little strict but always fair. You introduce yourself as \
           Professor Ionescu.",
    gender: VoiceGender::Male,
    theme: Theme {
        name: "Professor",
        background: "#022c22",
        header: "#064e3b",
        chat_background: "#022c22",
        input_background: "#065f46",
        user_bubble: "#10b981",
        ai_bubble: "#064e3b",
        accent: "#34d399",
        button_hover: "#059669",
        font: "Times New Roman",
        avatar: "P",
    },
};

const BRO: Persona = Persona {
    id: "bro",
    name: "Alex",
    label: "Bro",
    role: "You are ALEX, a second-year student. You are super relaxed, use casual slang, and \
           you are friendly and funny. You introduce yourself as Alex.",
    gender: VoiceGender::Male,
    theme: Theme {
        name: "Bro",
        background: "#2e1065",
        header: "#4c1d95",
        chat_background: "#2e1065",
        input_background: "#5b21b6",
        user_bubble: "#d946ef",
        ai_bubble: "#4c1d95",
        accent: "#e879f9",
        button_hover: "#c026d3",
        font: "Consolas",
        avatar: "B",
    },
};

/// Built-in personas in selector order
pub const PERSONAS: [Persona; 3] = [STANDARD, PROFESSOR, BRO];

impl Persona {
    /// Default persona shown on startup
    #[must_use]
    pub const fn standard() -> &'static Self {
        &PERSONAS[0]
    }

    /// Look up a persona by id or by 1-based selector index
    ///
    /// # Errors
    ///
    /// Returns error if nothing matches
    pub fn find(key: &str) -> Result<&'static Self> {
        let key = key.trim();
        if let Ok(index) = key.parse::<usize>() {
            return index
                .checked_sub(1)
                .and_then(|i| PERSONAS.get(i))
                .ok_or_else(|| Error::PersonaNotFound(key.to_string()));
        }

        PERSONAS
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(key) || p.label.eq_ignore_ascii_case(key))
            .ok_or_else(|| Error::PersonaNotFound(key.to_string()))
    }
}
