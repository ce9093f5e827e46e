//! Chat transcript and reported replies

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::assistant::AssistantReply;
use crate::{Result, journal};

/// Who wrote a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatSender {
    User,
    Ai,
    /// Status lines such as "thinking" or mode changes
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub sender: ChatSender,
    pub text: String,
    pub reference_ids: Vec<u32>,
}

/// Ordered turns of one chat screen; discarded when the screen closes
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    turns: Vec<ChatTurn>,
}

impl ChatSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(ChatSender::User, text.into(), Vec::new());
    }

    pub fn push_system(&mut self, text: impl Into<String>) {
        self.push(ChatSender::System, text.into(), Vec::new());
    }

    pub fn push_ai(&mut self, reply: AssistantReply) {
        self.push(ChatSender::Ai, reply.text, reply.reference_ids);
    }

    fn push(&mut self, sender: ChatSender, text: String, reference_ids: Vec<u32>) {
        self.turns.push(ChatTurn {
            sender,
            text,
            reference_ids,
        });
    }

    #[must_use]
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    #[must_use]
    pub fn last_ai(&self) -> Option<&ChatTurn> {
        self.turns.iter().rev().find(|t| t.sender == ChatSender::Ai)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// A reported AI reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: String,
    pub persona: String,
    pub language: String,
    pub text: String,
}

/// Local copy of AI replies flagged by users; each is also mailed to the admin
#[derive(Debug, Clone)]
pub struct ReportLog {
    path: PathBuf,
}

impl ReportLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a report
    ///
    /// # Errors
    ///
    /// Returns error if the log cannot be written
    pub fn record(&self, persona: &str, language: &str, text: &str) -> Result<Report> {
        let report = Report {
            timestamp: chrono::Local::now()
                .format(crate::quiz::TIMESTAMP_FORMAT)
                .to_string(),
            persona: persona.to_string(),
            language: language.to_string(),
            text: text.to_string(),
        };
        journal::append_entry(&self.path, report.clone())?;
        tracing::info!(persona, language, "AI reply reported");
        Ok(report)
    }

    /// # Errors
    ///
    /// Returns error if the log exists but cannot be read
    pub fn reports(&self) -> Result<Vec<Report>> {
        journal::read_entries(&self.path)
    }
}
