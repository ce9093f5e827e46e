//! Knowledge base and specialization catalog

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Admissions data embedded verbatim in every prompt
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBase {
    data: serde_json::Value,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::empty()
    }
}

impl KnowledgeBase {
    /// An empty JSON object
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    #[must_use]
    pub const fn from_value(data: serde_json::Value) -> Self {
        Self { data }
    }

    /// Load from a JSON file; a missing or invalid file yields an empty base
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "knowledge base unavailable");
                return Self::empty();
            }
        };

        match serde_json::from_str(&content) {
            Ok(data) => {
                tracing::info!(path = %path.display(), "loaded knowledge base");
                Self { data }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid knowledge base");
                Self::empty()
            }
        }
    }

    #[must_use]
    pub const fn value(&self) -> &serde_json::Value {
        &self.data
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.data {
            serde_json::Value::Object(map) => map.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            serde_json::Value::Null => true,
            _ => false,
        }
    }

    /// Compact JSON with non-ASCII characters kept as-is
    #[must_use]
    pub fn to_prompt_json(&self) -> String {
        self.data.to_string()
    }
}

/// A study program card shown under an AI reply
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Specialization {
    pub name: String,

    #[serde(default)]
    pub acronym: Option<String>,

    /// Display line of tags (e.g. "AI • ROBOTICS")
    #[serde(default)]
    pub tags: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,
}

/// Default link for cards without their own URL
pub const FACULTY_URL: &str = "https://aciee.ugal.ro";

impl Specialization {
    #[must_use]
    pub fn link(&self) -> &str {
        self.url.as_deref().unwrap_or(FACULTY_URL)
    }
}

/// Specialization cards keyed by reference id
#[derive(Debug, Clone, Default)]
pub struct SpecializationCatalog {
    cards: BTreeMap<u32, Specialization>,
}

impl SpecializationCatalog {
    /// Load `{"<id>": {...}}` from disk; missing or invalid files yield an empty catalog
    pub fn load(path: &Path) -> Self {
        let parsed = std::fs::read_to_string(path)
            .map_err(crate::Error::from)
            .and_then(|content| {
                serde_json::from_str::<BTreeMap<String, Specialization>>(&content)
                    .map_err(crate::Error::from)
            });

        match parsed {
            Ok(raw) => {
                let cards: BTreeMap<u32, Specialization> = raw
                    .into_iter()
                    .filter_map(|(id, card)| match id.trim().parse() {
                        Ok(id) => Some((id, card)),
                        Err(_) => {
                            tracing::warn!(id = %id, "ignoring specialization with non-numeric id");
                            None
                        }
                    })
                    .collect();
                tracing::info!(
                    path = %path.display(),
                    cards = cards.len(),
                    "loaded specializations"
                );
                Self { cards }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "specializations unavailable");
                Self::default()
            }
        }
    }

    #[must_use]
    pub fn from_cards(cards: impl IntoIterator<Item = (u32, Specialization)>) -> Self {
        Self {
            cards: cards.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Specialization> {
        self.cards.get(&id)
    }

    /// Cards for `ids`, skipping unknown ids
    #[must_use]
    pub fn resolve(&self, ids: &[u32]) -> Vec<(u32, &Specialization)> {
        ids.iter()
            .filter_map(|&id| self.get(id).map(|card| (id, card)))
            .collect()
    }

    /// `id: name` lines offered to the model as valid reference ids
    #[must_use]
    pub fn index_for_prompt(&self) -> String {
        self.cards
            .iter()
            .map(|(id, card)| format!("{id}: {}", card.name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_knowledge_base_is_empty_object() {
        let kb = KnowledgeBase::load(Path::new("/no/such/data.json"));
        assert!(kb.is_empty());
        assert_eq!(kb.to_prompt_json(), "{}");
    }

    #[test]
    fn test_knowledge_base_keeps_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"oraș": "Galați"}"#).unwrap();

        let kb = KnowledgeBase::load(&path);
        assert!(!kb.is_empty());
        assert!(kb.to_prompt_json().contains("Galați"));
    }

    #[test]
    fn test_catalog_resolves_known_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("specializations.json");
        std::fs::write(
            &path,
            r#"{
                "1": {"name": "Calculatoare", "acronym": "CTI", "tags": "SOFTWARE", "description": "..."},
                "2": {"name": "Automatică", "tags": "AI", "description": "...", "url": "https://example.org"},
                "x": {"name": "Broken"}
            }"#,
        )
        .unwrap();

        let catalog = SpecializationCatalog::load(&path);
        assert_eq!(catalog.len(), 2);

        let cards = catalog.resolve(&[2, 9, 1]);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].0, 2);
        assert_eq!(cards[0].1.link(), "https://example.org");
        assert_eq!(cards[1].1.link(), FACULTY_URL);
        assert!(catalog.index_for_prompt().starts_with("1: Calculatoare"));
    }
}
