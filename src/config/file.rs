//! TOML configuration file loading
//!
//! Supports `~/.config/threeb/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct KioskConfigFile {
    /// Persona identifier (e.g. "professor")
    #[serde(default)]
    pub persona: Option<String>,

    /// Startup language code ("ro", "en", "ua")
    #[serde(default)]
    pub language: Option<String>,

    /// Data directory override
    #[serde(default)]
    pub data_dir: Option<String>,

    #[serde(default)]
    pub presence: PresenceFileConfig,

    #[serde(default)]
    pub character: CharacterFileConfig,

    #[serde(default)]
    pub llm: LlmFileConfig,

    #[serde(default)]
    pub tts: TtsFileConfig,

    #[serde(default)]
    pub paths: PathsFileConfig,

    #[serde(default)]
    pub mail: MailFileConfig,
}

/// Presence detection configuration
#[derive(Debug, Default, Deserialize)]
pub struct PresenceFileConfig {
    pub enabled: Option<bool>,

    /// Minimum face area / frame area to count as "addressing the kiosk"
    pub face_area_threshold: Option<f64>,

    /// Dwell time in seconds before presence is confirmed
    pub time_to_trigger: Option<f64>,

    /// Poll interval in milliseconds
    pub poll_interval_ms: Option<u64>,

    pub detect_width: Option<u32>,
    pub detect_height: Option<u32>,
    pub camera_index: Option<i32>,
    pub cascade_paths: Option<Vec<String>>,

    /// Replay recorded frames from this directory instead of a camera
    pub replay_dir: Option<String>,
}

/// Mascot behavior configuration
#[derive(Debug, Default, Deserialize)]
pub struct CharacterFileConfig {
    /// Seconds of inactivity in Normal before falling asleep
    pub sleep_after_secs: Option<u32>,

    /// Per-second chance of an ambient look-around
    pub look_around_chance: Option<f64>,

    /// Directory holding the face images
    pub assets_dir: Option<String>,
}

/// LLM configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    pub api_key: Option<String>,

    /// Model identifier (e.g. "gemini-2.5-flash-lite")
    pub model: Option<String>,

    /// API base URL
    pub base_url: Option<String>,

    /// "plain" or "envelope"
    pub response_format: Option<String>,
}

/// Speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub enabled: Option<bool>,

    /// Path or name of the edge-tts executable
    pub edge_tts_bin: Option<String>,

    /// Use the HTTP synthesizer when the CLI fails
    pub fallback: Option<bool>,
}

/// Data file locations (relative paths resolve against the data dir)
#[derive(Debug, Default, Deserialize)]
pub struct PathsFileConfig {
    pub knowledge_base: Option<String>,
    pub specializations: Option<String>,
    pub quiz_log: Option<String>,
    pub report_log: Option<String>,
}

/// Outgoing mail configuration
#[derive(Debug, Default, Deserialize)]
pub struct MailFileConfig {
    /// SMTP relay host (STARTTLS)
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,

    /// Sender account, also the From address
    pub user: Option<String>,
    pub password: Option<String>,

    /// Recipient of reported replies
    pub admin: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `KioskConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> KioskConfigFile {
    config_file_path().map_or_else(KioskConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path, falling back to defaults
pub fn load_from(path: &Path) -> KioskConfigFile {
    if !path.exists() {
        return KioskConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                KioskConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            KioskConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/threeb/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("threeb").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_parses() {
        let cfg: KioskConfigFile = toml::from_str(
            r#"
            persona = "bro"

            [presence]
            face_area_threshold = 0.3

            [llm]
            response_format = "plain"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.persona.as_deref(), Some("bro"));
        assert_eq!(cfg.presence.face_area_threshold, Some(0.3));
        assert!(cfg.presence.time_to_trigger.is_none());
        assert_eq!(cfg.llm.response_format.as_deref(), Some("plain"));
        assert!(cfg.tts.enabled.is_none());
        assert!(cfg.mail.user.is_none());
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "presence = [not valid").unwrap();

        let cfg = load_from(&path);
        assert!(cfg.persona.is_none());
    }

    #[test]
    fn test_missing_file_is_default() {
        let cfg = load_from(Path::new("/definitely/not/here.toml"));
        assert!(cfg.language.is_none());
    }
}
