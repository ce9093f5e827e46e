//! Configuration management for the THREEB kiosk
//!
//! Values are layered env > TOML file > defaults. The resulting [`Config`] is
//! immutable and handed to each component by reference.

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::assistant::ResponseFormat;
use crate::character::{LOOK_AROUND_CHANCE, SLEEP_AFTER_SECS};
use crate::presence::{
    CASCADE_PATHS, DETECT_SIZE, FACE_AREA_THRESHOLD, POLL_INTERVAL, TIME_TO_TRIGGER,
};
use crate::{Error, Language, Persona, Result};

use self::file::KioskConfigFile;

/// Default Gemini model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

/// Default SMTP relay
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";

/// Default SMTP submission port (STARTTLS)
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Default Gemini REST endpoint
pub const DEFAULT_LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Kiosk configuration
#[derive(Debug)]
pub struct Config {
    /// Persona active on startup
    pub persona: &'static Persona,

    /// Language active on startup
    pub language: Language,

    /// Path to data directory (knowledge base, logs)
    pub data_dir: PathBuf,

    pub presence: PresenceConfig,

    pub character: CharacterConfig,

    pub llm: LlmConfig,

    pub tts: TtsConfig,

    pub paths: PathsConfig,

    pub mail: MailConfig,
}

/// Presence detection configuration
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Run the detector on the mascot screen
    pub enabled: bool,

    pub face_area_threshold: f64,

    pub time_to_trigger: Duration,

    pub poll_interval: Duration,

    /// Detection frame size (width, height)
    pub detect_size: (u32, u32),

    /// Video device index for the `camera` feature
    pub camera_index: i32,

    /// Haar cascade candidates, first existing wins
    pub cascade_paths: Vec<PathBuf>,

    /// Replay still frames from a directory instead of a live camera
    pub replay_dir: Option<PathBuf>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            face_area_threshold: FACE_AREA_THRESHOLD,
            time_to_trigger: TIME_TO_TRIGGER,
            poll_interval: POLL_INTERVAL,
            detect_size: DETECT_SIZE,
            camera_index: 0,
            cascade_paths: CASCADE_PATHS.iter().map(PathBuf::from).collect(),
            replay_dir: None,
        }
    }
}

/// Mascot behavior configuration
#[derive(Debug, Clone)]
pub struct CharacterConfig {
    /// Seconds in Normal without interaction before sleeping
    pub sleep_after_secs: u32,

    /// Chance per second of an ambient look-around
    pub look_around_chance: f64,

    /// Directory the frame image references resolve against
    pub assets_dir: PathBuf,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            sleep_after_secs: SLEEP_AFTER_SECS,
            look_around_chance: LOOK_AROUND_CHANCE,
            assets_dir: PathBuf::from("."),
        }
    }
}

/// LLM configuration
#[derive(Debug)]
pub struct LlmConfig {
    /// API key (from `GEMINI_KEY`)
    pub api_key: Option<SecretString>,

    pub model: String,

    pub base_url: String,

    pub response_format: ResponseFormat,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            response_format: ResponseFormat::Envelope,
        }
    }
}

/// Speech configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub enabled: bool,

    /// edge-tts executable name or path
    pub edge_tts_bin: String,

    /// Fall back to HTTP synthesis when the CLI fails
    pub fallback: bool,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            edge_tts_bin: "edge-tts".to_string(),
            fallback: true,
        }
    }
}

/// Outgoing mail configuration
///
/// Mail is sent only when both `user` and `password` are set.
#[derive(Debug)]
pub struct MailConfig {
    pub smtp_host: String,

    pub smtp_port: u16,

    /// Sender account (from `EMAIL_USER`)
    pub user: Option<String>,

    /// Sender password (from `EMAIL_PASS`)
    pub password: Option<SecretString>,

    /// Recipient of reported replies (from `EMAIL_ADMIN`)
    pub admin: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: DEFAULT_SMTP_HOST.to_string(),
            smtp_port: DEFAULT_SMTP_PORT,
            user: None,
            password: None,
            admin: None,
        }
    }
}

/// Data file locations
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Knowledge base JSON embedded verbatim in prompts
    pub knowledge_base: PathBuf,

    /// Specialization cards keyed by reference id
    pub specializations: PathBuf,

    /// Append-only quiz log
    pub quiz_log: PathBuf,

    /// Append-only log of reported AI replies
    pub report_log: PathBuf,
}

impl PathsConfig {
    fn under(data_dir: &Path) -> Self {
        Self {
            knowledge_base: data_dir.join("data.json"),
            specializations: data_dir.join("specializations.json"),
            quiz_log: data_dir.join("quiz_logs.json"),
            report_log: data_dir.join("reports.json"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from(".");
        Self {
            persona: Persona::standard(),
            language: Language::default(),
            paths: PathsConfig::under(&data_dir),
            data_dir,
            presence: PresenceConfig::default(),
            character: CharacterConfig::default(),
            llm: LlmConfig::default(),
            tts: TtsConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

/// Default data directory: `~/.local/share/threeb` on Linux
pub fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("threeb"))
}

impl Config {
    /// Load configuration from env, the TOML file and defaults
    ///
    /// # Errors
    ///
    /// Returns error if the persona or language cannot be resolved or a
    /// value is malformed
    pub fn load(persona: Option<&str>, language: Option<&str>) -> Result<Self> {
        Self::from_sources(file::load_config_file(), persona, language)
    }

    /// Build a configuration from an already-parsed file overlay
    ///
    /// # Errors
    ///
    /// Returns error if the persona or language cannot be resolved or a
    /// value is malformed
    #[allow(clippy::too_many_lines)]
    pub fn from_sources(
        fc: KioskConfigFile,
        persona: Option<&str>,
        language: Option<&str>,
    ) -> Result<Self> {
        // CLI > env > toml > default
        let persona = persona
            .map(ToString::to_string)
            .or_else(|| std::env::var("THREEB_PERSONA").ok())
            .or(fc.persona)
            .map_or_else(|| Ok(Persona::standard()), |id| Persona::find(&id))?;

        let language = language
            .map(ToString::to_string)
            .or_else(|| std::env::var("THREEB_LANGUAGE").ok())
            .or(fc.language)
            .map_or_else(|| Ok(Language::default()), |code| code.parse())?;

        let data_dir = std::env::var("THREEB_DATA_DIR")
            .ok()
            .or(fc.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        if let Err(e) = std::fs::create_dir_all(&data_dir) {
            tracing::warn!(
                path = %data_dir.display(),
                error = %e,
                "failed to create data directory"
            );
        }

        // Presence (env > toml > default)
        let defaults = PresenceConfig::default();
        let pf = fc.presence;
        let presence = PresenceConfig {
            enabled: env_flag("THREEB_PRESENCE_ENABLED")
                .or(pf.enabled)
                .unwrap_or(defaults.enabled),
            face_area_threshold: env_parse("THREEB_FACE_AREA_THRESHOLD")?
                .or(pf.face_area_threshold)
                .unwrap_or(defaults.face_area_threshold),
            time_to_trigger: env_parse::<f64>("THREEB_TIME_TO_TRIGGER")?
                .or(pf.time_to_trigger)
                .map_or(Ok(defaults.time_to_trigger), seconds)?,
            poll_interval: pf
                .poll_interval_ms
                .map_or(defaults.poll_interval, Duration::from_millis),
            detect_size: (
                pf.detect_width.unwrap_or(defaults.detect_size.0),
                pf.detect_height.unwrap_or(defaults.detect_size.1),
            ),
            camera_index: env_parse("THREEB_CAMERA_INDEX")?
                .or(pf.camera_index)
                .unwrap_or(defaults.camera_index),
            cascade_paths: pf
                .cascade_paths
                .map(|paths| paths.into_iter().map(PathBuf::from).collect())
                .unwrap_or(defaults.cascade_paths),
            replay_dir: std::env::var("THREEB_REPLAY_DIR")
                .ok()
                .or(pf.replay_dir)
                .map(PathBuf::from),
        };

        if !(0.0..=1.0).contains(&presence.face_area_threshold) {
            return Err(Error::Config(format!(
                "face_area_threshold must be within 0..=1, got {}",
                presence.face_area_threshold
            )));
        }

        // Character
        let defaults = CharacterConfig::default();
        let cf = fc.character;
        let character = CharacterConfig {
            sleep_after_secs: env_parse("THREEB_SLEEP_AFTER_SECS")?
                .or(cf.sleep_after_secs)
                .unwrap_or(defaults.sleep_after_secs),
            look_around_chance: cf
                .look_around_chance
                .unwrap_or(defaults.look_around_chance)
                .clamp(0.0, 1.0),
            assets_dir: std::env::var("THREEB_ASSETS_DIR")
                .ok()
                .or(cf.assets_dir)
                .map_or_else(|| data_dir.clone(), PathBuf::from),
        };

        // LLM (env > toml > default)
        let lf = fc.llm;
        let llm = LlmConfig {
            api_key: std::env::var("GEMINI_KEY")
                .ok()
                .or(lf.api_key)
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
            model: std::env::var("THREEB_LLM_MODEL")
                .ok()
                .or(lf.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: lf
                .base_url
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            response_format: std::env::var("THREEB_RESPONSE_FORMAT")
                .ok()
                .or(lf.response_format)
                .map_or(Ok(ResponseFormat::Envelope), |s| s.parse())?,
        };

        if llm.api_key.is_none() {
            tracing::warn!("GEMINI_KEY not set, assistant replies will be unavailable");
        }

        // TTS
        let defaults = TtsConfig::default();
        let tf = fc.tts;
        let tts = TtsConfig {
            enabled: env_flag("THREEB_TTS_ENABLED")
                .or(tf.enabled)
                .unwrap_or(defaults.enabled),
            edge_tts_bin: std::env::var("THREEB_EDGE_TTS_BIN")
                .ok()
                .or(tf.edge_tts_bin)
                .unwrap_or(defaults.edge_tts_bin),
            fallback: tf.fallback.unwrap_or(defaults.fallback),
        };

        // Mail (env > toml > default)
        let mf = fc.mail;
        let non_empty = |v: String| (!v.trim().is_empty()).then_some(v);
        let mail = MailConfig {
            smtp_host: std::env::var("THREEB_SMTP_HOST")
                .ok()
                .or(mf.smtp_host)
                .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            smtp_port: env_parse("THREEB_SMTP_PORT")?
                .or(mf.smtp_port)
                .unwrap_or(DEFAULT_SMTP_PORT),
            user: std::env::var("EMAIL_USER").ok().or(mf.user).and_then(non_empty),
            password: std::env::var("EMAIL_PASS")
                .ok()
                .or(mf.password)
                .and_then(non_empty)
                .map(SecretString::from),
            admin: std::env::var("EMAIL_ADMIN").ok().or(mf.admin).and_then(non_empty),
        };

        if mail.user.is_none() || mail.password.is_none() {
            tracing::warn!("EMAIL_USER/EMAIL_PASS not set, reports and quiz results stay local");
        }

        // Data files resolve against the data dir unless absolute
        let defaults = PathsConfig::under(&data_dir);
        let resolve = |p: Option<String>, default: PathBuf| {
            p.map_or(default, |p| data_dir.join(p))
        };
        let pf = fc.paths;
        let paths = PathsConfig {
            knowledge_base: resolve(pf.knowledge_base, defaults.knowledge_base),
            specializations: resolve(pf.specializations, defaults.specializations),
            quiz_log: resolve(pf.quiz_log, defaults.quiz_log),
            report_log: resolve(pf.report_log, defaults.report_log),
        };

        Ok(Self {
            persona,
            language,
            data_dir,
            presence,
            character,
            llm,
            tts,
            paths,
            mail,
        })
    }
}

/// Parse an optional env var, failing loudly on malformed values
fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    std::env::var(name).ok().map_or(Ok(None), |raw| {
        raw.trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name}: invalid value '{raw}'")))
    })
}

/// Read a boolean env var ("1"/"true" vs anything else)
fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn seconds(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::Config(format!("invalid duration {secs}: {e}")))
}
