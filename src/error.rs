//! Error types for the THREEB kiosk

use thiserror::Error;

/// Result type alias for kiosk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the kiosk core
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Persona not found
    #[error("persona not found: {0}")]
    PersonaNotFound(String),

    /// Unknown language code
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Camera could not be opened or read
    #[error("camera error: {0}")]
    Camera(String),

    /// Face locator failure
    #[error("detector error: {0}")]
    Detector(String),

    /// LLM request or response error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio output error
    #[error("audio error: {0}")]
    Audio(String),

    /// Invalid quiz input
    #[error("quiz error: {0}")]
    Quiz(String),

    /// Mail could not be built or delivered
    #[error("email error: {0}")]
    Email(String),

    /// Unrecognized kiosk command
    #[error("invalid command: {0}")]
    Command(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Image decoding error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}
