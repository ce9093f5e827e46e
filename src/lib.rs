//! THREEB - presence-aware mascot kiosk assistant
//!
//! This library provides the non-GUI core of the THREEB admissions kiosk:
//! - Presence detection over a shared camera (face area + dwell time)
//! - The mascot animation state machine and its render/behavior loops
//! - The assistant bridge (persona and language aware prompts to Gemini)
//! - Text-to-speech with one active utterance
//! - The engineering compass quiz, its append-only log and charts
//! - Mail for reported replies and quiz results
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Kiosk (screens)                      │
//! │   Mascot  │  Home  │  Chat  │  Quiz  │  Settings     │
//! └──────┬──────────────────────────────────▲───────────┘
//!        │ start/stop               UiQueue │ post
//! ┌──────▼──────────────────────────────────┴───────────┐
//! │  Presence  │  Animator  │  Assistant  │  TTS        │
//! └──────┬─────────────────────────┬────────────────────┘
//!        │                         │
//! ┌──────▼─────────┐     ┌─────────▼──────────┐
//! │ Camera (global)│     │ Gemini │ edge-tts  │
//! └────────────────┘     └────────────────────┘
//! ```

pub mod assistant;
pub mod character;
pub mod chat;
pub mod config;
pub mod error;
pub mod journal;
pub mod kiosk;
pub mod language;
pub mod mail;
pub mod persona;
pub mod presence;
pub mod quiz;
pub mod tts;
pub mod ui;

pub use assistant::{Assistant, AssistantReply, LlmClient, ResponseFormat};
pub use character::{Character, CharacterState};
pub use config::Config;
pub use error::{Error, Result};
pub use kiosk::{Kiosk, KioskCommand, Screen};
pub use language::Language;
pub use mail::{Mail, MailTransport};
pub use persona::{Persona, VoiceGender};
pub use presence::{Camera, FaceBox, FaceLocator, GrayFrame, PresenceDetector};
pub use tts::TtsManager;
