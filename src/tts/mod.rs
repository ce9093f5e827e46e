//! Text-to-speech
//!
//! One utterance at a time: starting a new one cancels the previous. Audio
//! is synthesized to a temporary MP3 (neural voice first, HTTP synthesis as
//! fallback) and played on a blocking thread. The temporary file lives as
//! long as its playback and is removed when the utterance ends or is
//! cancelled.

mod playback;
mod synth;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

pub use playback::{
    AudioPlayer, DecodedAudio, PlaybackControl, SpeakerPlayer, decode_mp3, play_samples, sine_tone,
};
pub use synth::{
    EdgeTtsSynthesizer, GOOGLE_TTS_CHUNK, GoogleTtsSynthesizer, Synthesizer, chunk_text,
};

use crate::config::TtsConfig;
pub use crate::persona::VoiceGender;
use crate::{Error, Language, Result};

/// Neural voice for a language and gender
#[must_use]
pub const fn voice_for(language: Language, gender: VoiceGender) -> &'static str {
    match (language, gender) {
        (Language::Ro, VoiceGender::Female) => "ro-RO-AlinaNeural",
        (Language::Ro, VoiceGender::Male) => "ro-RO-EmilNeural",
        (Language::En, VoiceGender::Female) => "en-US-AriaNeural",
        (Language::En, VoiceGender::Male) => "en-US-GuyNeural",
        (Language::Ua, VoiceGender::Female) => "uk-UA-PolinaNeural",
        (Language::Ua, VoiceGender::Male) => "uk-UA-OstapNeural",
    }
}

struct Utterance {
    control: PlaybackControl,
    done: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

/// Serializes speech to one active utterance
pub struct TtsManager {
    synthesizers: Arc<Vec<Arc<dyn Synthesizer>>>,
    player: Arc<dyn AudioPlayer>,
    current: Mutex<Option<Utterance>>,
}

impl TtsManager {
    /// `synthesizers` are tried in order until one succeeds
    #[must_use]
    pub fn new(synthesizers: Vec<Arc<dyn Synthesizer>>, player: Arc<dyn AudioPlayer>) -> Self {
        Self {
            synthesizers: Arc::new(synthesizers),
            player,
            current: Mutex::new(None),
        }
    }

    /// edge-tts, optionally backed by HTTP synthesis, playing to the speakers
    #[must_use]
    pub fn from_config(config: &TtsConfig) -> Self {
        let mut synthesizers: Vec<Arc<dyn Synthesizer>> =
            vec![Arc::new(EdgeTtsSynthesizer::new(config.edge_tts_bin.clone()))];
        if config.fallback {
            synthesizers.push(Arc::new(GoogleTtsSynthesizer::default()));
        }
        Self::new(synthesizers, Arc::new(SpeakerPlayer))
    }

    /// Speak `text`, cancelling whatever is playing
    ///
    /// Must be called from within a Tokio runtime.
    pub fn speak(&self, text: &str, language: Language, gender: VoiceGender) {
        let mut current = self.lock();
        if let Some(previous) = current.take() {
            cancel(previous);
        }

        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        let control = PlaybackControl::new();
        let synthesizers = Arc::clone(&self.synthesizers);
        let player = Arc::clone(&self.player);
        let task_control = control.clone();
        let done = Arc::new(AtomicBool::new(false));
        let task_done = Arc::clone(&done);

        let task = tokio::spawn(async move {
            let spoken = utter(&synthesizers, player, &text, language, gender, task_control);
            if let Err(e) = spoken.await {
                tracing::warn!(error = %e, "speech failed");
            }
            task_done.store(true, Ordering::Release);
        });

        *current = Some(Utterance {
            control,
            done,
            task: Some(task),
        });
    }

    /// Hold playback in place
    pub fn pause(&self) {
        if let Some(utterance) = self.lock().as_ref() {
            utterance.control.pause();
            tracing::debug!("speech paused");
        }
    }

    /// Continue paused playback
    pub fn unpause(&self) {
        if let Some(utterance) = self.lock().as_ref() {
            utterance.control.resume();
            tracing::debug!("speech resumed");
        }
    }

    /// Cancel synthesis and playback
    pub fn stop(&self) {
        if let Some(utterance) = self.lock().take() {
            cancel(utterance);
            tracing::debug!("speech stopped");
        }
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|u| !u.done.load(Ordering::Acquire) && !u.control.is_cancelled())
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|u| u.control.is_paused())
    }

    /// Wait until the current utterance ends
    pub async fn finished(&self) {
        let task = self.lock().as_mut().and_then(|u| u.task.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "speech task failed");
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Utterance>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TtsManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn cancel(utterance: Utterance) {
    utterance.control.cancel();
    // Dropping the synthesis future kills the CLI child and removes the
    // temp file; a playback thread notices the cancel flag on its next poll
    if let Some(task) = utterance.task {
        task.abort();
    }
}

async fn utter(
    synthesizers: &[Arc<dyn Synthesizer>],
    player: Arc<dyn AudioPlayer>,
    text: &str,
    language: Language,
    gender: VoiceGender,
    control: PlaybackControl,
) -> Result<()> {
    let file = tempfile::Builder::new()
        .prefix("threeb-tts-")
        .suffix(".mp3")
        .tempfile()?;
    let path: PathBuf = file.path().to_path_buf();

    let mut synthesized = false;
    for synthesizer in synthesizers {
        match synthesizer.synthesize(text, language, gender, &path).await {
            Ok(()) => {
                tracing::debug!(synthesizer = synthesizer.name(), "speech synthesized");
                synthesized = true;
                break;
            }
            Err(e) => {
                tracing::warn!(synthesizer = synthesizer.name(), error = %e, "synthesis failed");
            }
        }
        if control.is_cancelled() {
            return Ok(());
        }
    }

    if !synthesized {
        return Err(Error::Tts("all synthesizers failed".to_string()));
    }
    if control.is_cancelled() {
        return Ok(());
    }

    tokio::task::spawn_blocking(move || {
        let result = player.play_file(file.path(), &control);
        if let Err(e) = file.close() {
            tracing::debug!(error = %e, "temp audio cleanup failed");
        }
        result
    })
    .await
    .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
}
