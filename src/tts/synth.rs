//! Speech synthesizers

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::voice_for;
use crate::persona::VoiceGender;
use crate::{Error, Language, Result};

/// Longest text the HTTP synthesizer accepts per request
pub const GOOGLE_TTS_CHUNK: usize = 100;

const GOOGLE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Renders text to an MP3 file
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Write speech for `text` to `out`
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails or produces no audio
    async fn synthesize(
        &self,
        text: &str,
        language: Language,
        gender: VoiceGender,
        out: &Path,
    ) -> Result<()>;
}

/// Neural voices through the `edge-tts` command line tool
pub struct EdgeTtsSynthesizer {
    binary: String,
}

impl EdgeTtsSynthesizer {
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn locate(&self) -> Result<PathBuf> {
        which::which(&self.binary)
            .map_err(|e| Error::Tts(format!("{} not found: {e}", self.binary)))
    }
}

#[async_trait]
impl Synthesizer for EdgeTtsSynthesizer {
    fn name(&self) -> &'static str {
        "edge-tts"
    }

    async fn synthesize(
        &self,
        text: &str,
        language: Language,
        gender: VoiceGender,
        out: &Path,
    ) -> Result<()> {
        let binary = self.locate()?;
        let voice = voice_for(language, gender);

        let output = tokio::process::Command::new(&binary)
            .arg("--voice")
            .arg(voice)
            .arg("--text")
            .arg(text)
            .arg("--write-media")
            .arg(out)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Tts(format!(
                "edge-tts exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        ensure_audio(out).await?;
        tracing::debug!(voice, "edge-tts synthesis complete");
        Ok(())
    }
}

/// Google Translate speech endpoint, used when the neural voice fails
pub struct GoogleTtsSynthesizer {
    client: reqwest::Client,
    base_url: String,
}

impl Default for GoogleTtsSynthesizer {
    fn default() -> Self {
        Self::new(GOOGLE_TTS_URL)
    }
}

impl GoogleTtsSynthesizer {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn chunk_url(&self, chunk: &str, language: Language, index: usize, total: usize) -> String {
        format!(
            "{}?ie=UTF-8&client=tw-ob&tl={}&total={total}&idx={index}&textlen={}&q={}",
            self.base_url,
            language.speech_tag(),
            chunk.chars().count(),
            urlencoding::encode(chunk)
        )
    }
}

#[async_trait]
impl Synthesizer for GoogleTtsSynthesizer {
    fn name(&self) -> &'static str {
        "google-tts"
    }

    async fn synthesize(
        &self,
        text: &str,
        language: Language,
        _gender: VoiceGender,
        out: &Path,
    ) -> Result<()> {
        let chunks = chunk_text(text, GOOGLE_TTS_CHUNK);
        if chunks.is_empty() {
            return Err(Error::Tts("nothing to synthesize".to_string()));
        }

        // MP3 frames concatenate cleanly
        let mut audio = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let response = self
                .client
                .get(self.chunk_url(chunk, language, index, chunks.len()))
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                return Err(Error::Tts(format!("Google TTS error {status}")));
            }

            audio.extend_from_slice(&response.bytes().await?);
        }

        tokio::fs::write(out, &audio).await?;
        ensure_audio(out).await?;
        tracing::debug!(
            chunks = chunks.len(),
            bytes = audio.len(),
            "google-tts synthesis complete"
        );
        Ok(())
    }
}

async fn ensure_audio(path: &Path) -> Result<()> {
    let len = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
    if len == 0 {
        return Err(Error::Tts(format!("no audio written to {}", path.display())));
    }
    Ok(())
}

/// Split `text` on whitespace into chunks of at most `max` characters
///
/// Words longer than `max` are split mid-word.
#[must_use]
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for piece in chars.chunks(max) {
            let piece_len = piece.len();
            let separator = usize::from(current_len > 0);
            if current_len + separator + piece_len > max {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(piece);
            current_len += piece_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_respects_limit() {
        let text = "Facultatea de Automatică, Calculatoare, Inginerie Electrică și Electronică \
                    din Galați are patru programe de licență și mai multe programe de master.";
        let chunks = chunk_text(text, 40);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        assert_eq!(chunks.join(" "), text.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    #[test]
    fn test_chunk_splits_long_words() {
        let chunks = chunk_text("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_chunk_empty_text() {
        assert!(chunk_text("   ", 100).is_empty());
    }

    #[test]
    fn test_chunk_url_encodes_text() {
        let synth = GoogleTtsSynthesizer::default();
        let url = synth.chunk_url("ce faci?", Language::Ua, 0, 1);
        assert!(url.contains("tl=uk"));
        assert!(url.ends_with("q=ce%20faci%3F"));
    }

    #[tokio::test]
    async fn test_missing_binary_fails() {
        let synth = EdgeTtsSynthesizer::new("threeb-no-such-tts-binary");
        let dir = tempfile::tempdir().unwrap();
        let result = synth
            .synthesize("salut", Language::Ro, VoiceGender::Female, &dir.path().join("a.mp3"))
            .await;
        assert!(matches!(result, Err(Error::Tts(_))));
    }
}
