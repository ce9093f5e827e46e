//! Audio playback to speakers

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Pause and cancel flags for one utterance
#[derive(Debug, Clone, Default)]
pub struct PlaybackControl {
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl PlaybackControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Plays an audio file to completion, honouring `control`
///
/// Blocking; callers run it off the async runtime.
pub trait AudioPlayer: Send + Sync {
    /// Play the file at `path`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be decoded or the device fails
    fn play_file(&self, path: &Path, control: &PlaybackControl) -> Result<()>;
}

/// Plays MP3 files on the default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct SpeakerPlayer;

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioPlayer for SpeakerPlayer {
    fn play_file(&self, path: &Path, control: &PlaybackControl) -> Result<()> {
        let bytes = std::fs::read(path)?;
        let audio = decode_mp3(&bytes)?;
        play_samples(audio.samples, audio.sample_rate, control)
    }
}

/// Play mono `samples` at `sample_rate`, blocking until done or cancelled
///
/// While paused the device receives silence and the position is held.
///
/// # Errors
///
/// Returns error if no suitable output device or config is available
pub fn play_samples(samples: Vec<f32>, sample_rate: u32, control: &PlaybackControl) -> Result<()> {
    if samples.is_empty() || control.is_cancelled() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let config = output_config(&device, sample_rate)?;
    let channels = usize::from(config.channels);

    let sample_count = samples.len();
    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        let finished = Arc::clone(&finished);
        let control = control.clone();

        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if control.is_paused() || control.is_cancelled() {
                        data.fill(0.0);
                        return;
                    }

                    let mut pos = position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(pos).copied().unwrap_or_else(|| {
                            finished.store(true, Ordering::Release);
                            0.0
                        });
                        frame.fill(sample);
                        if pos < samples.len() {
                            pos += 1;
                        }
                    }
                    position.store(pos, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (sample_count as u64 * 1000) / u64::from(sample_rate.max(1));
    let timeout = Duration::from_millis(duration_ms + 500);
    let poll = Duration::from_millis(50);

    // Time spent paused does not count against the timeout
    let mut played = Duration::ZERO;
    let mut last = Instant::now();
    while !finished.load(Ordering::Acquire) && !control.is_cancelled() {
        let now = Instant::now();
        if !control.is_paused() {
            played += now - last;
        }
        last = now;

        if played > timeout {
            tracing::warn!("playback timed out");
            break;
        }
        std::thread::sleep(poll);
    }

    if !control.is_cancelled() {
        std::thread::sleep(Duration::from_millis(100));
    }

    drop(stream);
    tracing::debug!(
        samples = sample_count,
        cancelled = control.is_cancelled(),
        "playback complete"
    );

    Ok(())
}

fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
    };

    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| supports(c, 1))
        .or_else(|| {
            device
                .supported_output_configs()
                .ok()?
                .find(|c| supports(c, 2))
        })
        .ok_or_else(|| {
            Error::Audio(format!("no output config supports {sample_rate} Hz"))
        })?;

    let config = supported.with_sample_rate(rate).config();
    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels = config.channels,
        "audio output configured"
    );
    Ok(config)
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                }

                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("no MP3 frames found".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// A sine tone for speaker checks
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn sine_tone(frequency: f32, duration: Duration, sample_rate: u32) -> Vec<f32> {
    let count = (duration.as_secs_f32() * sample_rate as f32) as usize;
    (0..count)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.3 * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_flags() {
        let control = PlaybackControl::new();
        let shared = control.clone();
        shared.pause();
        assert!(control.is_paused());
        shared.resume();
        assert!(!control.is_paused());
        shared.cancel();
        assert!(control.is_cancelled());
    }

    #[test]
    fn test_cancelled_playback_returns_immediately() {
        let control = PlaybackControl::new();
        control.cancel();
        assert!(play_samples(vec![0.0; 10], 24_000, &control).is_ok());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_mp3(b"definitely not mp3").is_err());
    }

    #[test]
    fn test_sine_tone_length() {
        let tone = sine_tone(440.0, Duration::from_millis(500), 24_000);
        assert_eq!(tone.len(), 12_000);
        assert!(tone.iter().all(|s| s.abs() <= 0.3));
    }
}
