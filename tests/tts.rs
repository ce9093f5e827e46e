//! Speech manager integration tests
//!
//! Synthesizers and the player are fakes; the player blocks until the
//! utterance is cancelled so preemption and stop can be observed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use threeb_kiosk::tts::{AudioPlayer, PlaybackControl, Synthesizer, TtsManager};
use threeb_kiosk::{Error, Language, Result, VoiceGender};

type CallLog = Arc<Mutex<Vec<String>>>;

/// Synthesizer that logs `name:text` and either writes a file or fails
struct ScriptedSynth {
    name: &'static str,
    fails: bool,
    log: CallLog,
}

impl ScriptedSynth {
    fn boxed(name: &'static str, fails: bool, log: &CallLog) -> Arc<dyn Synthesizer> {
        Arc::new(Self {
            name,
            fails,
            log: Arc::clone(log),
        })
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynth {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn synthesize(
        &self,
        text: &str,
        _language: Language,
        _gender: VoiceGender,
        out: &Path,
    ) -> Result<()> {
        self.log.lock().unwrap().push(format!("{}:{text}", self.name));
        if self.fails {
            return Err(Error::Tts(format!("{} offline", self.name)));
        }
        tokio::fs::write(out, b"ID3").await?;
        Ok(())
    }
}

/// Player that holds each file until its utterance is cancelled
#[derive(Clone, Default)]
struct BlockingPlayer {
    paths: Arc<Mutex<Vec<PathBuf>>>,
    saw_pause: Arc<AtomicBool>,
}

impl BlockingPlayer {
    fn paths(&self) -> Vec<PathBuf> {
        self.paths.lock().unwrap().clone()
    }
}

impl AudioPlayer for BlockingPlayer {
    fn play_file(&self, path: &Path, control: &PlaybackControl) -> Result<()> {
        self.paths.lock().unwrap().push(path.to_path_buf());
        while !control.is_cancelled() {
            if control.is_paused() {
                self.saw_pause.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }
}

/// Poll `condition` for up to two seconds
async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn manager(log: &CallLog, player: &BlockingPlayer) -> TtsManager {
    TtsManager::new(
        vec![
            ScriptedSynth::boxed("edge", true, log),
            ScriptedSynth::boxed("http", false, log),
        ],
        Arc::new(player.clone()),
    )
}

#[tokio::test]
async fn test_new_utterance_preempts_and_falls_back_in_order() {
    let log = CallLog::default();
    let player = BlockingPlayer::default();
    let tts = manager(&log, &player);

    tts.speak("one", Language::Ro, VoiceGender::Female);
    assert!(wait_until(|| player.paths().len() == 1).await);
    let first = player.paths()[0].clone();
    assert!(first.exists());
    assert!(tts.is_speaking());

    tts.speak("two", Language::Ro, VoiceGender::Female);
    assert!(wait_until(|| player.paths().len() == 2).await);

    // The first playback was cancelled and its temp file removed
    assert!(wait_until(|| !first.exists()).await);
    assert!(player.paths()[1].exists());
    assert_eq!(
        log.lock().unwrap().clone(),
        vec!["edge:one", "http:one", "edge:two", "http:two"]
    );

    tts.stop();
}

#[tokio::test]
async fn test_stop_removes_temp_audio() {
    let log = CallLog::default();
    let player = BlockingPlayer::default();
    let tts = manager(&log, &player);

    tts.speak("Salut", Language::Ro, VoiceGender::Male);
    assert!(wait_until(|| player.paths().len() == 1).await);
    let path = player.paths()[0].clone();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("threeb-tts-"));
    assert!(name.ends_with(".mp3"));

    tts.stop();
    assert!(!tts.is_speaking());
    assert!(wait_until(|| !path.exists()).await);
}

#[tokio::test]
async fn test_pause_and_unpause_reach_the_player() {
    let log = CallLog::default();
    let player = BlockingPlayer::default();
    let tts = manager(&log, &player);

    assert!(!tts.is_paused());
    tts.speak("Hello", Language::En, VoiceGender::Female);
    assert!(wait_until(|| player.paths().len() == 1).await);

    tts.pause();
    assert!(tts.is_paused());
    assert!(wait_until(|| player.saw_pause.load(Ordering::SeqCst)).await);
    assert!(tts.is_speaking());

    tts.unpause();
    assert!(!tts.is_paused());
    assert!(tts.is_speaking());

    tts.stop();
    assert!(!tts.is_paused());
}

#[tokio::test]
async fn test_all_synthesizers_failing_skips_playback() {
    let log = CallLog::default();
    let player = BlockingPlayer::default();
    let tts = TtsManager::new(
        vec![
            ScriptedSynth::boxed("edge", true, &log),
            ScriptedSynth::boxed("http", true, &log),
        ],
        Arc::new(player.clone()),
    );

    tts.speak("nimic", Language::Ua, VoiceGender::Female);
    tts.finished().await;

    assert!(!tts.is_speaking());
    assert!(player.paths().is_empty());
    assert_eq!(log.lock().unwrap().clone(), vec!["edge:nimic", "http:nimic"]);
}
