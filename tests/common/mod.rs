//! Shared test doubles for hardware and network seams

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use threeb_kiosk::assistant::{Specialization, SpecializationCatalog};
use threeb_kiosk::mail::{Mail, MailTransport};
use threeb_kiosk::presence::FrameSource;
use threeb_kiosk::tts::{AudioPlayer, PlaybackControl, Synthesizer};
use threeb_kiosk::{
    Config, Error, FaceBox, FaceLocator, GrayFrame, Language, LlmClient, Result, VoiceGender,
};

/// Detection frame size used by the fakes
pub const FRAME: (u32, u32) = (320, 240);

/// A face covering a quarter of the frame
#[must_use]
pub const fn near_face() -> FaceBox {
    FaceBox::new(80, 60, 160, 120)
}

/// A face well under the area threshold
#[must_use]
pub const fn far_face() -> FaceBox {
    FaceBox::new(0, 0, 40, 40)
}

/// Frame source producing blank frames and counting opens
#[derive(Default)]
pub struct BlankSource {
    pub opens: Arc<AtomicUsize>,
}

impl FrameSource for BlankSource {
    fn open(&mut self) -> Result<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn capture(&mut self) -> Result<GrayFrame> {
        Ok(GrayFrame::blank(FRAME.0, FRAME.1))
    }

    fn close(&mut self) {}
}

/// Frame source whose device never opens
pub struct BrokenSource;

impl FrameSource for BrokenSource {
    fn open(&mut self) -> Result<()> {
        Err(Error::Camera("no device".to_string()))
    }

    fn capture(&mut self) -> Result<GrayFrame> {
        Err(Error::Camera("no device".to_string()))
    }

    fn close(&mut self) {}
}

/// Faces the scripted locator reports, changeable while a detector runs
#[derive(Clone, Default)]
pub struct FaceScript(Arc<Mutex<Vec<FaceBox>>>);

impl FaceScript {
    pub fn set(&self, faces: Vec<FaceBox>) {
        *self.0.lock().unwrap() = faces;
    }

    #[must_use]
    pub fn locator(&self) -> Box<dyn FaceLocator> {
        Box::new(ScriptedLocator(self.clone()))
    }
}

struct ScriptedLocator(FaceScript);

impl FaceLocator for ScriptedLocator {
    fn locate(&mut self, _frame: &GrayFrame) -> Result<Vec<FaceBox>> {
        Ok(self.0.0.lock().unwrap().clone())
    }
}

/// LLM returning a fixed reply (or failing) and recording prompts
pub struct MockLlm {
    reply: Option<String>,
    delay: Duration,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    #[must_use]
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            delay,
            prompts: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    fn model(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply
            .clone()
            .ok_or_else(|| Error::Llm("service unavailable".to_string()))
    }
}

/// Synthesizer that writes a few placeholder bytes
#[derive(Default)]
pub struct FakeSynth {
    pub calls: Arc<Mutex<Vec<(String, Language, VoiceGender)>>>,
}

#[async_trait]
impl Synthesizer for FakeSynth {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn synthesize(
        &self,
        text: &str,
        language: Language,
        gender: VoiceGender,
        out: &Path,
    ) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), language, gender));
        tokio::fs::write(out, b"ID3").await?;
        Ok(())
    }
}

/// Player that records what it was asked to play
#[derive(Default)]
pub struct RecordingPlayer {
    pub played: Arc<AtomicUsize>,
}

impl AudioPlayer for RecordingPlayer {
    fn play_file(&self, path: &Path, _control: &PlaybackControl) -> Result<()> {
        assert!(path.exists(), "temp audio missing during playback");
        self.played.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mail transport that keeps every mail instead of sending it
#[derive(Clone, Default)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<Mail>>>,
}

impl RecordingMailer {
    #[must_use]
    pub fn sent(&self) -> Vec<Mail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send(&self, mail: Mail) -> Result<()> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

/// Address reported replies are mailed to in tests
pub const ADMIN: &str = "admin@example.com";

/// Two-card catalog with ids 1 and 2
#[must_use]
pub fn catalog() -> SpecializationCatalog {
    SpecializationCatalog::from_cards([
        (
            1,
            Specialization {
                name: "Calculatoare".to_string(),
                acronym: Some("CTI".to_string()),
                tags: "SOFTWARE".to_string(),
                description: String::new(),
                url: Some("https://aciee.ugal.ro/cti".to_string()),
                icon: None,
            },
        ),
        (
            2,
            Specialization {
                name: "Automatică".to_string(),
                acronym: Some("AIA".to_string()),
                tags: "ROBOTICS".to_string(),
                description: String::new(),
                url: None,
                icon: None,
            },
        ),
    ])
}

/// Defaults with every data file under `dir` and fast presence timing
#[must_use]
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.data_dir = dir.to_path_buf();
    config.paths.knowledge_base = dir.join("data.json");
    config.paths.specializations = dir.join("specializations.json");
    config.paths.quiz_log = dir.join("quiz_logs.json");
    config.paths.report_log = dir.join("reports.json");
    config.character.assets_dir = dir.to_path_buf();
    config.presence.time_to_trigger = Duration::from_millis(60);
    config.presence.poll_interval = Duration::from_millis(5);
    config.mail.admin = Some(ADMIN.to_string());
    config
}
