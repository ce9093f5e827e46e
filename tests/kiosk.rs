//! Kiosk orchestrator integration tests
//!
//! Everything runs headless: blank camera frames, scripted faces, a mock LLM
//! and a fake synthesizer/player pair.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use threeb_kiosk::character::{CharacterSignal, CharacterState, MascotView};
use threeb_kiosk::chat::{ChatSender, ReportLog};
use threeb_kiosk::kiosk::{Flow, Kiosk, KioskParts, KioskUi, Screen};
use threeb_kiosk::presence::Camera;
use threeb_kiosk::quiz::{QuizLog, chart};
use threeb_kiosk::tts::TtsManager;
use threeb_kiosk::assistant::{KnowledgeBase, ResponseFormat};
use threeb_kiosk::{Assistant, Language, LlmClient, VoiceGender};

mod common;
use common::{
    ADMIN, BlankSource, FaceScript, FakeSynth, MockLlm, RecordingMailer, RecordingPlayer, catalog,
    near_face, test_config,
};

type SynthCalls = Arc<Mutex<Vec<(String, Language, VoiceGender)>>>;

struct Harness {
    kiosk: Kiosk,
    camera: Arc<Camera>,
    faces: FaceScript,
    synth_calls: SynthCalls,
    played: Arc<AtomicUsize>,
    mailer: RecordingMailer,
    dir: tempfile::TempDir,
}

fn harness(llm: Arc<MockLlm>, with_camera: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let assistant = Arc::new(Assistant::new(
        Some(llm as Arc<dyn LlmClient>),
        KnowledgeBase::empty(),
        catalog(),
        ResponseFormat::Envelope,
    ));

    let synth = FakeSynth::default();
    let synth_calls = Arc::clone(&synth.calls);
    let player = RecordingPlayer::default();
    let played = Arc::clone(&player.played);
    let tts = TtsManager::new(vec![Arc::new(synth)], Arc::new(player));

    let camera = Arc::new(Camera::new(Box::new(BlankSource::default())));
    let faces = FaceScript::default();
    let presence = with_camera.then(|| (Arc::clone(&camera), faces.locator()));
    let mailer = RecordingMailer::default();

    let kiosk = Kiosk::new(
        config,
        KioskParts {
            assistant,
            tts: Some(tts),
            presence,
            mailer: Some(Arc::new(mailer.clone())),
        },
    );

    Harness {
        kiosk,
        camera,
        faces,
        synth_calls,
        played,
        mailer,
        dir,
    }
}

/// Let background work land, ticking the UI loop as the main loop would
async fn settle(kiosk: &mut Kiosk, millis: u64) {
    for _ in 0..millis / 10 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        kiosk.tick();
    }
}

fn reply(text: &str, refs: &str) -> Arc<MockLlm> {
    MockLlm::replying(&format!("{{\"msg\": \"{text}\", \"ref_ids\": [{refs}]}}"))
}

#[tokio::test]
async fn test_ask_posts_reply_with_cards_and_speaks() {
    let mut h = harness(reply("Avem patru programe.", "1"), false);

    assert_eq!(h.kiosk.handle_line("ask Ce specializări există?"), Flow::Continue);
    assert_eq!(h.kiosk.ui().screen(), Screen::Chat);

    let senders: Vec<_> = h.kiosk.ui().chat().turns().iter().map(|t| t.sender).collect();
    assert_eq!(
        senders,
        vec![ChatSender::System, ChatSender::User, ChatSender::System]
    );
    assert_eq!(
        h.kiosk.ui().chat().turns()[2].text,
        Language::Ro.strings().thinking
    );

    settle(&mut h.kiosk, 300).await;

    let last = h.kiosk.ui().chat().last_ai().unwrap();
    assert_eq!(last.text, "Avem patru programe.");
    assert_eq!(last.reference_ids, vec![1]);

    let output = h.kiosk.take_output().join("\n");
    assert!(output.contains("Ana: Avem patru programe."));
    assert!(output.contains("[1] Calculatoare https://aciee.ugal.ro/cti"));

    let calls = h.synth_calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "Avem patru programe.");
    assert_eq!(calls[0].1, Language::Ro);
    assert_eq!(h.played.load(Ordering::SeqCst), 1);

    h.kiosk.shutdown();
}

#[tokio::test]
async fn test_voice_off_stays_silent() {
    let mut h = harness(reply("Salut", ""), false);

    h.kiosk.handle_line("voice off");
    assert!(!h.kiosk.ui().voice_enabled());
    h.kiosk.handle_line("ask Salut");
    settle(&mut h.kiosk, 200).await;

    assert!(h.kiosk.ui().chat().last_ai().is_some());
    assert!(h.synth_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_reply_after_leaving_chat_is_dropped() {
    let llm = MockLlm::slow("{\"msg\": \"prea târziu\"}", Duration::from_millis(100));
    let mut h = harness(llm, false);

    h.kiosk.handle_line("ask Salut");
    h.kiosk.handle_line("home");
    assert!(h.kiosk.ui().chat().is_empty());

    settle(&mut h.kiosk, 300).await;
    assert!(h.kiosk.ui().chat().is_empty());
    assert!(h.synth_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_persona_and_language_changes_announce() {
    let mut h = harness(reply("ok", ""), false);
    h.kiosk.enter(Screen::Chat);

    h.kiosk.handle_line("persona 3");
    assert_eq!(h.kiosk.ui().persona().id, "bro");

    h.kiosk.handle_line("lang en");
    assert_eq!(h.kiosk.ui().language(), Language::En);

    let system: Vec<_> = h
        .kiosk
        .ui()
        .chat()
        .turns()
        .iter()
        .filter(|t| t.sender == ChatSender::System)
        .map(|t| t.text.clone())
        .collect();
    assert!(system.contains(&"Mod: Bro".to_string()));
    assert_eq!(system.last().unwrap(), Language::En.strings().language_changed);

    h.kiosk.handle_line("persona nobody");
    assert_eq!(h.kiosk.ui().persona().id, "bro");
}

#[tokio::test]
async fn test_report_records_last_reply() {
    let mut h = harness(reply("Răspuns greșit", ""), false);

    h.kiosk.handle_line("report");
    assert!(h.kiosk.take_output().iter().any(|l| l == "nothing to report"));

    h.kiosk.handle_line("ask Ceva");
    settle(&mut h.kiosk, 200).await;
    h.kiosk.handle_line("report");

    let reports = ReportLog::new(h.dir.path().join("reports.json")).reports().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].text, "Răspuns greșit");
    assert_eq!(reports[0].persona, "standard");
    assert_eq!(
        h.kiosk.ui().chat().turns().last().unwrap().text,
        Language::Ro.strings().report_sent
    );

    settle(&mut h.kiosk, 50).await;
    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, ADMIN);
    assert!(sent[0].html.contains("Răspuns greșit"));
    assert!(sent[0].attachments.is_empty());
}

#[tokio::test]
async fn test_quiz_command_scores_and_logs() {
    let mut h = harness(reply("ok", ""), false);

    h.kiosk.handle_line("quiz 333333333333 ana@example.com");
    assert_eq!(h.kiosk.ui().screen(), Screen::Quiz);
    let output = h.kiosk.take_output().join("\n");
    assert!(output.contains("result: Calculatoare și Tehnologia Informației (0.00, 0.00)"));

    h.kiosk.handle_line("quiz 333333333333 not-an-email");
    assert!(h.kiosk.take_output().iter().any(|l| l.contains("invalid email")));

    h.kiosk.handle_line("quiz 3 3 3 ana@example.com");
    assert!(h.kiosk.take_output().iter().any(|l| l.contains("expected 12 answers")));

    let entries = QuizLog::new(h.dir.path().join("quiz_logs.json")).entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result, "CTI");
    assert_eq!(entries[0].label, "Calculatoare și Tehnologia Informației");
    assert!(h.dir.path().join(chart::RESULT_CHART).exists());

    settle(&mut h.kiosk, 50).await;
    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ana@example.com");
    assert_eq!(sent[0].attachments[0].filename, chart::RESULT_CHART);
    let png = image::load_from_memory(&sent[0].attachments[0].data).unwrap();
    assert_eq!((png.width(), png.height()), chart::RESULT_CHART_SIZE);

    h.kiosk.handle_line("stats");
    let stats = h.kiosk.take_output().join("\n");
    assert!(stats.contains("1 quiz results"));
    assert!(stats.contains("Calculatoare și Tehnologia Informației"));
    assert!(h.dir.path().join(chart::COLLECTIVE_CHART).exists());
}

#[tokio::test]
async fn test_presence_wakes_mascot() {
    let mut h = harness(reply("ok", ""), true);
    h.kiosk.enter(Screen::Mascot);
    assert!(h.kiosk.detector().unwrap().is_active());
    assert!(h.kiosk.ui().status().is_empty());

    settle(&mut h.kiosk, 100).await;
    assert!(h.kiosk.ui().image().is_some());
    let state = |k: &Kiosk| k.animator().unwrap().character().lock().unwrap().state();
    assert_eq!(state(&h.kiosk), CharacterState::Sleeping);

    h.faces.set(vec![near_face()]);
    settle(&mut h.kiosk, 400).await;
    assert_eq!(state(&h.kiosk), CharacterState::ClickMe);

    h.kiosk.handle_line("tap");
    assert_eq!(state(&h.kiosk), CharacterState::Normal);

    h.kiosk.handle_line("home");
    assert!(h.kiosk.animator().is_none());
    assert!(!h.kiosk.detector().unwrap().is_active());
    assert!(h.camera.is_running());
    assert!(h.kiosk.ui().image().is_none());

    // A fresh mascot starts asleep again
    h.faces.set(Vec::new());
    h.kiosk.enter(Screen::Mascot);
    assert_eq!(state(&h.kiosk), CharacterState::Sleeping);

    h.kiosk.shutdown();
    assert!(!h.camera.is_running());
}

#[tokio::test]
async fn test_wink_signal_navigates_home() {
    let mut h = harness(reply("ok", ""), false);
    h.kiosk.enter(Screen::Mascot);

    let session = h.kiosk.ui().mascot_session();
    h.kiosk.queue().post(move |ui: &mut KioskUi| {
        ui.mascot_signal(session, CharacterSignal::NavigateHome);
    });
    h.kiosk.tick();

    assert_eq!(h.kiosk.ui().screen(), Screen::Home);
    assert!(h.kiosk.animator().is_none());
}

#[tokio::test]
async fn test_stale_wink_ignored_after_reentering_mascot() {
    let mut h = harness(reply("ok", ""), false);
    h.kiosk.enter(Screen::Mascot);
    let first = h.kiosk.ui().mascot_session();

    // The first animator's wink lands after the mascot was reopened
    h.kiosk.enter(Screen::Home);
    h.kiosk.enter(Screen::Mascot);
    assert_ne!(h.kiosk.ui().mascot_session(), first);
    h.kiosk.queue().post(move |ui: &mut KioskUi| {
        ui.mascot_signal(first, CharacterSignal::NavigateHome);
    });
    h.kiosk.tick();

    assert_eq!(h.kiosk.ui().screen(), Screen::Mascot);
    assert!(h.kiosk.animator().is_some());
    h.kiosk.shutdown();
}

#[tokio::test]
async fn test_mascot_without_camera_shows_placeholder_status() {
    let mut h = harness(reply("ok", ""), false);
    h.kiosk.enter(Screen::Mascot);

    assert!(h.kiosk.detector().is_none());
    assert_eq!(
        h.kiosk.ui().status(),
        Language::Ro.strings().camera_unavailable
    );
    assert!(h.kiosk.animator().is_some());
    h.kiosk.shutdown();
}

#[tokio::test]
async fn test_unknown_input_and_quit() {
    let mut h = harness(reply("ok", ""), false);

    assert_eq!(h.kiosk.handle_line("dance"), Flow::Continue);
    assert!(h.kiosk.take_output()[0].starts_with("invalid command: dance"));
    assert_eq!(h.kiosk.handle_line("   "), Flow::Continue);
    assert_eq!(h.kiosk.handle_line("quit"), Flow::Quit);
}
