//! Headless kiosk orchestrator
//!
//! Owns the screens and wires the mascot, presence detection, assistant and
//! speech together. Background threads and tasks never touch [`KioskUi`]
//! directly: they post through the [`UiQueue`] and the main loop drains it
//! on every tick.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::assistant::{Assistant, AssistantReply, shortcut_questions};
use crate::character::{Animator, BEHAVIOR_TICK, Character, CharacterSignal, MascotView};
use crate::chat::{ChatSession, ReportLog};
use crate::config::PresenceConfig;
use crate::mail::{self, Mail, MailTransport, SmtpMailer};
use crate::persona::PERSONAS;
use crate::presence::{
    Camera, FaceLocator, FrameSource, ImageSequenceSource, PresenceDetector, PresenceThresholds,
    camera,
};
use crate::quiz::{self, QUESTIONS, QuizLog, chart};
use crate::tts::TtsManager;
use crate::ui::{self, UiLoop, UiQueue};
use crate::{Config, Error, Language, Persona, Result};

/// Interval between UI queue drains
pub const UI_TICK: Duration = Duration::from_millis(33);

/// Suggested questions shown when a chat opens
const SHORTCUT_COUNT: usize = 3;

/// Latest quiz results listed on the info screen
const RECENT_RESULTS: usize = 5;

/// Kiosk screens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Mascot,
    Home,
    Chat,
    Quiz,
    Info,
    Settings,
}

impl Screen {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mascot => "mascot",
            Self::Home => "home",
            Self::Chat => "chat",
            Self::Quiz => "quiz",
            Self::Info => "info",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Work queued for the orchestrator by UI tasks
#[derive(Debug)]
enum KioskEvent {
    PresenceDetected,
    Navigate(Screen),
    Reply {
        reply: AssistantReply,
        generation: u64,
    },
}

/// State owned by the UI loop
#[derive(Debug)]
pub struct KioskUi {
    screen: Screen,
    image: Option<PathBuf>,
    /// Bumped each time the mascot screen opens; older animators are ignored
    mascot_session: u64,
    chat: ChatSession,
    /// Bumped whenever the chat is torn down so late replies are dropped
    chat_generation: u64,
    status: String,
    persona: &'static Persona,
    language: Language,
    voice: bool,
    events: Vec<KioskEvent>,
    output: Vec<String>,
}

impl KioskUi {
    fn new(persona: &'static Persona, language: Language, voice: bool) -> Self {
        Self {
            screen: Screen::Home,
            image: None,
            mascot_session: 0,
            chat: ChatSession::new(),
            chat_generation: 0,
            status: String::new(),
            persona,
            language,
            voice,
            events: Vec::new(),
            output: Vec::new(),
        }
    }

    #[must_use]
    pub const fn screen(&self) -> Screen {
        self.screen
    }

    /// Mascot frame currently displayed
    #[must_use]
    pub fn image(&self) -> Option<&Path> {
        self.image.as_deref()
    }

    /// Session of the animator currently allowed to draw
    #[must_use]
    pub const fn mascot_session(&self) -> u64 {
        self.mascot_session
    }

    #[must_use]
    pub const fn chat(&self) -> &ChatSession {
        &self.chat
    }

    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    #[must_use]
    pub const fn persona(&self) -> &'static Persona {
        self.persona
    }

    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    #[must_use]
    pub const fn voice_enabled(&self) -> bool {
        self.voice
    }

    /// Lines rendered since the last call
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    fn say(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    fn announce(&mut self, text: &str) {
        self.chat.push_system(text);
        self.say(format!("* {text}"));
    }
}

impl KioskUi {
    /// Whether a post from animator `session` still belongs on screen
    fn is_current_mascot(&self, session: u64) -> bool {
        self.screen == Screen::Mascot && session == self.mascot_session
    }
}

impl MascotView for KioskUi {
    fn show_frame(&mut self, session: u64, path: &Path) {
        // Frames queued by an animator that has since been stopped
        if !self.is_current_mascot(session) {
            return;
        }
        tracing::trace!(frame = %path.display(), "mascot frame");
        self.image = Some(path.to_path_buf());
    }

    fn mascot_signal(&mut self, session: u64, signal: CharacterSignal) {
        if !self.is_current_mascot(session) {
            tracing::debug!(session, ?signal, "stale mascot signal dropped");
            return;
        }
        match signal {
            CharacterSignal::NavigateHome => self.events.push(KioskEvent::Navigate(Screen::Home)),
        }
    }
}

/// One line of operator input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KioskCommand {
    Tap,
    Wake,
    Go(Screen),
    Ask(String),
    Persona(String),
    Language(Language),
    Voice(bool),
    PauseSpeech,
    ResumeSpeech,
    StopSpeech,
    Report,
    Quiz { answers: Vec<u8>, email: String },
    Stats,
    Help,
    Quit,
}

impl FromStr for KioskCommand {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim()));

        let command = match (word.to_lowercase().as_str(), rest) {
            ("tap", "") => Self::Tap,
            ("wake", "") => Self::Wake,
            ("home", "") => Self::Go(Screen::Home),
            ("mascot", "") => Self::Go(Screen::Mascot),
            ("chat", "") => Self::Go(Screen::Chat),
            ("info", "") => Self::Go(Screen::Info),
            ("settings", "") => Self::Go(Screen::Settings),
            ("quiz", "") => Self::Go(Screen::Quiz),
            ("ask", question) if !question.is_empty() => Self::Ask(question.to_string()),
            ("persona", key) if !key.is_empty() => Self::Persona(key.to_string()),
            ("lang" | "language", code) if !code.is_empty() => Self::Language(code.parse()?),
            ("voice", "on") => Self::Voice(true),
            ("voice", "off") => Self::Voice(false),
            ("pause", "") => Self::PauseSpeech,
            ("resume", "") => Self::ResumeSpeech,
            ("hush", "") => Self::StopSpeech,
            ("report", "") => Self::Report,
            ("quiz", args) => parse_quiz(args)?,
            ("stats", "") => Self::Stats,
            ("help" | "?", "") => Self::Help,
            ("quit" | "exit", "") => Self::Quit,
            _ => return Err(Error::Command(line.to_string())),
        };
        Ok(command)
    }
}

/// `quiz <answers> <email>`; answers are separate numbers or one digit string
fn parse_quiz(args: &str) -> Result<KioskCommand> {
    let mut tokens: Vec<&str> = args.split_whitespace().collect();
    let email = tokens
        .pop()
        .ok_or_else(|| Error::Command("quiz needs answers and an email".to_string()))?;

    let digits: Vec<String> = match tokens.as_slice() {
        [single] if single.len() > 1 && single.chars().all(|c| c.is_ascii_digit()) => {
            single.chars().map(String::from).collect()
        }
        many => many.iter().map(ToString::to_string).collect(),
    };

    let answers = digits
        .iter()
        .map(|d| {
            d.parse::<u8>()
                .map_err(|_| Error::Command(format!("not an answer: {d}")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(KioskCommand::Quiz {
        answers,
        email: email.to_string(),
    })
}

const HELP: &str = "commands: tap | wake | home | mascot | chat | info | settings | quiz \
                    | ask <question> | persona <id|n> | lang <ro|en|ua> | voice on|off \
                    | pause | resume | hush | report | quiz <12 answers> <email> | stats | quit";

/// Whether the main loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Optional hardware the kiosk can run without
#[derive(Debug, Clone, Copy)]
pub struct KioskOptions {
    pub camera: bool,
    pub voice: bool,
}

impl Default for KioskOptions {
    fn default() -> Self {
        Self {
            camera: true,
            voice: true,
        }
    }
}

/// Collaborators handed to [`Kiosk::new`]
pub struct KioskParts {
    pub assistant: Arc<Assistant>,
    pub tts: Option<TtsManager>,
    pub presence: Option<(Arc<Camera>, Box<dyn FaceLocator>)>,
    /// Outgoing mail; reports and quiz results stay local without it
    pub mailer: Option<Arc<dyn MailTransport>>,
}

/// The kiosk orchestrator
pub struct Kiosk {
    config: Config,
    ui: KioskUi,
    queue: UiQueue<KioskUi>,
    ui_loop: UiLoop<KioskUi>,
    assistant: Arc<Assistant>,
    tts: Option<TtsManager>,
    camera: Option<Arc<Camera>>,
    detector: Option<PresenceDetector>,
    animator: Option<Animator>,
    quiz_log: QuizLog,
    reports: ReportLog,
    mailer: Option<Arc<dyn MailTransport>>,
}

impl Kiosk {
    /// Assemble a kiosk on the home screen; [`run`](Self::run) opens the mascot
    #[must_use]
    pub fn new(config: Config, parts: KioskParts) -> Self {
        let (queue, ui_loop) = ui::channel::<KioskUi>();

        let (camera, detector) = match parts.presence {
            Some((camera, locator)) => {
                let wake_queue = queue.clone();
                let detector = PresenceDetector::new(
                    Arc::clone(&camera),
                    locator,
                    PresenceThresholds::from(&config.presence),
                    config.presence.poll_interval,
                    move || {
                        wake_queue.post(|ui: &mut KioskUi| {
                            ui.events.push(KioskEvent::PresenceDetected);
                        });
                    },
                );
                (Some(camera), Some(detector))
            }
            None => (None, None),
        };

        let ui = KioskUi::new(config.persona, config.language, parts.tts.is_some());

        Self {
            quiz_log: QuizLog::new(config.paths.quiz_log.clone()),
            reports: ReportLog::new(config.paths.report_log.clone()),
            config,
            ui,
            queue,
            ui_loop,
            assistant: parts.assistant,
            tts: parts.tts,
            camera,
            detector,
            animator: None,
            mailer: parts.mailer,
        }
    }

    /// Kiosk backed by Gemini, the speakers and the process-wide camera
    #[must_use]
    pub fn from_config(config: Config, options: KioskOptions) -> Self {
        let assistant = Arc::new(Assistant::from_config(&config));

        let tts = (options.voice && config.tts.enabled)
            .then(|| TtsManager::from_config(&config.tts));
        if tts.is_none() {
            tracing::info!("voice disabled");
        }

        let presence = if options.camera && config.presence.enabled {
            presence_parts(&config.presence)
        } else {
            tracing::info!("presence detection disabled");
            None
        };

        let mailer = match SmtpMailer::from_config(&config.mail) {
            Ok(Some(mailer)) => Some(Arc::new(mailer) as Arc<dyn MailTransport>),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "mail disabled");
                None
            }
        };

        Self::new(
            config,
            KioskParts {
                assistant,
                tts,
                presence,
                mailer,
            },
        )
    }

    #[must_use]
    pub const fn ui(&self) -> &KioskUi {
        &self.ui
    }

    /// Lines rendered since the last call
    pub fn take_output(&mut self) -> Vec<String> {
        self.ui.take_output()
    }

    /// Handle for posting tasks to the UI loop
    #[must_use]
    pub fn queue(&self) -> UiQueue<KioskUi> {
        self.queue.clone()
    }

    #[must_use]
    pub const fn animator(&self) -> Option<&Animator> {
        self.animator.as_ref()
    }

    #[must_use]
    pub const fn detector(&self) -> Option<&PresenceDetector> {
        self.detector.as_ref()
    }

    /// Switch screens, tearing down the one being left
    pub fn enter(&mut self, screen: Screen) {
        let previous = self.ui.screen;
        if previous == screen {
            return;
        }

        self.leave(previous);
        self.ui.screen = screen;
        tracing::info!(from = %previous, to = %screen, "screen changed");

        match screen {
            Screen::Mascot => self.open_mascot(),
            Screen::Home => self.ui.say("[home] chat | quiz | info | settings | mascot"),
            Screen::Chat => self.open_chat(),
            Screen::Quiz => self.open_quiz(),
            Screen::Info => self.show_stats(),
            Screen::Settings => self.open_settings(),
        }
    }

    fn leave(&mut self, screen: Screen) {
        match screen {
            Screen::Mascot => {
                if let Some(mut animator) = self.animator.take() {
                    animator.stop();
                }
                if let Some(detector) = &mut self.detector {
                    detector.stop();
                }
                self.ui.image = None;
            }
            Screen::Chat => {
                self.ui.chat.clear();
                self.ui.chat_generation += 1;
                if let Some(tts) = &self.tts {
                    tts.stop();
                }
            }
            Screen::Home | Screen::Quiz | Screen::Info | Screen::Settings => {}
        }
    }

    fn open_mascot(&mut self) {
        self.ui.mascot_session += 1;
        let character = Character::new(&self.config.character);
        match Animator::spawn(
            character,
            self.config.character.assets_dir.clone(),
            BEHAVIOR_TICK,
            self.ui.mascot_session,
            self.queue.clone(),
        ) {
            Ok(animator) => self.animator = Some(animator),
            Err(e) => tracing::error!(error = %e, "failed to start mascot"),
        }

        let camera_unavailable = self.ui.language.strings().camera_unavailable;
        match &mut self.detector {
            Some(detector) => match detector.start() {
                Ok(()) => self.ui.status.clear(),
                Err(e) => {
                    tracing::warn!(error = %e, "presence detection unavailable");
                    self.ui.status = camera_unavailable.to_string();
                }
            },
            None => self.ui.status = camera_unavailable.to_string(),
        }

        self.ui.say("[mascot] tap or step closer to wake");
    }

    fn open_chat(&mut self) {
        let strings = self.ui.language.strings();
        self.ui.say(format!("[chat] {}", self.ui.persona.label));
        self.ui.announce(strings.welcome);
        for question in shortcut_questions(SHORTCUT_COUNT) {
            self.ui.say(format!("  ? {question}"));
        }
    }

    fn open_quiz(&mut self) {
        self.ui.say("[quiz] answer 1 (disagree) to 5 (agree):");
        let language = self.ui.language;
        for (i, question) in QUESTIONS.iter().enumerate() {
            self.ui.say(format!("  {:>2}. {}", i + 1, question.text(language)));
        }
    }

    fn open_settings(&mut self) {
        self.ui.say("[settings]");
        for (i, persona) in PERSONAS.iter().enumerate() {
            let marker = if persona.id == self.ui.persona.id { '*' } else { ' ' };
            self.ui.say(format!(" {marker}{}. {} ({})", i + 1, persona.label, persona.id));
        }
        self.ui.say(format!("  language: {}", self.ui.language));
    }

    fn show_stats(&mut self) {
        let entries = match self.quiz_log.entries() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read quiz log");
                self.ui.say(format!("[info] {e}"));
                return;
            }
        };
        let points: Vec<_> = entries.iter().map(|e| e.coordinate).collect();
        let language = self.ui.language;

        self.ui.say(format!("[info] {} quiz results", points.len()));
        for (quadrant, count) in quiz::tally(&points) {
            self.ui.say(format!(
                "  {:<5} {count:>4}  {}",
                quadrant.acronym(),
                quadrant.label(language)
            ));
        }
        for entry in entries.iter().rev().take(RECENT_RESULTS) {
            let label = if entry.label.is_empty() { &entry.result } else { &entry.label };
            self.ui.say(format!("  {} {label}", entry.timestamp));
        }

        let path = self.quiz_log.chart_dir().join(chart::COLLECTIVE_CHART);
        match chart::save(&chart::collective_chart(&points), &path) {
            Ok(()) => self.ui.say(format!("  chart: {}", path.display())),
            Err(e) => tracing::warn!(error = %e, "failed to write collective chart"),
        }
    }

    /// Parse and run one line of input
    pub fn handle_line(&mut self, line: &str) -> Flow {
        if line.trim().is_empty() {
            return Flow::Continue;
        }
        match line.parse::<KioskCommand>() {
            Ok(command) => self.handle(command),
            Err(e) => {
                tracing::debug!(error = %e, "rejected input");
                self.ui.say(format!("{e} (try `help`)"));
                Flow::Continue
            }
        }
    }

    /// Run one command
    pub fn handle(&mut self, command: KioskCommand) -> Flow {
        tracing::debug!(?command, screen = %self.ui.screen, "command");
        match command {
            KioskCommand::Tap => match self.mascot() {
                Some(animator) => animator.tap(),
                None => self.ui.say("nothing to tap here"),
            },
            KioskCommand::Wake => {
                if let Some(animator) = self.mascot() {
                    animator.wake_up();
                }
            }
            KioskCommand::Go(screen) => self.enter(screen),
            KioskCommand::Ask(question) => self.ask(&question),
            KioskCommand::Persona(key) => self.set_persona(&key),
            KioskCommand::Language(language) => self.set_language(language),
            KioskCommand::Voice(on) => self.set_voice(on),
            KioskCommand::PauseSpeech => self.with_tts(TtsManager::pause),
            KioskCommand::ResumeSpeech => self.with_tts(TtsManager::unpause),
            KioskCommand::StopSpeech => self.with_tts(TtsManager::stop),
            KioskCommand::Report => self.report(),
            KioskCommand::Quiz { answers, email } => self.submit_quiz(&answers, &email),
            KioskCommand::Stats => self.show_stats(),
            KioskCommand::Help => self.ui.say(HELP),
            KioskCommand::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// The animator, while the mascot screen is showing
    fn mascot(&self) -> Option<&Animator> {
        self.animator
            .as_ref()
            .filter(|_| self.ui.screen == Screen::Mascot)
    }

    fn with_tts(&self, action: impl FnOnce(&TtsManager)) {
        if let Some(tts) = &self.tts {
            action(tts);
        }
    }

    /// Send a question to the assistant on a background task
    ///
    /// Must be called from within a Tokio runtime.
    fn ask(&mut self, question: &str) {
        let question = question.trim().to_string();
        if question.is_empty() {
            return;
        }
        if self.ui.screen != Screen::Chat {
            self.enter(Screen::Chat);
        }

        self.ui.chat.push_user(question.as_str());
        self.ui.say(format!("> {question}"));
        let thinking = self.ui.language.strings().thinking;
        self.ui.announce(thinking);

        let assistant = Arc::clone(&self.assistant);
        let queue = self.queue.clone();
        let persona = self.ui.persona;
        let language = self.ui.language;
        let generation = self.ui.chat_generation;

        tokio::spawn(async move {
            let reply = assistant.ask(&question, persona, language).await;
            queue.post(move |ui: &mut KioskUi| {
                ui.events.push(KioskEvent::Reply { reply, generation });
            });
        });
    }

    fn on_reply(&mut self, reply: AssistantReply, generation: u64) {
        if generation != self.ui.chat_generation {
            tracing::debug!("reply arrived after chat closed, dropped");
            return;
        }

        let persona = self.ui.persona;
        let language = self.ui.language;
        let text = reply.text.clone();

        self.ui.say(format!("{}: {text}", persona.name));
        let cards: Vec<String> = self
            .assistant
            .catalog()
            .resolve(&reply.reference_ids)
            .into_iter()
            .map(|(id, card)| format!("  [{id}] {} {}", card.name, card.link()))
            .collect();
        for card in cards {
            self.ui.say(card);
        }
        self.ui.chat.push_ai(reply);

        if let Some(tts) = self.tts.as_ref().filter(|_| self.ui.voice) {
            tts.speak(&text, language, persona.gender);
        }
    }

    fn set_persona(&mut self, key: &str) {
        match Persona::find(key) {
            Ok(persona) => {
                self.ui.persona = persona;
                self.with_tts(TtsManager::stop);
                let text = format!("{}{}", self.ui.language.strings().mode_changed, persona.label);
                self.ui.announce(&text);
                tracing::info!(persona = persona.id, "persona changed");
            }
            Err(e) => self.ui.say(e.to_string()),
        }
    }

    fn set_language(&mut self, language: Language) {
        self.ui.language = language;
        self.ui.announce(language.strings().language_changed);
        tracing::info!(%language, "language changed");
    }

    fn set_voice(&mut self, on: bool) {
        if on && self.tts.is_none() {
            self.ui.say("voice unavailable");
            return;
        }
        self.ui.voice = on;
        if !on {
            self.with_tts(TtsManager::stop);
        }
        self.ui.say(if on { "voice on" } else { "voice off" });
    }

    fn report(&mut self) {
        let Some(text) = self.ui.chat.last_ai().map(|turn| turn.text.clone()) else {
            self.ui.say("nothing to report");
            return;
        };

        let report = match self
            .reports
            .record(self.ui.persona.id, self.ui.language.code(), &text)
        {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "failed to record report");
                return;
            }
        };

        match &self.config.mail.admin {
            Some(admin) => self.send_mail(mail::report_mail(admin, &report)),
            None => tracing::debug!("EMAIL_ADMIN not set, report kept locally"),
        }
        let sent = self.ui.language.strings().report_sent;
        self.ui.announce(sent);
    }

    /// Deliver `mail` on a background task; failures are only logged
    fn send_mail(&self, mail: Mail) {
        let Some(mailer) = self.mailer.clone() else {
            tracing::debug!(to = %mail.to, "no mailer configured, mail not sent");
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(to = %mail.to, "no async runtime, mail not sent");
            return;
        };

        runtime.spawn(async move {
            let to = mail.to.clone();
            if let Err(e) = mailer.send(mail).await {
                tracing::warn!(%to, error = %e, "failed to send mail");
            }
        });
    }

    fn submit_quiz(&mut self, answers: &[u8], email: &str) {
        if self.ui.screen != Screen::Quiz {
            self.enter(Screen::Quiz);
        }

        let language = self.ui.language;
        let submission = match quiz::submit(&self.quiz_log, email, answers, language) {
            Ok(submission) => submission,
            Err(e) => {
                self.ui.say(e.to_string());
                return;
            }
        };

        let c = submission.entry.coordinate;
        self.ui.say(format!(
            "result: {} ({:.2}, {:.2})",
            submission.entry.label, c.x, c.y
        ));
        let chart = self.quiz_log.chart_dir().join(chart::RESULT_CHART);
        self.ui.say(format!("  chart: {}", chart.display()));

        if self.mailer.is_some() {
            let to = submission.entry.email.clone();
            self.send_mail(mail::quiz_mail(&to, &submission, language));
            self.ui.say(language.strings().check_email);
        }
    }

    /// Drain the UI queue and act on what it produced
    pub fn tick(&mut self) {
        self.ui_loop.drain(&mut self.ui);

        for event in std::mem::take(&mut self.ui.events) {
            match event {
                KioskEvent::PresenceDetected => {
                    if let Some(animator) = self.mascot() {
                        tracing::info!("presence confirmed, waking mascot");
                        animator.wake_up();
                    }
                }
                KioskEvent::Navigate(screen) => self.enter(screen),
                KioskEvent::Reply { reply, generation } => self.on_reply(reply, generation),
            }
        }
    }

    /// Drive the kiosk until `quit`, ctrl-c or shutdown
    ///
    /// Each line received on `commands` is one [`KioskCommand`]. When the
    /// sender closes the kiosk keeps running until ctrl-c.
    pub async fn run(mut self, mut commands: mpsc::Receiver<String>) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        tracing::info!(
            persona = self.ui.persona.id,
            language = %self.ui.language,
            voice = self.ui.voice,
            presence = self.detector.is_some(),
            "kiosk started"
        );

        self.enter(Screen::Mascot);
        flush(&mut self.ui);

        let mut ticker = tokio::time::interval(UI_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut input_open = true;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                line = commands.recv(), if input_open => match line {
                    Some(line) => {
                        if self.handle_line(&line) == Flow::Quit {
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("command input closed");
                        input_open = false;
                    }
                },
                _ = ticker.tick() => self.tick(),
            }
            flush(&mut self.ui);
        }

        self.shutdown();
    }

    /// Stop the mascot, detection and speech, then release the camera
    pub fn shutdown(&mut self) {
        self.leave(self.ui.screen);
        self.with_tts(TtsManager::stop);
        self.detector = None;
        if let Some(camera) = self.camera.take() {
            camera.shutdown();
        }
        tracing::info!("kiosk stopped");
    }
}

fn flush(ui: &mut KioskUi) {
    for line in ui.take_output() {
        println!("{line}");
    }
}

/// Camera and locator for live detection, if this build and host have them
fn presence_parts(config: &PresenceConfig) -> Option<(Arc<Camera>, Box<dyn FaceLocator>)> {
    let locator = match face_locator(config) {
        Ok(locator) => locator,
        Err(e) => {
            tracing::warn!(error = %e, "no face locator, presence detection disabled");
            return None;
        }
    };

    let Some(source) = frame_source(config) else {
        tracing::warn!("no camera source, presence detection disabled");
        return None;
    };

    Some((camera::install_global(move || source), locator))
}

fn frame_source(config: &PresenceConfig) -> Option<Box<dyn FrameSource>> {
    config
        .replay_dir
        .as_ref()
        .map(|dir| {
            tracing::info!(dir = %dir.display(), "replaying frames instead of live camera");
            let source = ImageSequenceSource::new(dir.clone(), config.detect_size);
            Box::new(source) as Box<dyn FrameSource>
        })
        .or_else(|| device_source(config))
}

#[cfg(feature = "camera")]
fn device_source(config: &PresenceConfig) -> Option<Box<dyn FrameSource>> {
    Some(Box::new(crate::presence::opencv::DeviceSource::new(
        config.camera_index,
        config.detect_size,
    )))
}

#[cfg(not(feature = "camera"))]
fn device_source(_config: &PresenceConfig) -> Option<Box<dyn FrameSource>> {
    None
}

#[cfg(feature = "camera")]
fn face_locator(config: &PresenceConfig) -> Result<Box<dyn FaceLocator>> {
    let locator = crate::presence::opencv::CascadeLocator::load(&config.cascade_paths)?;
    Ok(Box::new(locator))
}

#[cfg(not(feature = "camera"))]
fn face_locator(_config: &PresenceConfig) -> Result<Box<dyn FaceLocator>> {
    Err(Error::Detector(
        "built without the `camera` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_navigation_and_toggles() {
        assert_eq!("tap".parse::<KioskCommand>().unwrap(), KioskCommand::Tap);
        assert_eq!(
            " Chat ".parse::<KioskCommand>().unwrap(),
            KioskCommand::Go(Screen::Chat)
        );
        assert_eq!(
            "voice off".parse::<KioskCommand>().unwrap(),
            KioskCommand::Voice(false)
        );
        assert_eq!(
            "lang ua".parse::<KioskCommand>().unwrap(),
            KioskCommand::Language(Language::Ua)
        );
        assert_eq!(
            "persona 2".parse::<KioskCommand>().unwrap(),
            KioskCommand::Persona("2".to_string())
        );
    }

    #[test]
    fn test_parse_ask_keeps_question() {
        assert_eq!(
            "ask Ce specializări aveți?".parse::<KioskCommand>().unwrap(),
            KioskCommand::Ask("Ce specializări aveți?".to_string())
        );
        assert!("ask".parse::<KioskCommand>().is_err());
    }

    #[test]
    fn test_parse_quiz_forms() {
        let spaced = "quiz 5 5 5 1 1 1 3 3 3 4 4 4 a@b.ro".parse::<KioskCommand>().unwrap();
        let packed = "quiz 555111333444 a@b.ro".parse::<KioskCommand>().unwrap();
        assert_eq!(spaced, packed);
        assert_eq!(
            spaced,
            KioskCommand::Quiz {
                answers: vec![5, 5, 5, 1, 1, 1, 3, 3, 3, 4, 4, 4],
                email: "a@b.ro".to_string(),
            }
        );
        assert_eq!("quiz".parse::<KioskCommand>().unwrap(), KioskCommand::Go(Screen::Quiz));
        assert!("quiz 5 x a@b.ro".parse::<KioskCommand>().is_err());
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(matches!(
            "dance".parse::<KioskCommand>(),
            Err(Error::Command(_))
        ));
        assert!(matches!(
            "lang fr".parse::<KioskCommand>(),
            Err(Error::UnsupportedLanguage(_))
        ));
        assert!("voice maybe".parse::<KioskCommand>().is_err());
    }

    #[test]
    fn test_stale_frames_ignored_off_mascot() {
        let mut ui = KioskUi::new(Persona::standard(), Language::Ro, false);
        ui.show_frame(0, Path::new("faces/idle1.png"));
        assert!(ui.image().is_none());

        ui.screen = Screen::Mascot;
        ui.show_frame(0, Path::new("faces/idle1.png"));
        assert_eq!(ui.image(), Some(Path::new("faces/idle1.png")));
    }

    #[test]
    fn test_wink_signal_queues_home() {
        let mut ui = KioskUi::new(Persona::standard(), Language::Ro, false);
        ui.screen = Screen::Mascot;
        ui.mascot_signal(0, CharacterSignal::NavigateHome);
        assert!(matches!(ui.events.as_slice(), [KioskEvent::Navigate(Screen::Home)]));
    }

    #[test]
    fn test_signal_from_previous_session_dropped() {
        let mut ui = KioskUi::new(Persona::standard(), Language::Ro, false);
        ui.screen = Screen::Mascot;
        ui.mascot_session = 2;

        ui.mascot_signal(1, CharacterSignal::NavigateHome);
        ui.show_frame(1, Path::new("faces/wink3.png"));
        assert!(ui.events.is_empty());
        assert!(ui.image().is_none());

        ui.mascot_signal(2, CharacterSignal::NavigateHome);
        assert_eq!(ui.events.len(), 1);
    }
}
