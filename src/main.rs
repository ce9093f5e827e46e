use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use threeb_kiosk::kiosk::{Kiosk, KioskOptions};
use threeb_kiosk::mail::{self, MailTransport, SmtpMailer};
use threeb_kiosk::quiz::{self, QuizLog, chart};
use threeb_kiosk::tts::{PlaybackControl, TtsManager, play_samples, sine_tone};
use threeb_kiosk::{Assistant, Config, character};

/// THREEB - presence-aware mascot kiosk assistant
#[derive(Parser)]
#[command(name = "threeb", version, about)]
struct Cli {
    /// Persona id or selector number (e.g., "professor" or 2)
    #[arg(short, long, env = "THREEB_PERSONA", global = true)]
    persona: Option<String>,

    /// Language code (ro, en, ua)
    #[arg(short, long, env = "THREEB_LANGUAGE", global = true)]
    language: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Run without presence detection
    #[arg(long, global = true)]
    no_camera: bool,

    /// Run without speech output
    #[arg(long, env = "THREEB_DISABLE_VOICE", global = true)]
    no_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the kiosk, reading commands from stdin (default)
    Run,
    /// Ask the assistant one question
    Ask {
        question: String,
        /// Speak the reply
        #[arg(long)]
        speak: bool,
    },
    /// Speak text with the active persona's voice
    Say { text: String },
    /// Play a test tone
    TestSpeaker,
    /// Score a quiz, log the result, draw the charts and mail the student
    Quiz {
        /// Twelve answers from 1 to 5
        #[arg(required = true, num_args = 1..)]
        answers: Vec<u8>,
        #[arg(short, long)]
        email: String,
    },
    /// Show collective quiz results
    QuizStats,
    /// Verify that every animation frame loads
    CheckAssets,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,threeb_kiosk=info",
        1 => "info,threeb_kiosk=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.persona.as_deref(), cli.language.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            run_kiosk(
                config,
                KioskOptions {
                    camera: !cli.no_camera,
                    voice: !cli.no_voice,
                },
            )
            .await;
            Ok(())
        }
        Command::Ask { question, speak } => ask(&config, &question, speak && !cli.no_voice).await,
        Command::Say { text } => say(&config, &text).await,
        Command::TestSpeaker => test_speaker().await,
        Command::Quiz { answers, email } => score_quiz(&config, &answers, &email).await,
        Command::QuizStats => quiz_stats(&config),
        Command::CheckAssets => check_assets(&config),
    }
}

async fn run_kiosk(config: Config, options: KioskOptions) {
    let (tx, rx) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });

    let kiosk = Kiosk::from_config(config, options);
    println!("THREEB ready. Type `help` for commands.");
    kiosk.run(rx).await;
}

async fn ask(config: &Config, question: &str, speak: bool) -> anyhow::Result<()> {
    let assistant = Assistant::from_config(config);
    let reply = assistant.ask(question, config.persona, config.language).await;

    println!("{}: {}", config.persona.name, reply.text);
    for (id, card) in assistant.catalog().resolve(&reply.reference_ids) {
        println!("  [{id}] {} {}", card.name, card.link());
    }

    if speak {
        let tts = TtsManager::from_config(&config.tts);
        tts.speak(&reply.text, config.language, config.persona.gender);
        tts.finished().await;
    }
    Ok(())
}

async fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    println!(
        "Speaking as {} ({}): \"{text}\"",
        config.persona.name, config.language
    );

    let tts = TtsManager::from_config(&config.tts);
    tts.speak(text, config.language, config.persona.gender);
    tts.finished().await;

    println!("If you heard the speech, TTS is working!");
    println!("If not, check that `{}` is installed.", config.tts.edge_tts_bin);
    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24_000;
    let samples = sine_tone(440.0, Duration::from_secs(2), sample_rate);
    println!("Playing {} samples at {sample_rate} Hz...", samples.len());

    tokio::task::spawn_blocking(move || {
        play_samples(samples, sample_rate, &PlaybackControl::new())
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

async fn score_quiz(config: &Config, answers: &[u8], email: &str) -> anyhow::Result<()> {
    let log = QuizLog::new(config.paths.quiz_log.clone());
    let submission = quiz::submit(&log, email, answers, config.language)?;
    let coordinate = submission.entry.coordinate;

    println!(
        "{} ({:.2}, {:.2})",
        submission.entry.label, coordinate.x, coordinate.y
    );
    println!("chart: {}", log.chart_dir().join(chart::RESULT_CHART).display());

    match SmtpMailer::from_config(&config.mail)? {
        Some(mailer) => {
            let mail = mail::quiz_mail(&submission.entry.email, &submission, config.language);
            mailer.send(mail).await?;
            println!("{}", config.language.strings().check_email);
        }
        None => tracing::info!("mail not configured, result kept locally"),
    }
    Ok(())
}

fn quiz_stats(config: &Config) -> anyhow::Result<()> {
    let log = QuizLog::new(config.paths.quiz_log.clone());
    let points = log.points()?;

    println!("{} results in {}", points.len(), log.path().display());
    for (quadrant, count) in quiz::tally(&points) {
        println!(
            "  {:<5} {count:>4}  {}",
            quadrant.acronym(),
            quadrant.label(config.language)
        );
    }

    let path = log.chart_dir().join(chart::COLLECTIVE_CHART);
    chart::save(&chart::collective_chart(&points), &path)?;
    println!("chart: {}", path.display());
    Ok(())
}

fn check_assets(config: &Config) -> anyhow::Result<()> {
    let dir = &config.character.assets_dir;
    let report = character::check_assets(dir);

    for (image, error) in &report.failures {
        println!("  missing {image}: {error}");
    }
    println!(
        "{}/{} frames load from {}",
        report.checked - report.failures.len(),
        report.checked,
        dir.display()
    );

    if report.is_ok() {
        Ok(())
    } else {
        anyhow::bail!("{} animation frames unavailable", report.failures.len())
    }
}
