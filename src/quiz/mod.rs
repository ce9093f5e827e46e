//! Engineering compass quiz
//!
//! Twelve statements rated 1..=5 place the student on a plane whose
//! quadrants map to the four study programs:
//!
//! ```text
//!            y
//!     AIA    |    CTI
//!   ---------+--------- x
//!  Electrical|   ETTI
//! ```
//!
//! A completed quiz is appended to the [`QuizLog`] and both charts (the
//! student's point, every logged point) are redrawn next to the log.

pub mod chart;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Language, Result, journal};

/// One rated statement and its pull on the x/y axes
#[derive(Debug, Clone, Copy)]
pub struct Question {
    pub ro: &'static str,
    pub en: &'static str,
    pub ua: &'static str,
    pub wx: f64,
    pub wy: f64,
}

impl Question {
    #[must_use]
    pub const fn text(&self, language: Language) -> &'static str {
        match language {
            Language::Ro => self.ro,
            Language::En => self.en,
            Language::Ua => self.ua,
        }
    }
}

pub const QUESTIONS: [Question; 12] = [
    Question {
        ro: "Îți place să rezolvi probleme logice complexe doar scriind cod?",
        en: "Do you enjoy solving complex logical problems just by writing code?",
        ua: "Вам подобається вирішувати складні логічні задачі за допомогою коду?",
        wx: 1.0,
        wy: 1.0,
    },
    Question {
        ro: "Ești pasionat de cum funcționează un site web, o bază de date sau un AI?",
        en: "Are you passionate about how a website, database, or AI works?",
        ua: "Ви захоплюєтеся тим, як працюють веб-сайти, бази даних або ШІ?",
        wx: 1.0,
        wy: 1.0,
    },
    Question {
        ro: "Preferi să lucrezi exclusiv pe calculator, fără să atingi fire sau piese?",
        en: "Do you prefer working exclusively on a computer without touching wires or parts?",
        ua: "Ви віддаєте перевагу роботі виключно за комп'ютером, не торкаючись дротів?",
        wx: 1.0,
        wy: 1.0,
    },
    Question {
        ro: "Vrei să programezi roboți fizici care se mișcă și interacționează cu lumea?",
        en: "Do you want to program physical robots that move and interact with the world?",
        ua: "Ви хочете програмувати фізичних роботів, які рухаються та взаємодіють зі світом?",
        wx: -0.8,
        wy: 1.0,
    },
    Question {
        ro: "Te interesează cum se automatizează o casă (Smart Home) sau o fabrică?",
        en: "Are you interested in how to automate a house (Smart Home) or a factory?",
        ua: "Вам цікаво, як автоматизувати будинок (Smart Home) або завод?",
        wx: -0.5,
        wy: 0.8,
    },
    Question {
        ro: "Îți place ideea de a combina programarea cu senzorii și motoarele?",
        en: "Do you like the idea of combining programming with sensors and motors?",
        ua: "Вам подобається ідея поєднання програмування з датчиками та моторами?",
        wx: -0.5,
        wy: 1.0,
    },
    Question {
        ro: "Ești curios cum se produce energia electrică (eoliană, solară, nucleară)?",
        en: "Are you curious about how electricity is generated (wind, solar, nuclear)?",
        ua: "Вам цікаво, як виробляється електроенергія (вітрова, сонячна, ядерна)?",
        wx: -1.0,
        wy: -1.0,
    },
    Question {
        ro: "Te fascinează motoarele electrice mari și infrastructura de înaltă tensiune?",
        en: "Do large electric motors and high-voltage infrastructure fascinate you?",
        ua: "Вас захоплюють великі електродвигуни та високовольтна інфраструктура?",
        wx: -1.0,
        wy: -1.0,
    },
    Question {
        ro: "Vrei să proiectezi instalații electrice pentru clădiri sau orașe?",
        en: "Do you want to design electrical installations for buildings or cities?",
        ua: "Ви хочете проектувати електричні установки для будівель або міст?",
        wx: -1.0,
        wy: -0.8,
    },
    Question {
        ro: "Îți place să lipești piese mărunte pe plăci de circuite (cipuri, tranzistori)?",
        en: "Do you like soldering small parts onto circuit boards (chips, transistors)?",
        ua: "Вам подобається паяти дрібні деталі на платах (чіпи, транзистори)?",
        wx: 1.0,
        wy: -1.0,
    },
    Question {
        ro: "Ești curios cum funcționează semnalul 5G, Wi-Fi și antenele?",
        en: "Are you curious about how 5G signals, Wi-Fi, and antennas work?",
        ua: "Вам цікаво, як працюють сигнали 5G, Wi-Fi та антени?",
        wx: 1.0,
        wy: -0.8,
    },
    Question {
        ro: "Te pasionează prelucrarea semnalelor audio/video și microprocesoarele?",
        en: "Are you passionate about audio/video signal processing and microprocessors?",
        ua: "Ви захоплюєтеся обробкою аудіо/відео сигналів та мікропроцесорами?",
        wx: 1.0,
        wy: -0.8,
    },
];

/// Scores are scaled by this factor before clamping
const SCALE: f64 = 0.8;

/// Axis bound
pub const AXIS_LIMIT: f64 = 10.0;

/// A point on the compass plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    /// Both axes rounded to two decimals
    #[must_use]
    pub fn rounded(self) -> Self {
        let round = |v: f64| (v * 100.0).round() / 100.0;
        Self {
            x: round(self.x),
            y: round(self.y),
        }
    }
}

/// Place a full set of answers on the plane
///
/// # Errors
///
/// Returns error unless there is exactly one answer per question, each in 1..=5
pub fn score(answers: &[u8]) -> Result<Coordinate> {
    if answers.len() != QUESTIONS.len() {
        return Err(Error::Quiz(format!(
            "expected {} answers, got {}",
            QUESTIONS.len(),
            answers.len()
        )));
    }

    let mut x = 0.0;
    let mut y = 0.0;
    for (i, (&answer, question)) in answers.iter().zip(QUESTIONS.iter()).enumerate() {
        if !(1..=5).contains(&answer) {
            return Err(Error::Quiz(format!(
                "answer {} is {answer}, expected 1 to 5",
                i + 1
            )));
        }
        let weight = f64::from(answer) - 3.0;
        x += weight * question.wx;
        y += weight * question.wy;
    }

    Ok(Coordinate {
        x: (x * SCALE).clamp(-AXIS_LIMIT, AXIS_LIMIT),
        y: (y * SCALE).clamp(-AXIS_LIMIT, AXIS_LIMIT),
    })
}

/// Study program matching a compass quadrant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quadrant {
    /// Computers and information technology
    Cti,
    /// Automation and applied informatics
    Aia,
    /// Electronics and telecommunications
    Etti,
    /// Electrical engineering
    Electrical,
}

impl Quadrant {
    /// Ties on an axis go to the non-negative side
    #[must_use]
    pub fn classify(coordinate: Coordinate) -> Self {
        match (coordinate.x >= 0.0, coordinate.y >= 0.0) {
            (true, true) => Self::Cti,
            (false, true) => Self::Aia,
            (true, false) => Self::Etti,
            (false, false) => Self::Electrical,
        }
    }

    #[must_use]
    pub const fn acronym(self) -> &'static str {
        match self {
            Self::Cti => "CTI",
            Self::Aia => "AIA",
            Self::Etti => "ETTI",
            Self::Electrical => "IE",
        }
    }

    #[must_use]
    pub const fn label(self, language: Language) -> &'static str {
        match (self, language) {
            (Self::Cti, Language::Ro) => "Calculatoare și Tehnologia Informației",
            (Self::Cti, Language::En) => "Computers and Information Technology",
            (Self::Cti, Language::Ua) => "Комп'ютери та інформаційні технології",
            (Self::Aia, Language::Ro) => "Automatică și Informatică Aplicată",
            (Self::Aia, Language::En) => "Automation and Applied Informatics",
            (Self::Aia, Language::Ua) => "Автоматика та прикладна інформатика",
            (Self::Etti, Language::Ro) => "Electronică și Telecomunicații",
            (Self::Etti, Language::En) => "Electronics and Telecommunications",
            (Self::Etti, Language::Ua) => "Електроніка та телекомунікації",
            (Self::Electrical, Language::Ro) => "Inginerie Electrică",
            (Self::Electrical, Language::En) => "Electrical Engineering",
            (Self::Electrical, Language::Ua) => "Електротехніка",
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.acronym())
    }
}

/// Scored quiz
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuizResult {
    pub coordinate: Coordinate,
    pub quadrant: Quadrant,
}

/// Score answers and classify the result
///
/// # Errors
///
/// Returns error if the answers are invalid
pub fn evaluate(answers: &[u8]) -> Result<QuizResult> {
    let coordinate = score(answers)?;
    Ok(QuizResult {
        coordinate,
        quadrant: Quadrant::classify(coordinate),
    })
}

/// Minimal address check used by the kiosk form
///
/// # Errors
///
/// Returns error if the address has no `@`
pub fn validate_email(email: &str) -> Result<&str> {
    let email = email.trim();
    if email.contains('@') {
        Ok(email)
    } else {
        Err(Error::Quiz(format!("invalid email address: {email:?}")))
    }
}

/// One line of the quiz log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizLogEntry {
    pub timestamp: String,
    pub email: String,
    /// Program acronym
    #[serde(alias = "rezultat")]
    pub result: String,
    /// Program name in the language the quiz was taken in
    #[serde(default)]
    pub label: String,
    #[serde(alias = "coordonate")]
    pub coordinate: Coordinate,
}

/// Timestamp layout of log entries
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only record of completed quizzes
#[derive(Debug, Clone)]
pub struct QuizLog {
    path: PathBuf,
}

impl QuizLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one completed quiz
    ///
    /// # Errors
    ///
    /// Returns error if the log cannot be written
    pub fn append(
        &self,
        email: &str,
        result: &QuizResult,
        language: Language,
    ) -> Result<QuizLogEntry> {
        let entry = QuizLogEntry {
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            email: email.to_string(),
            result: result.quadrant.acronym().to_string(),
            label: result.quadrant.label(language).to_string(),
            coordinate: result.coordinate.rounded(),
        };
        let count = journal::append_entry(&self.path, entry.clone())?;
        tracing::info!(result = %result.quadrant, entries = count, "quiz result logged");
        Ok(entry)
    }

    /// # Errors
    ///
    /// Returns error if the log exists but cannot be read
    pub fn entries(&self) -> Result<Vec<QuizLogEntry>> {
        journal::read_entries(&self.path)
    }

    /// Every logged coordinate, for the collective chart
    ///
    /// # Errors
    ///
    /// Returns error if the log exists but cannot be read
    pub fn points(&self) -> Result<Vec<Coordinate>> {
        Ok(self.entries()?.into_iter().map(|e| e.coordinate).collect())
    }

    /// Directory the charts are written to
    #[must_use]
    pub fn chart_dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }
}

/// A logged quiz and its rendered result chart
#[derive(Debug, Clone)]
pub struct Submission {
    pub result: QuizResult,
    pub entry: QuizLogEntry,
    /// PNG of the student's point, ready to attach
    pub result_png: Vec<u8>,
}

/// Score, log and chart one completed quiz
///
/// Chart files that cannot be written are logged and skipped; the result
/// chart is still returned for mailing.
///
/// # Errors
///
/// Returns error if the email or answers are invalid, the log cannot be
/// updated or the chart cannot be encoded
pub fn submit(
    log: &QuizLog,
    email: &str,
    answers: &[u8],
    language: Language,
) -> Result<Submission> {
    let email = validate_email(email)?;
    let result = evaluate(answers)?;
    let entry = log.append(email, &result, language)?;

    let dir = log.chart_dir();
    let personal = chart::result_chart(result.coordinate);
    if let Err(e) = chart::save(&personal, &dir.join(chart::RESULT_CHART)) {
        tracing::warn!(error = %e, "failed to write result chart");
    }
    match log.points() {
        Ok(points) => {
            let collective = chart::collective_chart(&points);
            if let Err(e) = chart::save(&collective, &dir.join(chart::COLLECTIVE_CHART)) {
                tracing::warn!(error = %e, "failed to write collective chart");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to read quiz log for the collective chart"),
    }

    Ok(Submission {
        result,
        entry,
        result_png: chart::encode_png(&personal)?,
    })
}

/// Quadrant tallies over a set of points
#[must_use]
pub fn tally(points: &[Coordinate]) -> [(Quadrant, usize); 4] {
    let mut counts = [
        (Quadrant::Cti, 0),
        (Quadrant::Aia, 0),
        (Quadrant::Etti, 0),
        (Quadrant::Electrical, 0),
    ];
    for &point in points {
        let quadrant = Quadrant::classify(point);
        if let Some(slot) = counts.iter_mut().find(|(q, _)| *q == quadrant) {
            slot.1 += 1;
        }
    }
    counts
}
