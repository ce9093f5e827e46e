//! Outgoing mail
//!
//! Reported replies go to the admin and quiz results go to the student with
//! the result chart attached. Delivery is SMTP with STARTTLS; callers send
//! in the background so a slow relay never blocks the kiosk.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;

use crate::chat::Report;
use crate::config::MailConfig;
use crate::quiz::{Submission, chart};
use crate::{Error, Language, Result};

/// File attached to a mail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

/// One HTML mail ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<MailAttachment>,
}

/// Delivers mail
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the mail cannot be built or delivered
    async fn send(&self, mail: Mail) -> Result<()>;
}

/// SMTP delivery through a STARTTLS relay
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build a mailer, or `None` when no sender account is configured
    ///
    /// # Errors
    ///
    /// Returns error if the sender address or relay host is invalid
    pub fn from_config(config: &MailConfig) -> Result<Option<Self>> {
        let (Some(user), Some(password)) = (&config.user, &config.password) else {
            return Ok(None);
        };

        let from = parse_mailbox(user)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| Error::Email(format!("invalid relay {}: {e}", config.smtp_host)))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                user.clone(),
                password.expose_secret().to_string(),
            ))
            .build();

        tracing::info!(
            host = %config.smtp_host,
            port = config.smtp_port,
            "mail enabled"
        );
        Ok(Some(Self { from, transport }))
    }

    /// Assemble the MIME message for `mail`
    ///
    /// # Errors
    ///
    /// Returns error if an address or attachment type is invalid
    pub fn message(&self, mail: &Mail) -> Result<Message> {
        build_message(self.from.clone(), mail)
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: Mail) -> Result<()> {
        let message = self.message(&mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| Error::Email(format!("delivery to {} failed: {e}", mail.to)))?;

        tracing::info!(to = %mail.to, subject = %mail.subject, "mail sent");
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse()
        .map_err(|e| Error::Email(format!("invalid address {address:?}: {e}")))
}

fn build_message(from: Mailbox, mail: &Mail) -> Result<Message> {
    let mut body = MultiPart::mixed().singlepart(SinglePart::html(mail.html.clone()));
    for attachment in &mail.attachments {
        let content_type = ContentType::parse(attachment.content_type).map_err(|e| {
            Error::Email(format!("invalid content type {}: {e}", attachment.content_type))
        })?;
        body = body.singlepart(
            Attachment::new(attachment.filename.clone())
                .body(attachment.data.clone(), content_type),
        );
    }

    Message::builder()
        .from(from)
        .to(parse_mailbox(&mail.to)?)
        .subject(mail.subject.as_str())
        .multipart(body)
        .map_err(|e| Error::Email(e.to_string()))
}

/// Admin notice for a reported reply
#[must_use]
pub fn report_mail(admin: &str, report: &Report) -> Mail {
    Mail {
        to: admin.to_string(),
        subject: format!("REPORT: Message Reported at {}", report.timestamp),
        html: format!(
            "<h3>Raport mesaj utilizator</h3>\
             <p>Un utilizator a raportat următorul mesaj generat de AI \
             (persona <b>{}</b>, limba <b>{}</b>):</p>\
             <blockquote style=\"background: #ffe6e6; padding: 15px; \
             border-left: 5px solid #ff0000; color: #333;\">{}</blockquote>\
             <p><small>Trimis automat de THREEB la {}</small></p>",
            escape_html(&report.persona),
            escape_html(&report.language),
            escape_html(&report.text),
            escape_html(&report.timestamp),
        ),
        attachments: Vec::new(),
    }
}

/// Result mail for a completed quiz, with the result chart attached
#[must_use]
pub fn quiz_mail(to: &str, submission: &Submission, language: Language) -> Mail {
    let strings = language.strings();
    let coordinate = submission.entry.coordinate;
    Mail {
        to: to.to_string(),
        subject: strings.quiz_mail_subject.to_string(),
        html: format!(
            "<p>{}</p><h2>{} ({})</h2><p>x = {:.2}, y = {:.2}</p>",
            escape_html(strings.quiz_mail_intro),
            escape_html(&submission.entry.label),
            submission.entry.result,
            coordinate.x,
            coordinate.y,
        ),
        attachments: vec![MailAttachment {
            filename: chart::RESULT_CHART.to_string(),
            content_type: "image/png",
            data: submission.result_png.clone(),
        }],
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br>"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::{QuizLog, submit};

    fn sender() -> Mailbox {
        "kiosk@example.com".parse().unwrap()
    }

    #[test]
    fn test_report_mail_escapes_reply() {
        let report = Report {
            timestamp: "2026-01-02 10:00:00".to_string(),
            persona: "bro".to_string(),
            language: "ro".to_string(),
            text: "<script>alert(1)</script> & more".to_string(),
        };
        let mail = report_mail("admin@example.com", &report);

        assert_eq!(mail.to, "admin@example.com");
        assert!(mail.subject.contains("2026-01-02 10:00:00"));
        assert!(mail.html.contains("&lt;script&gt;alert(1)&lt;/script&gt; &amp; more"));
        assert!(!mail.html.contains("<script>"));
        assert!(mail.attachments.is_empty());
    }

    #[test]
    fn test_quiz_message_carries_chart() {
        let dir = tempfile::tempdir().unwrap();
        let log = QuizLog::new(dir.path().join("quiz_logs.json"));
        let submission = submit(&log, "student@example.com", &[5; 12], Language::En).unwrap();

        let mail = quiz_mail("student@example.com", &submission, Language::En);
        assert_eq!(mail.subject, "Your Engineering Compass result");
        assert!(mail.html.contains(&submission.entry.label));
        assert_eq!(mail.attachments[0].filename, chart::RESULT_CHART);
        assert_eq!(mail.attachments[0].data, submission.result_png);

        let formatted =
            String::from_utf8_lossy(&build_message(sender(), &mail).unwrap().formatted())
                .into_owned();
        assert!(formatted.contains("To: student@example.com"));
        assert!(formatted.contains("image/png"));
        assert!(formatted.contains(chart::RESULT_CHART));
    }

    #[test]
    fn test_bad_recipient_is_email_error() {
        let mail = Mail {
            to: "not an address".to_string(),
            subject: "x".to_string(),
            html: String::new(),
            attachments: Vec::new(),
        };
        assert!(matches!(build_message(sender(), &mail), Err(Error::Email(_))));
    }

    #[test]
    fn test_mailer_needs_credentials() {
        let config = MailConfig {
            user: Some("kiosk@example.com".to_string()),
            ..MailConfig::default()
        };
        assert!(SmtpMailer::from_config(&config).unwrap().is_none());
    }
}
