//! Failure notifications and report delivery.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use crate::aggregate::AggregatedReport;
use crate::error::{CommandFailure, MailError};

/// A plain-text mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    /// RFC 822 rendering handed to the mailer.
    pub fn render(&self) -> String {
        let mut out = format!("To: {}\n", self.to.join(", "));
        out.push_str(&format!("Subject: {}\n", self.subject));
        out.push_str("Content-Type: text/plain; charset=utf-8\n\n");
        out.push_str(&self.body);
        if !self.body.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

/// Mail delivery backend.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Pipes messages to a sendmail-compatible command (`sendmail -t` by default).
#[derive(Debug, Clone)]
pub struct SendmailTransport {
    command: Vec<String>,
}

impl SendmailTransport {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl MailTransport for SendmailTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        if message.to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        let (exe, args) = self.command.split_first().ok_or(MailError::EmptyMailer)?;

        let mut child = Command::new(exe)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MailError::Spawn {
                program: exe.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(message.render().as_bytes())
                .await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(MailError::Exit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }
}

/// `"<cmd0> <cmd1> failed on <host>"`
pub fn failure_subject(command: &[String], hostname: &str) -> String {
    let head: Vec<&str> = command.iter().take(2).map(String::as_str).collect();
    format!("{} failed on {}", head.join(" "), hostname)
}

/// Joined command line, a blank line, then the captured output.
pub fn failure_body(failure: &CommandFailure) -> String {
    format!("{}\n\n{}", failure.command.join(" "), failure.output)
}

/// Routes failures and reports to recipient lists.
///
/// Delivery is fire-and-forget: transport errors are logged, never returned.
pub struct NotificationDispatcher {
    transport: Arc<dyn MailTransport>,
    hostname: String,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn MailTransport>, hostname: impl Into<String>) -> Self {
        Self {
            transport,
            hostname: hostname.into(),
        }
    }

    /// Tell `recipients` that a command failed.
    pub async fn notify_failure(&self, recipients: &[String], failure: &CommandFailure) {
        let message = MailMessage {
            to: recipients.to_vec(),
            subject: failure_subject(&failure.command, &self.hostname),
            body: failure_body(failure),
        };
        self.deliver(message).await;
    }

    /// Mail a finished report, using its title as subject.
    pub async fn deliver_report(&self, recipients: &[String], report: &AggregatedReport) {
        let message = MailMessage {
            to: recipients.to_vec(),
            subject: report.title.clone(),
            body: report.body.clone(),
        };
        self.deliver(message).await;
    }

    async fn deliver(&self, message: MailMessage) {
        if message.to.is_empty() {
            warn!(subject = %message.subject, "No recipients configured, mail dropped");
            return;
        }
        match self.transport.send(&message).await {
            Ok(()) => info!(subject = %message.subject, to = %message.to.join(","), "Mail sent"),
            Err(e) => warn!(subject = %message.subject, error = %e, "Mail delivery failed"),
        }
    }
}
