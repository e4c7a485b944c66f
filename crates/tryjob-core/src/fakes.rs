//! In-memory fakes for the command and mail seams (testing only)
//!
//! Provides `ScriptedRunner` and `MemoryMailer` that satisfy the trait
//! contracts without spawning processes or sending mail.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{MailError, RunnerError};
use crate::notify::{MailMessage, MailTransport};
use crate::runner::{CommandOutput, CommandRunner};

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Rule {
    prefix: String,
    exit_code: i32,
    stdout: String,
}

/// Command runner answering from a script of prefix rules.
///
/// A command matches a rule when its space-joined form starts with the
/// rule's prefix; the first matching rule wins. Unmatched commands succeed
/// with empty output. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed with `stdout` for commands starting with `prefix`.
    pub fn respond(mut self, prefix: &str, stdout: &str) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            exit_code: 0,
            stdout: stdout.to_string(),
        });
        self
    }

    /// Exit with `exit_code`, printing `output`, for commands starting with `prefix`.
    pub fn fail(mut self, prefix: &str, exit_code: i32, output: &str) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            exit_code,
            stdout: output.to_string(),
        });
        self
    }

    /// Commands run so far, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether any recorded command starts with `prefix`.
    pub fn ran(&self, prefix: &str) -> bool {
        self.calls()
            .iter()
            .any(|cmd| cmd.join(" ").starts_with(prefix))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &[String]) -> Result<CommandOutput, RunnerError> {
        if command.is_empty() {
            return Err(RunnerError::EmptyCommand);
        }
        self.calls.lock().unwrap().push(command.to_vec());

        let joined = command.join(" ");
        let (exit_code, stdout) = self
            .rules
            .iter()
            .find(|rule| joined.starts_with(&rule.prefix))
            .map(|rule| (rule.exit_code, rule.stdout.clone()))
            .unwrap_or_default();

        Ok(CommandOutput {
            command: command.to_vec(),
            exit_code,
            stdout,
            stderr: String::new(),
            duration_ms: 0,
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryMailer
// ---------------------------------------------------------------------------

/// Mail transport that keeps sent messages in memory.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<MailMessage>>,
    fail: bool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every delivery fails.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for MemoryMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Exit {
                code: 75,
                stderr: "temporary failure".to_string(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}
